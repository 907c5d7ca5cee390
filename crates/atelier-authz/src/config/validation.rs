//! Configuration validation.

use super::types::{AuthzConfig, CacheBackend};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Redis backend selected but no redis_url given")]
    MissingRedisUrl,

    #[error("Cache TTL must be positive")]
    InvalidTtl,

    #[error("Cache operation timeout must be positive")]
    InvalidOpTimeout,

    #[error("Eviction needs at least one attempt")]
    InvalidEvictionAttempts,

    #[error("Memory cache needs room for at least one entry")]
    InvalidMaxEntries,

    #[error("Invalid key prefix: {0}")]
    InvalidKeyPrefix(String),

    #[error("Invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}")]
    InvalidLogFormat(String),
}

/// Validate configuration, reporting every problem at once.
pub fn validate_config(config: &AuthzConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let url = &config.database.url;
    if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
        errors.push(ConfigError::InvalidDatabaseUrl);
    }

    let cache = &config.cache;
    if cache.backend == CacheBackend::Redis
        && cache.redis_url.as_deref().map_or(true, str::is_empty)
    {
        errors.push(ConfigError::MissingRedisUrl);
    }
    if cache.ttl_ms == 0 {
        errors.push(ConfigError::InvalidTtl);
    }
    if cache.op_timeout_ms == 0 {
        errors.push(ConfigError::InvalidOpTimeout);
    }
    if cache.eviction_attempts == 0 {
        errors.push(ConfigError::InvalidEvictionAttempts);
    }
    if cache.backend == CacheBackend::Memory && cache.max_entries == 0 {
        errors.push(ConfigError::InvalidMaxEntries);
    }
    if cache.key_prefix.contains(char::is_whitespace) || cache.key_prefix.ends_with(':') {
        errors.push(ConfigError::InvalidKeyPrefix(cache.key_prefix.clone()));
    }

    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.logging.level.to_lowercase().as_str()) {
        errors.push(ConfigError::InvalidLogLevel(config.logging.level.clone()));
    }

    let valid_formats = ["pretty", "compact", "json"];
    if !valid_formats.contains(&config.logging.format.to_lowercase().as_str()) {
        errors.push(ConfigError::InvalidLogFormat(config.logging.format.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
