//! Configuration types.

use crate::cache::{PermissionCacheSettings, Ttl};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthzConfig {
    /// Permission cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Membership database configuration.
    pub database: DatabaseConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which cache client backs the permission cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    Redis,
}

/// Permission cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,
    /// Required for the Redis backend.
    pub redis_url: Option<String>,
    /// Prepended to every key as `{prefix}:`. Empty keeps keys byte-exact
    /// for other services sharing the cache.
    #[serde(default)]
    pub key_prefix: String,
    /// Entry lifetime. Rounded up to whole seconds.
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,
    /// Bound on a single cache round trip.
    #[serde(default = "default_op_timeout_ms")]
    pub op_timeout_ms: u64,
    #[serde(default = "default_eviction_attempts")]
    pub eviction_attempts: u32,
    #[serde(default = "default_eviction_backoff_ms")]
    pub eviction_backoff_ms: u64,
    /// Capacity of the memory backend.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// Sweep interval of the memory backend.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

fn default_ttl_ms() -> u64 {
    60_000
}

fn default_op_timeout_ms() -> u64 {
    100
}

fn default_eviction_attempts() -> u32 {
    3
}

fn default_eviction_backoff_ms() -> u64 {
    25
}

fn default_max_entries() -> usize {
    100_000
}

fn default_cleanup_interval() -> u64 {
    30
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            redis_url: None,
            key_prefix: String::new(),
            ttl_ms: default_ttl_ms(),
            op_timeout_ms: default_op_timeout_ms(),
            eviction_attempts: default_eviction_attempts(),
            eviction_backoff_ms: default_eviction_backoff_ms(),
            max_entries: default_max_entries(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

impl CacheConfig {
    pub fn settings(&self) -> PermissionCacheSettings {
        PermissionCacheSettings {
            ttl: Ttl::from_millis(self.ttl_ms),
            op_timeout: Duration::from_millis(self.op_timeout_ms),
            eviction_attempts: self.eviction_attempts,
            eviction_backoff: Duration::from_millis(self.eviction_backoff_ms),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL.
    #[serde(default)]
    pub url: String,
    /// Maximum connections in pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum connections in pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Connection timeout.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Idle timeout.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    /// Enable query logging.
    #[serde(default)]
    pub log_queries: bool,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_idle_timeout() -> u64 {
    600
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// pretty, compact or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}
