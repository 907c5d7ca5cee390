//! Generic cache client contract.

use async_trait::async_trait;

/// Cache operation result.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Cache operation timed out after {0} ms")]
    Timeout(u64),
}

/// A TTL key/value store holding string payloads.
///
/// TTLs are whole seconds, the native resolution of the backing stores.
/// Batch methods default to looping over the single-key forms; backends
/// override them when they have a native round trip.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheClient: Send + Sync {
    /// Get a value from cache.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Set a value with a TTL in seconds.
    async fn set(&self, key: &str, value: String, ttl_secs: u64) -> CacheResult<()>;

    /// Delete a value. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Remaining TTL for a key, if it exists.
    async fn ttl_secs(&self, key: &str) -> CacheResult<Option<u64>>;

    /// Get many values; the result has one slot per key, in order.
    async fn mget(&self, keys: &[String]) -> CacheResult<Vec<Option<String>>> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(self.get(key).await?);
        }
        Ok(values)
    }

    /// Set many values with a shared TTL.
    async fn mset(&self, entries: &[(String, String)], ttl_secs: u64) -> CacheResult<()> {
        for (key, value) in entries {
            self.set(key, value.clone(), ttl_secs).await?;
        }
        Ok(())
    }

    /// Delete many keys.
    async fn mdel(&self, keys: &[String]) -> CacheResult<()> {
        for key in keys {
            self.delete(key).await?;
        }
        Ok(())
    }

    /// Get cache statistics.
    async fn stats(&self) -> CacheStats;
}

/// Cache statistics.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
