//! Redis cache client.

use super::client::{CacheClient, CacheError, CacheResult, CacheStats};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Redis-backed cache client.
///
/// An optional prefix namespaces every key (`{prefix}:{key}`) for
/// deployments sharing one Redis; with an empty prefix keys are written
/// verbatim so other services can read them.
pub struct RedisCache {
    client: redis::Client,
    prefix: String,
    stats: CacheStatsInner,
}

#[derive(Default)]
struct CacheStatsInner {
    hits: AtomicU64,
    misses: AtomicU64,
}

fn backend(e: redis::RedisError) -> CacheError {
    CacheError::Backend(e.to_string())
}

impl RedisCache {
    /// Create a new Redis cache with the given URL and key prefix.
    pub fn new(url: &str, prefix: &str) -> CacheResult<Self> {
        let client =
            redis::Client::open(url).map_err(|e| CacheError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            prefix: prefix.to_string(),
            stats: CacheStatsInner::default(),
        })
    }

    /// Build a full key with prefix.
    fn key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.prefix, key)
        }
    }

    async fn connection(&self) -> CacheResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))
    }

    fn record(&self, hit: bool) {
        let counter = if hit { &self.stats.hits } else { &self.stats.misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl CacheClient for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.connection().await?;

        let value: Option<String> = redis::cmd("GET")
            .arg(self.key(key))
            .query_async(&mut conn)
            .await
            .map_err(backend)?;

        self.record(value.is_some());
        debug!(key = key, hit = value.is_some(), "Redis cache get");
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl_secs: u64) -> CacheResult<()> {
        // Redis rejects EX 0.
        if ttl_secs == 0 {
            return self.delete(key).await;
        }

        let mut conn = self.connection().await?;
        redis::cmd("SET")
            .arg(self.key(key))
            .arg(value)
            .arg("EX")
            .arg(ttl_secs)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(backend)?;

        debug!(key = key, ttl_secs = ttl_secs, "Redis cache set");
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.connection().await?;
        redis::cmd("DEL")
            .arg(self.key(key))
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(backend)?;

        debug!(key = key, "Redis cache delete");
        Ok(())
    }

    async fn ttl_secs(&self, key: &str) -> CacheResult<Option<u64>> {
        let mut conn = self.connection().await?;
        let ttl: i64 = redis::cmd("TTL")
            .arg(self.key(key))
            .query_async(&mut conn)
            .await
            .map_err(backend)?;

        // -2: missing, -1: no expiry.
        Ok((ttl > 0).then_some(ttl as u64))
    }

    async fn mget(&self, keys: &[String]) -> CacheResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.connection().await?;
        let full: Vec<String> = keys.iter().map(|k| self.key(k)).collect();
        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&full)
            .query_async(&mut conn)
            .await
            .map_err(backend)?;

        if values.len() != keys.len() {
            return Err(CacheError::Backend(format!(
                "MGET returned {} values for {} keys",
                values.len(),
                keys.len()
            )));
        }

        for value in &values {
            self.record(value.is_some());
        }
        Ok(values)
    }

    async fn mset(&self, entries: &[(String, String)], ttl_secs: u64) -> CacheResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        if ttl_secs == 0 {
            let keys: Vec<String> = entries.iter().map(|(k, _)| k.clone()).collect();
            return self.mdel(&keys).await;
        }

        let mut conn = self.connection().await?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value) in entries {
            pipe.cmd("SET")
                .arg(self.key(key))
                .arg(value)
                .arg("EX")
                .arg(ttl_secs)
                .ignore();
        }
        pipe.query_async::<_, ()>(&mut conn).await.map_err(backend)?;

        debug!(count = entries.len(), ttl_secs = ttl_secs, "Redis cache mset");
        Ok(())
    }

    async fn mdel(&self, keys: &[String]) -> CacheResult<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut conn = self.connection().await?;
        let full: Vec<String> = keys.iter().map(|k| self.key(k)).collect();
        redis::cmd("DEL")
            .arg(&full)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(backend)?;

        debug!(count = keys.len(), "Redis cache mdel");
        Ok(())
    }

    async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            size: 0,
            evictions: 0,
        }
    }
}
