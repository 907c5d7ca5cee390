//! In-memory cache client.

use super::client::{CacheClient, CacheResult, CacheStats};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::debug;

struct Entry {
    value: String,
    expires_at: Instant,
}

#[derive(Default)]
struct CacheStatsInner {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// Process-local cache client for single-node deployments and tests.
pub struct MemoryCache {
    entries: Arc<DashMap<String, Entry>>,
    max_size: usize,
    stats: CacheStatsInner,
}

impl MemoryCache {
    /// Create a cache holding at most `max_size` entries.
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            max_size,
            stats: CacheStatsInner::default(),
        }
    }

    /// Spawn a background task that drops expired entries every `every`.
    ///
    /// Expired entries are never served even without this task; it only
    /// bounds memory. The task ends on the first tick after the cache is
    /// dropped.
    pub fn start_cleanup(&self, every: Duration) -> JoinHandle<()> {
        let entries = Arc::downgrade(&self.entries);
        tokio::spawn(async move {
            let mut ticker = interval(every);
            loop {
                ticker.tick().await;
                let Some(entries) = entries.upgrade() else {
                    debug!("Memory cache dropped, stopping cleanup");
                    break;
                };
                let now = Instant::now();
                entries.retain(|_, entry| entry.expires_at > now);
            }
        })
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_if_needed(&self, incoming: &str) {
        if self.entries.len() < self.max_size || self.entries.contains_key(incoming) {
            return;
        }

        // Prefer dropping something already expired.
        let now = Instant::now();
        let victim = self
            .entries
            .iter()
            .find(|e| e.value().expires_at <= now)
            .or_else(|| self.entries.iter().next())
            .map(|e| e.key().clone());

        if let Some(key) = victim {
            self.entries.remove(&key);
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[async_trait]
impl CacheClient for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let now = Instant::now();
        let value = match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            _ => None,
        };

        match value {
            Some(value) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = key, "Memory cache hit");
                Ok(Some(value))
            }
            None => {
                self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = key, "Memory cache miss");
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: String, ttl_secs: u64) -> CacheResult<()> {
        self.evict_if_needed(key);

        let entry = Entry {
            value,
            expires_at: Instant::now() + Duration::from_secs(ttl_secs),
        };
        self.entries.insert(key.to_string(), entry);
        debug!(key = key, ttl_secs = ttl_secs, "Memory cache set");
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.remove(key);
        debug!(key = key, "Memory cache delete");
        Ok(())
    }

    async fn ttl_secs(&self, key: &str) -> CacheResult<Option<u64>> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            // Round up so a fresh entry reports its full TTL.
            .map(|entry| (entry.expires_at - now).as_millis().div_ceil(1000) as u64))
    }

    async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            size: self.entries.len() as u64,
            evictions: self.stats.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = MemoryCache::new(16);
        cache.set("k", "v".into(), 60).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_zero_ttl_is_never_served() {
        let cache = MemoryCache::new(16);
        cache.set("k", "v".into(), 0).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_ttl_reports_whole_seconds() {
        let cache = MemoryCache::new(16);
        cache.set("k", "v".into(), 30).await.unwrap();
        assert_eq!(cache.ttl_secs("k").await.unwrap(), Some(30));
        assert_eq!(cache.ttl_secs("absent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_capacity_is_bounded() {
        let cache = MemoryCache::new(2);
        for key in ["a", "b", "c"] {
            cache.set(key, key.into(), 60).await.unwrap();
        }
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().await.evictions, 1);
        assert_eq!(cache.get("c").await.unwrap().as_deref(), Some("c"));
    }

    #[tokio::test]
    async fn test_overwrite_does_not_evict() {
        let cache = MemoryCache::new(1);
        cache.set("a", "1".into(), 60).await.unwrap();
        cache.set("a", "2".into(), 60).await.unwrap();
        assert_eq!(cache.stats().await.evictions, 0);
        assert_eq!(cache.get("a").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_cleanup_sweeps_and_stops_with_cache() {
        let cache = MemoryCache::new(8);
        cache.set("gone", "v".into(), 0).await.unwrap();
        let sweeper = cache.start_cleanup(Duration::from_millis(5));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.is_empty());

        drop(cache);
        tokio::time::timeout(Duration::from_secs(1), sweeper)
            .await
            .expect("cleanup task outlived the cache")
            .unwrap();
    }

    #[tokio::test]
    async fn test_batch_defaults_keep_order() {
        let cache = MemoryCache::new(16);
        cache
            .mset(&[("x".into(), "1".into()), ("z".into(), "3".into())], 60)
            .await
            .unwrap();
        let values = cache
            .mget(&["x".into(), "y".into(), "z".into()])
            .await
            .unwrap();
        assert_eq!(values, vec![Some("1".into()), None, Some("3".into())]);

        cache.mdel(&["x".into(), "z".into()]).await.unwrap();
        assert!(cache.is_empty());
    }
}
