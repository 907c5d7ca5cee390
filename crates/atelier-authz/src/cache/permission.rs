//! Permission cache: typed, fail-safe access to a [`CacheClient`].
//!
//! Reads never fail. Any client error, timeout or undecodable payload is
//! reported as [`CacheLookup::Miss`], which sends the resolver to the
//! membership store. A broken cache therefore costs latency, never
//! correctness.
//!
//! Writes on the read path (`set`, `del`, batch forms) are best-effort and
//! only logged. Eviction on the mutation path goes through [`PermissionCache::evict`],
//! which retries and reports failure.

use super::client::{CacheClient, CacheError, CacheResult, CacheStats};
use super::keys::CacheKey;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Result of a cache read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup<T> {
    Hit(T),
    Miss,
}

impl<T> CacheLookup<T> {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }
}

/// Cache entry lifetime.
///
/// Callers think in milliseconds; the backing stores keep whole seconds.
/// Conversion rounds up to the next second with a floor of one second, so
/// an entry never lives shorter than requested and millisecond values that
/// are whole seconds survive a round trip unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ttl {
    secs: u64,
}

impl Ttl {
    pub const fn from_secs(secs: u64) -> Self {
        Self {
            secs: if secs == 0 { 1 } else { secs },
        }
    }

    pub const fn from_millis(millis: u64) -> Self {
        Self::from_secs(millis.div_ceil(1000))
    }

    pub const fn as_secs(&self) -> u64 {
        self.secs
    }

    pub const fn as_millis(&self) -> u64 {
        self.secs.saturating_mul(1000)
    }

    pub const fn as_duration(&self) -> Duration {
        Duration::from_secs(self.secs)
    }
}

/// Tuning for [`PermissionCache`].
#[derive(Debug, Clone)]
pub struct PermissionCacheSettings {
    /// Lifetime of populated entries.
    pub ttl: Ttl,
    /// Upper bound on any single client round trip.
    pub op_timeout: Duration,
    /// Attempts made by [`PermissionCache::evict`] before giving up.
    pub eviction_attempts: u32,
    /// Delay before the second eviction attempt; grows linearly.
    pub eviction_backoff: Duration,
}

impl Default for PermissionCacheSettings {
    fn default() -> Self {
        Self {
            ttl: Ttl::from_secs(60),
            op_timeout: Duration::from_millis(100),
            eviction_attempts: 3,
            eviction_backoff: Duration::from_millis(25),
        }
    }
}

/// Typed facade over a cache client with timeouts and fail-safe reads.
pub struct PermissionCache {
    client: Arc<dyn CacheClient>,
    settings: PermissionCacheSettings,
    epoch: AtomicU64,
}

fn raw_keys(keys: &[CacheKey]) -> Vec<String> {
    keys.iter().map(|k| k.as_str().to_string()).collect()
}

impl PermissionCache {
    pub fn new(client: Arc<dyn CacheClient>, settings: PermissionCacheSettings) -> Self {
        Self {
            client,
            settings,
            epoch: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> &PermissionCacheSettings {
        &self.settings
    }

    /// Invalidation epoch; advanced by every [`evict`](Self::evict).
    ///
    /// A loader records the epoch before reading the store and skips
    /// populating the cache if it changed meanwhile, since its result may
    /// predate the mutation that caused the eviction.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    async fn bounded<T>(&self, fut: impl Future<Output = CacheResult<T>>) -> CacheResult<T> {
        match tokio::time::timeout(self.settings.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout(self.settings.op_timeout.as_millis() as u64)),
        }
    }

    fn decode<T: DeserializeOwned>(key: &str, raw: Option<String>) -> CacheLookup<T> {
        let Some(raw) = raw else {
            return CacheLookup::Miss;
        };
        match serde_json::from_str(&raw) {
            Ok(value) => CacheLookup::Hit(value),
            Err(e) => {
                warn!(key = key, error = %e, "Undecodable cache entry treated as miss");
                CacheLookup::Miss
            }
        }
    }

    /// Read a value. Never fails.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> CacheLookup<T> {
        match self.bounded(self.client.get(key.as_str())).await {
            Ok(raw) => {
                let lookup = Self::decode(key.as_str(), raw);
                debug!(key = %key, hit = lookup.is_hit(), "Permission cache read");
                lookup
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed, falling through to store");
                CacheLookup::Miss
            }
        }
    }

    /// Write a value with the configured TTL. Best-effort.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &CacheKey, value: &T) {
        self.set_with_ttl(key, value, self.settings.ttl).await
    }

    /// Write a value with an explicit TTL. Best-effort.
    pub async fn set_with_ttl<T: Serialize + ?Sized>(&self, key: &CacheKey, value: &T, ttl: Ttl) {
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache value not serializable, skipping write");
                return;
            }
        };

        if let Err(e) = self
            .bounded(self.client.set(key.as_str(), payload, ttl.as_secs()))
            .await
        {
            warn!(key = %key, error = %e, "Cache write failed");
        }
    }

    /// Delete a key. Best-effort; use [`evict`](Self::evict) on mutation paths.
    pub async fn del(&self, key: &CacheKey) {
        if let Err(e) = self.bounded(self.client.delete(key.as_str())).await {
            warn!(key = %key, error = %e, "Cache delete failed");
        }
    }

    /// Read many keys. Returns exactly one lookup per key, in order; when the
    /// batch fails as a whole every slot is a miss.
    pub async fn mget<T: DeserializeOwned>(&self, keys: &[CacheKey]) -> Vec<CacheLookup<T>> {
        if keys.is_empty() {
            return Vec::new();
        }

        let all_miss = || keys.iter().map(|_| CacheLookup::Miss).collect();

        match self.bounded(self.client.mget(&raw_keys(keys))).await {
            Ok(values) if values.len() == keys.len() => keys
                .iter()
                .zip(values)
                .map(|(key, raw)| Self::decode(key.as_str(), raw))
                .collect(),
            Ok(values) => {
                warn!(
                    expected = keys.len(),
                    got = values.len(),
                    "Cache batch read returned misaligned results, treating all as misses"
                );
                all_miss()
            }
            Err(e) => {
                warn!(count = keys.len(), error = %e, "Cache batch read failed");
                all_miss()
            }
        }
    }

    /// Write many values with one TTL. Best-effort; values that fail to
    /// serialize are skipped without affecting their siblings.
    pub async fn mset<T: Serialize>(&self, entries: &[(CacheKey, T)], ttl: Ttl) {
        let payloads: Vec<(String, String)> = entries
            .iter()
            .filter_map(|(key, value)| match serde_json::to_string(value) {
                Ok(payload) => Some((key.as_str().to_string(), payload)),
                Err(e) => {
                    warn!(key = %key, error = %e, "Cache value not serializable, skipping");
                    None
                }
            })
            .collect();

        if payloads.is_empty() {
            return;
        }

        if let Err(e) = self
            .bounded(self.client.mset(&payloads, ttl.as_secs()))
            .await
        {
            warn!(count = payloads.len(), error = %e, "Cache batch write failed");
        }
    }

    /// Delete many keys. Best-effort.
    pub async fn mdel(&self, keys: &[CacheKey]) {
        if keys.is_empty() {
            return;
        }
        if let Err(e) = self.bounded(self.client.mdel(&raw_keys(keys))).await {
            warn!(count = keys.len(), error = %e, "Cache batch delete failed");
        }
    }

    /// Remaining lifetime of a key, if present and reachable.
    pub async fn remaining_ttl(&self, key: &CacheKey) -> Option<Ttl> {
        match self.bounded(self.client.ttl_secs(key.as_str())).await {
            Ok(secs) => secs.map(Ttl::from_secs),
            Err(e) => {
                warn!(key = %key, error = %e, "Cache TTL lookup failed");
                None
            }
        }
    }

    /// Evict keys after a committed membership change.
    ///
    /// Advances the invalidation epoch first, then deletes with retries.
    /// Returns the last error if every attempt failed; the entries will then
    /// expire on their own within one TTL.
    pub async fn evict(&self, keys: &[CacheKey]) -> CacheResult<()> {
        self.epoch.fetch_add(1, Ordering::AcqRel);

        if keys.is_empty() {
            return Ok(());
        }

        let raw = raw_keys(keys);
        let attempts = self.settings.eviction_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.bounded(self.client.mdel(&raw)).await {
                Ok(()) => {
                    debug!(keys = ?raw, attempt = attempt, "Cache entries evicted");
                    return Ok(());
                }
                Err(e) if attempt < attempts => {
                    warn!(keys = ?raw, attempt = attempt, error = %e, "Eviction failed, retrying");
                    tokio::time::sleep(self.settings.eviction_backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        keys = ?raw,
                        attempts = attempts,
                        ttl_secs = self.settings.ttl.as_secs(),
                        error = %e,
                        "Eviction failed; stale entries remain until TTL expiry"
                    );
                    return Err(e);
                }
            }
        }
    }

    pub async fn stats(&self) -> CacheStats {
        self.client.stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use atelier_common_core::{UserId, WorkspaceId};

    fn cache() -> PermissionCache {
        PermissionCache::new(Arc::new(MemoryCache::new(64)), PermissionCacheSettings::default())
    }

    #[test]
    fn test_ttl_conversion() {
        assert_eq!(Ttl::from_millis(5_000).as_secs(), 5);
        assert_eq!(Ttl::from_millis(5_000).as_millis(), 5_000);
        assert_eq!(Ttl::from_millis(1_500).as_secs(), 2);
        assert_eq!(Ttl::from_millis(1).as_secs(), 1);
        assert_eq!(Ttl::from_millis(0).as_secs(), 1);
        assert_eq!(Ttl::from_secs(0), Ttl::from_secs(1));
    }

    #[tokio::test]
    async fn test_get_set_roundtrip_through_json() {
        let cache = cache();
        let key = CacheKey::user_context(UserId::new());

        assert_eq!(cache.get::<Vec<String>>(&key).await, CacheLookup::Miss);
        cache.set(&key, &vec!["a".to_string()]).await;
        assert_eq!(cache.get::<Vec<String>>(&key).await, CacheLookup::Hit(vec!["a".to_string()]));
    }

    #[tokio::test]
    async fn test_wrong_shape_is_a_miss() {
        let cache = cache();
        let key = CacheKey::user_context(UserId::new());
        cache.set(&key, "plain string").await;
        assert_eq!(cache.get::<Vec<u32>>(&key).await, CacheLookup::Miss);
    }

    #[tokio::test]
    async fn test_ttl_roundtrip_in_millis() {
        let cache = cache();
        let key = CacheKey::user_workspace(UserId::new(), WorkspaceId::new());
        cache.set_with_ttl(&key, &1u8, Ttl::from_millis(30_000)).await;
        let remaining = cache.remaining_ttl(&key).await.unwrap();
        assert_eq!(remaining.as_millis(), 30_000);
    }

    #[tokio::test]
    async fn test_batch_preserves_per_key_results() {
        let cache = cache();
        let user = UserId::new();
        let a = CacheKey::user_workspace(user, WorkspaceId::new());
        let b = CacheKey::user_workspace(user, WorkspaceId::new());
        let c = CacheKey::user_context(user);

        cache
            .mset(&[(a.clone(), 1u32), (c.clone(), 3u32)], Ttl::from_secs(60))
            .await;
        let got = cache.mget::<u32>(&[a.clone(), b.clone(), c.clone()]).await;
        assert_eq!(got, vec![CacheLookup::Hit(1), CacheLookup::Miss, CacheLookup::Hit(3)]);

        cache.mdel(&[a.clone(), c.clone()]).await;
        let got = cache.mget::<u32>(&[a, b, c]).await;
        assert!(got.iter().all(|l| !l.is_hit()));
    }

    #[tokio::test]
    async fn test_evict_advances_epoch() {
        let cache = cache();
        let key = CacheKey::user_context(UserId::new());
        cache.set(&key, &1u8).await;

        let before = cache.epoch();
        cache.evict(std::slice::from_ref(&key)).await.unwrap();
        assert_eq!(cache.epoch(), before + 1);
        assert_eq!(cache.get::<u8>(&key).await, CacheLookup::Miss);
    }
}
