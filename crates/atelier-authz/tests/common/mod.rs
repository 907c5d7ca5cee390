//! Common harness for authorization integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use atelier_authz::cache::CacheClient;
use atelier_authz::{AuthzEngine, CacheKey, PermissionCache, PermissionCacheSettings, Ttl};
use atelier_test_utils::{CountingStore, FlakyCache};

/// Engine wired to fault-injecting doubles.
pub struct TestContext {
    pub store: Arc<CountingStore>,
    pub client: Arc<FlakyCache>,
    pub engine: AuthzEngine,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_settings(test_settings())
    }

    pub fn with_settings(settings: PermissionCacheSettings) -> Self {
        let store = Arc::new(CountingStore::new());
        let client = Arc::new(FlakyCache::new());
        let cache = Arc::new(PermissionCache::new(client.clone(), settings));
        let engine = AuthzEngine::new(store.clone(), cache);

        Self {
            store,
            client,
            engine,
        }
    }

    pub fn cache(&self) -> &Arc<PermissionCache> {
        self.engine.cache()
    }

    /// Whether `key` is present in the backing cache, ignoring injected faults.
    pub async fn cached(&self, key: &CacheKey) -> bool {
        matches!(self.client.inner().get(key.as_str()).await, Ok(Some(_)))
    }
}

/// Short timeouts so fault tests stay fast.
pub fn test_settings() -> PermissionCacheSettings {
    PermissionCacheSettings {
        ttl: Ttl::from_secs(60),
        op_timeout: Duration::from_millis(50),
        eviction_attempts: 3,
        eviction_backoff: Duration::from_millis(1),
    }
}
