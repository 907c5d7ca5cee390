//! Wiring of store, cache, resolver and coordinator.

use crate::cache::{CacheClient, MemoryCache, PermissionCache, RedisCache};
use crate::config::{AuthzConfig, CacheBackend, CacheConfig};
use crate::coordinator::InvalidationCoordinator;
use crate::db::create_pool;
use crate::membership::{MembershipStore, PgMembershipStore};
use crate::resolver::AuthorizationResolver;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Resolver and coordinator sharing one store and one permission cache.
pub struct AuthzEngine {
    pub resolver: AuthorizationResolver,
    pub coordinator: InvalidationCoordinator,
}

impl AuthzEngine {
    pub fn new(store: Arc<dyn MembershipStore>, cache: Arc<PermissionCache>) -> Self {
        Self {
            resolver: AuthorizationResolver::new(Arc::clone(&store), Arc::clone(&cache)),
            coordinator: InvalidationCoordinator::new(store, cache),
        }
    }

    /// Connect to the configured database and cache.
    pub async fn connect(config: &AuthzConfig) -> Result<Self> {
        let pool = create_pool(&config.database).await?;
        let store: Arc<dyn MembershipStore> = Arc::new(PgMembershipStore::new(pool));
        let client = cache_client(&config.cache)?;
        let cache = Arc::new(PermissionCache::new(client, config.cache.settings()));
        Ok(Self::new(store, cache))
    }

    pub fn cache(&self) -> &Arc<PermissionCache> {
        self.resolver.cache()
    }
}

/// Build the cache client selected by `config`.
///
/// The memory backend starts its expiry sweep on the current runtime.
pub fn cache_client(config: &CacheConfig) -> Result<Arc<dyn CacheClient>> {
    match config.backend {
        CacheBackend::Memory => {
            let cache = MemoryCache::new(config.max_entries);
            cache.start_cleanup(Duration::from_secs(config.cleanup_interval_secs.max(1)));
            info!(max_entries = config.max_entries, "Using in-memory permission cache");
            Ok(Arc::new(cache))
        }
        CacheBackend::Redis => {
            let url = config
                .redis_url
                .as_deref()
                .context("cache.redis_url is required for the redis backend")?;
            let cache = RedisCache::new(url, &config.key_prefix).context("Invalid Redis URL")?;
            info!(prefix = %config.key_prefix, "Using Redis permission cache");
            Ok(Arc::new(cache))
        }
    }
}
