//! Permission caching.
//!
//! [`CacheClient`] is the raw TTL store, with in-memory and Redis backends.
//! [`PermissionCache`] layers typed values, timeouts, fail-safe reads and
//! strict eviction on top of any client.

pub mod client;
pub mod keys;
pub mod memory;
pub mod permission;
pub mod redis;

pub use client::{CacheClient, CacheError, CacheResult, CacheStats};
pub use keys::{CacheKey, USER_CONTEXT_PERMISSIONS, USER_WORKSPACE_PERMISSIONS};
pub use memory::MemoryCache;
pub use permission::{CacheLookup, PermissionCache, PermissionCacheSettings, Ttl};
pub use redis::RedisCache;
