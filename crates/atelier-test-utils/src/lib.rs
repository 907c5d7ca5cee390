//! Test utilities for Atelier crates.
//!
//! Fault-injecting doubles for the two external collaborators of the
//! authorization engine, plus fixtures and assertion macros.

use async_trait::async_trait;
use atelier_authz::cache::{CacheClient, CacheError, CacheResult, CacheStats, MemoryCache};
use atelier_authz::{
    InMemoryMembershipStore, MembershipStore, Role, StoreError, StoreResult, WorkspaceMembership,
};
use atelier_common_core::{UserId, WorkspaceId};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Cache client over [`MemoryCache`] that can be made to fail or stall.
pub struct FlakyCache {
    inner: MemoryCache,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl FlakyCache {
    pub fn new() -> Self {
        Self {
            inner: MemoryCache::new(1024),
            failing: AtomicBool::new(false),
            delay: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    /// Make every subsequent call fail with a connection error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Stall every subsequent call by `delay`, or stop stalling with `None`.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    /// Calls received, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Direct access to the backing cache, bypassing faults.
    pub fn inner(&self) -> &MemoryCache {
        &self.inner
    }

    async fn gate(&self) -> CacheResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(CacheError::Connection("injected failure".to_string()));
        }
        Ok(())
    }
}

impl Default for FlakyCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheClient for FlakyCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.gate().await?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String, ttl_secs: u64) -> CacheResult<()> {
        self.gate().await?;
        self.inner.set(key, value, ttl_secs).await
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.gate().await?;
        self.inner.delete(key).await
    }

    async fn ttl_secs(&self, key: &str) -> CacheResult<Option<u64>> {
        self.gate().await?;
        self.inner.ttl_secs(key).await
    }

    async fn mget(&self, keys: &[String]) -> CacheResult<Vec<Option<String>>> {
        self.gate().await?;
        self.inner.mget(keys).await
    }

    async fn mset(&self, entries: &[(String, String)], ttl_secs: u64) -> CacheResult<()> {
        self.gate().await?;
        self.inner.mset(entries, ttl_secs).await
    }

    async fn mdel(&self, keys: &[String]) -> CacheResult<()> {
        self.gate().await?;
        self.inner.mdel(keys).await
    }

    async fn stats(&self) -> CacheStats {
        self.inner.stats().await
    }
}

/// Membership store over [`InMemoryMembershipStore`] that counts reads and
/// can be made slow or unavailable.
pub struct CountingStore {
    inner: InMemoryMembershipStore,
    reads: AtomicUsize,
    failing: AtomicBool,
    read_delay: Mutex<Option<Duration>>,
}

impl CountingStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryMembershipStore::new(),
            reads: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            read_delay: Mutex::new(None),
        }
    }

    /// Number of `find_active_membership` calls so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn reset_reads(&self) {
        self.reads.store(0, Ordering::SeqCst);
    }

    /// Make reads and writes fail as unavailable.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay the reply of every read by `delay`.
    pub fn set_read_delay(&self, delay: Option<Duration>) {
        *self.read_delay.lock() = delay;
    }

    pub fn inner(&self) -> &InMemoryMembershipStore {
        &self.inner
    }

    fn check(&self) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("injected failure".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Default for CountingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MembershipStore for CountingStore {
    async fn find_active_membership(
        &self,
        user_id: UserId,
        workspace_id: WorkspaceId,
    ) -> StoreResult<Option<WorkspaceMembership>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let found = match self.check() {
            Ok(()) => self.inner.find_active_membership(user_id, workspace_id).await,
            Err(e) => Err(e),
        };

        // The outcome is fixed before the delay, so a slow reply can carry
        // state that a concurrent write has already replaced.
        let delay = *self.read_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        found
    }

    async fn insert_membership(
        &self,
        workspace_id: WorkspaceId,
        user_id: UserId,
        role: Role,
    ) -> StoreResult<WorkspaceMembership> {
        self.check()?;
        self.inner.insert_membership(workspace_id, user_id, role).await
    }

    async fn write_role(
        &self,
        workspace_id: WorkspaceId,
        user_id: UserId,
        role: Role,
    ) -> StoreResult<WorkspaceMembership> {
        self.check()?;
        self.inner.write_role(workspace_id, user_id, role).await
    }

    async fn deactivate_membership(
        &self,
        workspace_id: WorkspaceId,
        user_id: UserId,
    ) -> StoreResult<()> {
        self.check()?;
        self.inner.deactivate_membership(workspace_id, user_id).await
    }

    async fn transfer_ownership(
        &self,
        workspace_id: WorkspaceId,
        old_owner: UserId,
        new_owner: UserId,
    ) -> StoreResult<()> {
        self.check()?;
        self.inner
            .transfer_ownership(workspace_id, old_owner, new_owner)
            .await
    }
}

/// A workspace with an owner and optional extra members.
pub struct WorkspaceFixture {
    pub workspace_id: WorkspaceId,
    pub owner: UserId,
}

impl WorkspaceFixture {
    /// Found a fresh workspace in `store`, then add `members` with fresh ids.
    /// Returns the fixture and the member ids in input order.
    pub async fn seed(
        store: &dyn MembershipStore,
        members: &[Role],
    ) -> StoreResult<(Self, Vec<UserId>)> {
        let workspace_id = WorkspaceId::new();
        let owner = UserId::new();
        store.insert_membership(workspace_id, owner, Role::Owner).await?;

        let mut ids = Vec::with_capacity(members.len());
        for role in members {
            let user = UserId::new();
            store.insert_membership(workspace_id, user, *role).await?;
            ids.push(user);
        }

        Ok((Self { workspace_id, owner }, ids))
    }
}

/// Assert that a Result is Ok and return the value.
#[macro_export]
macro_rules! assert_ok {
    ($expr:expr) => {
        match $expr {
            Ok(v) => v,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
}

/// Assert that a Result is Err and return the error.
#[macro_export]
macro_rules! assert_err {
    ($expr:expr) => {
        match $expr {
            Ok(v) => panic!("Expected Err, got Ok: {:?}", v),
            Err(e) => e,
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flaky_cache_toggles() {
        tokio_test::block_on(async {
            let cache = FlakyCache::new();
            assert_ok!(cache.set("k", "v".into(), 60).await);

            cache.set_failing(true);
            let err = assert_err!(cache.get("k").await);
            assert!(matches!(err, CacheError::Connection(_)));

            cache.set_failing(false);
            assert_eq!(assert_ok!(cache.get("k").await).as_deref(), Some("v"));
            assert_eq!(cache.calls(), 3);
        });
    }

    #[test]
    fn test_counting_store_counts_reads() {
        tokio_test::block_on(async {
            let store = CountingStore::new();
            let (fixture, members) = assert_ok!(WorkspaceFixture::seed(&store, &[Role::Viewer]).await);

            let found = assert_ok!(
                store
                    .find_active_membership(members[0], fixture.workspace_id)
                    .await
            );
            assert_eq!(found.map(|m| m.role), Some(Role::Viewer));
            assert_eq!(store.reads(), 1);
            assert_eq!(store.inner().owner_of(fixture.workspace_id), Some(fixture.owner));

            store.set_failing(true);
            assert_err!(store.find_active_membership(fixture.owner, fixture.workspace_id).await);
            assert_eq!(store.reads(), 2);
        });
    }
}
