//! Behaviour under cache and store faults.
//!
//! The cache may fail or stall at any time; decisions must then come from
//! the store. The store failing is an error, never a grant.

mod common;

use std::time::Duration;

use atelier_authz::cache::CacheClient;
use atelier_authz::{
    tokens, AuthzError, CacheKey, CacheLookup, PermissionCacheSettings, Role, StoreError,
    WorkspacePermissionEntry,
};
use atelier_common_core::{UserId, WorkspaceId};
use atelier_test_utils::{assert_err, assert_ok, WorkspaceFixture};
use common::{test_settings, TestContext};
use futures_util::future::join_all;

#[tokio::test]
async fn test_cache_outage_falls_back_to_store() {
    let ctx = TestContext::new();
    let (fixture, members) = assert_ok!(WorkspaceFixture::seed(ctx.store.as_ref(), &[Role::Member]).await);
    let (ws, member) = (fixture.workspace_id, members[0]);
    let resolver = &ctx.engine.resolver;

    ctx.client.set_failing(true);

    assert!(assert_ok!(
        resolver
            .has_permission_in_workspace(member, ws, &tokens::CARD_CREATE)
            .await
    ));
    assert!(!assert_ok!(
        resolver
            .has_permission_in_workspace(member, ws, &tokens::MEMBER_INVITE)
            .await
    ));
    assert!(!assert_ok!(
        resolver
            .has_workspace_access(UserId::new(), ws, None)
            .await
    ));

    // Nothing sticks while the cache is down, so every check reads the store.
    assert_eq!(ctx.store.reads(), 3);
    assert!(ctx.client.calls() > 0);
}

#[tokio::test]
async fn test_stalled_cache_behaves_like_a_miss() {
    let ctx = TestContext::with_settings(PermissionCacheSettings {
        op_timeout: Duration::from_millis(20),
        ..test_settings()
    });
    let (fixture, members) = assert_ok!(WorkspaceFixture::seed(ctx.store.as_ref(), &[Role::Viewer]).await);
    let (ws, viewer) = (fixture.workspace_id, members[0]);

    ctx.client.set_delay(Some(Duration::from_millis(200)));

    let role = assert_ok!(ctx.engine.resolver.get_user_workspace_role(viewer, ws).await);
    assert_eq!(role, Some(Role::Viewer));
    assert_eq!(ctx.store.reads(), 1);

    let lookup = ctx
        .cache()
        .get::<WorkspacePermissionEntry>(&CacheKey::user_workspace(viewer, ws))
        .await;
    assert!(!lookup.is_hit());
}

#[tokio::test]
async fn test_corrupt_entry_is_reloaded() {
    let ctx = TestContext::new();
    let (fixture, members) = assert_ok!(WorkspaceFixture::seed(ctx.store.as_ref(), &[Role::Admin]).await);
    let (ws, admin) = (fixture.workspace_id, members[0]);
    let key = CacheKey::user_workspace(admin, ws);

    assert_ok!(ctx.client.inner().set(key.as_str(), "not json".to_string(), 60).await);

    assert!(assert_ok!(
        ctx.engine
            .resolver
            .has_permission_in_workspace(admin, ws, &tokens::MEMBER_REMOVE)
            .await
    ));
    assert_eq!(ctx.store.reads(), 1);
    assert!(matches!(
        ctx.cache().get::<WorkspacePermissionEntry>(&key).await,
        CacheLookup::Hit(_)
    ));
}

#[tokio::test]
async fn test_store_outage_is_an_error_not_a_decision() {
    let ctx = TestContext::new();
    let (fixture, _) = assert_ok!(WorkspaceFixture::seed(ctx.store.as_ref(), &[]).await);
    let resolver = &ctx.engine.resolver;

    ctx.store.set_failing(true);

    let err = assert_err!(
        resolver
            .has_workspace_access(fixture.owner, fixture.workspace_id, None)
            .await
    );
    assert!(matches!(err, AuthzError::Store(StoreError::Unavailable(_))));
    assert_eq!(err.error_code(), "STORE_UNAVAILABLE");
    assert!(err.is_infrastructure());

    let err = assert_err!(
        resolver
            .require_permission(fixture.owner, fixture.workspace_id, &tokens::CANVAS_READ, "Denied")
            .await
    );
    assert!(!err.is_denial());
}

#[tokio::test]
async fn test_cached_decision_survives_store_outage() {
    let ctx = TestContext::new();
    let (fixture, members) = assert_ok!(WorkspaceFixture::seed(ctx.store.as_ref(), &[Role::Member]).await);
    let (ws, member) = (fixture.workspace_id, members[0]);
    let resolver = &ctx.engine.resolver;

    assert_ok!(resolver.get_user_workspace_role(member, ws).await);
    ctx.store.set_failing(true);

    assert!(assert_ok!(
        resolver
            .has_permission_in_workspace(member, ws, &tokens::CANVAS_UPDATE)
            .await
    ));
    // Non-members are never cached, so they still need the store.
    assert_err!(resolver.has_workspace_access(UserId::new(), ws, None).await);
}

#[tokio::test]
async fn test_concurrent_misses_share_one_store_read() {
    let ctx = TestContext::new();
    let (fixture, members) = assert_ok!(WorkspaceFixture::seed(ctx.store.as_ref(), &[Role::Member]).await);
    let (ws, member) = (fixture.workspace_id, members[0]);

    ctx.store.set_read_delay(Some(Duration::from_millis(50)));

    let token = tokens::CANVAS_CREATE;
    let checks = (0..16).map(|_| {
        ctx.engine
            .resolver
            .has_permission_in_workspace(member, ws, &token)
    });
    let results = join_all(checks).await;

    assert!(results.into_iter().all(|r| matches!(r, Ok(true))));
    assert_eq!(ctx.store.reads(), 1);
}

#[tokio::test]
async fn test_concurrent_misses_share_one_failure() {
    let ctx = TestContext::new();
    let ws = WorkspaceId::new();
    let user = UserId::new();

    ctx.store.set_failing(true);
    ctx.store.set_read_delay(Some(Duration::from_millis(20)));

    let checks = (0..8).map(|_| ctx.engine.resolver.get_user_workspace_role(user, ws));
    let results = join_all(checks).await;

    assert!(results
        .iter()
        .all(|r| matches!(r, Err(AuthzError::Store(StoreError::Unavailable(_))))));
    assert_eq!(ctx.store.reads(), 1);
}

#[tokio::test]
async fn test_batch_read_failure_reads_each_from_store() {
    let ctx = TestContext::new();
    let user = UserId::new();
    let mut workspaces = Vec::new();
    for _ in 0..3 {
        let (fixture, _) = assert_ok!(WorkspaceFixture::seed(ctx.store.as_ref(), &[]).await);
        assert_ok!(ctx.engine.coordinator.join(fixture.workspace_id, user, Role::Member).await);
        workspaces.push(fixture.workspace_id);
    }

    // Warm every entry, then take the cache down.
    assert_ok!(ctx.engine.resolver.get_user_workspace_roles(user, &workspaces).await);
    ctx.store.reset_reads();
    ctx.client.set_failing(true);

    let keys: Vec<CacheKey> = workspaces
        .iter()
        .map(|ws| CacheKey::user_workspace(user, *ws))
        .collect();
    let lookups = ctx.cache().mget::<WorkspacePermissionEntry>(&keys).await;
    assert!(lookups.iter().all(|l| !l.is_hit()));

    let roles = assert_ok!(ctx.engine.resolver.get_user_workspace_roles(user, &workspaces).await);
    assert_eq!(roles, vec![Some(Role::Member); 3]);
    assert_eq!(ctx.store.reads(), 3);
}
