//! Postgres membership store against a live database.
//!
//! Run with `ATELIER_TEST_DATABASE_URL` set and `--ignored`.

use atelier_authz::membership::PgMembershipStore;
use atelier_authz::{MembershipStore, Role, StoreError};
use atelier_common_core::{UserId, WorkspaceId};
use sqlx::PgPool;

/// Only the per-pair index, so the founding-owner rule rests on the store.
const SCHEMA: &str = "\
    CREATE TABLE IF NOT EXISTS workspace_members (\
        workspace_id uuid NOT NULL, user_id uuid NOT NULL, role text NOT NULL, \
        is_active boolean NOT NULL, joined_at timestamptz NOT NULL); \
    CREATE UNIQUE INDEX IF NOT EXISTS workspace_members_active_pair \
        ON workspace_members (workspace_id, user_id) WHERE is_active;";

async fn store() -> PgMembershipStore {
    let url = std::env::var("ATELIER_TEST_DATABASE_URL")
        .expect("ATELIER_TEST_DATABASE_URL must be set");
    let pool = PgPool::connect(&url).await.expect("Failed to connect");
    sqlx::raw_sql(SCHEMA).execute(&pool).await.expect("Failed to create schema");
    PgMembershipStore::new(pool)
}

#[tokio::test]
#[ignore = "needs ATELIER_TEST_DATABASE_URL"]
async fn test_concurrent_founding_joins_admit_one_owner() {
    let store = store().await;
    let ws = WorkspaceId::new();
    let (a, b) = (UserId::new(), UserId::new());

    let (first, second) = tokio::join!(
        store.insert_membership(ws, a, Role::Owner),
        store.insert_membership(ws, b, Role::Owner),
    );

    let founded = [&first, &second].iter().filter(|r| r.is_ok()).count();
    assert_eq!(founded, 1);
    assert!([first, second]
        .into_iter()
        .any(|r| matches!(r, Err(StoreError::Conflict(_)))));
}

#[tokio::test]
#[ignore = "needs ATELIER_TEST_DATABASE_URL"]
async fn test_transfer_swaps_roles() {
    let store = store().await;
    let ws = WorkspaceId::new();
    let (owner, admin) = (UserId::new(), UserId::new());

    store.insert_membership(ws, owner, Role::Owner).await.unwrap();
    store.insert_membership(ws, admin, Role::Admin).await.unwrap();
    store.transfer_ownership(ws, owner, admin).await.unwrap();

    let store = &store;
    let role_of = |user| async move {
        store
            .find_active_membership(user, ws)
            .await
            .unwrap()
            .map(|m| m.role)
    };
    assert_eq!(role_of(admin).await, Some(Role::Owner));
    assert_eq!(role_of(owner).await, Some(Role::Admin));
}
