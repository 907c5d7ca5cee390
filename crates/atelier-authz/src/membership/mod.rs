//! Membership records and the store contract the resolver depends on.
//!
//! The durable membership store is owned by another service. This module
//! defines only what authorization needs from it:
//!
//! - point lookup of an *active* membership
//! - the four mutations driven by [`crate::coordinator::InvalidationCoordinator`]
//!
//! Two implementations ship with the crate: [`InMemoryMembershipStore`] for
//! tests and embedding, and [`PgMembershipStore`] over an existing
//! PostgreSQL `workspace_members` table.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryMembershipStore;
pub use postgres::PgMembershipStore;

use crate::registry::Role;
use async_trait::async_trait;
use atelier_common_core::{Timestamp, UserId, WorkspaceId};
use serde::{Deserialize, Serialize};

/// One user's standing in one workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceMembership {
    pub workspace_id: WorkspaceId,
    pub user_id: UserId,
    pub role: Role,
    pub is_active: bool,
    pub joined_at: Timestamp,
}

impl WorkspaceMembership {
    /// A fresh active membership joined now.
    pub fn new(workspace_id: WorkspaceId, user_id: UserId, role: Role) -> Self {
        Self {
            workspace_id,
            user_id,
            role,
            is_active: true,
            joined_at: Timestamp::now(),
        }
    }
}

/// Membership store result.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a membership store.
///
/// `Clone` so a single in-flight load can hand the same failure to every
/// waiter.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// No active membership for the pair.
    #[error("no active membership for {user} in {workspace}")]
    NotFound { workspace: WorkspaceId, user: UserId },

    /// The write would break a membership invariant (duplicate active row,
    /// owner demotion, wrong previous owner).
    #[error("membership conflict: {0}")]
    Conflict(String),

    /// The store could not be reached or failed internally.
    #[error("membership store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
                StoreError::Conflict(db_err.message().to_string())
            }
            _ => StoreError::Unavailable(err.to_string()),
        }
    }
}

/// Contract required from the membership system of record.
///
/// Only [`crate::coordinator::InvalidationCoordinator`] may call the write
/// methods; the resolver reads through [`find_active_membership`].
///
/// [`find_active_membership`]: MembershipStore::find_active_membership
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// The active membership for the pair, or `None`. Inactive rows are
    /// never returned.
    async fn find_active_membership(
        &self,
        user_id: UserId,
        workspace_id: WorkspaceId,
    ) -> StoreResult<Option<WorkspaceMembership>>;

    /// Insert an active membership. Fails with [`StoreError::Conflict`] when
    /// one already exists.
    async fn insert_membership(
        &self,
        workspace_id: WorkspaceId,
        user_id: UserId,
        role: Role,
    ) -> StoreResult<WorkspaceMembership>;

    /// Change the role of an existing active membership.
    async fn write_role(
        &self,
        workspace_id: WorkspaceId,
        user_id: UserId,
        role: Role,
    ) -> StoreResult<WorkspaceMembership>;

    /// Mark the active membership inactive.
    async fn deactivate_membership(
        &self,
        workspace_id: WorkspaceId,
        user_id: UserId,
    ) -> StoreResult<()>;

    /// Atomically make `new_owner` the owner and demote `old_owner` to admin.
    /// Either both rows change or neither does.
    async fn transfer_ownership(
        &self,
        workspace_id: WorkspaceId,
        old_owner: UserId,
        new_owner: UserId,
    ) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_membership_json_shape() {
        let m = WorkspaceMembership::new(WorkspaceId::new(), UserId::new(), Role::Member);
        let value = serde_json::to_value(&m).unwrap();
        assert_eq!(value["role"], "member");
        assert_eq!(value["isActive"], true);
        assert!(value.get("workspaceId").is_some());
        assert!(value.get("joinedAt").is_some());
    }

    #[test]
    fn test_store_error_messages() {
        let ws = WorkspaceId::new();
        let user = UserId::new();
        let err = StoreError::NotFound { workspace: ws, user };
        assert!(err.to_string().contains(&user.to_string()));
        assert!(StoreError::Unavailable("timeout".into()).to_string().contains("unavailable"));
    }
}
