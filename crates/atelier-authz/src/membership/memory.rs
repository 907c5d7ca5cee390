//! In-process membership store.

use super::{MembershipStore, StoreError, StoreResult, WorkspaceMembership};
use crate::registry::Role;
use async_trait::async_trait;
use atelier_common_core::{UserId, WorkspaceId};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// Membership store backed by a locked map.
///
/// Removed members keep their row with `is_active = false`. All invariant
/// checks run under the write lock, so the single-owner rule holds under
/// concurrent writers.
#[derive(Default)]
pub struct InMemoryMembershipStore {
    rows: RwLock<HashMap<(WorkspaceId, UserId), WorkspaceMembership>>,
}

impl InMemoryMembershipStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of active memberships across all workspaces.
    pub fn active_count(&self) -> usize {
        self.rows.read().values().filter(|m| m.is_active).count()
    }

    /// The active owner of a workspace, if any.
    pub fn owner_of(&self, workspace_id: WorkspaceId) -> Option<UserId> {
        self.rows
            .read()
            .values()
            .find(|m| m.workspace_id == workspace_id && m.is_active && m.role.is_owner())
            .map(|m| m.user_id)
    }
}

fn active_mut(
    rows: &mut HashMap<(WorkspaceId, UserId), WorkspaceMembership>,
    workspace_id: WorkspaceId,
    user_id: UserId,
) -> StoreResult<&mut WorkspaceMembership> {
    rows.get_mut(&(workspace_id, user_id))
        .filter(|m| m.is_active)
        .ok_or(StoreError::NotFound {
            workspace: workspace_id,
            user: user_id,
        })
}

#[async_trait]
impl MembershipStore for InMemoryMembershipStore {
    async fn find_active_membership(
        &self,
        user_id: UserId,
        workspace_id: WorkspaceId,
    ) -> StoreResult<Option<WorkspaceMembership>> {
        Ok(self
            .rows
            .read()
            .get(&(workspace_id, user_id))
            .filter(|m| m.is_active)
            .cloned())
    }

    async fn insert_membership(
        &self,
        workspace_id: WorkspaceId,
        user_id: UserId,
        role: Role,
    ) -> StoreResult<WorkspaceMembership> {
        let mut rows = self.rows.write();

        if rows
            .get(&(workspace_id, user_id))
            .is_some_and(|m| m.is_active)
        {
            return Err(StoreError::Conflict(format!(
                "{user_id} is already a member of {workspace_id}"
            )));
        }

        if role.is_owner()
            && rows
                .values()
                .any(|m| m.workspace_id == workspace_id && m.is_active && m.role.is_owner())
        {
            return Err(StoreError::Conflict(format!(
                "{workspace_id} already has an owner"
            )));
        }

        let membership = WorkspaceMembership::new(workspace_id, user_id, role);
        rows.insert((workspace_id, user_id), membership.clone());
        debug!(workspace = %workspace_id, user = %user_id, role = %role, "Membership inserted");
        Ok(membership)
    }

    async fn write_role(
        &self,
        workspace_id: WorkspaceId,
        user_id: UserId,
        role: Role,
    ) -> StoreResult<WorkspaceMembership> {
        let mut rows = self.rows.write();
        let membership = active_mut(&mut rows, workspace_id, user_id)?;

        if membership.role.is_owner() || role.is_owner() {
            return Err(StoreError::Conflict(
                "ownership changes only through transfer".to_string(),
            ));
        }

        membership.role = role;
        Ok(membership.clone())
    }

    async fn deactivate_membership(
        &self,
        workspace_id: WorkspaceId,
        user_id: UserId,
    ) -> StoreResult<()> {
        let mut rows = self.rows.write();
        let membership = active_mut(&mut rows, workspace_id, user_id)?;

        if membership.role.is_owner() {
            return Err(StoreError::Conflict(
                "the workspace owner cannot be removed".to_string(),
            ));
        }

        membership.is_active = false;
        Ok(())
    }

    async fn transfer_ownership(
        &self,
        workspace_id: WorkspaceId,
        old_owner: UserId,
        new_owner: UserId,
    ) -> StoreResult<()> {
        if old_owner == new_owner {
            return Err(StoreError::Conflict(
                "ownership cannot be transferred to the current owner".to_string(),
            ));
        }

        let mut rows = self.rows.write();

        // Validate both rows before touching either.
        let old_is_owner = active_mut(&mut rows, workspace_id, old_owner)?.role.is_owner();
        if !old_is_owner {
            return Err(StoreError::Conflict(format!(
                "{old_owner} is not the owner of {workspace_id}"
            )));
        }
        active_mut(&mut rows, workspace_id, new_owner)?;

        active_mut(&mut rows, workspace_id, new_owner)?.role = Role::Owner;
        active_mut(&mut rows, workspace_id, old_owner)?.role = Role::Admin;
        Ok(())
    }
}
