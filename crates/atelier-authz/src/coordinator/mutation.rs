//! Membership mutations as values.

use crate::cache::CacheKey;
use crate::error::{AuthzError, AuthzResult};
use crate::membership::WorkspaceMembership;
use crate::registry::Role;
use atelier_common_core::{UserId, WorkspaceId};
use serde::{Deserialize, Serialize};

/// A change to workspace membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MembershipMutation {
    /// New member (join or accepted invite). Joining as owner founds the
    /// workspace and is only accepted while it has no owner.
    Join {
        workspace_id: WorkspaceId,
        user_id: UserId,
        role: Role,
    },
    /// Promotion or demotion between non-owner roles.
    ChangeRole {
        workspace_id: WorkspaceId,
        user_id: UserId,
        role: Role,
    },
    /// Removal from the workspace.
    Remove {
        workspace_id: WorkspaceId,
        user_id: UserId,
    },
    /// Hand the workspace to another member; the previous owner becomes admin.
    TransferOwnership {
        workspace_id: WorkspaceId,
        from: UserId,
        to: UserId,
    },
}

/// What a committed mutation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    Joined(WorkspaceMembership),
    RoleChanged(WorkspaceMembership),
    Removed,
    OwnershipTransferred,
}

impl MembershipMutation {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::ChangeRole { .. } => "role_change",
            Self::Remove { .. } => "removal",
            Self::TransferOwnership { .. } => "ownership_transfer",
        }
    }

    pub fn workspace_id(&self) -> WorkspaceId {
        match self {
            Self::Join { workspace_id, .. }
            | Self::ChangeRole { workspace_id, .. }
            | Self::Remove { workspace_id, .. }
            | Self::TransferOwnership { workspace_id, .. } => *workspace_id,
        }
    }

    /// Cache keys whose underlying truth this mutation changes.
    ///
    /// A join evicts nothing: only active memberships are ever cached.
    pub fn affected_keys(&self) -> Vec<CacheKey> {
        match self {
            Self::Join { .. } => Vec::new(),
            Self::ChangeRole {
                workspace_id,
                user_id,
                ..
            }
            | Self::Remove {
                workspace_id,
                user_id,
            } => CacheKey::for_member(*user_id, *workspace_id).to_vec(),
            Self::TransferOwnership {
                workspace_id,
                from,
                to,
            } => CacheKey::for_member(*from, *workspace_id)
                .into_iter()
                .chain(CacheKey::for_member(*to, *workspace_id))
                .collect(),
        }
    }

    /// Checks that need no store access.
    pub fn validate(&self) -> AuthzResult<()> {
        match self {
            Self::ChangeRole { role, .. } if role.is_owner() => Err(AuthzError::InvalidMutation(
                "the owner role is assigned only by ownership transfer".to_string(),
            )),
            Self::TransferOwnership { from, to, .. } if from == to => Err(
                AuthzError::InvalidMutation("ownership cannot be transferred to the current owner".to_string()),
            ),
            _ => Ok(()),
        }
    }
}
