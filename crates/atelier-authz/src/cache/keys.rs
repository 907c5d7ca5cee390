//! Cache key construction.
//!
//! Keys are assembled only from fixed namespaces and typed identifiers. No
//! caller-supplied text ever reaches a key, so one tenant cannot craft a key
//! that collides with another's.

use atelier_common_core::{UserId, WorkspaceId};
use std::fmt;

/// Namespace for workspace-independent authority.
pub const USER_CONTEXT_PERMISSIONS: &str = "user_context_permissions";

/// Namespace for one user's resolved standing in one workspace.
pub const USER_WORKSPACE_PERMISSIONS: &str = "user_workspace_permissions";

/// Joins key parts with colons.
struct CacheKeyBuilder {
    parts: Vec<String>,
}

impl CacheKeyBuilder {
    fn new(namespace: &'static str) -> Self {
        Self {
            parts: vec![namespace.to_string()],
        }
    }

    fn add(mut self, part: impl ToString) -> Self {
        self.parts.push(part.to_string());
        self
    }

    fn build(self) -> CacheKey {
        CacheKey(self.parts.join(":"))
    }
}

/// A validated cache key.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// `user_context_permissions:{userId}`
    pub fn user_context(user_id: UserId) -> Self {
        CacheKeyBuilder::new(USER_CONTEXT_PERMISSIONS)
            .add(user_id.as_uuid())
            .build()
    }

    /// `user_workspace_permissions:{userId}:{workspaceId}`
    pub fn user_workspace(user_id: UserId, workspace_id: WorkspaceId) -> Self {
        CacheKeyBuilder::new(USER_WORKSPACE_PERMISSIONS)
            .add(user_id.as_uuid())
            .add(workspace_id.as_uuid())
            .build()
    }

    /// Both key families for a user in a workspace, context key first.
    pub fn for_member(user_id: UserId, workspace_id: WorkspaceId) -> [Self; 2] {
        [
            Self::user_context(user_id),
            Self::user_workspace(user_id, workspace_id),
        ]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({})", self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
