//! Authorization resolver.
//!
//! Answers "may user U do P in workspace W". Every operation resolves the
//! caller's active membership cache-first, falling through to the
//! membership store on a miss, and decides from the role alone:
//!
//! - no active membership: deny everything, `workspace:read` included
//! - owner: allow everything
//! - otherwise: allow exactly the tokens the registry lists for the role
//!
//! Store failures are returned as errors and never turned into an allow.

mod audit;
mod flight;

pub use audit::{log_authz, AuthzAuditEvent};

use crate::cache::{CacheKey, CacheLookup, PermissionCache};
use crate::error::{AuthzError, AuthzResult, DenialCode};
use crate::membership::{MembershipStore, StoreError, WorkspaceMembership};
use crate::registry::{self, tokens, PermissionToken, Role};
use atelier_common_core::{UserId, WorkspaceId};
use atelier_common_log::spans::authz_span;
use atelier_common_log::timed;
use flight::InFlight;
use futures_util::future::{join_all, FutureExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn, Instrument};

/// Value stored under `user_workspace_permissions:{userId}:{workspaceId}`.
///
/// Decisions use `membership.role`; `permissions` is the expanded set for
/// readers that only want to display it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspacePermissionEntry {
    pub membership: WorkspaceMembership,
    pub permissions: Vec<PermissionToken>,
}

impl WorkspacePermissionEntry {
    pub fn resolve(membership: WorkspaceMembership) -> Self {
        let mut permissions: Vec<_> = registry::permissions_for(membership.role)
            .into_iter()
            .collect();
        permissions.sort();
        Self {
            membership,
            permissions,
        }
    }

    /// Whether the entry is usable for this pair. Anything else is treated
    /// as a miss.
    fn describes(&self, user_id: UserId, workspace_id: WorkspaceId) -> bool {
        self.membership.is_active
            && self.membership.user_id == user_id
            && self.membership.workspace_id == workspace_id
    }
}

/// Role-level decision. The owner short-circuits before the table.
fn allows(role: Role, token: &PermissionToken) -> bool {
    if role.is_owner() {
        return true;
    }
    registry::role_grants(role, token)
}

/// The decision engine.
pub struct AuthorizationResolver {
    store: Arc<dyn MembershipStore>,
    cache: Arc<PermissionCache>,
    in_flight: InFlight<Option<WorkspaceMembership>>,
}

impl AuthorizationResolver {
    pub fn new(store: Arc<dyn MembershipStore>, cache: Arc<PermissionCache>) -> Self {
        Self {
            store,
            cache,
            in_flight: InFlight::new(),
        }
    }

    pub fn cache(&self) -> &Arc<PermissionCache> {
        &self.cache
    }

    /// Active membership for the pair, cache-first.
    async fn resolve_membership(
        &self,
        user_id: UserId,
        workspace_id: WorkspaceId,
    ) -> AuthzResult<Option<WorkspaceMembership>> {
        let key = CacheKey::user_workspace(user_id, workspace_id);
        let epoch = self.cache.epoch();

        if let CacheLookup::Hit(entry) = self.cache.get::<WorkspacePermissionEntry>(&key).await {
            if entry.describes(user_id, workspace_id) {
                return Ok(Some(entry.membership));
            }
            warn!(key = %key, "Cached entry does not match its key, reloading");
        }

        self.load_membership(key, epoch, user_id, workspace_id).await
    }

    /// Store read shared by concurrent misses. Populates the cache only if
    /// no eviction happened since `epoch` was observed.
    async fn load_membership(
        &self,
        key: CacheKey,
        epoch: u64,
        user_id: UserId,
        workspace_id: WorkspaceId,
    ) -> AuthzResult<Option<WorkspaceMembership>> {
        let store = Arc::clone(&self.store);
        let cache = Arc::clone(&self.cache);
        let populate_key = key.clone();

        let loaded = self
            .in_flight
            .run(&key, epoch, move || {
                async move {
                    let membership = timed!(
                        "membership_store_read",
                        store.find_active_membership(user_id, workspace_id).await
                    )?
                    .filter(|m| m.is_active);

                    // Absence is never cached.
                    if let Some(membership) = &membership {
                        if cache.epoch() == epoch {
                            let entry = WorkspacePermissionEntry::resolve(membership.clone());
                            cache.set(&populate_key, &entry).await;
                            // An eviction may have raced the write.
                            if cache.epoch() != epoch {
                                cache.del(&populate_key).await;
                            }
                        } else {
                            debug!(key = %populate_key, "Invalidated during load, not caching");
                        }
                    }
                    Ok::<_, StoreError>(membership)
                }
                .boxed()
            })
            .await;

        loaded.map_err(|e| {
            warn!(
                user_id = %user_id,
                workspace_id = %workspace_id,
                error = %e,
                "Membership store read failed"
            );
            AuthzError::Store(e)
        })
    }

    /// The caller's role in the workspace, or `None` without an active
    /// membership.
    pub async fn get_user_workspace_role(
        &self,
        user_id: UserId,
        workspace_id: WorkspaceId,
    ) -> AuthzResult<Option<Role>> {
        let membership = self
            .resolve_membership(user_id, workspace_id)
            .instrument(authz_span(&user_id, &workspace_id, "role"))
            .await?;
        Ok(membership.map(|m| m.role))
    }

    /// Roles across several workspaces in one batch cache read.
    ///
    /// Results line up with `workspace_ids`. Misses are loaded from the
    /// store concurrently.
    pub async fn get_user_workspace_roles(
        &self,
        user_id: UserId,
        workspace_ids: &[WorkspaceId],
    ) -> AuthzResult<Vec<Option<Role>>> {
        let epoch = self.cache.epoch();
        let keys: Vec<CacheKey> = workspace_ids
            .iter()
            .map(|ws| CacheKey::user_workspace(user_id, *ws))
            .collect();
        let lookups = self.cache.mget::<WorkspacePermissionEntry>(&keys).await;

        let resolved = keys
            .into_iter()
            .zip(lookups)
            .zip(workspace_ids.iter().copied())
            .map(|((key, lookup), workspace_id)| async move {
                match lookup {
                    CacheLookup::Hit(entry) if entry.describes(user_id, workspace_id) => {
                        Ok(Some(entry.membership.role))
                    }
                    _ => self
                        .load_membership(key, epoch, user_id, workspace_id)
                        .await
                        .map(|membership| membership.map(|m| m.role)),
                }
            });

        join_all(resolved).await.into_iter().collect()
    }

    /// Every token the caller holds in the workspace. Empty without an
    /// active membership; the full catalogue for the owner.
    pub async fn get_user_permissions_in_workspace(
        &self,
        user_id: UserId,
        workspace_id: WorkspaceId,
    ) -> AuthzResult<HashSet<PermissionToken>> {
        let membership = self
            .resolve_membership(user_id, workspace_id)
            .instrument(authz_span(&user_id, &workspace_id, "permissions"))
            .await?;
        Ok(membership
            .map(|m| registry::permissions_for(m.role))
            .unwrap_or_default())
    }

    /// The primary point check.
    pub async fn has_permission_in_workspace(
        &self,
        user_id: UserId,
        workspace_id: WorkspaceId,
        token: &PermissionToken,
    ) -> AuthzResult<bool> {
        let membership = self
            .resolve_membership(user_id, workspace_id)
            .instrument(authz_span(&user_id, &workspace_id, token.as_str()))
            .await?;
        Ok(membership.is_some_and(|m| allows(m.role, token)))
    }

    /// Convenience check; without a token it requires `workspace:read`.
    pub async fn has_workspace_access(
        &self,
        user_id: UserId,
        workspace_id: WorkspaceId,
        token: Option<&PermissionToken>,
    ) -> AuthzResult<bool> {
        let baseline = tokens::WORKSPACE_READ;
        let token = token.unwrap_or(&baseline);
        self.has_permission_in_workspace(user_id, workspace_id, token)
            .await
    }

    /// Enforcing check. Returns the caller's membership on success and a
    /// denial carrying `message` otherwise.
    pub async fn require_permission(
        &self,
        user_id: UserId,
        workspace_id: WorkspaceId,
        token: &PermissionToken,
        message: &str,
    ) -> AuthzResult<WorkspaceMembership> {
        let membership = self
            .resolve_membership(user_id, workspace_id)
            .instrument(authz_span(&user_id, &workspace_id, token.as_str()))
            .await?;

        let role = membership.as_ref().map(|m| m.role);
        let outcome = match membership {
            None => Err(DenialCode::AccessDenied),
            Some(m) if allows(m.role, token) => Ok(m),
            Some(_) if registry::is_owner_only(token) => Err(DenialCode::OwnershipRequired),
            Some(_) => Err(DenialCode::InsufficientPermissions),
        };

        self.enforce(user_id, workspace_id, token.as_str(), role, outcome, message)
    }

    /// Enforcing check on the role itself, for owner-accountable actions.
    pub async fn require_owner(
        &self,
        user_id: UserId,
        workspace_id: WorkspaceId,
        message: &str,
    ) -> AuthzResult<WorkspaceMembership> {
        let membership = self
            .resolve_membership(user_id, workspace_id)
            .instrument(authz_span(&user_id, &workspace_id, "owner"))
            .await?;

        let role = membership.as_ref().map(|m| m.role);
        let outcome = match membership {
            None => Err(DenialCode::AccessDenied),
            Some(m) if m.role == Role::Owner => Ok(m),
            Some(_) => Err(DenialCode::OwnershipRequired),
        };

        self.enforce(user_id, workspace_id, "owner", role, outcome, message)
    }

    fn enforce(
        &self,
        user_id: UserId,
        workspace_id: WorkspaceId,
        requirement: &str,
        role: Option<Role>,
        outcome: Result<WorkspaceMembership, DenialCode>,
        message: &str,
    ) -> AuthzResult<WorkspaceMembership> {
        match outcome {
            Ok(membership) => {
                log_authz(user_id, workspace_id, requirement, role, None);
                Ok(membership)
            }
            Err(code) => {
                log_authz(user_id, workspace_id, requirement, role, Some(code));
                Err(AuthzError::Denied {
                    code,
                    message: message.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryCache, PermissionCacheSettings};
    use crate::membership::{InMemoryMembershipStore, MockMembershipStore};

    fn cache() -> Arc<PermissionCache> {
        Arc::new(PermissionCache::new(
            Arc::new(MemoryCache::new(128)),
            PermissionCacheSettings::default(),
        ))
    }

    #[test]
    fn test_entry_expands_role() {
        let m = WorkspaceMembership::new(WorkspaceId::new(), UserId::new(), Role::Viewer);
        let entry = WorkspacePermissionEntry::resolve(m.clone());
        assert_eq!(entry.permissions.len(), 3);
        assert!(entry.describes(m.user_id, m.workspace_id));
        assert!(!entry.describes(UserId::new(), m.workspace_id));
    }

    #[tokio::test]
    async fn test_second_check_is_served_from_cache() {
        let ws = WorkspaceId::new();
        let user = UserId::new();
        let member = WorkspaceMembership::new(ws, user, Role::Member);

        let mut store = MockMembershipStore::new();
        store
            .expect_find_active_membership()
            .times(1)
            .returning(move |_, _| Ok(Some(member.clone())));

        let resolver = AuthorizationResolver::new(Arc::new(store), cache());
        assert!(resolver
            .has_permission_in_workspace(user, ws, &tokens::CANVAS_CREATE)
            .await
            .unwrap());
        assert!(!resolver
            .has_permission_in_workspace(user, ws, &tokens::MEMBER_INVITE)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_absence_is_not_cached() {
        let ws = WorkspaceId::new();
        let user = UserId::new();

        let mut store = MockMembershipStore::new();
        store
            .expect_find_active_membership()
            .times(2)
            .returning(|_, _| Ok(None));

        let resolver = AuthorizationResolver::new(Arc::new(store), cache());
        for _ in 0..2 {
            assert_eq!(resolver.get_user_workspace_role(user, ws).await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn test_store_failure_propagates_from_every_operation() {
        let ws = WorkspaceId::new();
        let user = UserId::new();

        let mut store = MockMembershipStore::new();
        store
            .expect_find_active_membership()
            .returning(|_, _| Err(StoreError::Unavailable("connection refused".into())));

        let resolver = AuthorizationResolver::new(Arc::new(store), cache());

        let err = resolver
            .has_permission_in_workspace(user, ws, &tokens::WORKSPACE_READ)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "STORE_UNAVAILABLE");
        assert!(resolver.get_user_workspace_role(user, ws).await.is_err());
        assert!(resolver.get_user_permissions_in_workspace(user, ws).await.is_err());
        assert!(resolver.has_workspace_access(user, ws, None).await.is_err());

        let err = resolver
            .require_permission(user, ws, &tokens::CANVAS_READ, "Cannot view canvas")
            .await
            .unwrap_err();
        assert!(err.is_infrastructure());
        assert!(!err.is_denial());
    }

    #[tokio::test]
    async fn test_inactive_row_from_store_denies() {
        let ws = WorkspaceId::new();
        let user = UserId::new();
        let mut inactive = WorkspaceMembership::new(ws, user, Role::Admin);
        inactive.is_active = false;

        let mut store = MockMembershipStore::new();
        store
            .expect_find_active_membership()
            .returning(move |_, _| Ok(Some(inactive.clone())));

        let resolver = AuthorizationResolver::new(Arc::new(store), cache());
        assert!(!resolver
            .has_permission_in_workspace(user, ws, &tokens::WORKSPACE_READ)
            .await
            .unwrap());
        let err = resolver
            .require_permission(user, ws, &tokens::WORKSPACE_READ, "No access")
            .await
            .unwrap_err();
        assert_eq!(err.denial_code(), Some(DenialCode::AccessDenied));
    }

    #[tokio::test]
    async fn test_require_codes() {
        let store = Arc::new(InMemoryMembershipStore::new());
        let ws = WorkspaceId::new();
        let (owner, admin, viewer, stranger) =
            (UserId::new(), UserId::new(), UserId::new(), UserId::new());
        store.insert_membership(ws, owner, Role::Owner).await.unwrap();
        store.insert_membership(ws, admin, Role::Admin).await.unwrap();
        store.insert_membership(ws, viewer, Role::Viewer).await.unwrap();

        let resolver = AuthorizationResolver::new(store, cache());

        let m = resolver
            .require_permission(owner, ws, &tokens::WORKSPACE_TRANSFER_OWNERSHIP, "x")
            .await
            .unwrap();
        assert_eq!(m.role, Role::Owner);

        let err = resolver
            .require_permission(
                admin,
                ws,
                &tokens::WORKSPACE_TRANSFER_OWNERSHIP,
                "Only workspace owners can transfer ownership",
            )
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "OWNERSHIP_REQUIRED");
        assert_eq!(err.to_string(), "Only workspace owners can transfer ownership");

        let err = resolver
            .require_permission(viewer, ws, &tokens::CANVAS_CREATE, "Insufficient permissions for canvas creation")
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INSUFFICIENT_PERMISSIONS");

        let err = resolver
            .require_permission(stranger, ws, &tokens::WORKSPACE_READ, "Not a member")
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "ACCESS_DENIED");

        assert!(resolver.require_owner(owner, ws, "owner only").await.is_ok());
        assert_eq!(
            resolver.require_owner(admin, ws, "owner only").await.unwrap_err().denial_code(),
            Some(DenialCode::OwnershipRequired)
        );
        assert_eq!(
            resolver.require_owner(stranger, ws, "owner only").await.unwrap_err().denial_code(),
            Some(DenialCode::AccessDenied)
        );
    }

    #[tokio::test]
    async fn test_batch_roles_align_with_input() {
        let store = Arc::new(InMemoryMembershipStore::new());
        let user = UserId::new();
        let (a, b, c) = (WorkspaceId::new(), WorkspaceId::new(), WorkspaceId::new());
        store.insert_membership(a, user, Role::Viewer).await.unwrap();
        store.insert_membership(c, user, Role::Admin).await.unwrap();

        let resolver = AuthorizationResolver::new(store, cache());
        // Warm one entry so the batch mixes hits and misses.
        resolver.get_user_workspace_role(user, a).await.unwrap();

        let roles = resolver.get_user_workspace_roles(user, &[a, b, c]).await.unwrap();
        assert_eq!(roles, vec![Some(Role::Viewer), None, Some(Role::Admin)]);
    }
}
