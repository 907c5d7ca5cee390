//! Invalidation coordinator.
//!
//! The only writer of membership state. Every workflow follows one sequence:
//!
//! 1. validate what can be checked without the store
//! 2. write to the membership store; on failure stop, nothing was changed
//! 3. run the caller's follow-up step, if any
//! 4. evict the affected cache keys, whatever the follow-up returned
//! 5. return
//!
//! Eviction always follows the committed write, so a reader never finds a
//! cached grant that the store has already revoked once the workflow has
//! returned.

mod mutation;

pub use mutation::{MembershipMutation, MutationOutcome};

use crate::cache::PermissionCache;
use crate::error::{AuthzError, AuthzResult};
use crate::membership::{MembershipStore, StoreResult, WorkspaceMembership};
use crate::registry::Role;
use atelier_common_core::{UserId, WorkspaceId};
use atelier_common_log::spans::mutation_span;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, warn, Instrument};

/// Runs membership mutations against the store and keeps the cache honest.
pub struct InvalidationCoordinator {
    store: Arc<dyn MembershipStore>,
    cache: Arc<PermissionCache>,
}

impl InvalidationCoordinator {
    pub fn new(store: Arc<dyn MembershipStore>, cache: Arc<PermissionCache>) -> Self {
        Self { store, cache }
    }

    /// Apply a mutation with no follow-up step.
    pub async fn apply(&self, mutation: MembershipMutation) -> AuthzResult<MutationOutcome> {
        self.apply_with(mutation, |_| async { Ok::<_, AuthzError>(()) })
            .await
            .map(|(outcome, ())| outcome)
    }

    /// Apply a mutation, then run `follow_up` with its outcome before
    /// eviction.
    ///
    /// Eviction is attempted whether or not `follow_up` succeeds. A failing
    /// follow-up wins over an eviction failure in the returned error; the
    /// latter is still logged.
    pub async fn apply_with<F, Fut, T, E>(
        &self,
        mutation: MembershipMutation,
        follow_up: F,
    ) -> Result<(MutationOutcome, T), E>
    where
        F: FnOnce(MutationOutcome) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<AuthzError>,
    {
        mutation.validate()?;

        let span = mutation_span(mutation.kind(), &mutation.workspace_id());
        async move {
            let outcome = self.write(&mutation).await.map_err(|e| {
                warn!(mutation = mutation.kind(), error = %e, "Membership write failed");
                AuthzError::Store(e)
            })?;

            let followed = follow_up(outcome.clone()).await;
            let evicted = self.evict(&mutation).await;

            match (followed, evicted) {
                (Ok(value), Ok(())) => {
                    info!(mutation = mutation.kind(), "Membership mutation applied");
                    Ok((outcome, value))
                }
                (Ok(_), Err(e)) => Err(e.into()),
                (Err(e), _) => {
                    warn!(mutation = mutation.kind(), "Follow-up step failed after membership write");
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn write(&self, mutation: &MembershipMutation) -> StoreResult<MutationOutcome> {
        match *mutation {
            MembershipMutation::Join {
                workspace_id,
                user_id,
                role,
            } => self
                .store
                .insert_membership(workspace_id, user_id, role)
                .await
                .map(MutationOutcome::Joined),
            MembershipMutation::ChangeRole {
                workspace_id,
                user_id,
                role,
            } => self
                .store
                .write_role(workspace_id, user_id, role)
                .await
                .map(MutationOutcome::RoleChanged),
            MembershipMutation::Remove {
                workspace_id,
                user_id,
            } => self
                .store
                .deactivate_membership(workspace_id, user_id)
                .await
                .map(|()| MutationOutcome::Removed),
            MembershipMutation::TransferOwnership {
                workspace_id,
                from,
                to,
            } => self
                .store
                .transfer_ownership(workspace_id, from, to)
                .await
                .map(|()| MutationOutcome::OwnershipTransferred),
        }
    }

    async fn evict(&self, mutation: &MembershipMutation) -> AuthzResult<()> {
        let keys = mutation.affected_keys();
        if keys.is_empty() {
            return Ok(());
        }

        self.cache.evict(&keys).await.map_err(|e| {
            error!(
                mutation = mutation.kind(),
                error = %e,
                "Membership committed but cache eviction failed"
            );
            AuthzError::eviction_failed(&keys, e)
        })
    }

    /// Add a member. Joining as owner is accepted only for a workspace
    /// without one.
    pub async fn join(
        &self,
        workspace_id: WorkspaceId,
        user_id: UserId,
        role: Role,
    ) -> AuthzResult<WorkspaceMembership> {
        let outcome = self
            .apply(MembershipMutation::Join {
                workspace_id,
                user_id,
                role,
            })
            .await?;
        expect_membership(outcome)
    }

    /// Promote or demote a non-owner member.
    pub async fn change_role(
        &self,
        workspace_id: WorkspaceId,
        user_id: UserId,
        role: Role,
    ) -> AuthzResult<WorkspaceMembership> {
        let outcome = self
            .apply(MembershipMutation::ChangeRole {
                workspace_id,
                user_id,
                role,
            })
            .await?;
        expect_membership(outcome)
    }

    pub async fn remove_member(&self, workspace_id: WorkspaceId, user_id: UserId) -> AuthzResult<()> {
        self.apply(MembershipMutation::Remove {
            workspace_id,
            user_id,
        })
        .await
        .map(|_| ())
    }

    pub async fn transfer_ownership(
        &self,
        workspace_id: WorkspaceId,
        from: UserId,
        to: UserId,
    ) -> AuthzResult<()> {
        self.apply(MembershipMutation::TransferOwnership {
            workspace_id,
            from,
            to,
        })
        .await
        .map(|_| ())
    }
}

fn expect_membership(outcome: MutationOutcome) -> AuthzResult<WorkspaceMembership> {
    match outcome {
        MutationOutcome::Joined(m) | MutationOutcome::RoleChanged(m) => Ok(m),
        other => Err(AuthzError::InvalidMutation(format!(
            "expected a membership, got {other:?}"
        ))),
    }
}
