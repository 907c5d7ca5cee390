//! PostgreSQL adapter for the membership contract.
//!
//! Expects an existing table managed elsewhere:
//!
//! ```sql
//! workspace_members (
//!     workspace_id uuid, user_id uuid, role text,
//!     is_active boolean, joined_at timestamptz
//! )
//! CREATE UNIQUE INDEX ON workspace_members (workspace_id, user_id) WHERE is_active;
//! CREATE UNIQUE INDEX ON workspace_members (workspace_id) WHERE is_active AND role = 'owner';
//! ```
//!
//! Owner-affecting writes also take a per-workspace advisory lock, so the
//! single-owner rule holds even where the second index is missing.

use super::{MembershipStore, StoreError, StoreResult, WorkspaceMembership};
use crate::registry::Role;
use async_trait::async_trait;
use atelier_common_core::{Timestamp, UserId, WorkspaceId};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

const SELECT_ACTIVE: &str = "SELECT workspace_id, user_id, role, is_active, joined_at \
     FROM workspace_members \
     WHERE workspace_id = $1 AND user_id = $2 AND is_active \
     LIMIT 1";

const WORKSPACE_LOCK: &str = "SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))";

#[derive(sqlx::FromRow)]
struct MemberRow {
    workspace_id: Uuid,
    user_id: Uuid,
    role: String,
    is_active: bool,
    joined_at: DateTime<Utc>,
}

impl TryFrom<MemberRow> for WorkspaceMembership {
    type Error = StoreError;

    fn try_from(row: MemberRow) -> Result<Self, Self::Error> {
        let role: Role = row
            .role
            .parse()
            .map_err(|e| StoreError::Unavailable(format!("corrupt membership row: {e}")))?;
        Ok(WorkspaceMembership {
            workspace_id: WorkspaceId::from_uuid(row.workspace_id),
            user_id: UserId::from_uuid(row.user_id),
            role,
            is_active: row.is_active,
            joined_at: Timestamp::from_datetime(row.joined_at),
        })
    }
}

/// Membership store over a `sqlx` Postgres pool.
#[derive(Clone)]
pub struct PgMembershipStore {
    pool: PgPool,
}

impl PgMembershipStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Serialize owner-affecting writes on one workspace until `tx` ends.
    ///
    /// Row locks cannot guard the founding insert, where no owner row
    /// exists yet to lock.
    async fn lock_workspace(
        tx: &mut Transaction<'_, Postgres>,
        workspace_id: WorkspaceId,
    ) -> StoreResult<()> {
        sqlx::query(WORKSPACE_LOCK)
            .bind(workspace_id.as_uuid())
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Lock and return the active row inside `tx`.
    async fn lock_active(
        tx: &mut Transaction<'_, Postgres>,
        workspace_id: WorkspaceId,
        user_id: UserId,
    ) -> StoreResult<WorkspaceMembership> {
        let sql = format!("{SELECT_ACTIVE} FOR UPDATE");
        let row: Option<MemberRow> = sqlx::query_as(&sql)
            .bind(workspace_id.as_uuid())
            .bind(user_id.as_uuid())
            .fetch_optional(&mut **tx)
            .await?;

        row.ok_or(StoreError::NotFound {
            workspace: workspace_id,
            user: user_id,
        })?
        .try_into()
    }

    async fn set_role(
        tx: &mut Transaction<'_, Postgres>,
        workspace_id: WorkspaceId,
        user_id: UserId,
        role: Role,
    ) -> StoreResult<WorkspaceMembership> {
        let row: MemberRow = sqlx::query_as(
            "UPDATE workspace_members SET role = $3 \
             WHERE workspace_id = $1 AND user_id = $2 AND is_active \
             RETURNING workspace_id, user_id, role, is_active, joined_at",
        )
        .bind(workspace_id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(role.as_str())
        .fetch_one(&mut **tx)
        .await?;

        row.try_into()
    }
}

#[async_trait]
impl MembershipStore for PgMembershipStore {
    async fn find_active_membership(
        &self,
        user_id: UserId,
        workspace_id: WorkspaceId,
    ) -> StoreResult<Option<WorkspaceMembership>> {
        let row: Option<MemberRow> = sqlx::query_as(SELECT_ACTIVE)
            .bind(workspace_id.as_uuid())
            .bind(user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(WorkspaceMembership::try_from).transpose()
    }

    async fn insert_membership(
        &self,
        workspace_id: WorkspaceId,
        user_id: UserId,
        role: Role,
    ) -> StoreResult<WorkspaceMembership> {
        let mut tx = self.pool.begin().await?;

        if role.is_owner() {
            Self::lock_workspace(&mut tx, workspace_id).await?;
            let existing: Option<(Uuid,)> = sqlx::query_as(
                "SELECT user_id FROM workspace_members \
                 WHERE workspace_id = $1 AND role = 'owner' AND is_active",
            )
            .bind(workspace_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?;

            if existing.is_some() {
                return Err(StoreError::Conflict(format!(
                    "{workspace_id} already has an owner"
                )));
            }
        }

        let row: MemberRow = sqlx::query_as(
            "INSERT INTO workspace_members (workspace_id, user_id, role, is_active, joined_at) \
             VALUES ($1, $2, $3, TRUE, now()) \
             RETURNING workspace_id, user_id, role, is_active, joined_at",
        )
        .bind(workspace_id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(role.as_str())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(workspace = %workspace_id, user = %user_id, role = %role, "Membership inserted");
        row.try_into()
    }

    async fn write_role(
        &self,
        workspace_id: WorkspaceId,
        user_id: UserId,
        role: Role,
    ) -> StoreResult<WorkspaceMembership> {
        let mut tx = self.pool.begin().await?;
        let current = Self::lock_active(&mut tx, workspace_id, user_id).await?;

        if current.role.is_owner() || role.is_owner() {
            return Err(StoreError::Conflict(
                "ownership changes only through transfer".to_string(),
            ));
        }

        let updated = Self::set_role(&mut tx, workspace_id, user_id, role).await?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn deactivate_membership(
        &self,
        workspace_id: WorkspaceId,
        user_id: UserId,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let current = Self::lock_active(&mut tx, workspace_id, user_id).await?;

        if current.role.is_owner() {
            return Err(StoreError::Conflict(
                "the workspace owner cannot be removed".to_string(),
            ));
        }

        sqlx::query(
            "UPDATE workspace_members SET is_active = FALSE \
             WHERE workspace_id = $1 AND user_id = $2 AND is_active",
        )
        .bind(workspace_id.as_uuid())
        .bind(user_id.as_uuid())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
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

        let mut tx = self.pool.begin().await?;
        Self::lock_workspace(&mut tx, workspace_id).await?;

        // Lock in a stable order to avoid deadlocking against a reverse transfer.
        let (first, second) = if old_owner < new_owner {
            (old_owner, new_owner)
        } else {
            (new_owner, old_owner)
        };
        let a = Self::lock_active(&mut tx, workspace_id, first).await?;
        let b = Self::lock_active(&mut tx, workspace_id, second).await?;
        let current_owner = if a.user_id == old_owner { &a } else { &b };

        if !current_owner.role.is_owner() {
            return Err(StoreError::Conflict(format!(
                "{old_owner} is not the owner of {workspace_id}"
            )));
        }

        // Demote first so the owner index never sees two owners.
        Self::set_role(&mut tx, workspace_id, old_owner, Role::Admin).await?;
        Self::set_role(&mut tx, workspace_id, new_owner, Role::Owner).await?;

        tx.commit().await?;
        debug!(workspace = %workspace_id, from = %old_owner, to = %new_owner, "Ownership transferred");
        Ok(())
    }
}
