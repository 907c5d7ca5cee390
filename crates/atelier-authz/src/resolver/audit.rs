//! Authorization audit logging.

use crate::error::DenialCode;
use crate::registry::Role;
use atelier_common_core::{Timestamp, UserId, WorkspaceId};
use serde::Serialize;
use tracing::info;

/// Outcome of one enforced check.
#[derive(Debug, Serialize)]
pub struct AuthzAuditEvent {
    pub timestamp: Timestamp,
    pub user_id: UserId,
    pub workspace_id: WorkspaceId,
    pub requirement: String,
    pub role: Option<Role>,
    pub granted: bool,
    pub code: Option<DenialCode>,
}

impl AuthzAuditEvent {
    pub fn new(
        user_id: UserId,
        workspace_id: WorkspaceId,
        requirement: &str,
        role: Option<Role>,
        code: Option<DenialCode>,
    ) -> Self {
        Self {
            timestamp: Timestamp::now(),
            user_id,
            workspace_id,
            requirement: requirement.to_string(),
            role,
            granted: code.is_none(),
            code,
        }
    }

    pub fn log(&self) {
        let role = self.role.map(Role::as_str).unwrap_or("none");
        if self.granted {
            info!(
                event = "authz_granted",
                user_id = %self.user_id,
                workspace_id = %self.workspace_id,
                requirement = %self.requirement,
                role = role,
                "Authorization granted"
            );
        } else {
            info!(
                event = "authz_denied",
                user_id = %self.user_id,
                workspace_id = %self.workspace_id,
                requirement = %self.requirement,
                role = role,
                code = self.code.map(|c| c.as_str()).unwrap_or_default(),
                "Authorization denied"
            );
        }
    }
}

/// Log an enforced decision.
pub fn log_authz(
    user_id: UserId,
    workspace_id: WorkspaceId,
    requirement: &str,
    role: Option<Role>,
    code: Option<DenialCode>,
) {
    AuthzAuditEvent::new(user_id, workspace_id, requirement, role, code).log();
}
