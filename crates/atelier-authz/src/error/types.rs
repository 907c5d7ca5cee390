//! Authorization error types.

use crate::cache::{CacheError, CacheKey};
use crate::membership::StoreError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Result type for authorization operations.
pub type AuthzResult<T> = Result<T, AuthzError>;

/// Machine-readable reason for a denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenialCode {
    /// No active membership in the workspace.
    AccessDenied,
    /// Member, but without the required token.
    InsufficientPermissions,
    /// The action needs the workspace owner.
    OwnershipRequired,
}

impl DenialCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessDenied => "ACCESS_DENIED",
            Self::InsufficientPermissions => "INSUFFICIENT_PERMISSIONS",
            Self::OwnershipRequired => "OWNERSHIP_REQUIRED",
        }
    }
}

impl fmt::Display for DenialCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error enum covering everything the engine surfaces to callers.
#[derive(Debug, Error)]
pub enum AuthzError {
    // Expected outcomes
    /// The caller may not perform the action. `message` comes from the call
    /// site and is safe to show to the user.
    #[error("{message}")]
    Denied { code: DenialCode, message: String },

    // Rejected before reaching the store
    #[error("Invalid membership mutation: {0}")]
    InvalidMutation(String),

    // Membership store
    #[error(transparent)]
    Store(#[from] StoreError),

    // Cache invalidation after a committed write
    #[error("Failed to evict cache keys {keys:?}")]
    EvictionFailed {
        keys: Vec<String>,
        #[source]
        source: CacheError,
    },
}

impl AuthzError {
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::Denied {
            code: DenialCode::AccessDenied,
            message: message.into(),
        }
    }

    pub fn insufficient_permissions(message: impl Into<String>) -> Self {
        Self::Denied {
            code: DenialCode::InsufficientPermissions,
            message: message.into(),
        }
    }

    pub fn ownership_required(message: impl Into<String>) -> Self {
        Self::Denied {
            code: DenialCode::OwnershipRequired,
            message: message.into(),
        }
    }

    pub fn eviction_failed(keys: &[CacheKey], source: CacheError) -> Self {
        Self::EvictionFailed {
            keys: keys.iter().map(|k| k.as_str().to_string()).collect(),
            source,
        }
    }

    /// Get error code for client handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Denied { code, .. } => code.as_str(),
            Self::InvalidMutation(_) => "INVALID_MUTATION",
            Self::Store(StoreError::NotFound { .. }) => "MEMBERSHIP_NOT_FOUND",
            Self::Store(StoreError::Conflict(_)) => "MEMBERSHIP_CONFLICT",
            Self::Store(StoreError::Unavailable(_)) => "STORE_UNAVAILABLE",
            Self::EvictionFailed { .. } => "EVICTION_FAILED",
        }
    }

    /// The denial code, if this is a denial.
    pub fn denial_code(&self) -> Option<DenialCode> {
        match self {
            Self::Denied { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Expected, user-facing refusal. Not a fault.
    pub fn is_denial(&self) -> bool {
        matches!(self, Self::Denied { .. })
    }

    /// A backing system failed; worth logging and alerting on.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Self::Store(StoreError::Unavailable(_)) | Self::EvictionFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_common_core::{UserId, WorkspaceId};

    #[test]
    fn test_denial_codes() {
        let err = AuthzError::insufficient_permissions("Insufficient permissions for canvas creation");
        assert_eq!(err.error_code(), "INSUFFICIENT_PERMISSIONS");
        assert_eq!(err.to_string(), "Insufficient permissions for canvas creation");
        assert!(err.is_denial());
        assert!(!err.is_infrastructure());

        assert_eq!(AuthzError::access_denied("no").error_code(), "ACCESS_DENIED");
        assert_eq!(
            AuthzError::ownership_required("Only workspace owners can transfer ownership").denial_code(),
            Some(DenialCode::OwnershipRequired)
        );
    }

    #[test]
    fn test_store_error_codes() {
        let not_found = AuthzError::from(StoreError::NotFound {
            workspace: WorkspaceId::new(),
            user: UserId::new(),
        });
        assert_eq!(not_found.error_code(), "MEMBERSHIP_NOT_FOUND");
        assert!(!not_found.is_infrastructure());

        let conflict = AuthzError::from(StoreError::Conflict("dup".into()));
        assert_eq!(conflict.error_code(), "MEMBERSHIP_CONFLICT");

        let down = AuthzError::from(StoreError::Unavailable("refused".into()));
        assert_eq!(down.error_code(), "STORE_UNAVAILABLE");
        assert!(down.is_infrastructure());
        assert!(!down.is_denial());
    }

    #[test]
    fn test_eviction_failed_names_keys() {
        let key = CacheKey::user_context(UserId::new());
        let err = AuthzError::eviction_failed(std::slice::from_ref(&key), CacheError::Timeout(50));
        assert_eq!(err.error_code(), "EVICTION_FAILED");
        assert!(err.to_string().contains(key.as_str()));
        assert!(err.is_infrastructure());
    }

    #[test]
    fn test_denial_code_serializes_screaming() {
        let json = serde_json::to_string(&DenialCode::OwnershipRequired).unwrap();
        assert_eq!(json, "\"OWNERSHIP_REQUIRED\"");
    }
}
