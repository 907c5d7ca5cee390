//! Workspace roles.

use serde::{Deserialize, Serialize};
use std::cmp;
use std::fmt;
use std::str::FromStr;

/// Standing of a member within one workspace.
///
/// The ordering exists for display and reporting. Authorization never
/// compares roles by rank; it consults the permission table for the exact
/// role (see [`super::role_grants`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The single accountable owner of a workspace.
    Owner,
    /// Manages members and workspace settings.
    Admin,
    /// Creates and edits canvases and cards.
    Member,
    /// Read-only access.
    Viewer,
}

impl Role {
    /// Every role, highest privilege first.
    pub const ALL: [Role; 4] = [Role::Owner, Role::Admin, Role::Member, Role::Viewer];

    /// Stable lowercase name, as stored and serialized.
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::Member => "member",
            Role::Viewer => "viewer",
        }
    }

    /// Rank for UI sorting (higher number = more privilege).
    #[inline]
    pub const fn privilege_level(self) -> u8 {
        match self {
            Role::Viewer => 1,
            Role::Member => 2,
            Role::Admin => 3,
            Role::Owner => 4,
        }
    }

    #[inline]
    pub const fn is_owner(self) -> bool {
        matches!(self, Role::Owner)
    }
}

impl PartialOrd for Role {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Role {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        self.privilege_level().cmp(&other.privilege_level())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing a role name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Role::Owner),
            "admin" => Ok(Role::Admin),
            "member" => Ok(Role::Member),
            "viewer" => Ok(Role::Viewer),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}
