//! Permission tokens.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// A `resource:action` permission identifier.
///
/// Tokens are compared by exact string equality. There is no wildcard token;
/// the owner's universal access is a rule in the registry, not a token.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PermissionToken(Cow<'static, str>);

/// Error building a [`PermissionToken`] from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid permission token '{0}': expected resource:action")]
pub struct InvalidToken(pub String);

fn valid_segment(s: &str) -> bool {
    !s.is_empty()
        && s
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

impl PermissionToken {
    pub(crate) const fn from_static(s: &'static str) -> Self {
        Self(Cow::Borrowed(s))
    }

    /// Parse and validate a token.
    pub fn parse(s: &str) -> Result<Self, InvalidToken> {
        match s.split_once(':') {
            Some((resource, action)) if valid_segment(resource) && valid_segment(action) => {
                Ok(Self(Cow::Owned(s.to_string())))
            }
            _ => Err(InvalidToken(s.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PermissionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for PermissionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PermissionToken({})", self.0)
    }
}

impl FromStr for PermissionToken {
    type Err = InvalidToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PermissionToken {
    type Error = InvalidToken;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PermissionToken> for String {
    fn from(token: PermissionToken) -> Self {
        token.0.into_owned()
    }
}

/// The known token catalogue.
pub mod tokens {
    use super::PermissionToken;

    pub const WORKSPACE_READ: PermissionToken = PermissionToken::from_static("workspace:read");
    pub const WORKSPACE_UPDATE: PermissionToken = PermissionToken::from_static("workspace:update");
    pub const WORKSPACE_DELETE: PermissionToken = PermissionToken::from_static("workspace:delete");
    pub const WORKSPACE_TRANSFER_OWNERSHIP: PermissionToken =
        PermissionToken::from_static("workspace:transfer_ownership");

    pub const CANVAS_READ: PermissionToken = PermissionToken::from_static("canvas:read");
    pub const CANVAS_CREATE: PermissionToken = PermissionToken::from_static("canvas:create");
    pub const CANVAS_UPDATE: PermissionToken = PermissionToken::from_static("canvas:update");
    pub const CANVAS_DELETE: PermissionToken = PermissionToken::from_static("canvas:delete");

    pub const CARD_READ: PermissionToken = PermissionToken::from_static("card:read");
    pub const CARD_CREATE: PermissionToken = PermissionToken::from_static("card:create");
    pub const CARD_UPDATE: PermissionToken = PermissionToken::from_static("card:update");
    pub const CARD_DELETE: PermissionToken = PermissionToken::from_static("card:delete");

    pub const MEMBER_INVITE: PermissionToken = PermissionToken::from_static("member:invite");
    pub const MEMBER_REMOVE: PermissionToken = PermissionToken::from_static("member:remove");
    pub const MEMBER_UPDATE_ROLE: PermissionToken =
        PermissionToken::from_static("member:update_role");
}
