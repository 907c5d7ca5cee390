//! Atelier common core types.

pub mod id;
pub mod timestamp;

pub use id::{IdParseError, UserId, WorkspaceId};
pub use timestamp::Timestamp;
