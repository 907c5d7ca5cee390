//! Error handling for the authorization engine.

pub mod types;

pub use types::{AuthzError, AuthzResult, DenialCode};
