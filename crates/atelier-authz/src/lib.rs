//! Atelier workspace authorization
//!
//! Decides whether a user may perform an action inside a workspace, and keeps
//! the permission cache in step with membership changes.
//!
//! # Architecture
//!
//! - **Registry**: fixed role to permission-token table
//! - **Membership**: the store contract, with in-memory and Postgres stores
//! - **Cache**: TTL cache clients and the fail-safe permission cache
//! - **Resolver**: the five read-side checks
//! - **Coordinator**: membership mutations followed by cache eviction
//!
//! Every failure mode denies. A cache outage only costs latency; a store
//! outage surfaces as an error, never as a grant.

#![warn(clippy::all)]

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod engine;
pub mod error;
pub mod membership;
pub mod registry;
pub mod resolver;

pub use cache::{CacheKey, CacheLookup, PermissionCache, PermissionCacheSettings, Ttl};
pub use config::AuthzConfig;
pub use coordinator::{InvalidationCoordinator, MembershipMutation, MutationOutcome};
pub use engine::AuthzEngine;
pub use error::{AuthzError, AuthzResult, DenialCode};
pub use membership::{
    InMemoryMembershipStore, MembershipStore, StoreError, StoreResult, WorkspaceMembership,
};
pub use registry::{tokens, PermissionToken, Role};
pub use resolver::{AuthorizationResolver, WorkspacePermissionEntry};
