//! Database connection management.

pub mod pool;

pub use pool::{create_pool, pool_stats, verify_connection, PoolStats, MEMBERSHIP_TABLE};
