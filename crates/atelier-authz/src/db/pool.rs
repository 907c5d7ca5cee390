//! Postgres pool backing the membership store.

use crate::config::DatabaseConfig;
use anyhow::{bail, Context, Result};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{ConnectOptions, PgPool};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// Table the membership store reads and writes.
pub const MEMBERSHIP_TABLE: &str = "workspace_members";

/// Open a pool and make sure the membership table is reachable through it.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let mut options = PgConnectOptions::from_str(&config.url).context("Invalid database URL")?;
    if !config.log_queries {
        options = options.disable_statement_logging();
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Some(Duration::from_secs(config.idle_timeout_secs)))
        .connect_with(options)
        .await
        .context("Failed to connect to the membership database")?;

    verify_connection(&pool).await?;

    let stats = pool_stats(&pool);
    info!(
        max_connections = config.max_connections,
        open = stats.size,
        idle = stats.idle,
        "Membership database pool ready"
    );
    Ok(pool)
}

/// Round trip to the database and check that the membership table exists.
pub async fn verify_connection(pool: &PgPool) -> Result<()> {
    let table: Option<String> = sqlx::query_scalar("SELECT to_regclass($1)::text")
        .bind(MEMBERSHIP_TABLE)
        .fetch_one(pool)
        .await
        .context("Membership database did not answer")?;

    if table.is_none() {
        bail!("Table `{MEMBERSHIP_TABLE}` not found; run the membership migrations first");
    }
    debug!(table = MEMBERSHIP_TABLE, "Membership table present");
    Ok(())
}

/// Point-in-time connection counts.
pub fn pool_stats(pool: &PgPool) -> PoolStats {
    let size = pool.size();
    let idle = pool.num_idle();
    PoolStats {
        size,
        idle,
        active: size.saturating_sub(idle as u32),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub size: u32,
    pub idle: usize,
    pub active: u32,
}
