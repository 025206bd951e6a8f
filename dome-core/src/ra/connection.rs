//! Connection pool: a cheap `Clone` handle around a `sqlx::PgPool`,
//! constructed once at startup.
//!
//! There is no standalone transaction-nesting wrapper here: each
//! mutating primitive that issues more than one statement opens its
//! own `self.pool.begin()` for the duration of that primitive (see
//! `insert_entry`/`unlink`/`rename`/`symlink` in `namespace.rs` and
//! `add_filesize_to_dirs` in `dirsize.rs`) and commits before
//! returning. No RA method calls into another RA method while holding
//! an open transaction, so there is nothing to nest: the outermost
//! (and only) `begin` for a given primitive is also the innermost.

use crate::error::{DomeError, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// Static migrator for `#[sqlx::test(migrator = "dome_core::MIGRATOR")]`
/// in integration tests, alongside the runtime `migrate()` used by
/// `main.rs`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../migrations");

#[derive(Clone)]
pub struct RelationalAdapter {
    pub(crate) pool: PgPool,
}

impl RelationalAdapter {
    pub async fn connect(database_url: &str, pool_size: u32) -> Result<Self> {
        info!(pool_size, "connecting to relational store");
        let pool = PgPoolOptions::new()
            .max_connections(pool_size)
            .connect(database_url)
            .await
            .map_err(|e| DomeError::Internal(format!("failed to connect to database: {e}")))?;
        info!("relational store connected");
        Ok(Self { pool })
    }

    /// Wraps an already-connected pool, e.g. one handed to a
    /// `#[sqlx::test]` by its migrator.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        info!("running relational store migrations");
        sqlx::migrate!("../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DomeError::Internal(format!("migration failed: {e}")))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
