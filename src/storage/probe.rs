//! `SQLite` liveness probe.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, Instant};

use super::map_sqlx_error;
use crate::error::DbError;
use crate::traits::DatabaseProbe;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs `SELECT 1` against a `SQLite` pool.
#[derive(Debug, Clone)]
pub struct SqliteProbe {
    pool: SqlitePool,
}

impl SqliteProbe {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Build a probe for `url` without connecting.
    ///
    /// Connection failures surface on the first [`ping`](DatabaseProbe::ping),
    /// so an unreachable database at startup is reported through the guard
    /// like any other failure.
    ///
    /// # Errors
    ///
    /// Returns a tagged [`DbError`] if `url` cannot be parsed.
    pub fn connect_lazy(url: &str) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::from_str(url).map_err(map_sqlx_error)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_lazy_with(options);
        Ok(Self { pool })
    }

    /// Open (creating if needed) a database file.
    ///
    /// # Errors
    ///
    /// Returns a tagged [`DbError`] if the directory or file cannot be created.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DbError::PermissionDenied {
                message: format!("Failed to create database directory: {e}"),
            })?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))
            .map_err(map_sqlx_error)?
            .journal_mode(SqliteJournalMode::Wal)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(map_sqlx_error)?;

        Ok(Self { pool })
    }

    /// Underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the pool; later pings fail with [`DbError::ConnectionLost`].
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl DatabaseProbe for SqliteProbe {
    async fn ping(&self) -> Result<(), DbError> {
        let started = Instant::now();
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| match map_sqlx_error(e) {
                DbError::Timeout { .. } => DbError::Timeout {
                    elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                },
                other => other,
            })
    }
}
