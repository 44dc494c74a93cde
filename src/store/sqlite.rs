//! SQLite session store.

use std::path::Path;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, trace};

use super::{sweep_due, SessionStore, StoreError};
use crate::context::Context;

const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS contexts (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    expires_at INTEGER NOT NULL
)";

/// SQLite-backed session store. Contexts are stored as JSON with an expiry
/// timestamp (unix milliseconds). Expired rows are deleted every few
/// hundred writes.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    writes: Arc<AtomicUsize>,
}

impl SqliteStore {
    /// Open (creating if needed) the database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the file cannot be opened or the
    /// schema cannot be created.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        debug!(path = %path.display(), "opened session database");
        Self::with_pool(pool).await
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the schema cannot be created.
    pub async fn in_memory() -> Result<Self, StoreError> {
        // A single connection: each in-memory connection is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool).await
    }

    /// Use an existing pool, creating the schema if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the schema cannot be created.
    pub async fn with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self {
            pool,
            writes: Arc::default(),
        })
    }

    /// Delete every expired row, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on SQLite failure.
    pub async fn purge_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM contexts WHERE expires_at <= ?1")
            .bind(Utc::now().timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<Context>, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM contexts WHERE key = ?1 AND expires_at > ?2")
                .bind(key)
                .bind(Utc::now().timestamp_millis())
                .fetch_optional(&self.pool)
                .await?;
        trace!(key, hit = row.is_some(), "context lookup");
        row.map(|(value,)| serde_json::from_str(&value))
            .transpose()
            .map_err(StoreError::from)
    }

    async fn put(
        &self,
        key: &str,
        context: &Context,
        retention: Duration,
    ) -> Result<(), StoreError> {
        let expires_at = chrono::Duration::from_std(retention)
            .ok()
            .and_then(|retention| Utc::now().checked_add_signed(retention))
            .ok_or(StoreError::RetentionOutOfRange(retention))?;
        let value = serde_json::to_string(context)?;
        sqlx::query(
            "INSERT INTO contexts (key, value, expires_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
        )
        .bind(key)
        .bind(value)
        .bind(expires_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        if sweep_due(&self.writes) {
            let removed = self.purge_expired().await?;
            trace!(removed, "swept expired contexts");
        }
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM contexts WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
