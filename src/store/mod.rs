//! Session store: persists a [`Context`] per session between webhook calls.
//!
//! The store is an injected collaborator. [`MemoryStore`] keeps contexts in
//! process with a retention deadline; [`SqliteStore`] persists them as JSON
//! rows so sessions survive restarts.

mod memory;
mod sqlite;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::StoreConfig;
use crate::context::Context;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Expired entries are swept once every this many writes, so sessions that
/// never come back do not accumulate.
const SWEEP_EVERY: usize = 256;

/// Count one write on `counter` and report whether this write should sweep.
fn sweep_due(counter: &std::sync::atomic::AtomicUsize) -> bool {
    let writes = counter
        .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
        .wrapping_add(1);
    writes.checked_rem(SWEEP_EVERY) == Some(0)
}

/// Session store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored context could not be encoded or decoded.
    #[error("context serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The retention period does not fit the store's clock.
    #[error("retention of {0:?} is out of range")]
    RetentionOutOfRange(Duration),
}

/// Key/value store for conversation contexts.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch the context for `key`. Expired entries read as absent.
    async fn get(&self, key: &str) -> Result<Option<Context>, StoreError>;

    /// Store `context` under `key`, replacing any previous value. The entry
    /// expires after `retention`.
    async fn put(&self, key: &str, context: &Context, retention: Duration)
        -> Result<(), StoreError>;

    /// Remove the context for `key`. Removing an absent key is not an error.
    async fn del(&self, key: &str) -> Result<(), StoreError>;
}

/// Open the store `config` selects: SQLite when a path is set, otherwise
/// in memory.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if the SQLite file cannot be opened.
pub async fn open(config: &StoreConfig) -> Result<Arc<dyn SessionStore>, StoreError> {
    match &config.sqlite_path {
        Some(path) => Ok(Arc::new(SqliteStore::open(path).await?)),
        None => Ok(Arc::new(MemoryStore::new())),
    }
}
