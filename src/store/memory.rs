//! In-process session store.

use std::collections::HashMap;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::trace;

use super::{sweep_due, SessionStore, StoreError};
use crate::context::Context;

/// In-process session store with per-entry expiry.
///
/// Expired entries are dropped lazily on read, and every few hundred writes
/// `put` sweeps the whole map.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    writes: Arc<AtomicUsize>,
}

#[derive(Clone)]
struct Entry {
    context: Context,
    expires_at: Instant,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry, returning how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        sweep(&mut entries, now)
    }

    /// Number of live (unexpired) entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }

    /// Whether the store holds no live entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn sweep(entries: &mut HashMap<String, Entry>, now: Instant) -> usize {
    let before = entries.len();
    entries.retain(|_, entry| entry.expires_at > now);
    let removed = before.saturating_sub(entries.len());
    if removed > 0 {
        trace!(removed, "swept expired contexts");
    }
    removed
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Context>, StoreError> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.context.clone())),
                Some(_) => {}
            }
        }
        trace!(key, "context expired");
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|entry| entry.expires_at <= now) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn put(
        &self,
        key: &str,
        context: &Context,
        retention: Duration,
    ) -> Result<(), StoreError> {
        let now = Instant::now();
        let expires_at = now
            .checked_add(retention)
            .ok_or(StoreError::RetentionOutOfRange(retention))?;
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_owned(),
            Entry {
                context: context.clone(),
                expires_at,
            },
        );
        if sweep_due(&self.writes) {
            sweep(&mut entries, now);
        }
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
