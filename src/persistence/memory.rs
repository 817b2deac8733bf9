//! In-memory persistence adapter.

use crate::core::error::{PersistenceError, PersistenceResult};
use crate::persistence::traits::PersistenceAdapter;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// A TTL-aware in-process key-value store.
///
/// Survives breaker disposal (not process restarts), which makes it handy
/// for tests and for sharing snapshots between registries in one process.
/// It can also be told to fail, to exercise error paths.
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    entries: RwLock<HashMap<String, Entry>>,
    fail: AtomicBool,
    writes: AtomicU64,
}

impl InMemoryPersistence {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent operation fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    /// Returns `true` if no live entries exist.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts a value directly, bypassing the failure switch.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>, ttl: Duration) {
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(
                key.into(),
                Entry {
                    value: value.into(),
                    expires_at: Instant::now() + ttl,
                },
            );
    }

    fn check(&self) -> PersistenceResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PersistenceError::backend("in-memory store set to fail"));
        }
        Ok(())
    }
}

#[async_trait]
impl PersistenceAdapter for InMemoryPersistence {
    async fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        self.check()?;
        let now = Instant::now();
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<(), PersistenceError> {
        self.check()?;
        self.insert(key, value, ttl);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
