//! Persistence adapter trait definition.

use crate::core::error::PersistenceError;

use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;

/// Key-value capability a breaker uses to survive process restarts.
///
/// The breaker only ever stores small JSON snapshots under keys of the form
/// `circuit_breaker:{service}`. Implementations can be backed by Redis, a
/// database table, files, or memory.
///
/// # Example Implementation
///
/// ```rust,ignore
/// use callguard::persistence::PersistenceAdapter;
/// use callguard::core::PersistenceError;
/// use async_trait::async_trait;
/// use std::time::Duration;
///
/// #[derive(Debug)]
/// struct RedisAdapter {
///     // connection pool
/// }
///
/// #[async_trait]
/// impl PersistenceAdapter for RedisAdapter {
///     async fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
///         todo!()
///     }
///
///     async fn set_with_ttl(
///         &self,
///         key: &str,
///         value: String,
///         ttl: Duration,
///     ) -> Result<(), PersistenceError> {
///         todo!()
///     }
/// }
/// ```
#[async_trait]
pub trait PersistenceAdapter: Send + Sync + Debug {
    /// Returns the value stored under `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, PersistenceError>;

    /// Stores `value` under `key` for at most `ttl`.
    async fn set_with_ttl(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<(), PersistenceError>;
}

/// Returns the storage key for a service's snapshot.
pub fn snapshot_key(service: &str) -> String {
    format!("circuit_breaker:{service}")
}

/// A persistence adapter that stores nothing.
///
/// Used when durability across restarts is not wanted.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpPersistence;

impl NoOpPersistence {
    /// Creates a new no-op adapter.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PersistenceAdapter for NoOpPersistence {
    async fn get(&self, _key: &str) -> Result<Option<String>, PersistenceError> {
        Ok(None)
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        _value: String,
        _ttl: Duration,
    ) -> Result<(), PersistenceError> {
        tracing::trace!(key = %key, "NoOp persistence: snapshot not stored");
        Ok(())
    }
}
