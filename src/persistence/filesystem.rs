//! Filesystem-based persistence adapter.

use crate::core::error::{PersistenceError, PersistenceResult};
use crate::persistence::traits::PersistenceAdapter;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Distinguishes temp files of concurrent writes.
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// On-disk envelope around a stored value.
#[derive(Debug, Serialize, Deserialize)]
struct StoredValue {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Stores each key as a small JSON file in a directory.
///
/// Expiry uses wall-clock time so that entries written before a restart
/// are still judged correctly afterwards.
///
/// # Directory Structure
///
/// ```text
/// state/
/// ├── circuit_breaker_weather.json
/// └── circuit_breaker_sms.json
/// ```
#[derive(Debug, Clone)]
pub struct FilesystemPersistence {
    base_path: PathBuf,
}

impl FilesystemPersistence {
    /// Creates an adapter rooted at `base_path`, creating the directory if needed.
    pub fn new(base_path: impl Into<PathBuf>) -> PersistenceResult<Self> {
        let base_path = base_path.into();
        std::fs::create_dir_all(&base_path).map_err(|e| {
            PersistenceError::backend(format!(
                "failed to create state directory {}: {}",
                base_path.display(),
                e
            ))
        })?;
        Ok(Self { base_path })
    }

    /// Returns the state directory.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Returns the file used for a key.
    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.base_path.join(format!("{file}.json"))
    }
}

#[async_trait]
impl PersistenceAdapter for FilesystemPersistence {
    async fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let path = self.path_for(key);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let stored: StoredValue = serde_json::from_str(&content)?;
        if stored.expires_at <= Utc::now() {
            tracing::debug!(key = %key, "Stored value expired; removing");
            let _ = tokio::fs::remove_file(&path).await;
            return Ok(None);
        }
        Ok(Some(stored.value))
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<(), PersistenceError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| PersistenceError::backend(format!("invalid ttl: {e}")))?;
        let stored = StoredValue {
            value,
            expires_at: Utc::now() + ttl,
        };
        let content = serde_json::to_string(&stored)?;

        // one temp file per write; the rename replaces the target atomically
        let path = self.path_for(key);
        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("json.{}.{seq}.tmp", std::process::id()));
        tokio::fs::write(&tmp, content).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_filesystem_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let store = FilesystemPersistence::new(temp_dir.path()).unwrap();

        assert_eq!(store.get("circuit_breaker:weather").await.unwrap(), None);

        store
            .set_with_ttl("circuit_breaker:weather", "{}".into(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(
            store.get("circuit_breaker:weather").await.unwrap().as_deref(),
            Some("{}")
        );
        assert!(temp_dir.path().join("circuit_breaker_weather.json").exists());
    }

    #[tokio::test]
    async fn test_filesystem_survives_new_instance() {
        let temp_dir = TempDir::new().unwrap();
        FilesystemPersistence::new(temp_dir.path())
            .unwrap()
            .set_with_ttl("k", "v".into(), Duration::from_secs(60))
            .await
            .unwrap();

        let reopened = FilesystemPersistence::new(temp_dir.path()).unwrap();
        assert_eq!(reopened.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_filesystem_expired_value() {
        let temp_dir = TempDir::new().unwrap();
        let store = FilesystemPersistence::new(temp_dir.path()).unwrap();
        store.set_with_ttl("k", "v".into(), Duration::ZERO).await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(!temp_dir.path().join("k.json").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_filesystem_concurrent_writes_same_key() {
        let temp_dir = TempDir::new().unwrap();
        let store = std::sync::Arc::new(FilesystemPersistence::new(temp_dir.path()).unwrap());

        for round in 0..10 {
            let handles: Vec<_> = (0..16)
                .map(|i| {
                    let store = std::sync::Arc::clone(&store);
                    tokio::spawn(async move {
                        store
                            .set_with_ttl(
                                "circuit_breaker:sms",
                                format!("{round}-{i}"),
                                Duration::from_secs(60),
                            )
                            .await
                    })
                })
                .collect();
            for result in futures::future::join_all(handles).await {
                result.unwrap().unwrap();
            }
        }

        let value = store.get("circuit_breaker:sms").await.unwrap().unwrap();
        assert!(value.starts_with("9-"));
        let leftovers = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter(|entry| {
                entry
                    .as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .ends_with(".tmp")
            })
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_filesystem_corrupt_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = FilesystemPersistence::new(temp_dir.path()).unwrap();
        std::fs::write(temp_dir.path().join("k.json"), "garbage").unwrap();

        assert!(matches!(
            store.get("k").await,
            Err(PersistenceError::Serialization(_))
        ));
    }
}
