use std::fs;
use std::path::PathBuf;

use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Owned store for the user-config JSON document served by the
/// `config.*` methods.
///
/// The document is an opaque JSON object; no schema is enforced
/// beyond "is an object". Reads go through the shared lock, writes
/// take the exclusive lock and persist before returning, so
/// concurrent writers are serialized.
pub struct ConfigStore {
    path: Option<PathBuf>,
    doc: RwLock<Map<String, Value>>,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            doc: RwLock::new(Map::new()),
        }
    }

    /// Store without a backing file, used in tests.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            doc: RwLock::new(Map::new()),
        }
    }

    /// Current document as a JSON value.
    pub async fn snapshot(&self) -> Value {
        Value::Object(self.doc.read().await.clone())
    }

    /// Re-read the document from disk. A missing or unparseable file
    /// leaves the in-memory document untouched; config delivery must
    /// not fail because the file was edited badly out-of-band.
    pub async fn reload(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "config file not readable, keeping current document");
                return;
            }
        };
        match serde_json::from_str::<Map<String, Value>>(&raw) {
            Ok(doc) => {
                *self.doc.write().await = doc;
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "config file is not a JSON object, keeping current document");
            }
        }
    }

    /// Replace the whole document and persist it. The write lock is
    /// held across the file write so writers are serialized.
    pub async fn replace(&self, doc: Map<String, Value>) -> Result<(), StoreError> {
        let mut guard = self.doc.write().await;
        if let Some(path) = &self.path {
            let content = serde_json::to_string_pretty(&Value::Object(doc.clone()))?;
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            // Atomic write: temp file then rename.
            let temp_path = path.with_extension("tmp");
            fs::write(&temp_path, content)?;
            fs::rename(&temp_path, path)?;
        }
        *guard = doc;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn replace_persists_and_snapshot_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let store = ConfigStore::new(&path);

        store
            .replace(as_map(json!({"agent": {"model": "default"}})))
            .await
            .unwrap();

        assert_eq!(store.snapshot().await, json!({"agent": {"model": "default"}}));
        let on_disk: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk, json!({"agent": {"model": "default"}}));
    }

    #[tokio::test]
    async fn reload_picks_up_external_edits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = ConfigStore::new(&path);

        fs::write(&path, r#"{"edited": true}"#).unwrap();
        store.reload().await;
        assert_eq!(store.snapshot().await, json!({"edited": true}));
    }

    #[tokio::test]
    async fn reload_keeps_document_when_file_is_missing_or_bad() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = ConfigStore::new(&path);
        store.replace(as_map(json!({"kept": 1}))).await.unwrap();

        fs::remove_file(&path).unwrap();
        store.reload().await;
        assert_eq!(store.snapshot().await, json!({"kept": 1}));

        fs::write(&path, "not json").unwrap();
        store.reload().await;
        assert_eq!(store.snapshot().await, json!({"kept": 1}));
    }

    #[tokio::test]
    async fn in_memory_store_skips_disk() {
        let store = ConfigStore::in_memory();
        store.replace(as_map(json!({"a": 1}))).await.unwrap();
        assert_eq!(store.snapshot().await, json!({"a": 1}));
        store.reload().await;
        assert_eq!(store.snapshot().await, json!({"a": 1}));
    }
}
