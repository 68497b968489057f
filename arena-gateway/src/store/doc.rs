//! Document store implementations.

use super::{DocStore, StoreError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// In-memory documents with versioned CAS.
#[derive(Default)]
pub struct MemoryDocStore {
    docs: Mutex<HashMap<(String, String), (serde_json::Value, u64)>>,
}

impl MemoryDocStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocStore for MemoryDocStore {
    async fn create(
        &self,
        collection: &str,
        id: &str,
        doc: serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut docs = self.docs.lock().map_err(|e| StoreError::Io(e.to_string()))?;
        let key = (collection.to_string(), id.to_string());
        if docs.contains_key(&key) {
            return Err(StoreError::AlreadyExists(id.to_string()));
        }
        docs.insert(key, (doc, 1));
        Ok(())
    }

    async fn get(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<(serde_json::Value, u64), StoreError> {
        let docs = self.docs.lock().map_err(|e| StoreError::Io(e.to_string()))?;
        docs.get(&(collection.to_string(), id.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        doc: serde_json::Value,
        expected_version: u64,
    ) -> Result<(), StoreError> {
        let mut docs = self.docs.lock().map_err(|e| StoreError::Io(e.to_string()))?;
        let key = (collection.to_string(), id.to_string());
        let entry = docs
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if entry.1 != expected_version {
            return Err(StoreError::Conflict {
                id: id.to_string(),
                expected: expected_version,
                found: entry.1,
            });
        }
        *entry = (doc, expected_version + 1);
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct StoredDoc {
    version: u64,
    doc: serde_json::Value,
}

/// One JSON file per document under `root/collection/id.json`.
pub struct FsDocStore {
    root: PathBuf,
    // Serializes read-modify-write cycles; a single gateway process owns the
    // directory so file locking is unnecessary.
    write_lock: Mutex<()>,
}

impl FsDocStore {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            write_lock: Mutex::new(()),
        }
    }

    fn path_for(&self, collection: &str, id: &str) -> Result<PathBuf, StoreError> {
        for part in [collection, id] {
            if part.is_empty() || part.contains('/') || part.contains("..") {
                return Err(StoreError::Io(format!("invalid doc path part: {}", part)));
            }
        }
        Ok(self.root.join(collection).join(format!("{}.json", id)))
    }

    fn read_stored(&self, path: &PathBuf, id: &str) -> Result<StoredDoc, StoreError> {
        match std::fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StoreError::Io(format!("corrupt document {}: {}", id, e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(id.to_string()))
            }
            Err(e) => Err(StoreError::Io(e.to_string())),
        }
    }

    fn write_stored(&self, path: &PathBuf, stored: &StoredDoc) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
        }
        let bytes =
            serde_json::to_vec_pretty(stored).map_err(|e| StoreError::Io(e.to_string()))?;
        std::fs::write(path, bytes).map_err(|e| StoreError::Io(e.to_string()))
    }
}

#[async_trait]
impl DocStore for FsDocStore {
    async fn create(
        &self,
        collection: &str,
        id: &str,
        doc: serde_json::Value,
    ) -> Result<(), StoreError> {
        let path = self.path_for(collection, id)?;
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| StoreError::Io(e.to_string()))?;
        if path.exists() {
            return Err(StoreError::AlreadyExists(id.to_string()));
        }
        self.write_stored(&path, &StoredDoc { version: 1, doc })
    }

    async fn get(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<(serde_json::Value, u64), StoreError> {
        let path = self.path_for(collection, id)?;
        let stored = self.read_stored(&path, id)?;
        Ok((stored.doc, stored.version))
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        doc: serde_json::Value,
        expected_version: u64,
    ) -> Result<(), StoreError> {
        let path = self.path_for(collection, id)?;
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| StoreError::Io(e.to_string()))?;
        let stored = self.read_stored(&path, id)?;
        if stored.version != expected_version {
            return Err(StoreError::Conflict {
                id: id.to_string(),
                expected: expected_version,
                found: stored.version,
            });
        }
        self.write_stored(
            &path,
            &StoredDoc {
                version: expected_version + 1,
                doc,
            },
        )
    }
}
