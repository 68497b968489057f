//! Narrow persistence seams: blob bytes and JSON documents.
//!
//! The gateway never touches a cloud SDK; production adapters live behind
//! these traits and the in-memory/filesystem implementations here cover
//! local deployment and tests.

mod blob;
mod doc;

pub use blob::{LocalBlobStore, MemoryBlobStore};
pub use doc::{FsDocStore, MemoryDocStore};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("version conflict on {id}: expected {expected}, found {found}")]
    Conflict {
        id: String,
        expected: u64,
        found: u64,
    },

    #[error("storage io error: {0}")]
    Io(String),
}

/// Content-addressed-at-the-caller's-discretion byte storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes under `key` and return a URI clients can fetch.
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StoreError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;
}

/// Versioned JSON document storage with compare-and-swap updates.
#[async_trait]
pub trait DocStore: Send + Sync {
    async fn create(
        &self,
        collection: &str,
        id: &str,
        doc: serde_json::Value,
    ) -> Result<(), StoreError>;

    /// Fetch a document and its current version.
    async fn get(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<(serde_json::Value, u64), StoreError>;

    /// Replace a document if its version still matches `expected_version`.
    async fn update(
        &self,
        collection: &str,
        id: &str,
        doc: serde_json::Value,
        expected_version: u64,
    ) -> Result<(), StoreError>;
}
