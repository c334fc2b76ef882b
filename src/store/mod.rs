//! Object storage for ingested documents.
//!
//! Keys are [`StorageKey`]s; values are opaque bytes (pretty-printed JSON in
//! practice). Writes are last-write-wins replacements: a second `put` of the
//! same key silently supersedes the first.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::{DatasetGroup, StorageKey};
use crate::error::PipelineError;

pub mod local;
pub mod memory;

pub use local::LocalFsStore;
pub use memory::MemoryStore;

pub trait ObjectStore: Send + Sync {
    /// Persist `body` at `key`, replacing any previous content.
    ///
    /// Must be safe to call concurrently for distinct keys.
    fn put(&self, key: &StorageKey, body: &[u8]) -> Result<(), PipelineError>;

    /// Read the bytes last written at `key`, or `None` if nothing was written.
    fn get(&self, key: &StorageKey) -> Result<Option<Vec<u8>>, PipelineError>;

    /// All keys of one dataset group, sorted.
    fn list(&self, group: DatasetGroup) -> Result<Vec<StorageKey>, PipelineError>;
}

/// Serialize `doc` as pretty JSON and store it at `key`.
pub fn put_document<T: Serialize>(store: &dyn ObjectStore, key: &StorageKey, doc: &T) -> Result<(), PipelineError> {
    let mut body = serde_json::to_vec_pretty(doc)
        .map_err(|e| PipelineError::malformed(format!("Failed to serialize document for {key}: {e}")))?;
    body.push(b'\n');
    store.put(key, &body)
}

/// Read and decode the document at `key`.
///
/// A document that exists but does not decode is `MalformedValue`.
pub fn get_document<T: DeserializeOwned>(
    store: &dyn ObjectStore,
    key: &StorageKey,
) -> Result<Option<T>, PipelineError> {
    let Some(body) = store.get(key)? else {
        return Ok(None);
    };
    serde_json::from_slice(&body)
        .map(Some)
        .map_err(|e| PipelineError::malformed(format!("Invalid document at {key}: {e}")))
}
