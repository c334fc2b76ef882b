//! In-process object store.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::domain::{DatasetGroup, StorageKey};
use crate::error::PipelineError;
use crate::store::ObjectStore;

#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<StorageKey, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every stored object, keyed by path.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        self.objects
            .lock()
            .map(|m| m.iter().map(|(k, v)| (k.path(), v.clone())).collect())
            .unwrap_or_default()
    }

    fn poisoned() -> PipelineError {
        PipelineError::storage("memory store lock poisoned")
    }
}

impl ObjectStore for MemoryStore {
    fn put(&self, key: &StorageKey, body: &[u8]) -> Result<(), PipelineError> {
        let mut objects = self.objects.lock().map_err(|_| Self::poisoned())?;
        objects.insert(key.clone(), body.to_vec());
        Ok(())
    }

    fn get(&self, key: &StorageKey) -> Result<Option<Vec<u8>>, PipelineError> {
        let objects = self.objects.lock().map_err(|_| Self::poisoned())?;
        Ok(objects.get(key).cloned())
    }

    fn list(&self, group: DatasetGroup) -> Result<Vec<StorageKey>, PipelineError> {
        let objects = self.objects.lock().map_err(|_| Self::poisoned())?;
        Ok(objects.keys().filter(|k| k.group == group).cloned().collect())
    }
}
