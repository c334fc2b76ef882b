//! Filesystem-backed object store.
//!
//! Layout mirrors the key paths: `{root}/{group}/{identifier}/{date}.json`.
//! Each `put` writes a uniquely named temp file in the target directory,
//! fsyncs it, and renames it over the destination, so readers see either the
//! old or the new document and concurrent writers never share a temp file.

use std::fs::{self, File};
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tracing::debug;

use crate::domain::{DatasetGroup, StorageKey};
use crate::error::PipelineError;
use crate::store::ObjectStore;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct LocalFsStore {
    root: PathBuf,
}

impl LocalFsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, key: &StorageKey) -> PathBuf {
        self.root
            .join(key.group.as_str())
            .join(&key.identifier)
            .join(format!("{}.json", key.date.format("%Y-%m-%d")))
    }
}

impl ObjectStore for LocalFsStore {
    fn put(&self, key: &StorageKey, body: &[u8]) -> Result<(), PipelineError> {
        let started = Instant::now();
        let path = self.object_path(key);
        let dir = path
            .parent()
            .ok_or_else(|| PipelineError::storage(format!("No parent directory for {key}")))?;
        fs::create_dir_all(dir).map_err(|e| io_error("create directory for", key, e))?;

        let tmp = dir.join(format!(
            ".{}.{}.{}.tmp",
            key.date.format("%Y-%m-%d"),
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        if let Err(err) = write_and_sync(&tmp, body) {
            let _ = fs::remove_file(&tmp);
            return Err(io_error("write", key, err));
        }
        if let Err(err) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(io_error("publish", key, err));
        }

        debug!(key = %key, bytes = body.len(), elapsed_ms = started.elapsed().as_millis() as u64, "stored object");
        Ok(())
    }

    fn get(&self, key: &StorageKey) -> Result<Option<Vec<u8>>, PipelineError> {
        match fs::read(self.object_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error("read", key, e)),
        }
    }

    fn list(&self, group: DatasetGroup) -> Result<Vec<StorageKey>, PipelineError> {
        let group_dir = self.root.join(group.as_str());
        let identifiers = match fs::read_dir(&group_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(list_error(&group_dir, e)),
        };

        let mut keys = Vec::new();
        for entry in identifiers {
            let entry = entry.map_err(|e| list_error(&group_dir, e))?;
            let id_dir = entry.path();
            if !id_dir.is_dir() {
                continue;
            }
            let Some(identifier) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            for file in fs::read_dir(&id_dir).map_err(|e| list_error(&id_dir, e))? {
                let file = file.map_err(|e| list_error(&id_dir, e))?;
                let Some(name) = file.file_name().to_str().map(str::to_string) else {
                    continue;
                };
                if let Some(key) = StorageKey::parse(&format!("{}/{identifier}/{name}", group.as_str())) {
                    keys.push(key);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

fn write_and_sync(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn io_error(action: &str, key: &StorageKey, err: std::io::Error) -> PipelineError {
    PipelineError::storage(format!("Failed to {action} {key}: {err}"))
}

fn list_error(dir: &Path, err: std::io::Error) -> PipelineError {
    PipelineError::storage(format!("Failed to list '{}': {err}", dir.display()))
}
