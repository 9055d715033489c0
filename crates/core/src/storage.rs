//! Durable storage port for the tracked job collection.
//!
//! The registry hands over the whole collection as JSON text on every write
//! and reads it back raw, so a corrupt payload reaches the registry's
//! fail-soft parser instead of failing inside the backend.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::StorageError;

/// Namespaced key of the persisted job collection.
pub const STORAGE_KEY: &str = "flashdeck.active-jobs.v1";

/// A single durable slot holding the serialized job collection.
pub trait JobStore: Send + Sync {
    /// Read the persisted payload. `Ok(None)` means nothing was ever written.
    fn load(&self) -> Result<Option<String>, StorageError>;

    /// Replace the persisted payload. Must be durable when it returns.
    fn save(&self, payload: &str) -> Result<(), StorageError>;
}

impl<S: JobStore + ?Sized> JobStore for std::sync::Arc<S> {
    fn load(&self) -> Result<Option<String>, StorageError> {
        (**self).load()
    }

    fn save(&self, payload: &str) -> Result<(), StorageError> {
        (**self).save(payload)
    }
}

/// In-process store. Used by tests and by embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slot: Mutex<Option<String>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an existing payload, as if written by a previous run.
    pub fn with_payload(payload: impl Into<String>) -> Self {
        Self {
            slot: Mutex::new(Some(payload.into())),
            writes: AtomicUsize::new(0),
        }
    }

    /// Current payload.
    pub fn payload(&self) -> Option<String> {
        match self.slot.lock() {
            Ok(slot) => slot.clone(),
            Err(e) => {
                tracing::error!("Mutex poisoned reading memory store: {e}");
                None
            }
        }
    }

    /// Number of `save` calls since creation.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

impl JobStore for MemoryStore {
    fn load(&self) -> Result<Option<String>, StorageError> {
        Ok(self.payload())
    }

    fn save(&self, payload: &str) -> Result<(), StorageError> {
        match self.slot.lock() {
            Ok(mut slot) => *slot = Some(payload.to_string()),
            Err(e) => tracing::error!("Mutex poisoned writing memory store: {e}"),
        }
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// One JSON file on disk, replaced atomically (temp file + rename).
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store under `dir`, using the standard file name.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(crate::paths::job_store_file(dir))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl JobStore for FileStore {
    fn load(&self) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io(&self.path, e)),
        }
    }

    fn save(&self, payload: &str) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
            }
        }
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, payload).map_err(|e| StorageError::io(&tmp_path, e))?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| StorageError::io(&self.path, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_counts_writes() {
        let store = MemoryStore::new();
        assert_eq!(store.load().unwrap(), None);

        store.save("[]").unwrap();
        store.save("[1]").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("[1]"));
        assert_eq!(store.write_count(), 2);
    }

    #[test]
    fn test_file_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::in_dir(dir.path());
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_file_store_round_trip_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::in_dir(&dir.path().join("nested"));

        store.save(r#"[{"id":"1"}]"#).unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some(r#"[{"id":"1"}]"#));
        assert!(store.path().ends_with("flashdeck.active-jobs.v1.json"));
        // Temp file is renamed away
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_file_store_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::in_dir(dir.path());
        store.save("[1]").unwrap();
        store.save("[]").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("[]"));
    }
}
