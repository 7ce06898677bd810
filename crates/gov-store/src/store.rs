// store.rs — RecordStore trait with in-memory and JSON-directory backends.
//
// Each record type gets its own store instance. The JSON backend writes one
// file per record: `<store_dir>/<record_id>.json`. Writes go to a temporary
// sibling first and are renamed into place, so a reader never observes a
// half-written record.

use std::collections::BTreeMap;
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;

/// A persistable record with a stable string key.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The key this record is stored under.
    fn record_id(&self) -> String;
}

/// Trait for persisting and retrieving records of one type.
///
/// Implementations must be safe to share across threads: the engine holds
/// stores behind `Arc<dyn RecordStore<T>>` and calls them concurrently.
pub trait RecordStore<T: Record>: Send + Sync {
    /// Save a record. If one with the same id exists, it's overwritten.
    fn save(&self, record: &T) -> Result<(), StoreError>;

    /// Get a record by id.
    fn get(&self, id: &str) -> Result<Option<T>, StoreError>;

    /// List all records, ordered by id.
    fn list(&self) -> Result<Vec<T>, StoreError>;

    /// Remove a record. Returns false if it did not exist.
    fn delete(&self, id: &str) -> Result<bool, StoreError>;
}

/// In-memory RecordStore. Lost when the process exits.
pub struct MemoryStore<T> {
    records: RwLock<BTreeMap<String, T>>,
}

impl<T: Record> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<T: Record> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> RecordStore<T> for MemoryStore<T> {
    fn save(&self, record: &T) -> Result<(), StoreError> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.insert(record.record_id(), record.clone());
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<T>, StoreError> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(records.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<T>, StoreError> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(records.values().cloned().collect())
    }

    fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        Ok(records.remove(id).is_some())
    }
}

/// JSON file-based RecordStore: one file per record.
pub struct JsonDirStore<T> {
    store_dir: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Record> JsonDirStore<T> {
    /// Create a new store backed by the given directory.
    /// Creates the directory if it doesn't exist.
    pub fn new(store_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let store_dir = store_dir.as_ref().to_path_buf();
        fs::create_dir_all(&store_dir).map_err(|source| StoreError::IoError {
            path: store_dir.clone(),
            source,
        })?;
        Ok(Self {
            store_dir,
            _marker: PhantomData,
        })
    }

    /// The directory records are written to.
    pub fn dir(&self) -> &Path {
        &self.store_dir
    }

    /// Path to the JSON file for a given record id.
    fn record_file(&self, id: &str) -> Result<PathBuf, StoreError> {
        if id.is_empty() {
            return Err(StoreError::InvalidId {
                id: id.to_string(),
                reason: "empty id".to_string(),
            });
        }
        if id.contains('/') || id.contains('\\') || id.contains("..") {
            return Err(StoreError::InvalidId {
                id: id.to_string(),
                reason: "id must not contain path separators".to_string(),
            });
        }
        Ok(self.store_dir.join(format!("{}.json", id)))
    }
}

impl<T: Record> RecordStore<T> for JsonDirStore<T> {
    fn save(&self, record: &T) -> Result<(), StoreError> {
        let path = self.record_file(&record.record_id())?;
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(record)?;
        fs::write(&tmp, json).map_err(|source| StoreError::IoError {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| StoreError::IoError { path, source })?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<T>, StoreError> {
        let path = self.record_file(id)?;
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path).map_err(|source| StoreError::IoError {
            path: path.clone(),
            source,
        })?;
        Ok(Some(serde_json::from_str(&json)?))
    }

    fn list(&self) -> Result<Vec<T>, StoreError> {
        let entries = fs::read_dir(&self.store_dir).map_err(|source| StoreError::IoError {
            path: self.store_dir.clone(),
            source,
        })?;

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::IoError {
                path: self.store_dir.clone(),
                source,
            })?;
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            let json = fs::read_to_string(&path).map_err(|source| StoreError::IoError {
                path: path.clone(),
                source,
            })?;
            match serde_json::from_str::<T>(&json) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable record")
                }
            }
        }

        records.sort_by_key(|r| r.record_id());
        Ok(records)
    }

    fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let path = self.record_file(id)?;
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path).map_err(|source| StoreError::IoError { path, source })?;
        Ok(true)
    }
}
