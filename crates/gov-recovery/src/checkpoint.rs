// checkpoint.rs — Append-only checkpoints for in-flight executions.
//
// Each save appends a new checkpoint with the next sequence number. Older
// checkpoints are superseded, never rewritten or deleted. The JSONL backend
// keeps one file per execution: `<dir>/<execution_id>.jsonl`.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::RecoveryError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    pub execution_id: Uuid,
    /// 1-based, strictly increasing per execution.
    pub sequence: u64,
    pub state: Value,
    pub created_at: DateTime<Utc>,
}

pub trait CheckpointStore: Send + Sync {
    /// Append a checkpoint and return it with its assigned sequence.
    fn append(&self, execution_id: Uuid, state: Value) -> Result<Checkpoint, RecoveryError>;

    /// The most recent checkpoint, if any.
    fn latest(&self, execution_id: Uuid) -> Result<Option<Checkpoint>, RecoveryError>;

    /// Every checkpoint for an execution, oldest first.
    fn history(&self, execution_id: Uuid) -> Result<Vec<Checkpoint>, RecoveryError>;
}

#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    checkpoints: Mutex<HashMap<Uuid, Vec<Checkpoint>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn append(&self, execution_id: Uuid, state: Value) -> Result<Checkpoint, RecoveryError> {
        let mut all = self.checkpoints.lock().unwrap_or_else(|e| e.into_inner());
        let list = all.entry(execution_id).or_default();
        let checkpoint = Checkpoint {
            execution_id,
            sequence: list.len() as u64 + 1,
            state,
            created_at: Utc::now(),
        };
        list.push(checkpoint.clone());
        Ok(checkpoint)
    }

    fn latest(&self, execution_id: Uuid) -> Result<Option<Checkpoint>, RecoveryError> {
        let all = self.checkpoints.lock().unwrap_or_else(|e| e.into_inner());
        Ok(all.get(&execution_id).and_then(|l| l.last().cloned()))
    }

    fn history(&self, execution_id: Uuid) -> Result<Vec<Checkpoint>, RecoveryError> {
        let all = self.checkpoints.lock().unwrap_or_else(|e| e.into_inner());
        Ok(all.get(&execution_id).cloned().unwrap_or_default())
    }
}

/// One JSONL file per execution.
pub struct JsonlCheckpointStore {
    dir: PathBuf,
    append_lock: Mutex<()>,
}

impl JsonlCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            append_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, execution_id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.jsonl", execution_id))
    }

    fn read(&self, execution_id: Uuid) -> Result<Vec<Checkpoint>, RecoveryError> {
        let path = self.path_for(execution_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = fs::File::open(&path).map_err(|source| RecoveryError::IoError {
            path: path.clone(),
            source,
        })?;
        let mut out = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|source| RecoveryError::IoError {
                path: path.clone(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Checkpoint>(&line) {
                Ok(c) => out.push(c),
                // A torn final line from a crash mid-append; earlier lines stand.
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable checkpoint line"),
            }
        }
        Ok(out)
    }
}

impl CheckpointStore for JsonlCheckpointStore {
    fn append(&self, execution_id: Uuid, state: Value) -> Result<Checkpoint, RecoveryError> {
        let _guard = self.append_lock.lock().unwrap_or_else(|e| e.into_inner());
        fs::create_dir_all(&self.dir).map_err(|source| RecoveryError::IoError {
            path: self.dir.clone(),
            source,
        })?;
        let sequence = self
            .read(execution_id)?
            .last()
            .map_or(1, |c| c.sequence + 1);
        let checkpoint = Checkpoint {
            execution_id,
            sequence,
            state,
            created_at: Utc::now(),
        };
        let path = self.path_for(execution_id);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| RecoveryError::IoError {
                path: path.clone(),
                source,
            })?;
        let line = serde_json::to_string(&checkpoint)?;
        writeln!(file, "{}", line)
            .and_then(|_| file.sync_data())
            .map_err(|source| RecoveryError::IoError { path, source })?;
        Ok(checkpoint)
    }

    fn latest(&self, execution_id: Uuid) -> Result<Option<Checkpoint>, RecoveryError> {
        Ok(self.read(execution_id)?.pop())
    }

    fn history(&self, execution_id: Uuid) -> Result<Vec<Checkpoint>, RecoveryError> {
        self.read(execution_id)
    }
}

/// Handle given to an executor so it can checkpoint its own progress.
#[derive(Clone)]
pub struct Checkpointer {
    store: Arc<dyn CheckpointStore>,
    execution_id: Uuid,
}

impl Checkpointer {
    pub fn new(store: Arc<dyn CheckpointStore>, execution_id: Uuid) -> Self {
        Self {
            store,
            execution_id,
        }
    }

    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    pub fn save(&self, state: Value) -> Result<Checkpoint, RecoveryError> {
        self.store.append(self.execution_id, state)
    }
}

impl std::fmt::Debug for Checkpointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Checkpointer")
            .field("execution_id", &self.execution_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn exercise(store: &dyn CheckpointStore) {
        let id = Uuid::new_v4();
        assert!(store.latest(id).unwrap().is_none());

        let first = store.append(id, json!({"step": 1})).unwrap();
        let second = store.append(id, json!({"step": 2, "rows": [1, 2, 3]})).unwrap();
        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);

        let latest = store.latest(id).unwrap().unwrap();
        assert_eq!(latest.state, json!({"step": 2, "rows": [1, 2, 3]}));

        // Superseded, not replaced.
        let history = store.history(id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].state, json!({"step": 1}));

        // Executions are independent.
        assert!(store.latest(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn memory_store_appends() {
        exercise(&MemoryCheckpointStore::new());
    }

    #[test]
    fn jsonl_store_appends_and_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlCheckpointStore::new(dir.path().join("checkpoints"));
        exercise(&store);

        let id = Uuid::new_v4();
        store.append(id, json!("saved")).unwrap();
        let reopened = JsonlCheckpointStore::new(dir.path().join("checkpoints"));
        assert_eq!(reopened.latest(id).unwrap().unwrap().state, json!("saved"));
        assert_eq!(reopened.append(id, json!("next")).unwrap().sequence, 2);
    }

    #[test]
    fn torn_trailing_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlCheckpointStore::new(dir.path());
        let id = Uuid::new_v4();
        store.append(id, json!({"ok": true})).unwrap();

        let mut file = OpenOptions::new()
            .append(true)
            .open(dir.path().join(format!("{}.jsonl", id)))
            .unwrap();
        write!(file, "{{\"execution_id\":").unwrap();

        assert_eq!(store.latest(id).unwrap().unwrap().state, json!({"ok": true}));
    }
}
