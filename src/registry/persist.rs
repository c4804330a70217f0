//! Best-effort JSON snapshot of the registry.
//!
//! The snapshot lists every record in insertion order. It is rewritten
//! after each mutation by writing a sibling temp file and renaming it over
//! the old one, so a crash mid-write leaves the previous snapshot intact.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::TaskRecord;
use crate::error::SchedulerError;

const SNAPSHOT_VERSION: u8 = 1;

fn default_snapshot_version() -> u8 {
    SNAPSHOT_VERSION
}

/// On-disk layout.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistrySnapshot {
    #[serde(default = "default_snapshot_version")]
    version: u8,
    #[serde(default)]
    tasks: Vec<TaskRecord>,
}

/// Reads and writes registry snapshots at a fixed path.
#[derive(Debug, Clone)]
pub struct JsonSnapshotStore {
    path: PathBuf,
}

impl JsonSnapshotStore {
    /// Store backed by `path`. Nothing is touched until the first load/save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Snapshot location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads all records. A missing file is an empty registry.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Persistence`] when the file exists but cannot be
    /// read or parsed.
    pub fn load(&self) -> Result<Vec<TaskRecord>, SchedulerError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.error(format!("cannot read snapshot: {e}"))),
        };

        let snapshot: RegistrySnapshot = serde_json::from_slice(&bytes)
            .map_err(|e| self.error(format!("cannot parse snapshot: {e}")))?;
        if snapshot.version != SNAPSHOT_VERSION {
            tracing::warn!(
                path = %self.path.display(),
                version = snapshot.version,
                "loading registry snapshot with unexpected version"
            );
        }
        Ok(snapshot.tasks)
    }

    /// Replaces the snapshot with `records`.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Persistence`] on any serialization or I/O failure.
    pub fn save(&self, records: &[TaskRecord]) -> Result<(), SchedulerError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| self.error(format!("cannot create snapshot dir: {e}")))?;
        }

        let snapshot = RegistrySnapshot {
            version: SNAPSHOT_VERSION,
            tasks: records.to_vec(),
        };
        let json = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| self.error(format!("cannot serialize snapshot: {e}")))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| self.error(format!("cannot write snapshot: {e}")))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| self.error(format!("cannot replace snapshot: {e}")))?;
        Ok(())
    }

    fn error(&self, message: String) -> SchedulerError {
        SchedulerError::Persistence {
            path: self.path.clone(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSnapshotStore::new(dir.path().join("absent.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn save_then_load_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSnapshotStore::new(dir.path().join("nested").join("registry.json"));
        let records = vec![
            TaskRecord::new("b", "second-name", Utc::now()),
            TaskRecord::new("a", "first-name", Utc::now()),
        ];
        store.save(&records).unwrap();

        let loaded = store.load().unwrap();
        let ids: Vec<_> = loaded.iter().map(|r| r.task_id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);
    }

    #[test]
    fn corrupt_file_is_a_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        std::fs::write(&path, b"{not json").unwrap();
        let err = JsonSnapshotStore::new(&path).load().unwrap_err();
        assert!(matches!(err, SchedulerError::Persistence { .. }));
    }
}
