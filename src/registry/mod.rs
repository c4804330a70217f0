//! Task registry: the single source of truth for scheduled tasks.
//!
//! # Ownership
//!
//! A [`TaskRegistry`] is created once per process (by the host, or by the
//! [`Scheduler`](crate::Scheduler) that owns it behind an `Arc`) and lives
//! until the process exits. Records are never removed; terminal statuses
//! stay visible to [`list`](TaskRegistry::list).
//!
//! # Concurrency
//!
//! All records live in one `IndexMap` behind a `parking_lot::RwLock`. Every
//! status transition reads the current status, validates it, and writes the
//! new one inside a single write-lock section. When a fire and a cancel race
//! on the same task, whichever takes the lock first wins and the other gets
//! [`SchedulerError::InvalidTransition`].
//!
//! # Persistence
//!
//! With a [`JsonSnapshotStore`] attached, the registry loads the snapshot on
//! construction and rewrites it after every mutation. Persistence failures
//! are logged and never fail the mutation.

pub mod persist;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;

pub use persist::JsonSnapshotStore;

use crate::domain::{TaskParameters, TaskRecord};
use crate::error::SchedulerError;
use crate::types::status::TaskStatus;

/// Insertion-ordered, lock-guarded map of task id to [`TaskRecord`].
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use schedule_task::registry::TaskRegistry;
/// use schedule_task::TaskStatus;
///
/// let registry = TaskRegistry::new();
/// registry.create("t1", "backup", Utc::now()).unwrap();
/// registry.update_status("t1", TaskStatus::Running).unwrap();
/// registry.update_status("t1", TaskStatus::Completed).unwrap();
///
/// assert_eq!(registry.get("t1").unwrap().status, TaskStatus::Completed);
/// assert!(registry.update_status("t1", TaskStatus::Cancelled).is_err());
/// ```
#[derive(Debug, Default)]
pub struct TaskRegistry {
    records: RwLock<IndexMap<String, TaskRecord>>,
    snapshot: Option<JsonSnapshotStore>,
}

impl TaskRegistry {
    /// Creates an empty, memory-only registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry backed by a snapshot, loading any existing records.
    ///
    /// An unreadable snapshot is logged and the registry starts empty.
    pub fn with_snapshot(store: JsonSnapshotStore) -> Self {
        let records = match store.load() {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(error = %e, "starting with an empty registry");
                Vec::new()
            }
        };
        tracing::debug!(
            path = %store.path().display(),
            count = records.len(),
            "loaded registry snapshot"
        );

        let map = records
            .into_iter()
            .map(|record| (record.task_id.clone(), record))
            .collect();
        Self {
            records: RwLock::new(map),
            snapshot: Some(store),
        }
    }

    /// Inserts a new record as given.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::DuplicateTaskId`] if the id is already present.
    pub fn insert(&self, record: TaskRecord) -> Result<TaskRecord, SchedulerError> {
        let mut records = self.records.write();
        if records.contains_key(&record.task_id) {
            tracing::warn!(task_id = %record.task_id, "duplicate task id rejected");
            return Err(SchedulerError::DuplicateTaskId {
                task_id: record.task_id,
            });
        }
        records.insert(record.task_id.clone(), record.clone());
        self.persist(&records);
        Ok(record)
    }

    /// Inserts a `Scheduled` record.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::DuplicateTaskId`] if the id is already present.
    pub fn create(
        &self,
        task_id: impl Into<String>,
        task_name: impl Into<String>,
        fire_time: DateTime<Utc>,
    ) -> Result<TaskRecord, SchedulerError> {
        self.insert(TaskRecord::new(task_id, task_name, fire_time))
    }

    /// Atomically moves a task to `new_status`.
    ///
    /// Valid transitions are `Scheduled -> Running | Cancelled` and
    /// `Running -> Completed | Failed`. Anything else leaves the record
    /// untouched.
    ///
    /// # Errors
    ///
    /// - [`SchedulerError::UnknownTask`] if the id is absent.
    /// - [`SchedulerError::InvalidTransition`] if the transition is not allowed.
    pub fn update_status(&self, task_id: &str, new_status: TaskStatus) -> Result<TaskRecord, SchedulerError> {
        self.transition(task_id, |record| {
            record.status.validate_transition(task_id, &new_status)?;
            Ok(new_status)
        })
    }

    /// Moves a `Scheduled` task whose trigger the mechanism refused to `Failed`.
    ///
    /// This is the only way a task fails without having run.
    ///
    /// # Errors
    ///
    /// - [`SchedulerError::UnknownTask`] if the id is absent.
    /// - [`SchedulerError::InvalidTransition`] unless the task is `Scheduled`.
    pub fn mark_dispatch_failed(&self, task_id: &str) -> Result<TaskRecord, SchedulerError> {
        self.transition(task_id, |record| {
            if record.status == TaskStatus::Scheduled {
                Ok(TaskStatus::Failed)
            } else {
                Err(SchedulerError::InvalidTransition {
                    task_id: task_id.to_string(),
                    from: record.status,
                    to: TaskStatus::Failed,
                })
            }
        })
    }

    fn transition<F>(&self, task_id: &str, decide: F) -> Result<TaskRecord, SchedulerError>
    where
        F: FnOnce(&TaskRecord) -> Result<TaskStatus, SchedulerError>,
    {
        let mut records = self.records.write();
        let record = records
            .get_mut(task_id)
            .ok_or_else(|| SchedulerError::UnknownTask {
                task_id: task_id.to_string(),
            })?;

        let from = record.status;
        let to = match decide(&*record) {
            Ok(to) => to,
            Err(e) => {
                tracing::warn!(task_id = %task_id, status = %from, error = %e, "status transition rejected");
                return Err(e);
            }
        };

        record.status = to;
        record.last_updated_at = Utc::now();
        let updated = record.clone();
        tracing::debug!(task_id = %task_id, from = %from, to = %to, "task status changed");

        self.persist(&records);
        Ok(updated)
    }

    /// Removes and returns the parameters held for a task.
    ///
    /// Called once the mechanism has taken over as the parameter carrier.
    pub fn take_parameters(&self, task_id: &str) -> Option<TaskParameters> {
        self.records
            .write()
            .get_mut(task_id)
            .and_then(|record| record.parameters.take())
    }

    /// Returns a copy of a record.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::UnknownTask`] if the id is absent.
    pub fn get(&self, task_id: &str) -> Result<TaskRecord, SchedulerError> {
        self.records
            .read()
            .get(task_id)
            .cloned()
            .ok_or_else(|| SchedulerError::UnknownTask {
                task_id: task_id.to_string(),
            })
    }

    /// All records in insertion order, terminal ones included.
    pub fn list(&self) -> Vec<TaskRecord> {
        self.records.read().values().cloned().collect()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns `true` when no task has been recorded.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn persist(&self, records: &IndexMap<String, TaskRecord>) {
        let Some(store) = &self.snapshot else {
            return;
        };
        let snapshot: Vec<TaskRecord> = records.values().cloned().collect();
        if let Err(e) = store.save(&snapshot) {
            tracing::warn!(error = %e, "registry snapshot not written");
        }
    }
}
