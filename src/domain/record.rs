//! Task record -- the registry's representation of a scheduled task.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::dispatch::MechanismKind;
use crate::domain::request::TaskParameters;
use crate::types::status::TaskStatus;
use crate::types::wire::TaskInfo;

/// Registry entry for one scheduled task.
///
/// `task_id`, `task_name` and `fire_time` never change after creation. Only
/// the registry mutates `status`. `parameters` are held only until the
/// mechanism has accepted the trigger; from then on the trigger payload
/// carries them, so they are never written to the snapshot either.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use schedule_task::domain::TaskRecord;
/// use schedule_task::TaskStatus;
///
/// let record = TaskRecord::new("task-1", "backup", Utc::now());
/// assert_eq!(record.status, TaskStatus::Scheduled);
/// assert!(record.mechanism.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    /// Unique task identifier.
    pub task_id: String,

    /// Name the entry point dispatches on.
    pub task_name: String,

    /// Instant the task becomes due.
    pub fire_time: DateTime<Utc>,

    /// Current lifecycle status.
    pub status: TaskStatus,

    /// Mechanism that carries the trigger. Set once, never mixed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mechanism: Option<MechanismKind>,

    /// Parameters awaiting hand-off to the mechanism.
    #[serde(skip)]
    pub parameters: Option<TaskParameters>,

    /// When the record was created.
    pub created_at: DateTime<Utc>,

    /// When the status last changed.
    pub last_updated_at: DateTime<Utc>,
}

impl TaskRecord {
    /// Creates a record in the `Scheduled` state.
    pub fn new(task_id: impl Into<String>, task_name: impl Into<String>, fire_time: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            task_id: task_id.into(),
            task_name: task_name.into(),
            fire_time,
            status: TaskStatus::Scheduled,
            mechanism: None,
            parameters: None,
            created_at: now,
            last_updated_at: now,
        }
    }

    /// Records which mechanism carries the trigger.
    pub fn with_mechanism(mut self, mechanism: MechanismKind) -> Self {
        self.mechanism = Some(mechanism);
        self
    }

    /// Attaches parameters until dispatch.
    pub fn with_parameters(mut self, parameters: TaskParameters) -> Self {
        self.parameters = Some(parameters);
        self
    }

    /// The fire time as RFC 3339 UTC with millisecond precision.
    pub fn scheduled_time(&self) -> String {
        self.fire_time.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Summary used by `list_tasks`.
    pub fn to_task_info(&self) -> TaskInfo {
        TaskInfo {
            task_id: self.task_id.clone(),
            task_name: self.task_name.clone(),
            scheduled_time: self.scheduled_time(),
            status: self.status,
        }
    }
}
