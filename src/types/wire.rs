//! Request and response shapes exchanged with the host transport.
//!
//! All types use `#[serde(rename_all = "camelCase")]` to match the JSON the
//! application sends. Optional response fields are omitted when `None`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::status::TaskStatus;

/// Health probe request.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PingRequest {
    /// Value echoed back in the response.
    pub value: Option<String>,
}

/// Health probe response.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResponse {
    /// The echoed value.
    pub value: Option<String>,
}

/// When a task should fire. Exactly one field must be set.
///
/// # Examples
///
/// ```
/// use schedule_task::ScheduleTime;
///
/// let time: ScheduleTime = serde_json::from_str(r#"{"duration": 3600}"#).unwrap();
/// assert_eq!(time.duration, Some(3600.0));
/// assert!(time.date_time.is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleTime {
    /// Absolute ISO-8601 timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,

    /// Delay in seconds from now.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

/// Payload of `schedule_task`.
///
/// # Examples
///
/// ```
/// use schedule_task::ScheduleTaskRequest;
///
/// let json = r#"{
///     "taskName": "backup",
///     "scheduleTime": { "duration": 3600 },
///     "parameters": { "path": "/x" }
/// }"#;
/// let request: ScheduleTaskRequest = serde_json::from_str(json).unwrap();
/// assert_eq!(request.task_name, "backup");
/// assert_eq!(request.parameters.unwrap()["path"], "/x");
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleTaskRequest {
    /// Opaque identifier of what to run.
    #[serde(default)]
    pub task_name: String,

    /// When to run it.
    #[serde(default)]
    pub schedule_time: ScheduleTime,

    /// String parameters handed to the entry point at fire time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<HashMap<String, String>>,
}

/// Response of `schedule_task`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleTaskResponse {
    /// The minted task id, present on failure too.
    pub task_id: String,

    /// Whether the task was registered.
    pub success: bool,

    /// Human-readable outcome.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Payload of `cancel_task`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelTaskRequest {
    /// Task to cancel.
    pub task_id: String,
}

/// Response of `cancel_task`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelTaskResponse {
    /// Whether the task is (now) cancelled.
    pub success: bool,

    /// Human-readable outcome.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// One entry of `list_tasks`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    /// Task id.
    pub task_id: String,

    /// Task name.
    pub task_name: String,

    /// Fire time, RFC 3339 UTC with millisecond precision.
    pub scheduled_time: String,

    /// Current status.
    pub status: TaskStatus,
}

/// Response of `list_tasks`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTasksResponse {
    /// Tasks in schedule order.
    pub tasks: Vec<TaskInfo>,
}
