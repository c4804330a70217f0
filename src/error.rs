//! Error types for scheduling operations.
//!
//! Provides [`SchedulerError`], one enum for every failure the core can
//! report, with context fields for the task and statuses involved.

use std::path::PathBuf;

use crate::types::status::TaskStatus;

/// Errors that can occur while scheduling, cancelling or re-entering a task.
///
/// Variants fall into three groups:
///
/// - request-shape errors ([`is_request_shape`](SchedulerError::is_request_shape)),
///   raised before a task id is minted;
/// - scheduling errors raised after minting, which the facade folds into a
///   failed response carrying the task id;
/// - registry and re-entry errors, which are logged rather than surfaced.
///
/// # Examples
///
/// ```
/// use schedule_task::SchedulerError;
///
/// let err = SchedulerError::UnknownTask {
///     task_id: "missing-task".to_string(),
/// };
/// assert!(err.to_string().contains("missing-task"));
/// assert!(!err.is_request_shape());
/// ```
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The request carried an empty task name.
    #[error("task name is required")]
    MissingTaskName,

    /// A parameter name is empty, collides with a reserved payload key or
    /// contains `=`.
    #[error("invalid parameter name {name:?}: {reason}")]
    InvalidParameterName {
        /// The rejected parameter name.
        name: String,
        /// Why the name was rejected.
        reason: &'static str,
    },

    /// Both `dateTime` and `duration` were supplied.
    #[error("schedule time must carry exactly one of dateTime or duration")]
    ConflictingTrigger,

    /// Neither `dateTime` nor `duration` was supplied.
    #[error("schedule time is missing: provide dateTime or duration")]
    MissingTrigger,

    /// The `dateTime` string could not be parsed as an ISO-8601 timestamp.
    #[error("invalid datetime format: {input:?}")]
    InvalidTimeFormat {
        /// The rejected input.
        input: String,
    },

    /// The `duration` is negative, not finite, or out of range.
    #[error("invalid duration: {seconds} seconds")]
    InvalidDuration {
        /// The rejected duration in seconds.
        seconds: f64,
    },

    /// A relative delay lands past the last representable timestamp.
    ///
    /// Raised by trigger resolution after the task id is minted, unlike
    /// [`InvalidDuration`](SchedulerError::InvalidDuration).
    #[error("delay of {seconds} seconds puts the fire time out of range")]
    FireTimeOutOfRange {
        /// The requested delay in seconds.
        seconds: f64,
    },

    /// The chosen mechanism refused to register the trigger.
    #[error("scheduling rejected by {mechanism}: {reason}")]
    SchedulingRejected {
        /// The mechanism that refused.
        mechanism: String,
        /// Mechanism-provided reason.
        reason: String,
    },

    /// A record with this task id already exists.
    #[error("duplicate task id: {task_id}")]
    DuplicateTaskId {
        /// The colliding task id.
        task_id: String,
    },

    /// No record exists for this task id.
    #[error("task not found: {task_id}")]
    UnknownTask {
        /// The task id that was looked up.
        task_id: String,
    },

    /// The requested status transition is not allowed.
    #[error("invalid transition from {from} to {to} for task {task_id}")]
    InvalidTransition {
        /// The task being transitioned.
        task_id: String,
        /// Status at the time of the request.
        from: TaskStatus,
        /// The rejected target status.
        to: TaskStatus,
    },

    /// A fired payload lacks the task identity.
    #[error("malformed trigger payload: missing {missing}")]
    MalformedTrigger {
        /// The missing payload key.
        missing: &'static str,
    },

    /// Cancellation was requested for a completed or failed task.
    #[error("cannot cancel task {task_id}: already {status}")]
    CancelOnTerminalTask {
        /// The task id.
        task_id: String,
        /// Its terminal status.
        status: TaskStatus,
    },

    /// Reading or writing the registry snapshot failed.
    #[error("persistence error at {path}: {message}")]
    Persistence {
        /// Snapshot location.
        path: PathBuf,
        /// Underlying failure.
        message: String,
    },

    /// The configuration could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SchedulerError {
    /// Returns `true` for errors that reject a request before any side effect.
    ///
    /// # Examples
    ///
    /// ```
    /// use schedule_task::SchedulerError;
    ///
    /// assert!(SchedulerError::MissingTaskName.is_request_shape());
    /// assert!(SchedulerError::ConflictingTrigger.is_request_shape());
    /// assert!(!SchedulerError::MissingTrigger.is_request_shape());
    /// ```
    pub fn is_request_shape(&self) -> bool {
        matches!(
            self,
            Self::MissingTaskName
                | Self::InvalidParameterName { .. }
                | Self::ConflictingTrigger
                | Self::InvalidDuration { .. }
        )
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = SchedulerError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = SchedulerError::UnknownTask {
            task_id: "abc".to_string(),
        };
        assert_eq!(err.to_string(), "task not found: abc");

        let err = SchedulerError::InvalidTransition {
            task_id: "t1".to_string(),
            from: TaskStatus::Completed,
            to: TaskStatus::Running,
        };
        assert_eq!(
            err.to_string(),
            "invalid transition from completed to running for task t1"
        );

        let err = SchedulerError::InvalidTimeFormat {
            input: "not-a-date".to_string(),
        };
        assert!(err.to_string().contains("invalid datetime format"));
    }

    #[test]
    fn request_shape_classification() {
        assert!(SchedulerError::InvalidParameterName {
            name: "taskId".to_string(),
            reason: "reserved",
        }
        .is_request_shape());
        assert!(SchedulerError::InvalidDuration { seconds: -1.0 }.is_request_shape());
        assert!(!SchedulerError::FireTimeOutOfRange { seconds: 1e13 }.is_request_shape());
        assert!(!SchedulerError::InvalidTimeFormat {
            input: "x".to_string()
        }
        .is_request_shape());
        assert!(!SchedulerError::SchedulingRejected {
            mechanism: "alarm".to_string(),
            reason: "quota".to_string(),
        }
        .is_request_shape());
    }
}
