//! Task lifecycle status and its transition table.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::SchedulerError;

/// Lifecycle status of a scheduled task.
///
/// # State Machine
///
/// ```text
/// Scheduled -> Running, Cancelled
/// Running   -> Completed, Failed
/// Completed -> (terminal, no transitions)
/// Failed    -> (terminal, no transitions)
/// Cancelled -> (terminal, no transitions)
/// ```
///
/// # Examples
///
/// ```
/// use schedule_task::TaskStatus;
///
/// let status = TaskStatus::Scheduled;
/// assert!(!status.is_terminal());
/// assert!(status.can_transition_to(&TaskStatus::Running));
/// assert!(!status.can_transition_to(&TaskStatus::Completed));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    /// Registered with a mechanism and waiting for its fire time.
    Scheduled,
    /// Fired; the application entry point is executing.
    Running,
    /// The entry point returned successfully (terminal).
    Completed,
    /// The entry point or the dispatch failed (terminal).
    Failed,
    /// Cancelled before it fired (terminal).
    Cancelled,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scheduled => write!(f, "scheduled"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl TaskStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [TaskStatus; 5] = [
        Self::Scheduled,
        Self::Running,
        Self::Completed,
        Self::Failed,
        Self::Cancelled,
    ];

    /// Returns `true` if no further transitions are allowed.
    ///
    /// # Examples
    ///
    /// ```
    /// use schedule_task::TaskStatus;
    ///
    /// assert!(!TaskStatus::Scheduled.is_terminal());
    /// assert!(!TaskStatus::Running.is_terminal());
    /// assert!(TaskStatus::Completed.is_terminal());
    /// assert!(TaskStatus::Failed.is_terminal());
    /// assert!(TaskStatus::Cancelled.is_terminal());
    /// ```
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns `true` if moving from this status to `next` is allowed.
    ///
    /// Self-transitions are rejected.
    pub fn can_transition_to(&self, next: &Self) -> bool {
        match self {
            Self::Scheduled => matches!(next, Self::Running | Self::Cancelled),
            Self::Running => matches!(next, Self::Completed | Self::Failed),
            Self::Completed | Self::Failed | Self::Cancelled => false,
        }
    }

    /// Validates a transition, returning [`SchedulerError::InvalidTransition`]
    /// with context when it is not allowed.
    ///
    /// # Examples
    ///
    /// ```
    /// use schedule_task::TaskStatus;
    ///
    /// assert!(TaskStatus::Running
    ///     .validate_transition("task-1", &TaskStatus::Completed)
    ///     .is_ok());
    /// assert!(TaskStatus::Cancelled
    ///     .validate_transition("task-1", &TaskStatus::Running)
    ///     .is_err());
    /// ```
    pub fn validate_transition(&self, task_id: &str, next: &Self) -> Result<(), SchedulerError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(SchedulerError::InvalidTransition {
                task_id: task_id.to_string(),
                from: *self,
                to: *next,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_serde_names() {
        for status in TaskStatus::ALL {
            let json = serde_json::to_value(status).unwrap();
            assert_eq!(json, serde_json::Value::String(status.to_string()));
        }
    }

    #[test]
    fn exactly_four_valid_transitions() {
        let valid = TaskStatus::ALL
            .iter()
            .flat_map(|from| TaskStatus::ALL.iter().map(move |to| (from, to)))
            .filter(|(from, to)| from.can_transition_to(to))
            .count();
        assert_eq!(valid, 4);
    }

    #[test]
    fn invalid_transition_carries_context() {
        let err = TaskStatus::Completed
            .validate_transition("t9", &TaskStatus::Cancelled)
            .unwrap_err();
        match err {
            SchedulerError::InvalidTransition { task_id, from, to } => {
                assert_eq!(task_id, "t9");
                assert_eq!(from, TaskStatus::Completed);
                assert_eq!(to, TaskStatus::Cancelled);
            }
            other => panic!("expected InvalidTransition, got {other:?}"),
        }
    }
}
