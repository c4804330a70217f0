//! Re-entry: turning a fired payload back into a task invocation.
//!
//! A trigger comes back into the process in one of two ways: a mechanism
//! calls [`FireSink::on_fire`] on a live [`ReentryDecoder`], or the process
//! is cold-started with the payload as launch arguments
//! ([`TriggerPayload::from_launch_args`]). Both paths end in
//! [`ReentryDecoder::handle_payload`].
//!
//! Decoding itself ([`decode_payload`]) is a pure function of the payload.
//! Registry bookkeeping around the invocation is best-effort: a decoder
//! without a registry, or one that does not know the task (a fresh process),
//! still runs the entry point.
//!
//! A process killed while a task runs leaves the record `Running`; nothing
//! reconciles it on restart.

pub mod payload;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

pub use payload::*;

use crate::dispatch::FireSink;
use crate::domain::TaskParameters;
use crate::error::SchedulerError;
use crate::registry::TaskRegistry;
use crate::types::status::TaskStatus;

/// Application entry point invoked when a task fires.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use schedule_task::domain::TaskParameters;
/// use schedule_task::reentry::TaskHandler;
///
/// struct Backup;
///
/// #[async_trait]
/// impl TaskHandler for Backup {
///     async fn run_task(
///         &self,
///         _task_id: &str,
///         task_name: &str,
///         parameters: &TaskParameters,
///     ) -> anyhow::Result<()> {
///         anyhow::ensure!(task_name == "backup", "unknown task {task_name}");
///         let _path = parameters.get("path");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Runs the task. An `Err` marks the task `Failed`.
    async fn run_task(&self, task_id: &str, task_name: &str, parameters: &TaskParameters) -> anyhow::Result<()>;
}

/// A decoded invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInvocation {
    /// Task id from the payload.
    pub task_id: String,
    /// Task name from the payload.
    pub task_name: String,
    /// Parameters rebuilt from the prefixed keys.
    pub parameters: TaskParameters,
}

/// Extracts the task identity and parameters from a payload.
///
/// # Errors
///
/// [`SchedulerError::MalformedTrigger`] when `taskId` or `taskName` is
/// absent.
///
/// # Examples
///
/// ```
/// use schedule_task::reentry::{decode_payload, TriggerPayload};
///
/// let mut payload = TriggerPayload::new();
/// payload.insert("taskId", "t1");
/// payload.insert("taskName", "backup");
/// payload.insert("param_path", "/x");
/// payload.insert("packageName", "com.example");
///
/// let invocation = decode_payload(&payload).unwrap();
/// assert_eq!(invocation.task_name, "backup");
/// assert_eq!(invocation.parameters.len(), 1);
/// ```
pub fn decode_payload(payload: &TriggerPayload) -> Result<TaskInvocation, SchedulerError> {
    let task_id = payload
        .task_id()
        .ok_or(SchedulerError::MalformedTrigger { missing: "taskId" })?;
    let task_name = payload
        .task_name()
        .ok_or(SchedulerError::MalformedTrigger { missing: "taskName" })?;

    Ok(TaskInvocation {
        task_id: task_id.to_string(),
        task_name: task_name.to_string(),
        parameters: payload.parameters(),
    })
}

/// What happened to one firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    /// The entry point returned `Ok`.
    Completed,
    /// The entry point returned `Err`.
    Failed,
    /// The task was no longer `Scheduled` (usually cancelled first); the
    /// entry point was not called.
    Skipped,
    /// The payload had no task identity; nothing ran.
    Malformed,
}

impl fmt::Display for FireOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
            Self::Malformed => write!(f, "malformed"),
        }
    }
}

/// Decodes fired payloads, runs the entry point and records the outcome.
pub struct ReentryDecoder {
    handler: Arc<dyn TaskHandler>,
    registry: Option<Arc<TaskRegistry>>,
}

impl fmt::Debug for ReentryDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReentryDecoder")
            .field("tracked", &self.registry.is_some())
            .finish()
    }
}

impl ReentryDecoder {
    /// Creates a decoder that keeps `registry` up to date.
    pub fn new(handler: Arc<dyn TaskHandler>, registry: Arc<TaskRegistry>) -> Self {
        Self {
            handler,
            registry: Some(registry),
        }
    }

    /// Creates a decoder with no registry, as in a cold-started process.
    pub fn untracked(handler: Arc<dyn TaskHandler>) -> Self {
        Self {
            handler,
            registry: None,
        }
    }

    /// Handles one fired payload.
    ///
    /// Never returns an error: a malformed payload is logged and dropped,
    /// and registry inconsistencies are logged by the registry.
    pub async fn handle_payload(&self, payload: &TriggerPayload) -> FireOutcome {
        let invocation = match decode_payload(payload) {
            Ok(invocation) => invocation,
            Err(e) => {
                tracing::warn!(error = %e, keys = payload.len(), "dropping trigger payload");
                return FireOutcome::Malformed;
            }
        };
        let TaskInvocation {
            task_id,
            task_name,
            parameters,
        } = invocation;

        let tracked = match self.begin(&task_id) {
            Ok(tracked) => tracked,
            Err(e) => {
                tracing::info!(task_id = %task_id, error = %e, "task not started");
                return FireOutcome::Skipped;
            }
        };

        tracing::info!(
            task_id = %task_id,
            task_name = %task_name,
            parameters = parameters.len(),
            "running task"
        );
        let (status, outcome) = match self.handler.run_task(&task_id, &task_name, &parameters).await {
            Ok(()) => (TaskStatus::Completed, FireOutcome::Completed),
            Err(e) => {
                tracing::warn!(task_id = %task_id, error = %e, "task failed");
                (TaskStatus::Failed, FireOutcome::Failed)
            }
        };

        if let (true, Some(registry)) = (tracked, &self.registry) {
            // Rejections are already logged by the registry.
            let _ = registry.update_status(&task_id, status);
        }
        outcome
    }

    /// Marks the task `Running`.
    ///
    /// Returns `Ok(false)` when there is nothing to track (no registry, or a
    /// task this registry never saw) and `Err` when the task exists but may
    /// not start.
    fn begin(&self, task_id: &str) -> Result<bool, SchedulerError> {
        let Some(registry) = &self.registry else {
            return Ok(false);
        };
        match registry.update_status(task_id, TaskStatus::Running) {
            Ok(_) => Ok(true),
            Err(SchedulerError::UnknownTask { .. }) => {
                tracing::debug!(task_id = %task_id, "task unknown to this registry, running untracked");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl FireSink for ReentryDecoder {
    async fn on_fire(&self, payload: TriggerPayload) {
        let outcome = self.handle_payload(&payload).await;
        tracing::debug!(task_id = ?payload.task_id(), outcome = %outcome, "trigger handled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<TaskInvocation>>,
        fail: bool,
    }

    #[async_trait]
    impl TaskHandler for Recorder {
        async fn run_task(&self, task_id: &str, task_name: &str, parameters: &TaskParameters) -> anyhow::Result<()> {
            self.calls.lock().push(TaskInvocation {
                task_id: task_id.to_string(),
                task_name: task_name.to_string(),
                parameters: parameters.clone(),
            });
            if self.fail {
                anyhow::bail!("boom");
            }
            Ok(())
        }
    }

    fn payload(id: &str) -> TriggerPayload {
        let params = TaskParameters::new(HashMap::from([("path".to_string(), "/x".to_string())])).unwrap();
        TriggerPayload::encode(id, "backup", &params)
    }

    #[test]
    fn missing_identity_is_malformed() {
        let mut payload = TriggerPayload::new();
        payload.insert("taskName", "n");
        let err = decode_payload(&payload).unwrap_err();
        assert!(matches!(err, SchedulerError::MalformedTrigger { missing: "taskId" }));

        let mut payload = TriggerPayload::new();
        payload.insert("taskId", "t");
        let err = decode_payload(&payload).unwrap_err();
        assert!(matches!(err, SchedulerError::MalformedTrigger { missing: "taskName" }));
    }

    #[tokio::test]
    async fn success_marks_completed() {
        let handler = Arc::new(Recorder::default());
        let registry = Arc::new(TaskRegistry::new());
        registry.create("t1", "backup", Utc::now()).unwrap();
        let decoder = ReentryDecoder::new(handler.clone(), registry.clone());

        assert_eq!(decoder.handle_payload(&payload("t1")).await, FireOutcome::Completed);
        assert_eq!(registry.get("t1").unwrap().status, TaskStatus::Completed);
        assert_eq!(handler.calls.lock()[0].parameters.get("path"), Some("/x"));
    }

    #[tokio::test]
    async fn handler_error_marks_failed() {
        let handler = Arc::new(Recorder {
            fail: true,
            ..Recorder::default()
        });
        let registry = Arc::new(TaskRegistry::new());
        registry.create("t1", "backup", Utc::now()).unwrap();
        let decoder = ReentryDecoder::new(handler, registry.clone());

        assert_eq!(decoder.handle_payload(&payload("t1")).await, FireOutcome::Failed);
        assert_eq!(registry.get("t1").unwrap().status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn cancelled_task_is_skipped() {
        let handler = Arc::new(Recorder::default());
        let registry = Arc::new(TaskRegistry::new());
        registry.create("t1", "backup", Utc::now()).unwrap();
        registry.update_status("t1", TaskStatus::Cancelled).unwrap();
        let decoder = ReentryDecoder::new(handler.clone(), registry.clone());

        assert_eq!(decoder.handle_payload(&payload("t1")).await, FireOutcome::Skipped);
        assert!(handler.calls.lock().is_empty());
        assert_eq!(registry.get("t1").unwrap().status, TaskStatus::Cancelled);
    }

    #[tokio::test]
    async fn unknown_task_still_runs() {
        let handler = Arc::new(Recorder::default());
        let registry = Arc::new(TaskRegistry::new());
        let decoder = ReentryDecoder::new(handler.clone(), registry.clone());

        assert_eq!(decoder.handle_payload(&payload("cold")).await, FireOutcome::Completed);
        assert_eq!(handler.calls.lock().len(), 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn untracked_decoder_runs_handler() {
        let handler = Arc::new(Recorder::default());
        let decoder = ReentryDecoder::untracked(handler.clone());
        decoder.on_fire(payload("t9")).await;
        assert_eq!(handler.calls.lock()[0].task_id, "t9");
    }
}
