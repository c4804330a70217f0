//! Scheduling facade: the only surface application code talks to.
//!
//! [`Scheduler`] composes the trigger resolver, the dispatch selector, the
//! task registry and the re-entry decoder behind `schedule_task`,
//! `cancel_task` and `list_tasks`.
//!
//! # Failure reporting
//!
//! Request-shape errors (empty task name, both trigger variants, invalid
//! duration, reserved parameter names) are returned as `Err` before a task id
//! is minted. Everything after minting is folded into a response with
//! `success: false` that still carries the task id.

use std::sync::Arc;

use uuid::Uuid;

use crate::clock::{Clock, MonotonicClock};
use crate::config::SchedulerConfig;
use crate::dispatch::{
    AlarmMechanism, DispatchHandle, DispatchSelector, FireSink, PendingTrigger, WorkQueueMechanism,
};
use crate::domain::{ScheduleRequest, TaskRecord};
use crate::error::SchedulerError;
use crate::reentry::{FireOutcome, ReentryDecoder, TaskHandler, TriggerPayload};
use crate::registry::{JsonSnapshotStore, TaskRegistry};
use crate::trigger;
use crate::types::status::TaskStatus;
use crate::types::wire::{
    CancelTaskRequest, CancelTaskResponse, ListTasksResponse, PingRequest, PingResponse, ScheduleTaskRequest,
    ScheduleTaskResponse,
};

const SCHEDULED_MESSAGE: &str = "Task scheduled successfully";
const CANCELLED_MESSAGE: &str = "Task cancelled successfully";
const ALREADY_CANCELLED_MESSAGE: &str = "Task already cancelled";

/// Deferred task scheduler.
///
/// Safe to share behind an `Arc` and call from any number of tasks; fires
/// arrive on the mechanisms' timer tasks concurrently with caller requests.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
/// use std::sync::Arc;
/// use async_trait::async_trait;
/// use schedule_task::domain::TaskParameters;
/// use schedule_task::reentry::TaskHandler;
/// use schedule_task::{ScheduleTaskRequest, ScheduleTime, Scheduler, SchedulerConfig};
///
/// struct Noop;
///
/// #[async_trait]
/// impl TaskHandler for Noop {
///     async fn run_task(&self, _: &str, _: &str, _: &TaskParameters) -> anyhow::Result<()> {
///         Ok(())
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let scheduler = Scheduler::new(&SchedulerConfig::default(), Arc::new(Noop));
/// let response = scheduler
///     .schedule_task(ScheduleTaskRequest {
///         task_name: "backup".to_string(),
///         schedule_time: ScheduleTime {
///             date_time: None,
///             duration: Some(3600.0),
///         },
///         parameters: Some(HashMap::from([("path".to_string(), "/x".to_string())])),
///     })
///     .await
///     .unwrap();
///
/// assert!(response.success);
/// assert_eq!(scheduler.list_tasks().tasks.len(), 1);
/// # }
/// ```
#[derive(Debug)]
pub struct Scheduler {
    clock: Arc<dyn Clock>,
    registry: Arc<TaskRegistry>,
    decoder: Arc<ReentryDecoder>,
    selector: DispatchSelector,
}

impl Scheduler {
    /// Builds a scheduler with both built-in mechanisms and a monotonic clock.
    pub fn new(config: &SchedulerConfig, handler: Arc<dyn TaskHandler>) -> Self {
        Self::with_clock(config, handler, Arc::new(MonotonicClock::new()))
    }

    /// Builds a scheduler on a caller-supplied clock.
    ///
    /// The clock is shared with both mechanisms, so fire times and timers
    /// always agree.
    pub fn with_clock(config: &SchedulerConfig, handler: Arc<dyn TaskHandler>, clock: Arc<dyn Clock>) -> Self {
        let registry = Arc::new(match &config.state_path {
            Some(path) => TaskRegistry::with_snapshot(JsonSnapshotStore::new(path)),
            None => TaskRegistry::new(),
        });
        let decoder = Arc::new(ReentryDecoder::new(handler, Arc::clone(&registry)));
        let sink: Arc<dyn FireSink> = decoder.clone();

        let managed = WorkQueueMechanism::new(Arc::clone(&sink), Arc::clone(&clock))
            .with_package_name(config.package_name.as_str())
            .with_max_pending(config.max_pending_triggers);
        let alarm = AlarmMechanism::new(sink, Arc::clone(&clock))
            .with_package_name(config.package_name.as_str())
            .with_max_pending(config.max_pending_triggers);
        let selector = DispatchSelector::new(config.capability_profile(), Arc::new(managed), Arc::new(alarm));

        tracing::debug!(
            capability = ?selector.capability(),
            mechanism = %selector.selected(),
            persistent = config.state_path.is_some(),
            "scheduler ready"
        );
        Self::from_parts(clock, registry, decoder, selector)
    }

    /// Assembles a scheduler from pre-built components.
    ///
    /// The selector's mechanisms should deliver to `decoder`.
    pub fn from_parts(
        clock: Arc<dyn Clock>,
        registry: Arc<TaskRegistry>,
        decoder: Arc<ReentryDecoder>,
        selector: DispatchSelector,
    ) -> Self {
        Self {
            clock,
            registry,
            decoder,
            selector,
        }
    }

    /// Schedules a task from its wire request.
    ///
    /// # Errors
    ///
    /// Only request-shape errors; see [`SchedulerError::is_request_shape`].
    /// All later failures come back as `Ok` with `success: false`.
    pub async fn schedule_task(&self, request: ScheduleTaskRequest) -> Result<ScheduleTaskResponse, SchedulerError> {
        let request = ScheduleRequest::try_from(request).map_err(|e| {
            tracing::debug!(error = %e, "schedule request rejected");
            e
        })?;
        Ok(self.schedule(request).await)
    }

    /// Schedules an already-validated request.
    pub async fn schedule(&self, request: ScheduleRequest) -> ScheduleTaskResponse {
        let task_id = Uuid::new_v4().to_string();
        let task_name = request.task_name.clone();

        match self.register(&task_id, request).await {
            Ok(()) => ScheduleTaskResponse {
                task_id,
                success: true,
                message: Some(SCHEDULED_MESSAGE.to_string()),
            },
            Err(e) => {
                tracing::warn!(task_id = %task_id, task_name = %task_name, error = %e, "schedule failed");
                ScheduleTaskResponse {
                    task_id,
                    success: false,
                    message: Some(e.to_string()),
                }
            }
        }
    }

    async fn register(&self, task_id: &str, request: ScheduleRequest) -> Result<(), SchedulerError> {
        let resolved = trigger::resolve(request.trigger.as_ref(), self.clock.now())?;
        let kind = self.selector.selected();

        // The record exists before the trigger so an immediate fire finds it.
        self.registry.insert(
            TaskRecord::new(task_id, request.task_name.as_str(), resolved.fire_time)
                .with_mechanism(kind)
                .with_parameters(request.parameters.clone()),
        )?;

        let pending = PendingTrigger {
            task_id: task_id.to_string(),
            task_name: request.task_name,
            fire_time: resolved.fire_time,
            parameters: request.parameters,
        };
        if let Err(e) = self.selector.dispatch(kind, pending).await {
            // Rejections are logged by the registry.
            let _ = self.registry.mark_dispatch_failed(task_id);
            return Err(e);
        }
        self.registry.take_parameters(task_id);

        tracing::info!(
            task_id = %task_id,
            mechanism = %kind,
            fire_time = %resolved.fire_time,
            delay_ms = resolved.delay.as_millis() as u64,
            "task scheduled"
        );
        Ok(())
    }

    /// Cancels a task.
    ///
    /// Succeeds for a `Scheduled` task and, idempotently, for one already
    /// `Cancelled`. Fails for unknown, running, completed and failed tasks.
    pub async fn cancel_task(&self, task_id: &str) -> CancelTaskResponse {
        let record = match self.registry.get(task_id) {
            Ok(record) => record,
            Err(e) => return cancel_failed(&e),
        };

        let mut status = record.status;
        if status == TaskStatus::Scheduled {
            match self.registry.update_status(task_id, TaskStatus::Cancelled) {
                Ok(record) => {
                    self.cancel_trigger(&record).await;
                    tracing::info!(task_id = %task_id, "task cancelled");
                    return CancelTaskResponse {
                        success: true,
                        message: Some(CANCELLED_MESSAGE.to_string()),
                    };
                }
                // Lost a race; answer for whatever won.
                Err(SchedulerError::InvalidTransition { from, .. }) => status = from,
                Err(e) => return cancel_failed(&e),
            }
        }
        settled_cancel_response(task_id, status)
    }

    /// Cancels the task named by a wire request.
    pub async fn cancel(&self, request: CancelTaskRequest) -> CancelTaskResponse {
        self.cancel_task(&request.task_id).await
    }

    async fn cancel_trigger(&self, record: &TaskRecord) {
        let Some(kind) = record.mechanism else {
            return;
        };
        let handle = DispatchHandle::for_task(record.task_id.as_str());
        if let Err(e) = self.selector.cancel(kind, &handle).await {
            tracing::warn!(task_id = %record.task_id, mechanism = %kind, error = %e, "mechanism cancel failed");
        }
    }

    /// Every task ever scheduled, in schedule order.
    pub fn list_tasks(&self) -> ListTasksResponse {
        ListTasksResponse {
            tasks: self.registry.list().iter().map(TaskRecord::to_task_info).collect(),
        }
    }

    /// Echoes the request value.
    pub fn ping(&self, request: PingRequest) -> PingResponse {
        PingResponse { value: request.value }
    }

    /// Runs a payload delivered outside the mechanisms, e.g. on a cold start.
    pub async fn handle_payload(&self, payload: &TriggerPayload) -> FireOutcome {
        self.decoder.handle_payload(payload).await
    }

    /// The underlying registry.
    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// The dispatch selector.
    pub fn selector(&self) -> &DispatchSelector {
        &self.selector
    }

    /// The clock fire times are measured on.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

fn cancel_failed(error: &SchedulerError) -> CancelTaskResponse {
    CancelTaskResponse {
        success: false,
        message: Some(error.to_string()),
    }
}

fn settled_cancel_response(task_id: &str, status: TaskStatus) -> CancelTaskResponse {
    match status {
        TaskStatus::Cancelled => CancelTaskResponse {
            success: true,
            message: Some(ALREADY_CANCELLED_MESSAGE.to_string()),
        },
        TaskStatus::Completed | TaskStatus::Failed => cancel_failed(&SchedulerError::CancelOnTerminalTask {
            task_id: task_id.to_string(),
            status,
        }),
        TaskStatus::Running | TaskStatus::Scheduled => CancelTaskResponse {
            success: false,
            message: Some(format!("task {task_id} is {status} and can no longer be cancelled")),
        },
    }
}
