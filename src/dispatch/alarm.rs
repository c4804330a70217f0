//! Raw wake-alarm mechanism.
//!
//! One exact timer per request code (the task id). The timer task is held
//! back until its abort handle is filed, then sleeps until the fire time,
//! removes its own entry and delivers the payload. Cancelling aborts the
//! timer if it has not fired yet. Arming runs under one admission lock so
//! the quota and duplicate checks hold across concurrent registrations.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

use super::{check_quota, sleep_until_due, DispatchHandle, FireSink, Mechanism, MechanismKind, PendingTrigger};
use crate::clock::Clock;
use crate::error::SchedulerError;

/// Exact one-shot alarms keyed by request code.
pub struct AlarmMechanism {
    alarms: Arc<DashMap<String, AbortHandle>>,
    admission: Mutex<()>,
    sink: Arc<dyn FireSink>,
    clock: Arc<dyn Clock>,
    package_name: String,
    max_pending: Option<usize>,
}

impl AlarmMechanism {
    /// Creates an alarm service delivering to `sink`.
    pub fn new(sink: Arc<dyn FireSink>, clock: Arc<dyn Clock>) -> Self {
        Self {
            alarms: Arc::new(DashMap::new()),
            admission: Mutex::new(()),
            sink,
            clock,
            package_name: String::new(),
            max_pending: None,
        }
    }

    /// Sets the platform package tag added to every payload.
    pub fn with_package_name(mut self, package_name: impl Into<String>) -> Self {
        self.package_name = package_name.into();
        self
    }

    /// Caps the number of armed alarms.
    pub fn with_max_pending(mut self, max_pending: Option<usize>) -> Self {
        self.max_pending = max_pending;
        self
    }
}

#[async_trait]
impl Mechanism for AlarmMechanism {
    fn kind(&self) -> MechanismKind {
        MechanismKind::WakeAlarm
    }

    async fn register_trigger(&self, trigger: PendingTrigger) -> Result<DispatchHandle, SchedulerError> {
        let code = trigger.task_id.clone();
        let payload = trigger.to_payload(&self.package_name);
        let fire_time = trigger.fire_time;
        let (armed_tx, armed_rx) = oneshot::channel::<()>();

        {
            let _admission = self.admission.lock();
            // `len` must run before `entry`: it read-locks every shard.
            check_quota(self.kind(), self.alarms.len(), self.max_pending)?;
            let slot = match self.alarms.entry(code.clone()) {
                Entry::Occupied(_) => {
                    return Err(SchedulerError::SchedulingRejected {
                        mechanism: self.kind().to_string(),
                        reason: format!("alarm {code} is already armed"),
                    });
                }
                Entry::Vacant(slot) => slot,
            };

            let alarms = Arc::clone(&self.alarms);
            let sink = Arc::clone(&self.sink);
            let clock = Arc::clone(&self.clock);
            let timer_code = code.clone();
            let timer = tokio::spawn(async move {
                if armed_rx.await.is_err() {
                    return;
                }
                sleep_until_due(clock.as_ref(), fire_time).await;
                if alarms.remove(&timer_code).is_some() {
                    tracing::debug!(task_id = %timer_code, "alarm fired");
                    sink.on_fire(payload).await;
                }
            });
            slot.insert(timer.abort_handle());
        }
        // Receiver only drops if the timer was aborted first.
        let _ = armed_tx.send(());

        tracing::debug!(task_id = %code, fire_time = %fire_time, "exact alarm armed");
        Ok(DispatchHandle::for_task(code))
    }

    async fn cancel_trigger(&self, handle: &DispatchHandle) -> Result<(), SchedulerError> {
        match self.alarms.remove(handle.as_str()) {
            Some((_, timer)) => {
                timer.abort();
                tracing::debug!(task_id = %handle, "alarm cancelled");
            }
            None => tracing::debug!(task_id = %handle, "no armed alarm for request code"),
        }
        Ok(())
    }

    fn pending(&self) -> usize {
        self.alarms.len()
    }
}
