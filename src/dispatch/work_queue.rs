//! Managed deferred-work mechanism.
//!
//! Each registration enqueues a work item tagged with the task id and
//! spawns a worker that waits for the fire time. Cancelling by tag trips
//! the item's [`CancellationToken`]. A worker claims its item (removes it
//! from the queue) before delivering the payload, so a cancel that arrives
//! after the claim finds nothing and the delivery proceeds.
//!
//! Admission (quota plus duplicate check plus insert) runs under one lock.
//! Removals skip it: they only shrink the queue, so a quota check made
//! under the lock never admits past the cap.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::{check_quota, sleep_until_due, DispatchHandle, FireSink, Mechanism, MechanismKind, PendingTrigger};
use crate::clock::Clock;
use crate::error::SchedulerError;

/// Tag-indexed queue of pending work items.
pub struct WorkQueueMechanism {
    queue: Arc<DashMap<String, CancellationToken>>,
    admission: Mutex<()>,
    sink: Arc<dyn FireSink>,
    clock: Arc<dyn Clock>,
    package_name: String,
    max_pending: Option<usize>,
}

impl WorkQueueMechanism {
    /// Creates an empty queue delivering to `sink`.
    pub fn new(sink: Arc<dyn FireSink>, clock: Arc<dyn Clock>) -> Self {
        Self {
            queue: Arc::new(DashMap::new()),
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

    /// Caps the number of pending work items.
    pub fn with_max_pending(mut self, max_pending: Option<usize>) -> Self {
        self.max_pending = max_pending;
        self
    }

    /// Returns `true` if a work item with this tag is still queued.
    pub fn is_pending(&self, handle: &DispatchHandle) -> bool {
        self.queue.contains_key(handle.as_str())
    }
}

#[async_trait]
impl Mechanism for WorkQueueMechanism {
    fn kind(&self) -> MechanismKind {
        MechanismKind::ManagedWork
    }

    async fn register_trigger(&self, trigger: PendingTrigger) -> Result<DispatchHandle, SchedulerError> {
        let tag = trigger.task_id.clone();
        let token = CancellationToken::new();
        {
            let _admission = self.admission.lock();
            // `len` must run before `entry`: it read-locks every shard.
            check_quota(self.kind(), self.queue.len(), self.max_pending)?;
            match self.queue.entry(tag.clone()) {
                Entry::Occupied(_) => {
                    return Err(SchedulerError::SchedulingRejected {
                        mechanism: self.kind().to_string(),
                        reason: format!("work tagged {tag} is already enqueued"),
                    });
                }
                Entry::Vacant(slot) => {
                    slot.insert(token.clone());
                }
            }
        }

        let payload = trigger.to_payload(&self.package_name);
        let fire_time = trigger.fire_time;
        let queue = Arc::clone(&self.queue);
        let sink = Arc::clone(&self.sink);
        let clock = Arc::clone(&self.clock);
        let worker_tag = tag.clone();

        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {
                    tracing::debug!(task_id = %worker_tag, "work item cancelled");
                }
                () = sleep_until_due(clock.as_ref(), fire_time) => {
                    if queue.remove(&worker_tag).is_some() {
                        tracing::debug!(task_id = %worker_tag, "work item due, delivering payload");
                        sink.on_fire(payload).await;
                    }
                }
            }
        });

        tracing::debug!(task_id = %tag, fire_time = %fire_time, "work item enqueued");
        Ok(DispatchHandle::for_task(tag))
    }

    async fn cancel_trigger(&self, handle: &DispatchHandle) -> Result<(), SchedulerError> {
        match self.queue.remove(handle.as_str()) {
            Some((_, token)) => {
                token.cancel();
                tracing::debug!(task_id = %handle, "cancelled work by tag");
            }
            None => tracing::debug!(task_id = %handle, "no queued work for tag"),
        }
        Ok(())
    }

    fn pending(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MonotonicClock;
    use crate::domain::TaskParameters;
    use crate::reentry::TriggerPayload;
    use chrono::Duration;
    use tokio::sync::mpsc;

    fn mechanism() -> (WorkQueueMechanism, Arc<MonotonicClock>, mpsc::UnboundedReceiver<TriggerPayload>) {
        let (tx, rx) = mpsc::unbounded_channel::<TriggerPayload>();
        let clock = Arc::new(MonotonicClock::new());
        let mechanism = WorkQueueMechanism::new(Arc::new(tx), clock.clone()).with_package_name("com.example");
        (mechanism, clock, rx)
    }

    fn trigger(clock: &MonotonicClock, id: &str, secs: i64) -> PendingTrigger {
        PendingTrigger {
            task_id: id.to_string(),
            task_name: "job".to_string(),
            fire_time: clock.now() + Duration::seconds(secs),
            parameters: TaskParameters::default(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_at_fire_time() {
        let (mechanism, clock, mut rx) = mechanism();
        let fire_time = clock.now() + Duration::seconds(30);
        mechanism.register_trigger(trigger(&clock, "t1", 30)).await.unwrap();
        assert_eq!(mechanism.pending(), 1);

        let payload = rx.recv().await.unwrap();
        assert!(clock.now() >= fire_time);
        assert_eq!(payload.task_id(), Some("t1"));
        assert_eq!(payload.get("packageName"), Some("com.example"));
        assert_eq!(mechanism.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_by_tag_prevents_delivery() {
        let (mechanism, clock, mut rx) = mechanism();
        let handle = mechanism.register_trigger(trigger(&clock, "t1", 30)).await.unwrap();
        mechanism.cancel_trigger(&handle).await.unwrap();
        assert!(!mechanism.is_pending(&handle));

        tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_tag_is_rejected() {
        let (mechanism, clock, _rx) = mechanism();
        mechanism.register_trigger(trigger(&clock, "t1", 30)).await.unwrap();
        let err = mechanism.register_trigger(trigger(&clock, "t1", 30)).await.unwrap_err();
        assert!(matches!(err, SchedulerError::SchedulingRejected { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn quota_is_enforced() {
        let (mechanism, clock, _rx) = mechanism();
        let mechanism = mechanism.with_max_pending(Some(1));
        mechanism.register_trigger(trigger(&clock, "t1", 30)).await.unwrap();
        let err = mechanism.register_trigger(trigger(&clock, "t2", 30)).await.unwrap_err();
        assert!(matches!(err, SchedulerError::SchedulingRejected { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_registrations_respect_quota() {
        let (mechanism, clock, _rx) = mechanism();
        let mechanism = Arc::new(mechanism.with_max_pending(Some(3)));

        let mut workers = Vec::new();
        for i in 0..32 {
            let mechanism = Arc::clone(&mechanism);
            let trigger = trigger(&clock, &format!("t{i}"), 3600);
            workers.push(tokio::spawn(async move { mechanism.register_trigger(trigger).await }));
        }
        let mut admitted = 0;
        for worker in workers {
            if worker.await.unwrap().is_ok() {
                admitted += 1;
            }
        }

        assert_eq!(admitted, 3);
        assert_eq!(mechanism.pending(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_duplicate_tags_admit_one() {
        let (mechanism, clock, _rx) = mechanism();
        let mechanism = Arc::new(mechanism);

        let mut workers = Vec::new();
        for _ in 0..16 {
            let mechanism = Arc::clone(&mechanism);
            let trigger = trigger(&clock, "t1", 3600);
            workers.push(tokio::spawn(async move { mechanism.register_trigger(trigger).await }));
        }
        let mut admitted = 0;
        for worker in workers {
            if worker.await.unwrap().is_ok() {
                admitted += 1;
            }
        }

        assert_eq!(admitted, 1);
    }
}
