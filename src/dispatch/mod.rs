//! Dispatch selection and the deferred-execution mechanisms.
//!
//! # Architecture
//!
//! 1. **[`Mechanism`]** -- the contract every deferred-execution primitive
//!    satisfies: register a trigger, cancel it by [`DispatchHandle`], and
//!    hand the payload to a [`FireSink`] at or after the fire time.
//! 2. **[`WorkQueueMechanism`]** -- managed deferred work: a tagged queue of
//!    pending work items, cancelled by tag.
//! 3. **[`AlarmMechanism`]** -- raw wake alarm: one exact timer per request
//!    code, cancelled by aborting the timer.
//! 4. **[`DispatchSelector`]** -- picks one of the two from the environment's
//!    [`CapabilityProfile`], once per schedule call.
//!
//! Both mechanisms accept the same [`PendingTrigger`], encode it into the
//! same [`TriggerPayload`] shape, and never fire early.

pub mod alarm;
pub mod work_queue;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub use alarm::AlarmMechanism;
pub use work_queue::WorkQueueMechanism;

use crate::clock::Clock;
use crate::constants::{MANAGED_WORK_MIN_API_LEVEL, PACKAGE_NAME_KEY};
use crate::domain::TaskParameters;
use crate::error::SchedulerError;
use crate::reentry::TriggerPayload;
use crate::trigger::delay_until;

/// Which deferred-execution primitive carries a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MechanismKind {
    /// Managed deferred-work queue with guaranteed-delivery background execution.
    ManagedWork,
    /// Exact wake alarm that fires even while the process is idle.
    WakeAlarm,
}

impl fmt::Display for MechanismKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ManagedWork => write!(f, "managed_work"),
            Self::WakeAlarm => write!(f, "wake_alarm"),
        }
    }
}

/// What the environment offers for deferred execution.
///
/// # Examples
///
/// ```
/// use schedule_task::dispatch::{select, CapabilityProfile, MechanismKind};
///
/// assert_eq!(CapabilityProfile::from_api_level(21), CapabilityProfile::AlarmOnly);
/// assert_eq!(select(CapabilityProfile::from_api_level(23)), MechanismKind::ManagedWork);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityProfile {
    /// Managed deferred work is available.
    #[default]
    ManagedWork,
    /// Only raw wake alarms are available.
    AlarmOnly,
}

impl CapabilityProfile {
    /// Derives the profile from a platform API level.
    pub fn from_api_level(level: u32) -> Self {
        if level >= MANAGED_WORK_MIN_API_LEVEL {
            Self::ManagedWork
        } else {
            Self::AlarmOnly
        }
    }
}

/// Applies the fallback ladder: managed work when available, else wake alarm.
pub fn select(profile: CapabilityProfile) -> MechanismKind {
    match profile {
        CapabilityProfile::ManagedWork => MechanismKind::ManagedWork,
        CapabilityProfile::AlarmOnly => MechanismKind::WakeAlarm,
    }
}

/// Opaque correlation key a mechanism uses to find a pending trigger.
///
/// Always equal to the task id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DispatchHandle(String);

impl DispatchHandle {
    /// Handle for a task id.
    pub fn for_task(task_id: impl Into<String>) -> Self {
        Self(task_id.into())
    }

    /// The underlying key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DispatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything a mechanism needs to realise one trigger.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingTrigger {
    /// Task id (also the dispatch handle).
    pub task_id: String,
    /// Task name.
    pub task_name: String,
    /// Earliest instant the trigger may fire.
    pub fire_time: DateTime<Utc>,
    /// Parameters to carry until fire time.
    pub parameters: TaskParameters,
}

impl PendingTrigger {
    /// The payload delivered at fire time, tagged with the platform package.
    pub fn to_payload(&self, package_name: &str) -> TriggerPayload {
        TriggerPayload::encode(&self.task_id, &self.task_name, &self.parameters)
            .with_extra(PACKAGE_NAME_KEY, package_name)
    }
}

/// Receives payloads when triggers fire.
#[async_trait]
pub trait FireSink: Send + Sync {
    /// Called once per firing, on the mechanism's timer task.
    async fn on_fire(&self, payload: TriggerPayload);
}

#[async_trait]
impl FireSink for mpsc::UnboundedSender<TriggerPayload> {
    async fn on_fire(&self, payload: TriggerPayload) {
        if self.send(payload).is_err() {
            tracing::warn!("fire sink channel closed; payload dropped");
        }
    }
}

/// A deferred-execution primitive.
#[async_trait]
pub trait Mechanism: Send + Sync {
    /// Which primitive this is.
    fn kind(&self) -> MechanismKind;

    /// Registers a trigger and returns its handle.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::SchedulingRejected`] when the mechanism refuses the
    /// registration (quota exhausted, duplicate handle).
    async fn register_trigger(&self, trigger: PendingTrigger) -> Result<DispatchHandle, SchedulerError>;

    /// Cancels a pending trigger. Cancelling an unknown or already-fired
    /// handle succeeds without effect.
    async fn cancel_trigger(&self, handle: &DispatchHandle) -> Result<(), SchedulerError>;

    /// Number of triggers still waiting to fire.
    fn pending(&self) -> usize;
}

/// Holds both mechanism variants and routes each task to exactly one.
pub struct DispatchSelector {
    capability: CapabilityProfile,
    managed: Arc<dyn Mechanism>,
    alarm: Arc<dyn Mechanism>,
}

impl fmt::Debug for DispatchSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchSelector")
            .field("capability", &self.capability)
            .field("managed_pending", &self.managed.pending())
            .field("alarm_pending", &self.alarm.pending())
            .finish()
    }
}

impl DispatchSelector {
    /// Creates a selector over the two variants.
    pub fn new(
        capability: CapabilityProfile,
        managed: Arc<dyn Mechanism>,
        alarm: Arc<dyn Mechanism>,
    ) -> Self {
        Self {
            capability,
            managed,
            alarm,
        }
    }

    /// The capability profile in effect.
    pub fn capability(&self) -> CapabilityProfile {
        self.capability
    }

    /// The variant new schedules go to.
    pub fn selected(&self) -> MechanismKind {
        select(self.capability)
    }

    /// The mechanism for a given variant.
    pub fn mechanism(&self, kind: MechanismKind) -> &Arc<dyn Mechanism> {
        match kind {
            MechanismKind::ManagedWork => &self.managed,
            MechanismKind::WakeAlarm => &self.alarm,
        }
    }

    /// Registers a trigger with `kind`.
    ///
    /// # Errors
    ///
    /// Propagates [`SchedulerError::SchedulingRejected`] from the mechanism.
    pub async fn dispatch(
        &self,
        kind: MechanismKind,
        trigger: PendingTrigger,
    ) -> Result<DispatchHandle, SchedulerError> {
        self.mechanism(kind).register_trigger(trigger).await
    }

    /// Cancels a trigger with the variant that registered it.
    ///
    /// # Errors
    ///
    /// Propagates mechanism cancel errors.
    pub async fn cancel(&self, kind: MechanismKind, handle: &DispatchHandle) -> Result<(), SchedulerError> {
        self.mechanism(kind).cancel_trigger(handle).await
    }
}

/// Sleeps until `clock` reports `fire_time` or later.
///
/// Re-checks after every wake so an early timer never fires a task early.
pub(crate) async fn sleep_until_due(clock: &dyn Clock, fire_time: DateTime<Utc>) {
    loop {
        let delay = delay_until(fire_time, clock.now());
        if delay.is_zero() {
            return;
        }
        tokio::time::sleep(delay).await;
    }
}

/// Quota check shared by both mechanisms.
pub(crate) fn check_quota(
    kind: MechanismKind,
    pending: usize,
    max_pending: Option<usize>,
) -> Result<(), SchedulerError> {
    match max_pending {
        Some(max) if pending >= max => Err(SchedulerError::SchedulingRejected {
            mechanism: kind.to_string(),
            reason: format!("pending trigger quota of {max} exhausted"),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_level_threshold() {
        assert_eq!(CapabilityProfile::from_api_level(22), CapabilityProfile::AlarmOnly);
        assert_eq!(CapabilityProfile::from_api_level(23), CapabilityProfile::ManagedWork);
        assert_eq!(CapabilityProfile::from_api_level(34), CapabilityProfile::ManagedWork);
    }

    #[test]
    fn ladder_prefers_managed_work() {
        assert_eq!(select(CapabilityProfile::ManagedWork), MechanismKind::ManagedWork);
        assert_eq!(select(CapabilityProfile::AlarmOnly), MechanismKind::WakeAlarm);
    }

    #[test]
    fn quota_rejects_at_limit() {
        assert!(check_quota(MechanismKind::WakeAlarm, 1, Some(2)).is_ok());
        assert!(check_quota(MechanismKind::WakeAlarm, 5, None).is_ok());
        let err = check_quota(MechanismKind::WakeAlarm, 2, Some(2)).unwrap_err();
        assert!(err.to_string().contains("wake_alarm"));
    }

    #[test]
    fn payload_carries_package_tag() {
        let trigger = PendingTrigger {
            task_id: "t1".to_string(),
            task_name: "n".to_string(),
            fire_time: Utc::now(),
            parameters: TaskParameters::default(),
        };
        let payload = trigger.to_payload("com.example");
        assert_eq!(payload.get(PACKAGE_NAME_KEY), Some("com.example"));
        assert_eq!(payload.task_id(), Some("t1"));
    }
}
