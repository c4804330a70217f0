//! Time sources for trigger resolution and mechanism timers.

use std::fmt::Debug;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Source of "now" shared by the facade and the mechanisms.
///
/// Mechanisms never fire before a task's fire time *as measured by this
/// clock*, so the facade and the mechanisms must share one instance.
pub trait Clock: Send + Sync + Debug {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall time anchored once, then advanced by tokio's monotonic clock.
///
/// Immune to wall-clock jumps after construction, and follows tokio's
/// paused test clock, so timers and fire times always agree.
///
/// # Examples
///
/// ```
/// use schedule_task::clock::{Clock, MonotonicClock};
///
/// let clock = MonotonicClock::new();
/// let a = clock.now();
/// let b = clock.now();
/// assert!(b >= a);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    anchor_wall: DateTime<Utc>,
    anchor_instant: Instant,
}

impl MonotonicClock {
    /// Anchors to the current wall time.
    pub fn new() -> Self {
        Self::anchored_at(Utc::now())
    }

    /// Anchors to an arbitrary wall time; useful for deterministic tests.
    pub fn anchored_at(anchor_wall: DateTime<Utc>) -> Self {
        Self {
            anchor_wall,
            anchor_instant: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = Instant::now().saturating_duration_since(self.anchor_instant);
        chrono::Duration::from_std(elapsed)
            .ok()
            .and_then(|delta| self.anchor_wall.checked_add_signed(delta))
            .unwrap_or(self.anchor_wall)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn monotonic_clock_follows_tokio_time() {
        let anchor = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let clock = MonotonicClock::anchored_at(anchor);
        tokio::time::advance(Duration::from_secs(90)).await;
        assert_eq!(clock.now(), anchor + chrono::Duration::seconds(90));
    }
}
