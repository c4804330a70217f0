//! Trigger resolution: schedule request to absolute fire time.
//!
//! Resolution is a pure function of the requested [`Trigger`] and the
//! current instant. Fire times in the past are accepted; their effective
//! dispatch delay is clamped to zero so they fire as soon as possible.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::domain::request::Trigger;
use crate::error::SchedulerError;

/// A trigger resolved against a particular "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTrigger {
    /// Absolute instant the task becomes due.
    pub fire_time: DateTime<Utc>,
    /// Delay from "now" to `fire_time`, zero when `fire_time` is not in the future.
    pub delay: Duration,
}

/// Resolves a trigger to a fire time relative to `now`.
///
/// # Errors
///
/// - [`SchedulerError::MissingTrigger`] when `trigger` is `None`.
/// - [`SchedulerError::InvalidTimeFormat`] when an absolute time does not parse.
/// - [`SchedulerError::FireTimeOutOfRange`] when `now + delay` overflows.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use chrono::Utc;
/// use schedule_task::domain::Trigger;
/// use schedule_task::trigger::resolve;
///
/// let now = Utc::now();
/// let resolved = resolve(Some(&Trigger::RelativeDelay(Duration::from_secs(60))), now).unwrap();
/// assert_eq!(resolved.fire_time, now + chrono::Duration::seconds(60));
/// assert_eq!(resolved.delay, Duration::from_secs(60));
/// ```
pub fn resolve(trigger: Option<&Trigger>, now: DateTime<Utc>) -> Result<ResolvedTrigger, SchedulerError> {
    let fire_time = match trigger {
        None => return Err(SchedulerError::MissingTrigger),
        Some(Trigger::AbsoluteTime(input)) => parse_date_time(input)?,
        Some(Trigger::RelativeDelay(delay)) => {
            let invalid = || SchedulerError::FireTimeOutOfRange {
                seconds: delay.as_secs_f64(),
            };
            let delta = chrono::Duration::from_std(*delay).map_err(|_| invalid())?;
            now.checked_add_signed(delta).ok_or_else(invalid)?
        }
    };

    Ok(ResolvedTrigger {
        fire_time,
        delay: delay_until(fire_time, now),
    })
}

/// Parses an ISO-8601 timestamp.
///
/// Accepts RFC 3339 with an explicit offset, or a naive
/// `YYYY-MM-DDTHH:MM:SS[.fff]` which is taken as UTC.
///
/// # Examples
///
/// ```
/// use schedule_task::trigger::parse_date_time;
///
/// let with_offset = parse_date_time("2030-01-01T02:00:00+02:00").unwrap();
/// let naive = parse_date_time("2030-01-01T00:00:00").unwrap();
/// assert_eq!(with_offset, naive);
/// assert!(parse_date_time("not-a-date").is_err());
/// ```
pub fn parse_date_time(input: &str) -> Result<DateTime<Utc>, SchedulerError> {
    let trimmed = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }
    trimmed
        .parse::<NaiveDateTime>()
        .map(|naive| naive.and_utc())
        .map_err(|_| SchedulerError::InvalidTimeFormat {
            input: input.to_string(),
        })
}

/// Delay from `now` until `fire_time`, clamped to zero.
pub fn delay_until(fire_time: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (fire_time - now).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 6, 1, 12, 0, 0).unwrap()
    }

    fn absolute(input: &str) -> Trigger {
        Trigger::AbsoluteTime(input.to_string())
    }

    fn relative(millis: u64) -> Trigger {
        Trigger::RelativeDelay(Duration::from_millis(millis))
    }

    #[rstest]
    #[case::absolute_future(absolute("2030-06-01T13:00:00Z"), Utc.with_ymd_and_hms(2030, 6, 1, 13, 0, 0).unwrap(), Duration::from_secs(3600))]
    #[case::absolute_with_offset(absolute("2030-06-01T14:00:00+02:00"), fixed_now(), Duration::ZERO)]
    #[case::absolute_naive_is_utc(absolute("2030-06-01T12:00:30"), fixed_now() + chrono::Duration::seconds(30), Duration::from_secs(30))]
    #[case::absolute_fractional(absolute("2030-06-01T12:00:00.250Z"), fixed_now() + chrono::Duration::milliseconds(250), Duration::from_millis(250))]
    #[case::absolute_past(absolute("2000-01-01T00:00:00Z"), Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap(), Duration::ZERO)]
    #[case::relative_zero(relative(0), fixed_now(), Duration::ZERO)]
    #[case::relative_fractional(relative(1500), fixed_now() + chrono::Duration::milliseconds(1500), Duration::from_millis(1500))]
    #[case::relative_hour(relative(3_600_000), fixed_now() + chrono::Duration::hours(1), Duration::from_secs(3600))]
    fn resolves(#[case] trigger: Trigger, #[case] fire_time: DateTime<Utc>, #[case] delay: Duration) {
        let resolved = resolve(Some(&trigger), fixed_now()).unwrap();
        assert_eq!(resolved.fire_time, fire_time);
        assert_eq!(resolved.delay, delay);
    }

    #[rstest]
    #[case::not_a_date("not-a-date")]
    #[case::empty("")]
    #[case::date_only_garbage("2030-13-45T99:00:00Z")]
    #[case::epoch_number("1700000000")]
    fn rejects_unparseable_times(#[case] input: &str) {
        let err = resolve(Some(&absolute(input)), fixed_now()).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidTimeFormat { .. }));
    }

    #[test]
    fn missing_trigger() {
        let err = resolve(None, fixed_now()).unwrap_err();
        assert!(matches!(err, SchedulerError::MissingTrigger));
    }

    #[rstest]
    #[case::past_chrono_range(Duration::from_secs(10_000_000_000_000))]
    #[case::past_std_conversion(Duration::from_secs(u64::MAX / 2))]
    fn overflowing_delay_is_out_of_range(#[case] delay: Duration) {
        let err = resolve(Some(&Trigger::RelativeDelay(delay)), fixed_now()).unwrap_err();
        assert!(matches!(err, SchedulerError::FireTimeOutOfRange { .. }));
        assert!(!err.is_request_shape());
    }
}
