//! Validated schedule requests.
//!
//! [`ScheduleRequest`] is the checked form of the wire
//! [`ScheduleTaskRequest`]: the task name is non-empty, at most one trigger
//! variant is populated, durations are non-negative and every parameter name
//! is safe to carry through a trigger payload.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{PARAM_NAME_SEPARATOR, RESERVED_PARAMETER_NAMES};
use crate::error::SchedulerError;
use crate::types::wire::ScheduleTaskRequest;

/// The requested trigger, before resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    /// Fire at this ISO-8601 instant (unparsed).
    AbsoluteTime(String),
    /// Fire after this delay from now.
    RelativeDelay(Duration),
}

/// String parameters delivered to the entry point when a task fires.
///
/// Names are unique (it is a map) and never empty or reserved.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
/// use schedule_task::domain::TaskParameters;
///
/// let params = TaskParameters::new(HashMap::from([
///     ("path".to_string(), "/x".to_string()),
/// ]))
/// .unwrap();
/// assert_eq!(params.get("path"), Some("/x"));
///
/// let reserved = HashMap::from([("taskId".to_string(), "x".to_string())]);
/// assert!(TaskParameters::new(reserved).is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskParameters(HashMap<String, String>);

impl TaskParameters {
    /// Validates and wraps a parameter map.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvalidParameterName`] for an empty name, a name
    /// equal to a reserved payload key, or a name containing `=` (which the
    /// cold-start argument syntax cannot carry).
    pub fn new(map: HashMap<String, String>) -> Result<Self, SchedulerError> {
        for name in map.keys() {
            validate_parameter_name(name)?;
        }
        Ok(Self(map))
    }

    /// Wraps a map that was decoded from a payload, skipping validation.
    pub(crate) fn from_decoded(map: HashMap<String, String>) -> Self {
        Self(map)
    }

    /// Looks up a parameter value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Iterates over `(name, value)` pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrows the underlying map.
    pub fn as_map(&self) -> &HashMap<String, String> {
        &self.0
    }

    /// Unwraps into the underlying map.
    pub fn into_inner(self) -> HashMap<String, String> {
        self.0
    }
}

fn validate_parameter_name(name: &str) -> Result<(), SchedulerError> {
    if name.is_empty() {
        return Err(SchedulerError::InvalidParameterName {
            name: name.to_string(),
            reason: "parameter names must not be empty",
        });
    }
    if RESERVED_PARAMETER_NAMES.contains(&name) {
        return Err(SchedulerError::InvalidParameterName {
            name: name.to_string(),
            reason: "name is reserved for task identity",
        });
    }
    if name.contains(PARAM_NAME_SEPARATOR) {
        return Err(SchedulerError::InvalidParameterName {
            name: name.to_string(),
            reason: "parameter names must not contain '='",
        });
    }
    Ok(())
}

/// A request that passed shape validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleRequest {
    /// Opaque identifier of what to run.
    pub task_name: String,
    /// `None` when the request carried no schedule time at all; the
    /// resolver reports that as [`SchedulerError::MissingTrigger`].
    pub trigger: Option<Trigger>,
    /// Parameters for the entry point.
    pub parameters: TaskParameters,
}

impl ScheduleRequest {
    /// Builds a request with a relative delay.
    pub fn after(task_name: impl Into<String>, delay: Duration) -> Self {
        Self {
            task_name: task_name.into(),
            trigger: Some(Trigger::RelativeDelay(delay)),
            parameters: TaskParameters::default(),
        }
    }

    /// Builds a request with an absolute ISO-8601 time.
    pub fn at(task_name: impl Into<String>, date_time: impl Into<String>) -> Self {
        Self {
            task_name: task_name.into(),
            trigger: Some(Trigger::AbsoluteTime(date_time.into())),
            parameters: TaskParameters::default(),
        }
    }

    /// Replaces the parameters.
    pub fn with_parameters(mut self, parameters: TaskParameters) -> Self {
        self.parameters = parameters;
        self
    }
}

impl TryFrom<ScheduleTaskRequest> for ScheduleRequest {
    type Error = SchedulerError;

    fn try_from(request: ScheduleTaskRequest) -> Result<Self, Self::Error> {
        if request.task_name.trim().is_empty() {
            return Err(SchedulerError::MissingTaskName);
        }

        let trigger = match (request.schedule_time.date_time, request.schedule_time.duration) {
            (Some(_), Some(_)) => return Err(SchedulerError::ConflictingTrigger),
            (Some(date_time), None) => Some(Trigger::AbsoluteTime(date_time)),
            (None, Some(seconds)) => Some(Trigger::RelativeDelay(duration_from_secs(seconds)?)),
            (None, None) => None,
        };

        let parameters = TaskParameters::new(request.parameters.unwrap_or_default())?;

        Ok(Self {
            task_name: request.task_name,
            trigger,
            parameters,
        })
    }
}

fn duration_from_secs(seconds: f64) -> Result<Duration, SchedulerError> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(SchedulerError::InvalidDuration { seconds });
    }
    Duration::try_from_secs_f64(seconds).map_err(|_| SchedulerError::InvalidDuration { seconds })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::wire::ScheduleTime;

    fn wire(name: &str, time: ScheduleTime) -> ScheduleTaskRequest {
        ScheduleTaskRequest {
            task_name: name.to_string(),
            schedule_time: time,
            parameters: None,
        }
    }

    #[test]
    fn duration_request_converts() {
        let request = ScheduleRequest::try_from(wire(
            "backup",
            ScheduleTime {
                date_time: None,
                duration: Some(1.5),
            },
        ))
        .unwrap();
        assert_eq!(
            request.trigger,
            Some(Trigger::RelativeDelay(Duration::from_millis(1500)))
        );
    }

    #[test]
    fn empty_task_name_is_rejected() {
        let err = ScheduleRequest::try_from(wire("  ", ScheduleTime::default())).unwrap_err();
        assert!(matches!(err, SchedulerError::MissingTaskName));
    }

    #[test]
    fn both_trigger_variants_conflict() {
        let err = ScheduleRequest::try_from(wire(
            "t",
            ScheduleTime {
                date_time: Some("2030-01-01T00:00:00Z".to_string()),
                duration: Some(10.0),
            },
        ))
        .unwrap_err();
        assert!(matches!(err, SchedulerError::ConflictingTrigger));
    }

    #[test]
    fn missing_trigger_passes_shape_validation() {
        let request = ScheduleRequest::try_from(wire("t", ScheduleTime::default())).unwrap();
        assert!(request.trigger.is_none());
    }

    #[test]
    fn negative_and_nan_durations_are_rejected() {
        for seconds in [-1.0, f64::NAN, f64::INFINITY] {
            let err = ScheduleRequest::try_from(wire(
                "t",
                ScheduleTime {
                    date_time: None,
                    duration: Some(seconds),
                },
            ))
            .unwrap_err();
            assert!(matches!(err, SchedulerError::InvalidDuration { .. }));
        }
    }

    #[test]
    fn reserved_and_empty_parameter_names_are_rejected() {
        for name in ["taskId", "taskName", ""] {
            let map = HashMap::from([(name.to_string(), "v".to_string())]);
            let err = TaskParameters::new(map).unwrap_err();
            assert!(matches!(err, SchedulerError::InvalidParameterName { .. }));
        }
    }

    #[test]
    fn names_with_equals_sign_are_rejected() {
        for name in ["a=b", "=", "path="] {
            let map = HashMap::from([(name.to_string(), "c".to_string())]);
            let err = TaskParameters::new(map).unwrap_err();
            assert!(err.is_request_shape());
            assert!(err.to_string().contains('='));
        }
        let map = HashMap::from([("query".to_string(), "a=b".to_string())]);
        assert!(TaskParameters::new(map).is_ok());
    }

    #[test]
    fn prefixed_parameter_names_are_allowed() {
        let map = HashMap::from([("param_x".to_string(), "v".to_string())]);
        assert!(TaskParameters::new(map).is_ok());
    }
}
