//! Payload keys, launch-argument flags and capability thresholds.
//!
//! These names form the contract between the scheduling core and the
//! mechanisms that carry a trigger until it fires. Changing any of them
//! breaks re-entry for triggers registered by an older build.

/// Payload key holding the task identifier.
pub const TASK_ID_KEY: &str = "taskId";

/// Payload key holding the task name.
pub const TASK_NAME_KEY: &str = "taskName";

/// Payload key carrying the platform package tag.
///
/// Mechanisms add it to every payload; the decoder ignores it.
pub const PACKAGE_NAME_KEY: &str = "packageName";

/// Prefix under which every task parameter travels in a trigger payload.
///
/// A parameter `path` is carried as `param_path`. Only the first occurrence
/// of the prefix is stripped on decode, so a parameter that itself starts
/// with `param_` survives the round trip.
pub const PARAM_PREFIX: &str = "param_";

/// Parameter names that may never be scheduled.
///
/// They are rejected at schedule time so a parameter can never be mistaken
/// for a control field when a payload is rebuilt from launch arguments.
pub const RESERVED_PARAMETER_NAMES: [&str; 2] = [TASK_ID_KEY, TASK_NAME_KEY];

/// Launch argument naming the task to run on a cold start.
pub const RUN_TASK_ARG: &str = "--run-task=";

/// Launch argument carrying the task identifier on a cold start.
pub const TASK_ID_ARG: &str = "--task-id=";

/// Launch argument carrying one `key=value` parameter on a cold start.
pub const TASK_PARAM_ARG: &str = "--task-param=";

/// Separates name from value inside a `--task-param=` argument, so it is
/// not allowed in parameter names.
pub const PARAM_NAME_SEPARATOR: char = '=';

/// Lowest platform API level that offers managed deferred work.
pub const MANAGED_WORK_MIN_API_LEVEL: u32 = 23;

/// Environment variable the host binary reads its config path from.
pub const CONFIG_PATH_ENV: &str = "SCHEDULE_TASK_CONFIG";
