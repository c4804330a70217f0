//! Flat trigger payload and its parameter encoding.
//!
//! When a task leaves the registry its parameters travel inside the
//! mechanism's own string-only key/value bag, interleaved with the task
//! identity and whatever keys the platform adds.
//!
//! # Encoding contract
//!
//! - `taskId` and `taskName` carry the task identity.
//! - A parameter `name` is stored under `param_<name>`. Decoding strips the
//!   prefix once, so `param_param_x` decodes to `param_x`.
//! - Any key without the prefix (other than the identity keys) is a
//!   platform key and is ignored on decode.
//! - The encoding is reversible for every parameter name accepted at
//!   schedule time. The empty name, the reserved names `taskId`/`taskName`
//!   and names containing `=` are rejected there.
//! - Collision risk: a platform that injects its own keys starting with
//!   `param_` would surface them as parameters. No mechanism in this crate
//!   does, and [`TriggerPayload::with_extra`] refuses such keys.
//!
//! # Launch arguments
//!
//! A cold-started process receives the same payload as command-line
//! arguments: `--task-id=<id>`, `--run-task=<name>` and one
//! `--task-param=<name>=<value>` per parameter. The first `=` after the
//! name ends it, which is why names may not contain one; values may.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::{
    PARAM_NAME_SEPARATOR, PARAM_PREFIX, RUN_TASK_ARG, TASK_ID_ARG, TASK_ID_KEY, TASK_NAME_KEY, TASK_PARAM_ARG,
};
use crate::domain::request::TaskParameters;

/// String-keyed bag delivered by a mechanism when a trigger fires.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
/// use schedule_task::domain::TaskParameters;
/// use schedule_task::reentry::TriggerPayload;
///
/// let params = TaskParameters::new(HashMap::from([
///     ("path".to_string(), "/x".to_string()),
/// ]))
/// .unwrap();
/// let payload = TriggerPayload::encode("task-1", "backup", &params);
/// assert_eq!(payload.get("taskId"), Some("task-1"));
/// assert_eq!(payload.get("param_path"), Some("/x"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriggerPayload(BTreeMap<String, String>);

impl TriggerPayload {
    /// Creates an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes a task identity and its parameters.
    pub fn encode(task_id: &str, task_name: &str, parameters: &TaskParameters) -> Self {
        let mut bag = BTreeMap::new();
        bag.insert(TASK_ID_KEY.to_string(), task_id.to_string());
        bag.insert(TASK_NAME_KEY.to_string(), task_name.to_string());
        for (name, value) in parameters.iter() {
            bag.insert(encode_param_key(name), value.to_string());
        }
        Self(bag)
    }

    /// Adds a platform key that is not a parameter.
    ///
    /// Keys that would be read back as identity or parameters are ignored.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        if key == TASK_ID_KEY || key == TASK_NAME_KEY || key.starts_with(PARAM_PREFIX) {
            tracing::debug!(key = %key, "refusing platform key that shadows payload contract");
            return self;
        }
        self.0.insert(key, value.into());
        self
    }

    /// Inserts a raw entry, exactly as a platform delivering the payload would.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Looks up a raw entry.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Iterates over raw entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of raw entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when the payload has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Task id carried by the payload, if any.
    pub fn task_id(&self) -> Option<&str> {
        self.get(TASK_ID_KEY)
    }

    /// Task name carried by the payload, if any.
    pub fn task_name(&self) -> Option<&str> {
        self.get(TASK_NAME_KEY)
    }

    /// Rebuilds the parameter mapping from the prefixed keys.
    pub fn parameters(&self) -> TaskParameters {
        let map = self
            .0
            .iter()
            .filter_map(|(key, value)| decode_param_key(key).map(|name| (name.to_string(), value.clone())))
            .collect();
        TaskParameters::from_decoded(map)
    }

    /// Builds a payload from a cold-start argument list.
    ///
    /// Returns `None` when no `--run-task=` argument is present, meaning the
    /// process was not launched to run a task. Unrelated arguments are
    /// ignored.
    ///
    /// # Examples
    ///
    /// ```
    /// use schedule_task::reentry::TriggerPayload;
    ///
    /// let args = ["app", "--task-id=t1", "--run-task=backup", "--task-param=path=/x=y"];
    /// let payload = TriggerPayload::from_launch_args(args).unwrap();
    /// assert_eq!(payload.task_name(), Some("backup"));
    /// assert_eq!(payload.parameters().get("path"), Some("/x=y"));
    ///
    /// assert!(TriggerPayload::from_launch_args(["app", "--verbose"]).is_none());
    /// ```
    pub fn from_launch_args<I, S>(args: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut payload = Self::new();
        let mut launched_for_task = false;

        for arg in args {
            let arg = arg.as_ref();
            if let Some(name) = arg.strip_prefix(RUN_TASK_ARG) {
                payload.insert(TASK_NAME_KEY, name);
                launched_for_task = true;
            } else if let Some(id) = arg.strip_prefix(TASK_ID_ARG) {
                payload.insert(TASK_ID_KEY, id);
            } else if let Some(param) = arg.strip_prefix(TASK_PARAM_ARG) {
                match param.split_once(PARAM_NAME_SEPARATOR) {
                    Some((name, value)) => payload.insert(encode_param_key(name), value),
                    None => tracing::warn!(arg = %arg, "ignoring task parameter without '='"),
                }
            }
        }

        launched_for_task.then_some(payload)
    }

    /// Renders the payload as cold-start arguments (platform keys dropped).
    pub fn to_launch_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.0.len());
        if let Some(id) = self.task_id() {
            args.push(format!("{TASK_ID_ARG}{id}"));
        }
        if let Some(name) = self.task_name() {
            args.push(format!("{RUN_TASK_ARG}{name}"));
        }
        for (key, value) in &self.0 {
            if let Some(name) = decode_param_key(key) {
                args.push(format!("{TASK_PARAM_ARG}{name}={value}"));
            }
        }
        args
    }
}

impl FromIterator<(String, String)> for TriggerPayload {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Payload key for a parameter name.
pub fn encode_param_key(name: &str) -> String {
    format!("{PARAM_PREFIX}{name}")
}

/// Parameter name for a payload key, or `None` for a non-parameter key.
pub fn decode_param_key(key: &str) -> Option<&str> {
    key.strip_prefix(PARAM_PREFIX)
}
