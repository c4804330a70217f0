//! Deferred task scheduling core.
//!
//! Lets an application register a named task with string parameters to run
//! at an absolute instant or after a relative delay, then list or cancel it.
//! When the trigger fires, the task comes back through one entry point with
//! its parameters intact.
//!
//! # Overview
//!
//! A schedule request flows through four components:
//!
//! 1. the trigger resolver ([`trigger`]) turns the requested time into an
//!    absolute fire time;
//! 2. the dispatch selector ([`dispatch`]) picks the managed-work or the
//!    wake-alarm mechanism from the environment's capability profile;
//! 3. the task registry ([`registry`]) records the task and guards every
//!    status transition;
//! 4. the re-entry decoder ([`reentry`]) rebuilds the invocation from the
//!    fired payload and calls the application's [`TaskHandler`].
//!
//! [`Scheduler`] composes all four behind `schedule_task`, `cancel_task` and
//! `list_tasks`.
//!
//! # Task lifecycle
//!
//! `scheduled -> running -> completed | failed`, or `scheduled -> cancelled`.
//! Terminal records stay in the registry for the life of the process.
//!
//! # Module Organization
//!
//! - [`types`] - Wire request/response shapes and the status state machine
//! - [`domain`] - Validated requests and registry records
//! - [`error`] - [`SchedulerError`]
//! - [`config`] - [`SchedulerConfig`] loaded from TOML
//! - [`constants`] - Payload keys and launch-argument flags

pub mod clock;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod reentry;
pub mod registry;
pub mod scheduler;
pub mod trigger;
pub mod types;

// Re-exports for ergonomic access
pub use config::SchedulerConfig;
pub use dispatch::{CapabilityProfile, MechanismKind};
pub use domain::{ScheduleRequest, TaskParameters, TaskRecord, Trigger};
pub use error::{Result, SchedulerError};
pub use reentry::{FireOutcome, TaskHandler, TriggerPayload};
pub use registry::TaskRegistry;
pub use scheduler::Scheduler;
pub use types::*;
