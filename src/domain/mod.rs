//! Domain types for validated requests and registry records.
//!
//! These types separate internal concerns from the wire shapes in
//! [`types`](crate::types). [`ScheduleRequest`] is a request that passed
//! shape validation; [`TaskRecord`] is what the registry stores.

pub mod record;
pub mod request;

pub use record::*;
pub use request::*;
