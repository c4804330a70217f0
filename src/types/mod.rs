//! Wire types and the task status state machine.
//!
//! [`wire`] holds the camelCase request/response shapes the host transport
//! carries. [`status`] holds [`TaskStatus`] and its transition table.

pub mod status;
pub mod wire;

pub use status::*;
pub use wire::*;
