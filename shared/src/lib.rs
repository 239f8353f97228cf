//! Shared types for the netproxy control and telemetry core
//!
//! Contains the value types exchanged between the controller services and
//! whatever front end consumes them (CLI, management UI bridge), plus the
//! logging setup every binary in the workspace uses.

pub mod errors;
pub mod logging;
pub mod types;

pub use errors::*;
pub use types::*;
