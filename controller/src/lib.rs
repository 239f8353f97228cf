//! Control and telemetry core for the netproxy module
//!
//! Drives and observes a proxy engine that runs outside this process and is
//! reachable only through a privileged command channel: lifecycle control by
//! dispatch plus polling, background subscription work tracked through a
//! signal file, counter-based telemetry, and a lazily loaded config catalog.

pub mod config;
pub mod core;
pub mod error;
pub mod netproxy;
pub mod services;
pub mod traits;

// Re-export commonly used types
pub use config::{ControllerConfig, ModulePaths};
pub use crate::core::{poll_until, race_first_valid, shell_quote, Check, DeltaSampler, PollOutcome};
pub use error::{ControllerError, ControllerResult};
pub use netproxy::Netproxy;
pub use traits::{CommandChannel, CommandResult, HttpFetcher, ProcessExit, SpawnedProcess};

// Re-export mocks for testing
pub use traits::{MockCommandChannel, MockHttpFetcher};
