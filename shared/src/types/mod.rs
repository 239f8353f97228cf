//! Core types used throughout the controller

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod catalog;
pub mod operation;
pub mod service;
pub mod telemetry;

pub use catalog::*;
pub use operation::*;
pub use service::*;
pub use telemetry::*;

/// Controller component emitting a log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Component {
    /// Privileged command channel
    Channel,
    /// Service start/stop orchestration
    Lifecycle,
    /// Throughput, CPU, memory, IP and latency sampling
    Telemetry,
    /// Background subscription operations
    Subscription,
    /// Configuration groups, metadata and latency cache
    Catalog,
    /// Command line front end
    Cli,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Channel => write!(f, "channel"),
            Component::Lifecycle => write!(f, "lifecycle"),
            Component::Telemetry => write!(f, "telemetry"),
            Component::Subscription => write!(f, "subscription"),
            Component::Catalog => write!(f, "catalog"),
            Component::Cli => write!(f, "cli"),
        }
    }
}

/// Round to one decimal place, the precision every percentage is reported with
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
