//! Engine service state and routing mode

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::SharedError;

/// Observed state of the proxy engine, recomputed on every query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Running,
    Stopped,
    /// The liveness probe itself failed
    Unknown,
}

impl ServiceState {
    /// Interpret the stdout of a process-presence probe (a pid or nothing)
    pub fn from_probe_output(stdout: &str) -> Self {
        if stdout.trim().is_empty() {
            ServiceState::Stopped
        } else {
            ServiceState::Running
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ServiceState::Running)
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceState::Running => write!(f, "running"),
            ServiceState::Stopped => write!(f, "stopped"),
            ServiceState::Unknown => write!(f, "unknown"),
        }
    }
}

/// Engine state together with the active outbound config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub state: ServiceState,
    /// File name of the active outbound config, empty when none is set
    pub config: String,
}

impl ServiceStatus {
    pub fn unknown() -> Self {
        Self {
            state: ServiceState::Unknown,
            config: String::new(),
        }
    }
}

/// Outbound routing mode of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutboundMode {
    #[default]
    Rule,
    Global,
    Direct,
}

impl fmt::Display for OutboundMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutboundMode::Rule => write!(f, "rule"),
            OutboundMode::Global => write!(f, "global"),
            OutboundMode::Direct => write!(f, "direct"),
        }
    }
}

impl FromStr for OutboundMode {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rule" => Ok(OutboundMode::Rule),
            "global" => Ok(OutboundMode::Global),
            "direct" => Ok(OutboundMode::Direct),
            other => Err(SharedError::invalid("outbound mode", other)),
        }
    }
}
