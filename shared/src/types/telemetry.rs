//! Telemetry values reported for the engine and the host

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Cumulative byte counters summed across all interfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrafficStats {
    pub rx: u64,
    pub tx: u64,
}

/// Throughput in bytes per second
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NetworkSpeed {
    pub download: f64,
    pub upload: f64,
}

impl NetworkSpeed {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Whole KiB/s, the unit the management UI displays
    pub fn download_kib(&self) -> u64 {
        (self.download / 1024.0).floor() as u64
    }

    pub fn upload_kib(&self) -> u64 {
        (self.upload / 1024.0).floor() as u64
    }
}

impl fmt::Display for NetworkSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "↓ {} KB/s  ↑ {} KB/s", self.download_kib(), self.upload_kib())
    }
}

/// Resident memory of the engine against total system memory, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub total: u64,
    pub used: u64,
    /// `used / total` in percent with one decimal, 0 when total is unknown
    pub percentage: f64,
}

/// CPU and memory footprint of the engine process
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ProcessUsage {
    pub cpu: f64,
    pub mem: MemoryUsage,
}

/// A non-loopback IPv4 address and the interface carrying it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalIp {
    pub ip: Ipv4Addr,
    pub iface: String,
}

/// Public address as seen by an IP-info provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIpInfo {
    pub ip: String,
    pub country_code: Option<String>,
}

/// Outcome of a single latency probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LatencyResult {
    Millis(u32),
    Timeout,
    Failed,
}

impl LatencyResult {
    /// Ordering value used where a numeric latency is required
    pub const UNREACHABLE_MS: u32 = 9_999;

    /// Timeouts and failures mark a node as invalid
    pub fn is_invalid(&self) -> bool {
        matches!(self, LatencyResult::Timeout | LatencyResult::Failed)
    }

    pub fn millis(&self) -> Option<u32> {
        match self {
            LatencyResult::Millis(ms) => Some(*ms),
            _ => None,
        }
    }

    pub fn sort_value(&self) -> u32 {
        self.millis().unwrap_or(Self::UNREACHABLE_MS)
    }
}

impl fmt::Display for LatencyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LatencyResult::Millis(ms) => write!(f, "{ms} ms"),
            LatencyResult::Timeout => write!(f, "timeout"),
            LatencyResult::Failed => write!(f, "failed"),
        }
    }
}
