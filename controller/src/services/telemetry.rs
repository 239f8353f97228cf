//! Telemetry sampling for the engine and the host
//!
//! Every read is best effort: failures are logged and the sampler falls back
//! to a zero or empty value instead of returning an error.

use std::sync::Arc;
use std::time::Duration;

use shared::{
    component_debug, component_warn, Component, ExternalIpInfo, InternalIp, LatencyResult, MemoryUsage,
    NetworkSpeed, ProcessUsage, TrafficStats,
};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::{ControllerConfig, ModulePaths};
use crate::core::parse::{
    find_process_stat_line, parse_internal_ips, parse_kb_field, parse_net_dev, parse_process_cpu_ticks,
    parse_system_cpu_ticks,
};
use crate::core::sampler::DEFAULT_MIN_INTERVAL;
use crate::core::{race_first_valid, rate_per_sec, share_percent, DeltaSampler, Observation, SpeedHistory};
use crate::error::{ControllerError, ControllerResult};
use crate::services::ip_lookup::IpProvider;
use crate::services::latency::ping_latency;
use crate::services::lifecycle::probe_engine_pid;
use crate::traits::{CommandChannel, HttpFetcher};

const INTERNAL_IP_COMMAND: &str =
    r#"ip -4 addr show 2>/dev/null | awk '/inet / && !/127\.0\.0\.1/ {gsub(/\/.*/, "", $2); print $2, $NF}'"#;

/// Cumulative CPU counters of one engine process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CpuCounters {
    pid: u32,
    process: u64,
    system: u64,
}

#[derive(Debug)]
struct NetworkState {
    sampler: DeltaSampler<TrafficStats>,
    last_speed: NetworkSpeed,
    history: SpeedHistory,
}

pub struct TelemetryCollector {
    channel: Arc<dyn CommandChannel>,
    http: Arc<dyn HttpFetcher>,
    paths: ModulePaths,
    providers: Vec<IpProvider>,
    ip_probe_timeout: Duration,
    ping_timeout: Duration,
    network: Mutex<NetworkState>,
    cpu: Mutex<DeltaSampler<CpuCounters>>,
}

impl TelemetryCollector {
    pub fn new(channel: Arc<dyn CommandChannel>, http: Arc<dyn HttpFetcher>, config: &ControllerConfig) -> Self {
        Self {
            channel,
            http,
            paths: config.paths(),
            providers: IpProvider::defaults(),
            ip_probe_timeout: config.ip_probe_timeout,
            ping_timeout: config.ping_timeout,
            network: Mutex::new(NetworkState {
                sampler: DeltaSampler::new(DEFAULT_MIN_INTERVAL),
                last_speed: NetworkSpeed::zero(),
                history: SpeedHistory::default(),
            }),
            // Every distinct pair of CPU readings is usable
            cpu: Mutex::new(DeltaSampler::new(Duration::ZERO)),
        }
    }

    /// Replace the external IP providers (fluent API)
    pub fn with_providers(mut self, providers: Vec<IpProvider>) -> Self {
        self.providers = providers;
        self
    }

    /// Current throughput in bytes per second
    ///
    /// The first call only records a baseline and reports zero. Calls closer
    /// than the minimum interval repeat the previous figure.
    pub async fn network_speed(&self) -> NetworkSpeed {
        let stats = match self.read_traffic().await {
            Ok(stats) => stats,
            Err(e) => {
                component_warn!(Component::Telemetry, error = %e, "network counters unavailable");
                return NetworkSpeed::zero();
            }
        };
        let now = Instant::now();

        let mut network = self.network.lock().await;
        match network.sampler.observe(now, stats) {
            Observation::Baseline => NetworkSpeed::zero(),
            Observation::TooSoon => network.last_speed,
            Observation::Delta {
                previous,
                current,
                elapsed,
            } => {
                let speed = NetworkSpeed {
                    download: rate_per_sec(previous.rx, current.rx, elapsed),
                    upload: rate_per_sec(previous.tx, current.tx, elapsed),
                };
                network.last_speed = speed;
                network.history.push(speed);
                speed
            }
        }
    }

    /// Most recent reported speeds, oldest first
    pub async fn speed_history(&self) -> Vec<NetworkSpeed> {
        self.network.lock().await.history.points().copied().collect()
    }

    /// Raw cumulative byte counters
    pub async fn traffic_totals(&self) -> TrafficStats {
        self.read_traffic().await.unwrap_or_else(|e| {
            component_warn!(Component::Telemetry, error = %e, "network counters unavailable");
            TrafficStats::default()
        })
    }

    /// CPU share and resident memory of the engine
    ///
    /// CPU needs two readings of the same pid, so the first call after a
    /// (re)start reports 0%.
    pub async fn process_usage(&self) -> ProcessUsage {
        let pid = match probe_engine_pid(self.channel.as_ref(), &self.paths).await {
            Ok(Some(pid)) => pid,
            Ok(None) => return ProcessUsage::default(),
            Err(e) => {
                component_warn!(Component::Telemetry, error = %e, "engine pid unavailable");
                return ProcessUsage::default();
            }
        };

        let command = format!(
            "cat /proc/{pid}/stat 2>/dev/null; head -n 1 /proc/stat; \
             grep VmRSS /proc/{pid}/status 2>/dev/null; grep MemTotal /proc/meminfo 2>/dev/null"
        );
        let output = match self.channel.run(&command).await {
            Ok(result) => result.stdout,
            Err(e) => {
                component_warn!(Component::Telemetry, error = %e, "process counters unavailable");
                return ProcessUsage::default();
            }
        };

        let used = parse_kb_field(&output, "VmRSS").unwrap_or(0);
        let total = parse_kb_field(&output, "MemTotal").unwrap_or(0);
        let mem = MemoryUsage {
            total,
            used,
            percentage: share_percent(used, total),
        };

        let process = find_process_stat_line(&output).and_then(parse_process_cpu_ticks);
        let system = parse_system_cpu_ticks(&output);
        let cpu = match (process, system) {
            (Some(process), Some(system)) => self.cpu_percent(CpuCounters { pid, process, system }).await,
            _ => {
                component_debug!(Component::Telemetry, pid, "cpu counters unreadable");
                0.0
            }
        };

        ProcessUsage { cpu, mem }
    }

    async fn cpu_percent(&self, counters: CpuCounters) -> f64 {
        let mut sampler = self.cpu.lock().await;
        if sampler.previous().is_some_and(|s| s.value.pid != counters.pid) {
            sampler.reset();
        }

        match sampler.observe(Instant::now(), counters) {
            Observation::Delta { previous, current, .. } => {
                let system_delta = current.system.saturating_sub(previous.system);
                let process_delta = current.process.saturating_sub(previous.process);
                share_percent(process_delta, system_delta)
            }
            Observation::Baseline | Observation::TooSoon => 0.0,
        }
    }

    /// Non-loopback IPv4 addresses; the first one is the primary address
    pub async fn internal_ips(&self) -> Vec<InternalIp> {
        match self.channel.run(INTERNAL_IP_COMMAND).await {
            Ok(result) => parse_internal_ips(&result.stdout),
            Err(e) => {
                component_warn!(Component::Telemetry, error = %e, "internal ip lookup failed");
                Vec::new()
            }
        }
    }

    /// Public address from whichever provider answers validly first
    pub async fn external_ip(&self) -> Option<ExternalIpInfo> {
        let http = self.http.as_ref();
        let timeout = self.ip_probe_timeout;
        let probes = self.providers.iter().map(|provider| {
            (provider.url.as_str(), async move {
                let body = http.get_text(&provider.url, timeout).await?;
                provider.extract(&body).into_result()
            })
        });

        let info = race_first_valid(probes, timeout).await;
        if info.is_none() {
            component_warn!(Component::Telemetry, "no ip provider answered");
        }
        info
    }

    /// Round-trip latency to `host`
    pub async fn ping(&self, host: &str) -> LatencyResult {
        ping_latency(self.channel.as_ref(), host, self.ping_timeout).await
    }

    async fn read_traffic(&self) -> ControllerResult<TrafficStats> {
        let output = self.channel.run("cat /proc/net/dev").await?.into_output()?;
        parse_net_dev(&output).ok_or_else(|| ControllerError::parse("/proc/net/dev", "no interface lines"))
    }
}
