//! Single-shot ICMP latency probe

use std::time::Duration;

use shared::{component_debug, Component, LatencyResult};
use tokio::time::timeout;

use crate::core::parse::parse_ping_millis;
use crate::traits::CommandChannel;

/// `ping -c 1 -W 2 <host>` bounded by `budget`
///
/// An answer without a parsable time, a non-zero exit or an exhausted budget
/// is a `Timeout`. Failing to launch or await the process is `Failed`.
pub async fn ping_latency(channel: &dyn CommandChannel, host: &str, budget: Duration) -> LatencyResult {
    let args = ["-c", "1", "-W", "2", host].map(str::to_string);

    let process = match channel.spawn("ping", &args).await {
        Ok(process) => process,
        Err(e) => {
            component_debug!(Component::Telemetry, host, error = %e, "ping spawn failed");
            return LatencyResult::Failed;
        }
    };

    match timeout(budget, process.await_exit()).await {
        Err(_) => LatencyResult::Timeout,
        Ok(Err(e)) => {
            component_debug!(Component::Telemetry, host, error = %e, "ping did not complete");
            LatencyResult::Failed
        }
        Ok(Ok(exit)) if exit.success() => parse_ping_millis(&exit.stdout)
            .map(LatencyResult::Millis)
            .unwrap_or(LatencyResult::Timeout),
        Ok(Ok(_)) => LatencyResult::Timeout,
    }
}
