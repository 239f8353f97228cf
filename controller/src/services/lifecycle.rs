//! Engine lifecycle control
//!
//! Start and stop are dispatched in the background and then confirmed by
//! polling the liveness probe, because the service script may take several
//! seconds and its own exit status says nothing about the engine.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use shared::{component_debug, component_info, component_warn, Component, OutboundMode, ServiceState, ServiceStatus};

use crate::config::{ControllerConfig, ModulePaths};
use crate::core::parse::{
    file_name_of, find_process_stat_line, format_uptime, parse_conf_value, parse_engine_version, parse_pid,
    parse_process_start_ticks, parse_uptime_secs,
};
use crate::core::shell::{or_empty, quote_path};
use crate::core::{poll_until, write_base64_command, Check};
use crate::error::ControllerResult;
use crate::traits::CommandChannel;

/// Reported when the engine binary does not answer `version`
pub const UNKNOWN_VERSION: &str = "unknown";

/// `pidof` on the engine binary; prints a pid or nothing
pub fn liveness_command(paths: &ModulePaths) -> String {
    or_empty(&format!("pidof -s {}", quote_path(&paths.engine_binary())))
}

/// Pid of the running engine, `None` when it is not running
pub async fn probe_engine_pid(channel: &dyn CommandChannel, paths: &ModulePaths) -> ControllerResult<Option<u32>> {
    let result = channel.run(&liveness_command(paths)).await?;
    Ok(parse_pid(&result.stdout))
}

/// Probe the engine once
pub async fn probe_engine_state(channel: &dyn CommandChannel, paths: &ModulePaths) -> ControllerResult<ServiceState> {
    let result = channel.run(&liveness_command(paths)).await?;
    Ok(ServiceState::from_probe_output(&result.stdout))
}

pub struct ServiceLifecycleController {
    channel: Arc<dyn CommandChannel>,
    paths: ModulePaths,
    poll_interval: Duration,
    start_timeout: Duration,
    stop_timeout: Duration,
}

impl ServiceLifecycleController {
    pub fn new(channel: Arc<dyn CommandChannel>, config: &ControllerConfig) -> Self {
        Self {
            channel,
            paths: config.paths(),
            poll_interval: config.poll_interval,
            start_timeout: config.start_timeout,
            stop_timeout: config.stop_timeout,
        }
    }

    /// Current engine state; a failed probe reads as `Unknown`
    pub async fn state(&self) -> ServiceState {
        match probe_engine_state(self.channel.as_ref(), &self.paths).await {
            Ok(state) => state,
            Err(e) => {
                component_warn!(Component::Lifecycle, error = %e, "liveness probe failed");
                ServiceState::Unknown
            }
        }
    }

    /// Engine state together with the active config file name
    pub async fn status(&self) -> ServiceStatus {
        let state = self.state().await;
        if state == ServiceState::Unknown {
            return ServiceStatus::unknown();
        }

        let config = match self.read_module_conf().await {
            Ok(conf) => parse_conf_value(&conf, "CURRENT_CONFIG")
                .map(|path| file_name_of(&path))
                .unwrap_or_default(),
            Err(e) => {
                component_warn!(Component::Lifecycle, error = %e, "cannot read module.conf");
                return ServiceStatus::unknown();
            }
        };

        ServiceStatus { state, config }
    }

    /// Launch the service script and wait until the engine runs
    ///
    /// `Ok(false)` means the engine was not observed running within the budget;
    /// it may still come up later.
    pub async fn start(&self) -> ControllerResult<bool> {
        self.dispatch("start").await?;
        let converged = self.await_state(ServiceState::Running, self.start_timeout).await;
        if converged {
            component_info!(Component::Lifecycle, "engine running");
        } else {
            component_warn!(Component::Lifecycle, "engine not running after {:?}", self.start_timeout);
        }
        Ok(converged)
    }

    /// Stop the engine and wait until it is gone
    pub async fn stop(&self) -> ControllerResult<bool> {
        self.dispatch("stop").await?;
        let converged = self.await_state(ServiceState::Stopped, self.stop_timeout).await;
        if converged {
            component_info!(Component::Lifecycle, "engine stopped");
        } else {
            component_warn!(Component::Lifecycle, "engine still running after {:?}", self.stop_timeout);
        }
        Ok(converged)
    }

    /// Stop then start; a stop that does not converge skips the start
    pub async fn restart(&self) -> ControllerResult<bool> {
        if !self.stop().await? {
            return Ok(false);
        }
        self.start().await
    }

    /// Engine uptime, `None` when the engine is not running or unreadable
    pub async fn uptime(&self) -> Option<String> {
        let pid = match probe_engine_pid(self.channel.as_ref(), &self.paths).await {
            Ok(Some(pid)) => pid,
            Ok(None) => return None,
            Err(e) => {
                component_debug!(Component::Lifecycle, error = %e, "uptime probe failed");
                return None;
            }
        };

        let command = format!("cat /proc/uptime; cat /proc/{pid}/stat; getconf CLK_TCK");
        let output = match self.channel.run(&command).await {
            Ok(result) if result.success() => result.stdout,
            Ok(result) => {
                component_debug!(Component::Lifecycle, exit_code = result.exit_code, "uptime read failed");
                return None;
            }
            Err(e) => {
                component_debug!(Component::Lifecycle, error = %e, "uptime read failed");
                return None;
            }
        };

        let uptime = parse_uptime_secs(output.lines().next()?)?;
        let start_ticks = parse_process_start_ticks(find_process_stat_line(&output)?)?;
        let clk_tck: f64 = output.lines().last()?.trim().parse().ok()?;
        if clk_tck <= 0.0 {
            return None;
        }

        let running_for = (uptime - start_ticks as f64 / clk_tck).max(0.0);
        Some(format_uptime(running_for as u64))
    }

    /// Engine release such as `1.8.24`, [`UNKNOWN_VERSION`] when it cannot be read
    pub async fn engine_version(&self) -> String {
        let command = format!("{} version", quote_path(&self.paths.engine_binary()));
        match self.channel.run(&command).await {
            Ok(result) => parse_engine_version(&result.stdout).unwrap_or_else(|| UNKNOWN_VERSION.to_string()),
            Err(e) => {
                component_debug!(Component::Lifecycle, error = %e, "engine version unavailable");
                UNKNOWN_VERSION.to_string()
            }
        }
    }

    /// Last `lines` lines of the service script log, `None` when it cannot be read
    pub async fn service_log(&self, lines: usize) -> Option<String> {
        self.tail(&self.paths.service_log(), lines).await
    }

    /// Last `lines` lines of the engine log, `None` when it cannot be read
    pub async fn engine_log(&self, lines: usize) -> Option<String> {
        self.tail(&self.paths.engine_log(), lines).await
    }

    /// Outbound mode from module.conf, `rule` when unset or unreadable
    pub async fn outbound_mode(&self) -> OutboundMode {
        match self.read_module_conf().await {
            Ok(conf) => parse_conf_value(&conf, "OUTBOUND_MODE")
                .and_then(|mode| mode.parse().ok())
                .unwrap_or_default(),
            Err(e) => {
                component_debug!(Component::Lifecycle, error = %e, "cannot read outbound mode");
                OutboundMode::default()
            }
        }
    }

    /// Switch the outbound mode; `true` when the switch script reports success
    pub async fn set_outbound_mode(&self, mode: OutboundMode) -> ControllerResult<bool> {
        let rules_file = self.paths.mode_rules_file();
        let rules = mode_rules(mode);

        if let Some(rules) = &rules {
            let body = serde_json::to_string_pretty(rules)?;
            self.channel
                .run(&write_base64_command(&body, &rules_file))
                .await?
                .into_output()?;
        }

        let mut command = format!("sh {} {}", quote_path(&self.paths.switch_mode_script()), mode);
        if rules.is_some() {
            command.push(' ');
            command.push_str(&quote_path(&rules_file));
        }
        let result = self.channel.run(&command).await;

        if rules.is_some() {
            if let Err(e) = self.channel.run(&format!("rm -f {}", quote_path(&rules_file))).await {
                component_debug!(Component::Lifecycle, error = %e, "rules cleanup failed");
            }
        }

        let switched = result?.stdout.contains("success");
        component_info!(Component::Lifecycle, mode = %mode, switched, "outbound mode switch");
        Ok(switched)
    }

    async fn tail(&self, path: &Path, lines: usize) -> Option<String> {
        let command = format!("tail -n {lines} {}", quote_path(path));
        match self.channel.run(&command).await {
            Ok(result) if result.success() => Some(result.stdout),
            Ok(result) => {
                component_debug!(Component::Lifecycle, exit_code = result.exit_code, log = %path.display(), "log unreadable");
                None
            }
            Err(e) => {
                component_debug!(Component::Lifecycle, error = %e, log = %path.display(), "log unreadable");
                None
            }
        }
    }

    async fn read_module_conf(&self) -> ControllerResult<String> {
        let command = or_empty(&format!("cat {}", quote_path(&self.paths.module_conf())));
        Ok(self.channel.run(&command).await?.stdout)
    }

    async fn dispatch(&self, action: &str) -> ControllerResult<()> {
        let command = format!("sh {} {}", quote_path(&self.paths.service_script()), action);
        component_debug!(Component::Lifecycle, action, "dispatching service script");
        self.channel.spawn_detached(&command).await
    }

    async fn await_state(&self, target: ServiceState, timeout: Duration) -> bool {
        let outcome = poll_until(self.poll_interval, timeout, || async move {
            match probe_engine_state(self.channel.as_ref(), &self.paths).await {
                Ok(state) => Check::when(state == target),
                Err(e) => {
                    component_debug!(Component::Lifecycle, error = %e, "probe failed while polling");
                    Check::Pending
                }
            }
        })
        .await;
        component_debug!(Component::Lifecycle, state = %target, ticks = outcome.ticks(), "poll finished");
        outcome.is_converged()
    }
}

/// Routing rules for modes that override the rule set
fn mode_rules(mode: OutboundMode) -> Option<Value> {
    let catch_all = match mode {
        OutboundMode::Rule => return None,
        OutboundMode::Global => "proxy",
        OutboundMode::Direct => "direct",
    };
    Some(json!({
        "routing": {
            "domainStrategy": "AsIs",
            "rules": [
                { "type": "field", "inboundTag": ["tproxy-in"], "port": "53", "outboundTag": "dns-out" },
                { "type": "field", "port": "0-65535", "outboundTag": catch_all },
                { "type": "field", "inboundTag": ["domestic-dns"], "outboundTag": "direct" },
                { "type": "field", "inboundTag": ["dns-module"], "outboundTag": catch_all },
            ]
        }
    }))
}
