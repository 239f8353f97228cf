//! Controller configuration
//!
//! Defaults describe a stock module install on the device. Every value can be
//! overridden from `NETPROXY_*` environment variables (optionally loaded from a
//! `.env` file) and, in the binary, from command line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ControllerError, ControllerResult};

pub const DEFAULT_MODULE_DIR: &str = "/data/adb/modules/netproxy";

/// Well-known locations inside the module directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModulePaths {
    root: PathBuf,
}

impl ModulePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Engine binary, also the liveness probe target
    pub fn engine_binary(&self) -> PathBuf {
        self.root.join("bin/xray")
    }

    pub fn proxylink_binary(&self) -> PathBuf {
        self.root.join("bin/proxylink")
    }

    pub fn service_script(&self) -> PathBuf {
        self.root.join("scripts/core/service.sh")
    }

    pub fn switch_config_script(&self) -> PathBuf {
        self.root.join("scripts/core/switch-config.sh")
    }

    pub fn switch_mode_script(&self) -> PathBuf {
        self.root.join("scripts/core/switch-mode.sh")
    }

    pub fn subscription_script(&self) -> PathBuf {
        self.root.join("scripts/config/subscription.sh")
    }

    pub fn outbounds_dir(&self) -> PathBuf {
        self.root.join("config/xray/outbounds")
    }

    pub fn module_conf(&self) -> PathBuf {
        self.root.join("config/module.conf")
    }

    /// Completion signal of background subscription work
    pub fn signal_file(&self) -> PathBuf {
        self.root.join("config/.sub_status")
    }

    /// Log written by the module's service scripts
    pub fn service_log(&self) -> PathBuf {
        self.root.join("logs/service.log")
    }

    pub fn engine_log(&self) -> PathBuf {
        self.root.join("logs/xray.log")
    }

    /// Scratch file for generated routing rules
    pub fn mode_rules_file(&self) -> PathBuf {
        self.root.join("logs/.mode_rules.json")
    }
}

impl Default for ModulePaths {
    fn default() -> Self {
        Self::new(DEFAULT_MODULE_DIR)
    }
}

/// Tunables for every controller service
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    pub module_dir: PathBuf,
    /// Program and leading arguments that run one shell command with privileges
    pub shell: Vec<String>,
    pub command_timeout: Duration,
    pub start_timeout: Duration,
    pub stop_timeout: Duration,
    pub poll_interval: Duration,
    pub subscription_timeout: Duration,
    pub chunk_size: usize,
    pub ip_probe_timeout: Duration,
    pub ping_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            module_dir: PathBuf::from(DEFAULT_MODULE_DIR),
            shell: vec!["su".to_string(), "-c".to_string()],
            command_timeout: Duration::from_secs(30),
            start_timeout: Duration::from_secs(15),
            stop_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(500),
            subscription_timeout: Duration::from_secs(60),
            chunk_size: 20,
            ip_probe_timeout: Duration::from_secs(5),
            ping_timeout: Duration::from_secs(3),
        }
    }
}

impl ControllerConfig {
    /// Load overrides from the process environment (and `.env` if present)
    pub fn from_env() -> ControllerResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> ControllerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup("NETPROXY_MODULE_DIR") {
            config.module_dir = PathBuf::from(dir);
        }
        if let Some(shell) = lookup("NETPROXY_SHELL") {
            config.shell = parse_shell("NETPROXY_SHELL", &shell)?;
        }
        if let Some(size) = lookup("NETPROXY_CHUNK_SIZE") {
            config.chunk_size = size
                .trim()
                .parse()
                .map_err(|_| ControllerError::config(format!("NETPROXY_CHUNK_SIZE={size}")))?;
        }

        let durations: [(&str, &mut Duration); 7] = [
            ("NETPROXY_COMMAND_TIMEOUT_MS", &mut config.command_timeout),
            ("NETPROXY_START_TIMEOUT_MS", &mut config.start_timeout),
            ("NETPROXY_STOP_TIMEOUT_MS", &mut config.stop_timeout),
            ("NETPROXY_POLL_INTERVAL_MS", &mut config.poll_interval),
            ("NETPROXY_SUBSCRIPTION_TIMEOUT_MS", &mut config.subscription_timeout),
            ("NETPROXY_IP_PROBE_TIMEOUT_MS", &mut config.ip_probe_timeout),
            ("NETPROXY_PING_TIMEOUT_MS", &mut config.ping_timeout),
        ];
        for (key, slot) in durations {
            if let Some(raw) = lookup(key) {
                *slot = parse_millis(key, &raw)?;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the module directory (fluent API)
    pub fn with_module_dir(mut self, module_dir: impl Into<PathBuf>) -> Self {
        self.module_dir = module_dir.into();
        self
    }

    /// Set the privileged shell (fluent API)
    pub fn with_shell(mut self, shell: Vec<String>) -> Self {
        self.shell = shell;
        self
    }

    pub fn paths(&self) -> ModulePaths {
        ModulePaths::new(self.module_dir.clone())
    }

    pub fn validate(&self) -> ControllerResult<()> {
        if self.shell.is_empty() {
            return Err(ControllerError::config("shell must name a program"));
        }
        if self.chunk_size == 0 {
            return Err(ControllerError::config("chunk_size must be positive"));
        }
        if self.poll_interval.is_zero() {
            return Err(ControllerError::config("poll_interval must be positive"));
        }
        Ok(())
    }
}

/// Split a shell string such as `su -c` into program and arguments
pub fn parse_shell(key: &str, raw: &str) -> ControllerResult<Vec<String>> {
    let parts: Vec<String> = raw.split_whitespace().map(str::to_string).collect();
    if parts.is_empty() {
        return Err(ControllerError::config(format!("{key} is empty")));
    }
    Ok(parts)
}

fn parse_millis(key: &str, raw: &str) -> ControllerResult<Duration> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ControllerError::config(format!("{key}={raw}")))
}
