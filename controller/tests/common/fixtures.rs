//! Test fixtures and data for controller tests
//!
//! This module provides consistent device contents used across all test suites.

use std::time::Duration;

use controller::ControllerConfig;

/// Standard test data and fixtures
pub struct TestFixtures;

impl TestFixtures {
    pub const MODULE_DIR: &'static str = "/data/adb/modules/netproxy";
    pub const OUTBOUNDS: &'static str = "/data/adb/modules/netproxy/config/xray/outbounds";
    pub const SIGNAL_FILE: &'static str = "/data/adb/modules/netproxy/config/.sub_status";
    pub const ENGINE_PID: u32 = 4242;

    /// Controller config with the test module dir and small chunks
    pub fn config() -> ControllerConfig {
        ControllerConfig {
            chunk_size: 2,
            poll_interval: Duration::from_millis(500),
            ..ControllerConfig::default()
        }
        .with_module_dir(Self::MODULE_DIR)
    }

    /// Minimal outbound config pointing at `address`
    pub fn outbound(protocol: &str, address: &str, port: u16) -> String {
        format!(
            "{{\n  \"outbounds\": [\n    {{\n      \"protocol\": \"{protocol}\",\n      \"settings\": {{\n        \"vnext\": [\n          {{\n            \"address\": \"{address}\",\n            \"port\": {port}\n          }}\n        ]\n      }}\n    }}\n  ]\n}}\n"
        )
    }

    /// Subscription `_meta.json`
    pub fn meta(name: &str, url: &str) -> String {
        format!("{{\"name\":\"{name}\",\"url\":\"{url}\",\"updated\":\"2026-10-01 08:00\"}}")
    }

    /// Outbound files of a small device: two default nodes and a four-node
    /// subscription, keyed by path relative to the outbounds dir
    pub fn device_files() -> Vec<(String, String)> {
        vec![
            ("home.json".to_string(), Self::outbound("vless", "10.1.0.1", 443)),
            ("office.json".to_string(), Self::outbound("vmess", "10.1.0.2", 8443)),
            ("sub_tokyo/_meta.json".to_string(), Self::meta("Tokyo", "https://sub.example.org/tokyo")),
            ("sub_tokyo/jp-1.json".to_string(), Self::outbound("trojan", "203.0.113.1", 443)),
            ("sub_tokyo/jp-2.json".to_string(), Self::outbound("trojan", "203.0.113.2", 443)),
            ("sub_tokyo/jp-3.json".to_string(), Self::outbound("trojan", "203.0.113.3", 443)),
            ("sub_tokyo/jp-4.json".to_string(), Self::outbound("trojan", "203.0.113.4", 443)),
        ]
    }

    /// Ping answers for the device nodes; `None` never answers
    pub fn ping_answers() -> Vec<(&'static str, Option<f64>)> {
        vec![
            ("203.0.113.1", Some(88.2)),
            ("203.0.113.2", None),
            ("203.0.113.3", Some(31.6)),
            ("203.0.113.4", None),
        ]
    }

    /// `/proc/net/dev` with one active interface
    pub fn net_dev(rx: u64, tx: u64) -> String {
        format!(
            "Inter-|   Receive                                                |  Transmit\n \
             face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed\n    \
             lo:     120       2    0    0    0     0          0         0      120       2    0    0    0     0       0          0\n \
             wlan0: {rx}     900    0    0    0     0          0         0 {tx}     700    0    0    0     0       0          0\n"
        )
    }
}
