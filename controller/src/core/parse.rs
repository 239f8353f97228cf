//! Parsers for device command output
//!
//! Every parser is total: unexpected input yields `None` (or an empty
//! collection), never a panic.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::OnceLock;

use regex::Regex;
use shared::{ConfigInfo, InternalIp, TrafficStats};

/// Marker that opens one file block in batched metadata output
pub const FILE_MARKER: &str = "===FILE:";

fn cached(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

/// First token of a liveness probe, if it is a pid
pub fn parse_pid(output: &str) -> Option<u32> {
    output.split_whitespace().next()?.parse().ok()
}

/// Sum receive and transmit bytes over every interface line of `/proc/net/dev`
pub fn parse_net_dev(text: &str) -> Option<TrafficStats> {
    let mut totals: Option<TrafficStats> = None;

    for line in text.lines() {
        let Some((_, counters)) = line.split_once(':') else {
            continue;
        };
        let fields: Vec<&str> = counters.split_whitespace().collect();
        let (Some(rx), Some(tx)) = (
            fields.first().and_then(|f| f.parse::<u64>().ok()),
            fields.get(8).and_then(|f| f.parse::<u64>().ok()),
        ) else {
            continue;
        };

        let sum = totals.get_or_insert_with(TrafficStats::default);
        sum.rx = sum.rx.saturating_add(rx);
        sum.tx = sum.tx.saturating_add(tx);
    }

    totals
}

/// Fields of `/proc/<pid>/stat` after the command name, starting at field 3
fn stat_fields(line: &str) -> Option<Vec<&str>> {
    let (_, rest) = line.rsplit_once(')')?;
    Some(rest.split_whitespace().collect())
}

fn stat_field(line: &str, number: usize) -> Option<u64> {
    stat_fields(line)?.get(number.checked_sub(3)?)?.parse().ok()
}

/// utime + stime (fields 14 and 15) in clock ticks
pub fn parse_process_cpu_ticks(stat_line: &str) -> Option<u64> {
    Some(stat_field(stat_line, 14)?.saturating_add(stat_field(stat_line, 15)?))
}

/// Process start time after boot (field 22) in clock ticks
pub fn parse_process_start_ticks(stat_line: &str) -> Option<u64> {
    stat_field(stat_line, 22)
}

/// Sum of every counter on the aggregate `cpu` line of `/proc/stat`
pub fn parse_system_cpu_ticks(text: &str) -> Option<u64> {
    let line = text.lines().find(|l| l.starts_with("cpu "))?;
    let values: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .map(|v| v.parse::<u64>().ok())
        .collect::<Option<_>>()?;
    if values.is_empty() {
        return None;
    }
    Some(values.iter().fold(0u64, |acc, v| acc.saturating_add(*v)))
}

/// The `/proc/<pid>/stat` line within mixed output
pub fn find_process_stat_line(text: &str) -> Option<&str> {
    text.lines().find(|l| l.contains(") ") && !l.starts_with("cpu"))
}

/// `<field>: <n> kB` from a `/proc` status file, converted to bytes
pub fn parse_kb_field(text: &str, field: &str) -> Option<u64> {
    text.lines().find_map(|line| {
        let rest = line.strip_prefix(field)?.strip_prefix(':')?;
        let mut parts = rest.split_whitespace();
        let value: u64 = parts.next()?.parse().ok()?;
        match parts.next() {
            Some("kB") => value.checked_mul(1024),
            _ => None,
        }
    })
}

/// Round-trip time of a single ping, rounded to whole milliseconds
pub fn parse_ping_millis(output: &str) -> Option<u32> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    let captures = cached(&RE, r"time=([\d.]+)\s*ms")?.captures(output)?;
    let millis: f64 = captures.get(1)?.as_str().parse().ok()?;
    if !millis.is_finite() || millis < 0.0 {
        return None;
    }
    Some(millis.round() as u32)
}

/// Engine release from `xray version` output, e.g. `Xray 1.8.24 (Xray, Penetrates Everything.)`
pub fn parse_engine_version(output: &str) -> Option<String> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    let captures = cached(&RE, r"Xray\s+([\d.]+)")?.captures(output)?;
    Some(captures.get(1)?.as_str().to_string())
}

/// `<ip> <iface>` lines, keeping non-loopback IPv4 addresses in order
pub fn parse_internal_ips(text: &str) -> Vec<InternalIp> {
    text.lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let ip: Ipv4Addr = parts.next()?.parse().ok()?;
            if ip.is_loopback() {
                return None;
            }
            let iface = parts.next().unwrap_or("unknown").to_string();
            Some(InternalIp { ip, iface })
        })
        .collect()
}

/// Value of `KEY=value` or `KEY="value"` in a shell-style config file
pub fn parse_conf_value(text: &str, key: &str) -> Option<String> {
    text.lines().find_map(|line| {
        let value = line.trim().strip_prefix(key)?.strip_prefix('=')?;
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        Some(value.to_string())
    })
}

/// Last path segment, as shown for the active config
pub fn file_name_of(path: &str) -> String {
    path.rsplit('/').next().unwrap_or_default().to_string()
}

/// Non-empty trimmed lines
pub fn parse_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split batched metadata output into per-file [`ConfigInfo`]
///
/// Each block starts with `===FILE:<name>===` followed by the grep hits of
/// that file. Missing fields fall back to `unknown` protocol and empty address.
pub fn parse_batched_info(text: &str) -> HashMap<String, ConfigInfo> {
    static PROTOCOL: OnceLock<Option<Regex>> = OnceLock::new();
    static ADDRESS: OnceLock<Option<Regex>> = OnceLock::new();
    static PORT: OnceLock<Option<Regex>> = OnceLock::new();

    let capture = |cell: &'static OnceLock<Option<Regex>>, pattern: &str, content: &str| {
        cached(cell, pattern)
            .and_then(|re| re.captures(content))
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    };

    let mut infos = HashMap::new();
    for block in text.split(FILE_MARKER).filter(|b| !b.trim().is_empty()) {
        let (header, content) = block.split_once('\n').unwrap_or((block, ""));
        let filename = header.trim().trim_end_matches("===").trim();
        if filename.is_empty() {
            continue;
        }

        let mut info = ConfigInfo::unknown();
        if let Some(protocol) = capture(&PROTOCOL, r#""protocol"\s*:\s*"([^"]+)""#, content) {
            info.protocol = protocol;
        }
        if let Some(address) = capture(&ADDRESS, r#""address"\s*:\s*"([^"]+)""#, content) {
            info.address = address;
        }
        info.port = capture(&PORT, r#""port"\s*:\s*(\d+)"#, content).and_then(|p| p.parse().ok());

        infos.insert(filename.to_string(), info);
    }
    infos
}

/// Seconds since boot from `/proc/uptime`
pub fn parse_uptime_secs(text: &str) -> Option<f64> {
    text.split_whitespace().next()?.parse().ok()
}

/// `D-HH:MM:SS` once past a day, `HH:MM:SS` otherwise
pub fn format_uptime(total_secs: u64) -> String {
    let days = total_secs / 86_400;
    let hours = (total_secs % 86_400) / 3_600;
    let minutes = (total_secs % 3_600) / 60;
    let seconds = total_secs % 60;
    if days > 0 {
        format!("{days}-{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_version() {
        let output = "Xray 1.8.24 (Xray, Penetrates Everything.) 3f4b7c2 (go1.22.4 android/arm64)\nA unified platform.\n";
        assert_eq!(parse_engine_version(output).as_deref(), Some("1.8.24"));
        assert_eq!(parse_engine_version("sh: xray: not found"), None);
    }

    const NET_DEV: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo:     600       6    0    0    0     0          0         0      600       6    0    0    0     0       0          0
 wlan0:     400       4    0    0    0     0          0         0     1400      10    0    0    0     0       0          0
";

    const PROC_STAT: &str = "4242 (xray worker) S 1 4242 4242 0 -1 4194560 1000 0 0 0 150 50 0 0 20 0 12 0 9000 123456 789";

    #[test]
    fn test_net_dev_sums_all_interfaces() {
        assert_eq!(parse_net_dev(NET_DEV), Some(TrafficStats { rx: 1000, tx: 2000 }));
        assert_eq!(parse_net_dev("garbage"), None);
    }

    #[test]
    fn test_net_dev_without_space_after_colon() {
        let text = "eth0:123 1 0 0 0 0 0 0 456 1 0 0 0 0 0 0";
        assert_eq!(parse_net_dev(text), Some(TrafficStats { rx: 123, tx: 456 }));
    }

    #[test]
    fn test_process_stat_fields() {
        assert_eq!(parse_process_cpu_ticks(PROC_STAT), Some(200));
        assert_eq!(parse_process_start_ticks(PROC_STAT), Some(9000));
        assert_eq!(parse_process_cpu_ticks("4242 (xray) S 1"), None);
    }

    #[test]
    fn test_system_cpu_total() {
        let text = "cpu  100 0 50 800 10 0 40 0 0 0\ncpu0 1 2 3";
        assert_eq!(parse_system_cpu_ticks(text), Some(1000));
        assert_eq!(parse_system_cpu_ticks("intr 1 2"), None);

        let mixed = format!("{PROC_STAT}\n{text}");
        assert_eq!(find_process_stat_line(&mixed), Some(PROC_STAT));
    }

    #[test]
    fn test_kb_fields() {
        let text = "VmRSS:\t   20480 kB\nMemTotal:        4096000 kB\n";
        assert_eq!(parse_kb_field(text, "VmRSS"), Some(20480 * 1024));
        assert_eq!(parse_kb_field(text, "MemTotal"), Some(4096000 * 1024));
        assert_eq!(parse_kb_field(text, "MemFree"), None);
        assert_eq!(parse_kb_field("VmRSS: lots kB", "VmRSS"), None);
    }

    #[test]
    fn test_ping_time() {
        let output = "64 bytes from 1.1.1.1: icmp_seq=1 ttl=57 time=23.6 ms";
        assert_eq!(parse_ping_millis(output), Some(24));
        assert_eq!(parse_ping_millis("time=7 ms"), Some(7));
        assert_eq!(parse_ping_millis("1 packets transmitted, 0 received"), None);
    }

    #[test]
    fn test_internal_ips_skip_loopback() {
        let text = "127.0.0.1 lo\n192.168.1.20 wlan0\n10.0.0.2 rmnet0\nnot-an-ip eth0\n";
        let ips = parse_internal_ips(text);
        assert_eq!(ips.len(), 2);
        assert_eq!(ips[0].ip, Ipv4Addr::new(192, 168, 1, 20));
        assert_eq!(ips[0].iface, "wlan0");
        assert_eq!(ips[1].iface, "rmnet0");
    }

    #[test]
    fn test_conf_values() {
        let conf = "# comment\nCURRENT_CONFIG=\"/m/config/xray/outbounds/sub_hk/a.json\"\nOUTBOUND_MODE=global\n";
        assert_eq!(
            parse_conf_value(conf, "CURRENT_CONFIG").map(|p| file_name_of(&p)),
            Some("a.json".to_string())
        );
        assert_eq!(parse_conf_value(conf, "OUTBOUND_MODE").as_deref(), Some("global"));
        assert_eq!(parse_conf_value(conf, "MISSING"), None);
    }

    #[test]
    fn test_batched_info() {
        let text = "\
===FILE:a.json===
      \"protocol\": \"vless\",
          \"address\": \"hk.example.org\",
          \"port\": 443,
===FILE:b.json===
===FILE:c.json===
      \"protocol\": \"freedom\",
";
        let infos = parse_batched_info(text);
        assert_eq!(infos.len(), 3);
        assert_eq!(infos["a.json"].endpoint(), "hk.example.org:443");
        assert_eq!(infos["b.json"], ConfigInfo::unknown());
        assert_eq!(infos["c.json"].protocol, "freedom");
        assert_eq!(infos["c.json"].port, None);
    }

    #[test]
    fn test_uptime_format() {
        assert_eq!(format_uptime(3_661), "01:01:01");
        assert_eq!(format_uptime(90_061), "1-01:01:01");
        assert_eq!(parse_uptime_secs("12345.67 54321.00"), Some(12345.67));
    }
}
