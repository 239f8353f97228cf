//! Test helpers for controller integration tests
//!
//! `FakeDevice` is a scripted [`CommandChannel`] that understands the handful
//! of commands the controller issues, backed by an in-memory outbounds tree.
//! It records every command and can delay the batched metadata read so that
//! overlapping requests can be observed.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use controller::{
    CommandChannel, CommandResult, ControllerResult, MockHttpFetcher, Netproxy, ProcessExit, SpawnedProcess,
};

use super::fixtures::TestFixtures;

#[derive(Debug, Default)]
struct DeviceState {
    engine_pid: Option<u32>,
    /// Engine pid to apply once this many further probes have run
    transition: Option<(Option<u32>, u32)>,
    files: BTreeMap<String, String>,
    signal: Option<String>,
    traffic: (u64, u64),
    pings: HashMap<String, Option<f64>>,
    failing_removals: Vec<String>,
}

pub struct FakeDevice {
    state: Mutex<DeviceState>,
    commands: Mutex<Vec<String>>,
    batch_delay: Duration,
    /// Probes between dispatching start/stop and the engine changing state
    settle_probes: u32,
}

impl FakeDevice {
    pub fn new() -> Self {
        let device = Self {
            state: Mutex::new(DeviceState::default()),
            commands: Mutex::new(Vec::new()),
            batch_delay: Duration::ZERO,
            settle_probes: 2,
        };
        {
            let mut state = device.state.lock().unwrap();
            state.files = TestFixtures::device_files().into_iter().collect();
            state.pings = TestFixtures::ping_answers()
                .into_iter()
                .map(|(host, ms)| (host.to_string(), ms))
                .collect();
        }
        device
    }

    /// Delay every batched metadata read (fluent API)
    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    /// Make removals of `relative` fail (fluent API)
    pub fn with_failing_removal(self, relative: &str) -> Self {
        self.state.lock().unwrap().failing_removals.push(relative.to_string());
        self
    }

    pub fn set_traffic(&self, rx: u64, tx: u64) {
        self.state.lock().unwrap().traffic = (rx, tx);
    }

    pub fn engine_running(&self) -> bool {
        self.state.lock().unwrap().engine_pid.is_some()
    }

    pub fn has_file(&self, relative: &str) -> bool {
        self.state.lock().unwrap().files.contains_key(relative)
    }

    pub fn file(&self, relative: &str) -> Option<String> {
        self.state.lock().unwrap().files.get(relative).cloned()
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.commands().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn relative(path: &str) -> Option<&str> {
        path.strip_prefix(TestFixtures::OUTBOUNDS)?.strip_prefix('/')
    }

    fn probe(&self) -> CommandResult {
        let mut state = self.state.lock().unwrap();
        if let Some((pid, remaining)) = state.transition {
            if remaining <= 1 {
                state.engine_pid = pid;
                state.transition = None;
            } else {
                state.transition = Some((pid, remaining - 1));
            }
        }
        CommandResult::ok(state.engine_pid.map(|p| format!("{p}\n")).unwrap_or_else(|| "\n".to_string()))
    }

    fn list_top_level(&self) -> CommandResult {
        let state = self.state.lock().unwrap();
        let names: Vec<&str> = state.files.keys().filter(|k| !k.contains('/')).map(String::as_str).collect();
        CommandResult::ok(names.join("\n"))
    }

    fn list_subscriptions(&self) -> CommandResult {
        let state = self.state.lock().unwrap();
        let mut dirs: BTreeMap<&str, (usize, Option<&str>)> = BTreeMap::new();
        for (path, content) in &state.files {
            let Some((dir, file)) = path.split_once('/') else {
                continue;
            };
            let entry = dirs.entry(dir).or_default();
            if file == "_meta.json" {
                entry.1 = Some(content.as_str());
            } else {
                entry.0 += 1;
            }
        }
        let mut out = String::new();
        for (dir, (count, meta)) in dirs {
            out.push_str(&format!("===SUB:{dir}===\n{count}\n{}\n", meta.unwrap_or("")));
        }
        CommandResult::ok(out)
    }

    fn list_dir(&self, dir: &str) -> CommandResult {
        let state = self.state.lock().unwrap();
        let prefix = format!("{dir}/");
        let names: Vec<&str> = state
            .files
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix))
            .filter(|name| *name != "_meta.json")
            .collect();
        CommandResult::ok(names.join("\n"))
    }

    fn batched_info(&self, command: &str) -> CommandResult {
        let list = command
            .split_once("<< 'EOF'\n")
            .and_then(|(_, rest)| rest.split_once("\nEOF"))
            .map(|(list, _)| list)
            .unwrap_or_default();

        let state = self.state.lock().unwrap();
        let mut out = String::new();
        for path in list.lines() {
            let name = path.rsplit('/').next().unwrap_or(path);
            out.push_str(&format!("===FILE:{name}===\n"));
            let content = Self::relative(path).and_then(|r| state.files.get(r));
            for line in content.into_iter().flat_map(|c| c.lines().take(30)) {
                if line.contains("\"protocol\"") || line.contains("\"address\"") || line.contains("\"port\"") {
                    out.push_str(line);
                    out.push('\n');
                }
            }
        }
        CommandResult::ok(out)
    }

    fn remove(&self, quoted: &str) -> CommandResult {
        let path = quoted.trim().trim_matches('\'');
        let mut state = self.state.lock().unwrap();
        let Some(relative) = Self::relative(path) else {
            return CommandResult::new(1, "", "outside outbounds");
        };
        if state.failing_removals.iter().any(|f| f == relative) {
            return CommandResult::new(1, "", "Permission denied");
        }
        match state.files.remove(relative) {
            Some(_) => CommandResult::ok(""),
            None => CommandResult::new(1, "", "No such file or directory"),
        }
    }
}

#[async_trait]
impl CommandChannel for FakeDevice {
    async fn run(&self, command: &str) -> ControllerResult<CommandResult> {
        self.commands.lock().unwrap().push(command.to_string());

        let signal = format!("'{}'", TestFixtures::SIGNAL_FILE);
        let outbounds = format!("'{}'", TestFixtures::OUTBOUNDS);

        let result = if command.starts_with("pidof") {
            self.probe()
        } else if command.starts_with(&format!("find {outbounds} -maxdepth 1")) {
            self.list_top_level()
        } else if command.starts_with("for d in") {
            self.list_subscriptions()
        } else if let Some(rest) = command.strip_prefix(&format!("find '{}/", TestFixtures::OUTBOUNDS)) {
            let dir = rest.split('\'').next().unwrap_or_default().to_string();
            self.list_dir(&dir)
        } else if command.starts_with("while IFS=") {
            if !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }
            self.batched_info(command)
        } else if let Some(target) = command.strip_prefix("rm -f ") {
            if target == signal {
                self.state.lock().unwrap().signal = None;
            }
            CommandResult::ok("")
        } else if command.starts_with(&format!("cat {signal}")) {
            let signal = self.state.lock().unwrap().signal.clone().unwrap_or_default();
            CommandResult::ok(format!("{signal}\n"))
        } else if let Some(path) = command.strip_prefix("rm ") {
            self.remove(path)
        } else if command == "cat /proc/net/dev" {
            let (rx, tx) = self.state.lock().unwrap().traffic;
            CommandResult::ok(TestFixtures::net_dev(rx, tx))
        } else {
            CommandResult::ok("")
        };
        Ok(result)
    }

    async fn spawn(&self, program: &str, args: &[String]) -> ControllerResult<SpawnedProcess> {
        self.commands.lock().unwrap().push(format!("{program} {}", args.join(" ")));

        let host = args.last().cloned().unwrap_or_default();
        let answer = self.state.lock().unwrap().pings.get(&host).copied().flatten();
        Ok(match answer {
            Some(ms) => SpawnedProcess::exits_after(
                Duration::from_millis(ms as u64),
                ProcessExit::with_code(0, format!("64 bytes from {host}: icmp_seq=1 ttl=55 time={ms} ms\n")),
            ),
            None => SpawnedProcess::hung(),
        })
    }

    async fn spawn_detached(&self, command: &str) -> ControllerResult<()> {
        self.commands.lock().unwrap().push(command.to_string());

        let mut state = self.state.lock().unwrap();
        if command.contains("service.sh' start") {
            state.transition = Some((Some(TestFixtures::ENGINE_PID), self.settle_probes));
        } else if command.contains("service.sh' stop") {
            state.transition = Some((None, self.settle_probes));
        } else if command.contains("subscription.sh' ") {
            // The work finishes instantly; failures are keyed on the url
            let outcome = if command.contains("invalid.example") { "fail" } else { "success" };
            state.signal = Some(outcome.to_string());
        }
        Ok(())
    }
}

/// Helper functions for common test patterns
pub struct TestHelpers;

impl TestHelpers {
    /// Controller services on top of `device`; HTTP is not expected
    pub fn netproxy(device: Arc<FakeDevice>) -> Netproxy {
        Netproxy::new(device, Arc::new(MockHttpFetcher::new()), TestFixtures::config())
    }
}
