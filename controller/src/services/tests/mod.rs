//! Service-specific tests
//!
//! Each service has its own test file. Device behaviour is scripted through
//! `MockCommandChannel`; timing-sensitive tests run on a paused tokio clock.

mod channel;
mod subscription;

// Common test utilities for services
pub mod common {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use crate::config::ControllerConfig;
    use crate::traits::{CommandResult, MockCommandChannel};

    pub const MODULE_DIR: &str = "/data/adb/modules/netproxy";
    pub const OUTBOUNDS: &str = "/data/adb/modules/netproxy/config/xray/outbounds";

    pub fn test_config() -> ControllerConfig {
        ControllerConfig {
            poll_interval: Duration::from_millis(500),
            chunk_size: 2,
            ..ControllerConfig::default()
        }
        .with_module_dir(MODULE_DIR)
    }

    /// Every command text the channel received, in order
    #[derive(Clone, Default)]
    pub struct CommandLog(Arc<Mutex<Vec<String>>>);

    impl CommandLog {
        pub fn push(&self, command: &str) {
            self.0.lock().unwrap().push(command.to_string());
        }

        pub fn all(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }

        pub fn matching(&self, needle: &str) -> Vec<String> {
            self.all().into_iter().filter(|c| c.contains(needle)).collect()
        }
    }

    /// A channel whose `run` answers through `script` and whose detached
    /// launches always succeed; every command is logged
    pub fn scripted_channel<F>(script: F) -> (MockCommandChannel, CommandLog)
    where
        F: Fn(&str) -> CommandResult + Send + Sync + 'static,
    {
        let log = CommandLog::default();
        let mut channel = MockCommandChannel::new();

        let run_log = log.clone();
        channel.expect_run().returning(move |command| {
            run_log.push(command);
            Ok(script(command))
        });

        let detached_log = log.clone();
        channel.expect_spawn_detached().returning(move |command| {
            detached_log.push(command);
            Ok(())
        });

        (channel, log)
    }
}
