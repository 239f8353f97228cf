//! Trait definitions with mockall annotations for testing
//!
//! The controller reaches the outside world through two seams: the privileged
//! command channel and plain HTTP. Every service takes them as trait objects so
//! tests can script device behaviour without a rooted phone.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::error::{ControllerError, ControllerResult};

/// Captured outcome of one synchronous privileged command
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Successful result with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self::new(0, stdout, "")
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// `CommandFailed` for a non-zero exit
    pub fn ensure_success(self) -> ControllerResult<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(ControllerError::CommandFailed {
                exit_code: self.exit_code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }

    /// Trimmed stdout of a successful command
    pub fn into_output(self) -> ControllerResult<String> {
        Ok(self.ensure_success()?.stdout.trim().to_string())
    }
}

/// Final state of a spawned process, available once all output is captured
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessExit {
    /// `None` when the process was killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessExit {
    pub fn with_code(code: i32, stdout: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

pub type ExitFuture = Pin<Box<dyn Future<Output = ControllerResult<ProcessExit>> + Send>>;

/// Live handle of a long-running process
///
/// Awaiting the handle yields the exit together with the full captured output.
/// There is no built-in deadline; wrap `await_exit` in `tokio::time::timeout`.
pub struct SpawnedProcess {
    exit: ExitFuture,
}

impl SpawnedProcess {
    pub fn new<F>(exit: F) -> Self
    where
        F: Future<Output = ControllerResult<ProcessExit>> + Send + 'static,
    {
        Self { exit: Box::pin(exit) }
    }

    /// A process that has already finished
    pub fn exited(exit: ProcessExit) -> Self {
        Self::new(async move { Ok(exit) })
    }

    /// A process that finishes after `delay`
    pub fn exits_after(delay: Duration, exit: ProcessExit) -> Self {
        Self::new(async move {
            tokio::time::sleep(delay).await;
            Ok(exit)
        })
    }

    /// A process that never terminates
    pub fn hung() -> Self {
        Self::new(std::future::pending())
    }

    pub async fn await_exit(self) -> ControllerResult<ProcessExit> {
        self.exit.await
    }
}

impl fmt::Debug for SpawnedProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpawnedProcess").finish_non_exhaustive()
    }
}

/// Privileged command execution on the device
///
/// Commands are opaque shell text. Any value interpolated into that text must
/// go through [`crate::core::shell_quote`].
#[mockall::automock]
#[async_trait::async_trait]
pub trait CommandChannel: Send + Sync {
    /// Run a command to completion and capture its output
    ///
    /// A non-zero exit is an ordinary result. `ChannelUnreachable` means the
    /// channel itself could not be used or did not answer in time.
    async fn run(&self, command: &str) -> ControllerResult<CommandResult>;

    /// Start a long-running program and return a handle to its exit
    async fn spawn(&self, program: &str, args: &[String]) -> ControllerResult<SpawnedProcess>;

    /// Launch a command fully in the background; no handle is kept
    async fn spawn_detached(&self, command: &str) -> ControllerResult<()>;
}

/// Minimal HTTP GET used by the external IP providers
#[mockall::automock]
#[async_trait::async_trait]
pub trait HttpFetcher: Send + Sync {
    /// Fetch `url` and return the body text, failing on non-success status
    async fn get_text(&self, url: &str, timeout: Duration) -> ControllerResult<String>;
}
