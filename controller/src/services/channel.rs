//! Privileged command channel backed by a local shell
//!
//! Every command is handed to the configured shell (`su -c` on a device,
//! `sh -c` for unprivileged use) as one opaque argument.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;

use crate::config::ControllerConfig;
use crate::core::shell_quote;
use crate::error::{ControllerError, ControllerResult};
use crate::traits::{CommandChannel, CommandResult, ProcessExit, SpawnedProcess};
use shared::{component_debug, Component};

/// Real command channel
pub struct ShellCommandChannel {
    /// Program and leading arguments, e.g. `["su", "-c"]`
    shell: Vec<String>,

    /// Upper bound for one synchronous `run`
    timeout: Duration,
}

impl ShellCommandChannel {
    pub fn new(shell: Vec<String>, timeout: Duration) -> Self {
        Self { shell, timeout }
    }

    pub fn from_config(config: &ControllerConfig) -> Self {
        Self::new(config.shell.clone(), config.command_timeout)
    }

    /// Build a process that runs `text` through the shell with captured output
    fn shell_command(&self, text: &str) -> ControllerResult<Command> {
        let (program, leading) = self
            .shell
            .split_first()
            .ok_or_else(|| ControllerError::config("shell must name a program"))?;

        let mut cmd = Command::new(program);
        cmd.args(leading)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(cmd)
    }

    fn launch_error(&self, error: std::io::Error) -> ControllerError {
        ControllerError::unreachable(format!(
            "cannot launch '{}': {}",
            self.shell.join(" "),
            error
        ))
    }
}

#[async_trait]
impl CommandChannel for ShellCommandChannel {
    async fn run(&self, command: &str) -> ControllerResult<CommandResult> {
        component_debug!(Component::Channel, command = %command, "run");

        let child = self
            .shell_command(command)?
            .spawn()
            .map_err(|e| self.launch_error(e))?;

        // Dropping the child on timeout kills it
        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(ControllerError::unreachable(e.to_string())),
            Err(_) => {
                return Err(ControllerError::unreachable(format!(
                    "no answer within {:?}",
                    self.timeout
                )))
            }
        };

        Ok(CommandResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn spawn(&self, program: &str, args: &[String]) -> ControllerResult<SpawnedProcess> {
        let text = std::iter::once(shell_quote(program))
            .chain(args.iter().map(|a| shell_quote(a)))
            .collect::<Vec<_>>()
            .join(" ");
        component_debug!(Component::Channel, command = %text, "spawn");

        let child = self
            .shell_command(&text)?
            .spawn()
            .map_err(|e| self.launch_error(e))?;

        Ok(SpawnedProcess::new(async move {
            let output = child.wait_with_output().await?;
            Ok(ProcessExit {
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }))
    }

    async fn spawn_detached(&self, command: &str) -> ControllerResult<()> {
        // The outer shell returns as soon as the job is backgrounded
        let text = format!("nohup sh -c {} >/dev/null 2>&1 &", shell_quote(command));
        self.run(&text).await?.into_output().map(|_| ())
    }
}
