//! Detached work observed through a signal file
//!
//! The work is launched in the background wrapped so that it writes `success`
//! or `fail` to the signal file when it ends. The controller polls that file
//! and deletes it once a terminal value has been read.

use std::sync::Arc;
use std::time::Duration;

use shared::{component_debug, component_info, component_warn, Component, OperationResult, SubscriptionOperation};

use crate::core::shell::{or_empty, quote_path};
use crate::core::{poll_until, Check, PollOutcome};
use crate::error::ControllerResult;
use crate::traits::CommandChannel;

const SUCCESS: &str = "success";
const FAIL: &str = "fail";

/// Terminal content of the signal file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Success,
    Fail,
}

impl Signal {
    fn read(content: &str) -> Option<Self> {
        match content.trim() {
            SUCCESS => Some(Signal::Success),
            FAIL => Some(Signal::Fail),
            _ => None,
        }
    }
}

pub struct BackgroundOperation {
    channel: Arc<dyn CommandChannel>,
    operation: SubscriptionOperation,
    poll_interval: Duration,
}

impl BackgroundOperation {
    /// Clear a stale signal and launch `work` detached
    pub async fn launch(
        channel: Arc<dyn CommandChannel>,
        operation: SubscriptionOperation,
        work: &str,
        poll_interval: Duration,
    ) -> ControllerResult<Self> {
        let signal = quote_path(&operation.signal_file);
        channel.run(&format!("rm -f {signal}")).await?;

        let wrapped = format!("{work} && echo {SUCCESS} > {signal} || echo {FAIL} > {signal}");
        channel.spawn_detached(&wrapped).await?;
        component_debug!(
            Component::Subscription,
            kind = %operation.kind,
            subscription = %operation.target_name,
            "background work launched"
        );

        Ok(Self {
            channel,
            operation,
            poll_interval,
        })
    }

    pub fn operation(&self) -> &SubscriptionOperation {
        &self.operation
    }

    /// Poll the signal file until it holds a terminal value or `timeout` passes
    ///
    /// Unreadable polls count as pending. A timeout is reported as
    /// [`OperationResult::timed_out`]; the work may still finish afterwards.
    pub async fn await_completion(&self, timeout: Duration) -> OperationResult {
        let command = or_empty(&format!("cat {}", quote_path(&self.operation.signal_file)));
        let read_signal = command.as_str();

        let outcome = poll_until(self.poll_interval, timeout, || async move {
            match self.channel.run(read_signal).await {
                Ok(result) => match Signal::read(&result.stdout) {
                    Some(signal) => Check::Ready(signal),
                    None => Check::Pending,
                },
                Err(e) => {
                    component_debug!(Component::Subscription, error = %e, "signal read failed");
                    Check::Pending
                }
            }
        })
        .await;

        match outcome {
            PollOutcome::Converged { value, ticks } => {
                self.consume_signal().await;
                let kind = self.operation.kind;
                let target = &self.operation.target_name;
                match value {
                    Signal::Success => {
                        component_info!(Component::Subscription, kind = %kind, subscription = %target, ticks, "operation succeeded");
                        OperationResult::ok()
                    }
                    Signal::Fail => {
                        component_warn!(Component::Subscription, kind = %kind, subscription = %target, "operation failed");
                        OperationResult::failed(format!("subscription {kind} failed for '{target}'"))
                    }
                }
            }
            PollOutcome::TimedOut { ticks } => {
                component_warn!(
                    Component::Subscription,
                    kind = %self.operation.kind,
                    ticks,
                    "no completion signal within {:?}",
                    timeout
                );
                OperationResult::timed_out()
            }
        }
    }

    async fn consume_signal(&self) {
        let command = format!("rm -f {}", quote_path(&self.operation.signal_file));
        if let Err(e) = self.channel.run(&command).await {
            component_debug!(Component::Subscription, error = %e, "signal cleanup failed");
        }
    }
}
