//! Bounded fixed-interval polling

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};

/// Answer of a single poll check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check<T> {
    Ready(T),
    Pending,
}

impl<T> Check<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Check::Ready(_))
    }
}

impl Check<()> {
    pub fn when(condition: bool) -> Self {
        if condition {
            Check::Ready(())
        } else {
            Check::Pending
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Converged { value: T, ticks: u32 },
    TimedOut { ticks: u32 },
}

impl<T> PollOutcome<T> {
    pub fn is_converged(&self) -> bool {
        matches!(self, PollOutcome::Converged { .. })
    }

    pub fn ticks(&self) -> u32 {
        match self {
            PollOutcome::Converged { ticks, .. } | PollOutcome::TimedOut { ticks } => *ticks,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            PollOutcome::Converged { value, .. } => Some(value),
            PollOutcome::TimedOut { .. } => None,
        }
    }
}

/// Sleep one `interval`, run `check` once, repeat until ready or out of time
///
/// The deadline is only evaluated after a pending check, so a poll that never
/// converges gives up after at least `timeout` and before `timeout + interval`
/// (plus the duration of the checks themselves). Errors inside `check` are the
/// caller's to map onto [`Check::Pending`].
pub async fn poll_until<T, F, Fut>(interval: Duration, timeout: Duration, mut check: F) -> PollOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Check<T>>,
{
    let started = Instant::now();
    let mut ticks = 0;

    loop {
        sleep(interval).await;
        ticks += 1;

        if let Check::Ready(value) = check().await {
            return PollOutcome::Converged { value, ticks };
        }
        if started.elapsed() >= timeout {
            return PollOutcome::TimedOut { ticks };
        }
    }
}
