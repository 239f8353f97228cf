//! First valid answer among concurrent, individually timed probes

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use futures_util::stream::{FuturesUnordered, StreamExt};
use shared::{component_debug, Component};
use tokio::time::timeout;

use crate::error::ControllerResult;

/// Run every probe at once and return the first `Ok`
///
/// Each probe gets its own `per_probe` deadline. A probe that errors or times
/// out is logged and ignored. Once a winner is found the remaining probes are
/// dropped. `None` means no probe produced a usable value.
pub async fn race_first_valid<L, T, Fut, I>(probes: I, per_probe: Duration) -> Option<T>
where
    I: IntoIterator<Item = (L, Fut)>,
    L: Display,
    Fut: Future<Output = ControllerResult<T>>,
{
    let mut in_flight: FuturesUnordered<_> = probes
        .into_iter()
        .map(|(label, probe)| async move { (label, timeout(per_probe, probe).await) })
        .collect();

    while let Some((label, outcome)) = in_flight.next().await {
        match outcome {
            Ok(Ok(value)) => {
                component_debug!(Component::Telemetry, probe = %label, "probe won the race");
                return Some(value);
            }
            Ok(Err(error)) => {
                component_debug!(Component::Telemetry, probe = %label, error = %error, "probe rejected");
            }
            Err(_) => {
                component_debug!(Component::Telemetry, probe = %label, "probe timed out after {:?}", per_probe);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ControllerError;
    use futures_util::future::BoxFuture;
    use futures_util::FutureExt;
    use tokio::time::sleep;

    fn probe(delay_ms: u64, result: ControllerResult<&'static str>) -> BoxFuture<'static, ControllerResult<&'static str>> {
        async move {
            sleep(Duration::from_millis(delay_ms)).await;
            result
        }
        .boxed()
    }

    fn invalid(reason: &str) -> ControllerError {
        ControllerError::ProbeInvalid {
            reason: reason.to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fastest_invalid_loses_to_valid_second() {
        let probes = vec![
            ("a", probe(10, Err(invalid("country code 'usa'")))),
            ("b", probe(50, Ok("b"))),
            ("c", probe(60_000, Ok("c"))),
        ];

        let winner = race_first_valid(probes, Duration::from_secs(5)).await;
        assert_eq!(winner, Some("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_probe_cannot_win() {
        let probes = vec![("slow", probe(6_000, Ok("slow"))), ("bad", probe(1, Err(invalid("empty body"))))];

        let started = tokio::time::Instant::now();
        let winner = race_first_valid(probes, Duration::from_secs(5)).await;

        assert_eq!(winner, None);
        assert!(started.elapsed() < Duration::from_secs(6));
    }

    #[tokio::test]
    async fn test_no_probes() {
        let probes: Vec<(&str, BoxFuture<'static, ControllerResult<u8>>)> = Vec::new();
        assert_eq!(race_first_valid(probes, Duration::from_secs(1)).await, None);
    }
}
