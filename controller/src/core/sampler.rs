//! Rates and percentages from cumulative counters
//!
//! A [`DeltaSampler`] owns the most recent sample only. Each observation is
//! compared against it and, when far enough apart, replaces it.

use std::collections::VecDeque;
use std::time::Duration;

use shared::{round1, NetworkSpeed};
use tokio::time::Instant;

/// Smallest spacing between two samples worth differencing
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(500);

/// Number of points kept for the speed chart
pub const SPEED_HISTORY_LEN: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct Sample<T> {
    pub at: Instant,
    pub value: T,
}

/// What a new reading means relative to the stored one
#[derive(Debug, Clone, PartialEq)]
pub enum Observation<T> {
    /// No previous sample; the reading became the baseline
    Baseline,
    /// Too close to the stored sample; the baseline was kept
    TooSoon,
    /// A usable pair; the reading replaced the baseline
    Delta {
        previous: T,
        current: T,
        elapsed: Duration,
    },
}

#[derive(Debug, Clone)]
pub struct DeltaSampler<T> {
    previous: Option<Sample<T>>,
    min_interval: Duration,
}

impl<T: Clone> DeltaSampler<T> {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            previous: None,
            min_interval,
        }
    }

    pub fn observe(&mut self, at: Instant, value: T) -> Observation<T> {
        let Some(previous) = self.previous.as_ref() else {
            self.previous = Some(Sample { at, value });
            return Observation::Baseline;
        };

        // Timestamps must strictly increase
        let elapsed = match at.checked_duration_since(previous.at) {
            Some(elapsed) if !elapsed.is_zero() && elapsed >= self.min_interval => elapsed,
            _ => return Observation::TooSoon,
        };

        let previous = previous.value.clone();
        self.previous = Some(Sample {
            at,
            value: value.clone(),
        });
        Observation::Delta {
            previous,
            current: value,
            elapsed,
        }
    }

    pub fn previous(&self) -> Option<&Sample<T>> {
        self.previous.as_ref()
    }

    /// Forget the stored sample; the next reading becomes a new baseline
    pub fn reset(&mut self) {
        self.previous = None;
    }
}

impl<T: Clone> Default for DeltaSampler<T> {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL)
    }
}

/// Per-second rate between two counter readings; a decrease yields 0
pub fn rate_per_sec(previous: u64, current: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    match current.checked_sub(previous) {
        Some(delta) => delta as f64 / secs,
        None => 0.0,
    }
}

/// `100 * part / whole`, rounded to one decimal and clamped to `[0, 100]`
///
/// A zero `whole` yields 0.
pub fn share_percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round1(100.0 * part as f64 / whole as f64).clamp(0.0, 100.0)
}

/// Rolling window of the most recently reported speeds
#[derive(Debug, Clone, Default)]
pub struct SpeedHistory {
    points: VecDeque<NetworkSpeed>,
}

impl SpeedHistory {
    pub fn push(&mut self, speed: NetworkSpeed) {
        if self.points.len() == SPEED_HISTORY_LEN {
            self.points.pop_front();
        }
        self.points.push_back(speed);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Oldest first
    pub fn points(&self) -> impl Iterator<Item = &NetworkSpeed> {
        self.points.iter()
    }

    pub fn latest(&self) -> Option<&NetworkSpeed> {
        self.points.back()
    }
}
