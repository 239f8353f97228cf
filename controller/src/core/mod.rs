//! Core primitives shared by the controller services
//!
//! Nothing in here talks to the device. The services feed these helpers with
//! channel output and timestamps.

pub mod parse;
pub mod poll;
pub mod race;
pub mod sampler;
pub mod shell;

pub use poll::{poll_until, Check, PollOutcome};
pub use race::race_first_valid;
pub use sampler::{rate_per_sec, share_percent, DeltaSampler, Observation, Sample, SpeedHistory};
pub use shell::{shell_quote, write_base64_command};
