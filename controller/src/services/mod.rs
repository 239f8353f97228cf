//! Service implementations
//!
//! Real implementations of the controller seams plus the services built on
//! top of them. Everything device-facing goes through a [`crate::traits::CommandChannel`].

pub mod background;
pub mod catalog;
pub mod channel;
pub mod http;
pub mod ip_lookup;
pub mod latency;
pub mod lifecycle;
pub mod subscription;
pub mod telemetry;

#[cfg(test)]
mod tests;

// Re-export all service implementations
pub use background::BackgroundOperation;
pub use catalog::{ChunkLoad, ConfigCatalog, InfoSlot, UNMEASURED_SORT_VALUE};
pub use channel::ShellCommandChannel;
pub use http::ReqwestFetcher;
pub use ip_lookup::{IpProvider, ProbeResult};
pub use latency::ping_latency;
pub use lifecycle::ServiceLifecycleController;
pub use subscription::SubscriptionRunner;
pub use telemetry::TelemetryCollector;
