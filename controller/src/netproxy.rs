//! Service container wiring every controller service to one channel

use std::sync::Arc;

use shared::{component_debug, Component};

use crate::config::ControllerConfig;
use crate::error::ControllerResult;
use crate::services::{
    ConfigCatalog, ReqwestFetcher, ServiceLifecycleController, ShellCommandChannel, SubscriptionRunner,
    TelemetryCollector,
};
use crate::traits::{CommandChannel, HttpFetcher};

/// All controller services sharing one command channel
///
/// The seams are trait objects, so the same container runs on the real shell
/// channel and on scripted channels in tests.
pub struct Netproxy {
    pub lifecycle: ServiceLifecycleController,
    pub telemetry: TelemetryCollector,
    pub subscriptions: SubscriptionRunner,
    pub catalog: ConfigCatalog,
    config: ControllerConfig,
}

impl Netproxy {
    /// Create the services with injected dependencies
    pub fn new(channel: Arc<dyn CommandChannel>, http: Arc<dyn HttpFetcher>, config: ControllerConfig) -> Self {
        Self {
            lifecycle: ServiceLifecycleController::new(channel.clone(), &config),
            telemetry: TelemetryCollector::new(channel.clone(), http, &config),
            subscriptions: SubscriptionRunner::new(channel.clone(), &config),
            catalog: ConfigCatalog::new(channel, &config),
            config,
        }
    }

    /// Create the services on top of the configured shell and reqwest
    pub fn from_config(config: ControllerConfig) -> ControllerResult<Self> {
        config.validate()?;
        component_debug!(
            Component::Channel,
            shell = %config.shell.join(" "),
            module_dir = %config.module_dir.display(),
            "using privileged shell"
        );
        let channel = Arc::new(ShellCommandChannel::from_config(&config));
        let http = Arc::new(ReqwestFetcher::new()?);
        Ok(Self::new(channel, http, config))
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }
}
