//! Subscription management through the module's subscription script

use std::sync::Arc;
use std::time::Duration;

use shared::{
    component_info, component_warn, Component, OperationKind, OperationResult, Subscription, SubscriptionMeta,
    SubscriptionOperation,
};

use crate::config::{ControllerConfig, ModulePaths};
use crate::core::shell::{quote_path, shell_quote};
use crate::error::ControllerResult;
use crate::services::background::BackgroundOperation;
use crate::traits::CommandChannel;

const SUB_MARKER: &str = "===SUB:";
const META_FILE: &str = "_meta.json";

/// Every `sub_*` directory with its node count and raw metadata, in one round trip
fn listing_command(paths: &ModulePaths) -> String {
    format!(
        r#"for d in {}/sub_*; do [ -d "$d" ] || continue; echo "{SUB_MARKER}$(basename "$d")==="; find "$d" -name '*.json' ! -name '{META_FILE}' | wc -l; cat "$d/{META_FILE}" 2>/dev/null; echo; done"#,
        quote_path(&paths.outbounds_dir())
    )
}

/// Parse the output of [`listing_command`]
///
/// Unreadable metadata falls back to the directory name without url.
pub fn parse_subscription_listing(text: &str) -> Vec<Subscription> {
    text.split(SUB_MARKER)
        .filter(|b| !b.trim().is_empty())
        .filter_map(|block| {
            let mut lines = block.lines();
            let dir_name = lines.next()?.trim().trim_end_matches("===").to_string();
            if dir_name.is_empty() {
                return None;
            }
            let node_count = lines.next().and_then(|l| l.trim().parse().ok()).unwrap_or(0);
            let meta_text: String = lines.collect::<Vec<_>>().join("\n");
            let meta: SubscriptionMeta = serde_json::from_str(meta_text.trim()).unwrap_or_default();

            let fallback_name = dir_name.strip_prefix("sub_").unwrap_or(&dir_name).to_string();
            Some(Subscription {
                name: meta.name.filter(|n| !n.is_empty()).unwrap_or(fallback_name),
                dir_name,
                url: meta.url,
                updated: meta.updated,
                node_count,
            })
        })
        .collect()
}

/// List subscriptions stored below the outbounds directory
pub async fn list_subscriptions(channel: &dyn CommandChannel, paths: &ModulePaths) -> ControllerResult<Vec<Subscription>> {
    let output = channel.run(&listing_command(paths)).await?.into_output()?;
    Ok(parse_subscription_listing(&output))
}

pub struct SubscriptionRunner {
    channel: Arc<dyn CommandChannel>,
    paths: ModulePaths,
    poll_interval: Duration,
    timeout: Duration,
}

impl SubscriptionRunner {
    pub fn new(channel: Arc<dyn CommandChannel>, config: &ControllerConfig) -> Self {
        Self {
            channel,
            paths: config.paths(),
            poll_interval: config.poll_interval,
            timeout: config.subscription_timeout,
        }
    }

    pub async fn list(&self) -> ControllerResult<Vec<Subscription>> {
        list_subscriptions(self.channel.as_ref(), &self.paths).await
    }

    /// Fetch a new subscription in the background and wait for it
    pub async fn add(&self, name: &str, url: &str) -> ControllerResult<OperationResult> {
        let work = format!(
            "sh {} add {} {}",
            quote_path(&self.paths.subscription_script()),
            shell_quote(name),
            shell_quote(url)
        );
        self.run_in_background(OperationKind::Add, name, &work).await
    }

    /// Refresh an existing subscription in the background and wait for it
    pub async fn update(&self, name: &str) -> ControllerResult<OperationResult> {
        let work = format!(
            "sh {} update {}",
            quote_path(&self.paths.subscription_script()),
            shell_quote(name)
        );
        self.run_in_background(OperationKind::Update, name, &work).await
    }

    /// Remove a subscription and its nodes; runs synchronously
    pub async fn remove(&self, name: &str) -> ControllerResult<OperationResult> {
        let command = format!(
            "sh {} remove {}",
            quote_path(&self.paths.subscription_script()),
            shell_quote(name)
        );
        let result = self.channel.run(&command).await?;
        if result.success() {
            component_info!(Component::Subscription, subscription = name, "subscription removed");
            return Ok(OperationResult::ok());
        }

        let stderr = result.stderr.trim();
        component_warn!(Component::Subscription, subscription = name, exit_code = result.exit_code, "remove failed");
        Ok(OperationResult::failed(if stderr.is_empty() {
            format!("remove exited with code {}", result.exit_code)
        } else {
            stderr.to_string()
        }))
    }

    async fn run_in_background(&self, kind: OperationKind, name: &str, work: &str) -> ControllerResult<OperationResult> {
        let operation = SubscriptionOperation {
            kind,
            target_name: name.to_string(),
            signal_file: self.paths.signal_file(),
        };
        let background = BackgroundOperation::launch(self.channel.clone(), operation, work, self.poll_interval).await?;
        Ok(background.await_completion(self.timeout).await)
    }
}
