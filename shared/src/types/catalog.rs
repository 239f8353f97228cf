//! Configuration groups, per-node metadata and subscriptions

use serde::{Deserialize, Serialize};

/// Where a group of outbound configs comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKind {
    Default,
    Subscription,
}

/// A directory of outbound config files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigGroup {
    pub kind: GroupKind,
    pub name: String,
    /// Directory below the outbounds root, empty for the default group
    pub dir_name: String,
    /// Member file names in display order
    pub configs: Vec<String>,
    pub url: Option<String>,
    pub updated: Option<String>,
}

impl ConfigGroup {
    pub const DEFAULT_NAME: &'static str = "default";

    /// Path of a member file relative to the outbounds root
    pub fn relative_path(&self, filename: &str) -> String {
        if self.dir_name.is_empty() {
            filename.to_string()
        } else {
            format!("{}/{}", self.dir_name, filename)
        }
    }

    pub fn position(&self, filename: &str) -> Option<usize> {
        self.configs.iter().position(|c| c == filename)
    }
}

/// Descriptive metadata extracted from the head of an outbound config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigInfo {
    pub protocol: String,
    pub address: String,
    pub port: Option<u16>,
}

impl ConfigInfo {
    pub fn unknown() -> Self {
        Self {
            protocol: "unknown".to_string(),
            address: String::new(),
            port: None,
        }
    }

    /// `address:port`, or the bare address when no port was found
    pub fn endpoint(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.address, port),
            None => self.address.clone(),
        }
    }
}

/// `_meta.json` written next to the nodes of a subscription
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionMeta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub updated: Option<String>,
}

/// A remote node subscription as listed from storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub name: String,
    pub dir_name: String,
    pub url: Option<String>,
    pub updated: Option<String>,
    pub node_count: usize,
}
