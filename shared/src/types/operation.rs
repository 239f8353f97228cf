//! Results of mutating operations

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Subscription operation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Add,
    Update,
    Remove,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Add => write!(f, "add"),
            OperationKind::Update => write!(f, "update"),
            OperationKind::Remove => write!(f, "remove"),
        }
    }
}

/// A subscription operation in flight
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionOperation {
    pub kind: OperationKind,
    pub target_name: String,
    pub signal_file: PathBuf,
}

/// Why a mutating operation did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationFailure {
    /// No terminal signal was observed within the budget; the work may still finish
    TimedOut,
    /// The operation reported failure
    Failed { message: String },
}

impl fmt::Display for OperationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationFailure::TimedOut => write!(f, "operation timed out"),
            OperationFailure::Failed { message } => write!(f, "operation failed: {message}"),
        }
    }
}

/// Uniform `{success, error?}` result of a mutating operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl OperationResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            output: None,
        }
    }

    pub fn ok_with_output(output: impl Into<String>) -> Self {
        Self {
            output: Some(output.into()),
            ..Self::ok()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(OperationFailure::Failed {
                message: message.into(),
            }),
            output: None,
        }
    }

    pub fn timed_out() -> Self {
        Self {
            success: false,
            error: Some(OperationFailure::TimedOut),
            output: None,
        }
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self.error, Some(OperationFailure::TimedOut))
    }
}

/// Outcome of pruning nodes whose last latency probe failed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneReport {
    pub candidates: Vec<String>,
    pub deleted: Vec<String>,
}

impl PruneReport {
    pub fn success_count(&self) -> usize {
        self.deleted.len()
    }
}
