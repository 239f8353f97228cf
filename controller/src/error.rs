//! Controller-specific error types

use shared::SharedError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("Privileged channel unreachable: {message}")]
    ChannelUnreachable { message: String },

    #[error("Command exited with code {exit_code}: {stderr}")]
    CommandFailed { exit_code: i32, stderr: String },

    #[error("Unexpected output from {what}: {detail}")]
    ParseFailed { what: String, detail: String },

    #[error("Probe result rejected: {reason}")]
    ProbeInvalid { reason: String },

    #[error("HTTP request failed: {message}")]
    HttpError { message: String },

    #[error("Configuration error: {field}")]
    ConfigurationError { field: String },

    #[error("Shared component error: {0}")]
    SharedError(#[from] SharedError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl ControllerError {
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::ChannelUnreachable {
            message: message.into(),
        }
    }

    pub fn parse(what: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ParseFailed {
            what: what.into(),
            detail: detail.into(),
        }
    }

    pub fn config(field: impl Into<String>) -> Self {
        Self::ConfigurationError {
            field: field.into(),
        }
    }

    /// True when the privileged channel itself could not be used
    pub fn is_channel_failure(&self) -> bool {
        matches!(self, Self::ChannelUnreachable { .. })
    }
}

impl From<reqwest::Error> for ControllerError {
    fn from(error: reqwest::Error) -> Self {
        Self::HttpError {
            message: error.to_string(),
        }
    }
}

pub type ControllerResult<T> = Result<T, ControllerError>;
