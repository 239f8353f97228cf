//! Shared error types for the netproxy controller

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SharedError {
    #[error("Failed to parse {what}: {input:?}")]
    ParseError { what: String, input: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },
}

impl SharedError {
    pub fn parse(what: impl Into<String>, input: impl Into<String>) -> Self {
        Self::ParseError {
            what: what.into(),
            input: input.into(),
        }
    }

    pub fn invalid(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
        }
    }
}

pub type SharedResult<T> = Result<T, SharedError>;
