//! Error types for the adaptation core

use thiserror::Error;

/// Errors raised by the adaptation core.
///
/// Most "nothing to do" outcomes (no evidence, no matching rule, cooldown,
/// infeasible target) are not errors and never surface through this type.
#[derive(Debug, Error)]
pub enum AdaptError {
    #[error("rule catalog line {line}: {message}")]
    CatalogParse { line: usize, message: String },

    #[error("unknown action type: {0}")]
    UnknownActionType(String),

    #[error("unknown comparison operator: {0}")]
    UnknownOperator(String),

    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    #[error("no actuator bound")]
    ActuatorUnavailable,

    #[error("actuator does not support {0}")]
    Unsupported(String),

    #[error("command failed: {0}")]
    CommandFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for AdaptError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<String> for AdaptError {
    fn from(e: String) -> Self {
        Self::CommandFailed(e)
    }
}

impl From<&str> for AdaptError {
    fn from(e: &str) -> Self {
        Self::CommandFailed(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AdaptError>;
