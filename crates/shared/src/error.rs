use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure taxonomy shared by the dispatcher and every ingress adapter.
///
/// Serialized with the variant name as-is (`"UnknownPlugin"`), which is the
/// spelling the HTTP surface exposes in its `error` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    UnknownPlugin,
    BadRequest,
    HandlerFailed,
    BusClosed,
    Timeout,
    Busy,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::UnknownPlugin => "UnknownPlugin",
            ErrorKind::BadRequest => "BadRequest",
            ErrorKind::HandlerFailed => "HandlerFailed",
            ErrorKind::BusClosed => "BusClosed",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Busy => "Busy",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("command bus is closed")]
    Closed,
    #[error("command queue is full")]
    Busy,
}

impl BusError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BusError::Closed => ErrorKind::BusClosed,
            BusError::Busy => ErrorKind::Busy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandParseError {
    #[error("command is empty")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("plugin `{0}` is already registered")]
    DuplicateName(String),
    #[error("`{0}` cannot be used as a plugin name")]
    InvalidName(String),
}

/// Failure reported by a plugin handler. Every variant surfaces to the
/// caller as [`ErrorKind::HandlerFailed`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginError {
    #[error("missing parameters {expected}; usage: {usage}")]
    MissingParameters { expected: String, usage: String },
    #[error("invalid parameter {name}: `{value}`")]
    InvalidParameter { name: String, value: String },
    #[error("unsupported action `{0}`")]
    UnsupportedAction(String),
    #[error("{0}")]
    Failed(String),
}

impl PluginError {
    pub fn missing(expected: impl Into<String>, usage: impl Into<String>) -> Self {
        Self::MissingParameters {
            expected: expected.into(),
            usage: usage.into(),
        }
    }

    pub fn invalid(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            value: value.into(),
        }
    }
}
