use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Convenience alias for fallible crate results.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Structured validation/build error raised before a request is dispatched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(field) = &self.field {
            write!(f, "{}: {}", field, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<String> for ValidationError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ValidationError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Transport-level error (timeouts, DNS/TLS/connectivity, body read failures).
///
/// The dispatcher never surfaces this to callers directly; it is folded into a
/// failure [`Envelope`](crate::Envelope). It stays public because custom
/// [`Transport`](crate::Transport) and [`TokenProvider`](crate::TokenProvider)
/// implementations produce it.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
    #[source]
    pub source: Option<reqwest::Error>,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn connect(message: impl Into<String>, source: reqwest::Error) -> Self {
        Self {
            kind: TransportErrorKind::Connect,
            message: message.into(),
            source: Some(source),
        }
    }

    /// Classify a `reqwest` error into the broad kinds callers can branch on.
    pub fn from_reqwest(message: impl Into<String>, err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_connect() {
            TransportErrorKind::Connect
        } else if err.is_request() {
            TransportErrorKind::Request
        } else {
            TransportErrorKind::Other
        };
        Self {
            kind,
            message: format!("{}: {err}", message.into()),
            source: Some(err),
        }
    }
}

/// Broad transport error kinds for classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Request,
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Connect => "connect",
            TransportErrorKind::Request => "request",
            TransportErrorKind::Other => "transport",
        };
        write!(f, "{label}")
    }
}

/// Unified error type for the few operations that can fail before or outside
/// of a dispatch: client construction, payload encoding, and credential
/// refresh exchanges.
///
/// Dispatch itself never returns this; every per-request outcome is an
/// [`Envelope`](crate::Envelope).
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("credential refresh failed: {0}")]
    CredentialRefresh(String),

    #[error("{0}")]
    Transport(#[from] TransportError),
}
