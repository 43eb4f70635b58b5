//! Error types for the HiveFund session layer

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Closed taxonomy of request failure kinds
///
/// Every failed call is normalized into exactly one of these kinds by the
/// [`ErrorClassifier`](crate::classify::ErrorClassifier). Callers can match
/// on the kind without inspecting status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// No response reached the caller (connectivity, DNS, timeout)
    Network,
    /// Request was rejected as invalid (400/409/422), may carry field errors
    Validation,
    /// Session invalid or expired (401)
    Auth,
    /// Authenticated but not allowed (403)
    Forbidden,
    /// Resource does not exist (404)
    NotFound,
    /// Server-side failure or throttling (429/5xx)
    Server,
    /// Anything that fits no other kind
    Unknown,
}

impl ErrorKind {
    /// Stable string form, matching the serde representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Validation => "validation",
            Self::Auth => "auth",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not-found",
            Self::Server => "server",
            Self::Unknown => "unknown",
        }
    }
}

/// Normalized, taxonomy-tagged representation of any request failure
///
/// Immutable value created per failed call. The `message` is always safe to
/// surface to an end user; diagnostic detail goes to the tracing output
/// instead.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{} error: {message}", .kind.as_str())]
pub struct ClassifiedError {
    /// Failure kind from the closed taxonomy
    pub kind: ErrorKind,
    /// Human-readable, user-safe message
    pub message: String,
    /// Per-field validation messages, when the server provided them
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_errors: Option<HashMap<String, Vec<String>>>,
    /// HTTP status code, when a response was received
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl ClassifiedError {
    /// Create a classified error with no field errors or status code
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            field_errors: None,
            status_code: None,
        }
    }

    /// Create an `auth`-kind error for an invalidated session
    #[must_use]
    pub fn session_invalid() -> Self {
        Self {
            kind: ErrorKind::Auth,
            message: "Session expired. Please login again.".to_string(),
            field_errors: None,
            status_code: Some(401),
        }
    }

    /// Create a `network`-kind error
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    /// True if this error should send the caller back to the login surface
    #[must_use]
    pub fn is_auth(&self) -> bool {
        self.kind == ErrorKind::Auth
    }
}

/// Transport-level failure: the request never produced an HTTP response
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Connection could not be established or was interrupted
    #[error("Network error: {0}")]
    Network(String),

    /// The transport's per-request timeout elapsed
    #[error("Request timed out: {0}")]
    Timeout(String),
}

/// Raw failure of an outbound call, before classification
///
/// Either the transport failed outright, or the server answered with a
/// non-success status (body retained for message and field-error extraction).
#[derive(Debug, Clone)]
pub enum RequestFailure {
    /// No response reached the caller
    Transport(TransportError),
    /// The server responded with an error status
    Response {
        /// HTTP status code
        status: u16,
        /// Parsed JSON body, if the server sent one
        body: Option<serde_json::Value>,
    },
}

impl RequestFailure {
    /// Status code of the failure, if a response was received
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport(_) => None,
            Self::Response { status, .. } => Some(*status),
        }
    }
}

impl From<TransportError> for RequestFailure {
    fn from(err: TransportError) -> Self {
        Self::Transport(err)
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}
