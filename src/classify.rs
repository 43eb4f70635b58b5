//! Normalization of raw request failures into the error taxonomy
//!
//! The classifier is independent of the mediator: it maps any
//! [`RequestFailure`] to a [`ClassifiedError`] with a stable kind and a
//! user-safe message, never failing itself. Server-provided messages are
//! preferred; each status falls back to a generic wording when the body
//! carries none.

use crate::error::{ClassifiedError, ErrorKind, RequestFailure, TransportError};
use std::collections::HashMap;

/// Path marker of the token renewal endpoint
pub(crate) const REFRESH_ENDPOINT: &str = "/auth/refresh-token";

/// Stateless failure classifier
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify a raw failure of the request sent to `url`
    ///
    /// Logs diagnostic detail for every non-network failure except those
    /// from the refresh endpoint, whose 401s are expected during renewal
    /// races and would only add noise.
    #[must_use]
    pub fn classify(failure: &RequestFailure, url: &str) -> ClassifiedError {
        let classified = match failure {
            RequestFailure::Transport(err) => Self::classify_transport(err),
            RequestFailure::Response { status, body } => {
                Self::classify_response(*status, body.as_ref(), url)
            }
        };

        if classified.kind != ErrorKind::Network && !url.contains(REFRESH_ENDPOINT) {
            tracing::error!(
                url,
                status = failure.status(),
                kind = classified.kind.as_str(),
                message = %classified.message,
                "Request failed"
            );
        }

        classified
    }

    fn classify_transport(err: &TransportError) -> ClassifiedError {
        let message = match err {
            TransportError::Network(_) => {
                "Network error. Please check your connection and try again."
            }
            TransportError::Timeout(_) => {
                "The request timed out. Please check your connection and try again."
            }
        };
        let mut classified = ClassifiedError::network(message);
        classified.status_code = Some(0);
        classified
    }

    fn classify_response(
        status: u16,
        body: Option<&serde_json::Value>,
        url: &str,
    ) -> ClassifiedError {
        let server_message = body.and_then(server_message);
        let message = |fallback: &str| server_message.clone().unwrap_or_else(|| fallback.to_string());

        let (kind, message, field_errors) = match status {
            400 => (
                ErrorKind::Validation,
                message("Invalid request. Please check your input."),
                field_errors(body),
            ),
            401 if url.contains(REFRESH_ENDPOINT) => {
                // The session-expired wording is reserved for the original
                // request; a failing refresh call reports plainly to avoid
                // double auth-error reporting.
                (ErrorKind::Auth, "Authentication failed.".to_string(), None)
            }
            401 => (
                ErrorKind::Auth,
                message("Session expired. Please login again."),
                None,
            ),
            403 => (
                ErrorKind::Forbidden,
                message("Access denied. You don't have permission to perform this action."),
                None,
            ),
            404 => (ErrorKind::NotFound, message("Resource not found."), None),
            409 => (
                ErrorKind::Validation,
                message("This resource already exists."),
                field_errors(body),
            ),
            422 => (
                ErrorKind::Validation,
                message("Validation failed."),
                field_errors(body),
            ),
            429 => (
                ErrorKind::Server,
                message("Too many requests. Please try again later."),
                None,
            ),
            500 => (
                ErrorKind::Server,
                message("Server error. Please try again later."),
                None,
            ),
            502..=504 => (
                ErrorKind::Server,
                "Service temporarily unavailable. Please try again later.".to_string(),
                None,
            ),
            501 | 505..=599 => (
                ErrorKind::Server,
                message("Server error. Please try again later."),
                None,
            ),
            _ => (
                ErrorKind::Unknown,
                message("An unexpected error occurred. Please try again."),
                None,
            ),
        };

        ClassifiedError {
            kind,
            message,
            field_errors,
            status_code: Some(status),
        }
    }
}

/// Server-provided `message` field, when present and a string
fn server_message(body: &serde_json::Value) -> Option<String> {
    body.get("message")
        .and_then(|value| value.as_str())
        .map(str::to_string)
}

/// Per-field validation messages from the body's `errors` mapping
fn field_errors(body: Option<&serde_json::Value>) -> Option<HashMap<String, Vec<String>>> {
    let errors = body?.get("errors")?;
    serde_json::from_value(errors.clone()).ok()
}
