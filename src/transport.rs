//! Transport layer for outbound HTTP requests
//!
//! The [`Dispatch`] trait is the seam between the request mediator and the
//! network. Any HTTP response - success or error status - is returned as
//! `Ok(HttpResponse)`; `Err(TransportError)` means no response reached the
//! caller at all. Per-request timeouts are owned here, and a timed-out
//! request surfaces as a transport error, never as an authorization failure.

use crate::config::SessionConfig;
use crate::error::TransportError;
use async_trait::async_trait;

/// HTTP method of an outbound request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// DELETE
    Delete,
}

/// An outbound request before token attachment
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute request URL
    pub url: String,
    /// JSON body, for methods that carry one
    pub body: Option<serde_json::Value>,
    /// Bearer credential attached by the mediator; not set by callers
    pub bearer: Option<String>,
}

impl HttpRequest {
    /// GET request
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            body: None,
            bearer: None,
        }
    }

    /// POST request with a JSON body
    pub fn post(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            body: Some(body),
            bearer: None,
        }
    }

    /// PUT request with a JSON body
    pub fn put(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Put,
            url: url.into(),
            body: Some(body),
            bearer: None,
        }
    }

    /// DELETE request
    pub fn delete(url: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            url: url.into(),
            body: None,
            bearer: None,
        }
    }

    /// Copy of this request with the given bearer credential attached
    #[must_use]
    pub fn with_bearer(&self, token: &str) -> Self {
        let mut request = self.clone();
        request.bearer = Some(token.to_string());
        request
    }

    /// `Authorization` header value for the attached credential, if any
    #[must_use]
    pub fn authorization_header(&self) -> Option<String> {
        self.bearer.as_ref().map(|token| format!("Bearer {token}"))
    }
}

/// An HTTP response, regardless of status
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Parsed JSON body, if the server sent one
    pub body: Option<serde_json::Value>,
}

impl HttpResponse {
    /// True for 2xx statuses
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// True for an HTTP 401 authorization failure
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        self.status == 401
    }
}

/// Dispatches a single request over the wire
///
/// Implementations must be cheap to share behind an `Arc` and safe to call
/// concurrently.
#[async_trait]
pub trait Dispatch: Send + Sync {
    /// Send the request and wait for its response
    ///
    /// # Errors
    /// Returns [`TransportError`] only when no HTTP response was received.
    async fn dispatch(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Production [`Dispatch`] over a shared [`reqwest::Client`]
#[derive(Debug, Clone)]
pub struct ReqwestDispatch {
    client: reqwest::Client,
}

impl ReqwestDispatch {
    /// Build a dispatcher with the configured per-request timeout
    ///
    /// # Errors
    /// Returns [`TransportError::Network`] if the underlying client cannot
    /// be constructed.
    pub fn new(config: &SessionConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self { client })
    }

    /// Wrap an existing client (shared connection pool)
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Dispatch for ReqwestDispatch {
    async fn dispatch(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
            Method::Put => self.client.put(&request.url),
            Method::Delete => self.client.delete(&request.url),
        };

        if let Some(header) = request.authorization_header() {
            builder = builder.header("Authorization", header);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(TransportError::from)?;
        let status = response.status().as_u16();
        // Bodies are JSON or empty on this API; anything else is discarded
        let body = response.json::<serde_json::Value>().await.ok();

        Ok(HttpResponse { status, body })
    }
}
