//! Client for the remote authentication authority
//!
//! The [`Authority`] trait abstracts the five auth endpoints so the session
//! coordinator can be exercised against a mock in tests. [`HttpAuthority`]
//! is the production implementation over reqwest. These calls bypass the
//! request mediator on purpose: they are the bootstrap endpoints the
//! mediator itself skips, and the refresh call must never recurse into the
//! refresh protocol.

use crate::config::SessionConfig;
use crate::error::{RequestFailure, TransportError};
use crate::types::{
    AuthResponse, LoginRequest, RefreshRequest, RefreshResponse, RegisterRequest,
    RegisterResponse, ResendOtpRequest, ResendOtpResponse, VerifyOtpRequest,
};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Remote authority endpoints consumed by the session coordinator
#[async_trait]
pub trait Authority: Send + Sync {
    /// `POST /auth/login`
    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, RequestFailure>;

    /// `POST /auth/register`
    async fn register(&self, request: &RegisterRequest)
    -> Result<RegisterResponse, RequestFailure>;

    /// `POST /auth/verify-otp`
    async fn verify_otp(&self, request: &VerifyOtpRequest)
    -> Result<AuthResponse, RequestFailure>;

    /// `POST /auth/resend-otp`
    async fn resend_otp(
        &self,
        request: &ResendOtpRequest,
    ) -> Result<ResendOtpResponse, RequestFailure>;

    /// `POST /auth/refresh-token` - exchanges the refresh token for a new
    /// access token
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, RequestFailure>;

    /// `POST /auth/logout` - best-effort server-side session teardown
    async fn logout(&self, access_token: &str) -> Result<(), RequestFailure>;
}

/// Production [`Authority`] over a dedicated reqwest client
#[derive(Debug, Clone)]
pub struct HttpAuthority {
    client: reqwest::Client,
    config: SessionConfig,
}

impl HttpAuthority {
    /// Build an authority client with the configured timeout
    ///
    /// # Errors
    /// Returns [`TransportError::Network`] if the underlying client cannot
    /// be constructed.
    pub fn new(config: SessionConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self { client, config })
    }

    async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        bearer: Option<&str>,
    ) -> Result<T, RequestFailure> {
        let url = self.config.endpoint(path);
        let mut builder = self.client.post(&url).json(body);
        if let Some(token) = bearer {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| RequestFailure::Transport(TransportError::from(e)))?;

        let status = response.status().as_u16();
        let body = response.json::<serde_json::Value>().await.ok();

        if !(200..300).contains(&status) {
            return Err(RequestFailure::Response { status, body });
        }

        let payload = body.unwrap_or(serde_json::Value::Null);
        serde_json::from_value(payload.clone()).map_err(|e| {
            tracing::debug!("Unexpected {path} response shape: {e}");
            RequestFailure::Response {
                status,
                body: Some(payload),
            }
        })
    }
}

#[async_trait]
impl Authority for HttpAuthority {
    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, RequestFailure> {
        self.post_json("/auth/login", request, None).await
    }

    async fn register(
        &self,
        request: &RegisterRequest,
    ) -> Result<RegisterResponse, RequestFailure> {
        self.post_json("/auth/register", request, None).await
    }

    async fn verify_otp(
        &self,
        request: &VerifyOtpRequest,
    ) -> Result<AuthResponse, RequestFailure> {
        self.post_json("/auth/verify-otp", request, None).await
    }

    async fn resend_otp(
        &self,
        request: &ResendOtpRequest,
    ) -> Result<ResendOtpResponse, RequestFailure> {
        self.post_json("/auth/resend-otp", request, None).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, RequestFailure> {
        let request = RefreshRequest {
            refresh_token: refresh_token.to_string(),
        };
        self.post_json("/auth/refresh-token", &request, None).await
    }

    async fn logout(&self, access_token: &str) -> Result<(), RequestFailure> {
        let _: serde_json::Value = self
            .post_json("/auth/logout", &serde_json::json!({}), Some(access_token))
            .await?;
        Ok(())
    }
}
