//! Data shapes shared across the session layer
//!
//! Wire types use camelCase field names to match the authority's JSON
//! protocol (`accessToken`, `refreshToken`, ...). The same shapes are used
//! for credential persistence, so stored values survive a protocol-faithful
//! round trip.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Access/refresh token pair issued by the authority
///
/// The two tokens are always persisted together or not at all; a partial
/// pair never exists in storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    /// Short-lived bearer credential sent on each authenticated request
    pub access_token: String,
    /// Longer-lived credential exchanged for new access tokens
    pub refresh_token: String,
    /// Absolute expiry of the access token (epoch seconds), when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl TokenPair {
    /// Create a pair with no recorded expiry
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at: None,
        }
    }

    /// Same pair with the access token replaced (after a refresh)
    #[must_use]
    pub fn with_access_token(&self, access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: self.refresh_token.clone(),
            expires_at: self.expires_at,
        }
    }
}

/// Authenticated user identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    /// Stable user identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Primary contact handle
    pub phone_number: String,
    /// Optional secondary contact handle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Whether the account has completed OTP verification
    pub verified: bool,
    /// Account creation time
    pub created_at: DateTime<Utc>,
    /// Last profile update time
    pub updated_at: DateTime<Utc>,
}

/// Process-wide session state
///
/// Single instance owned by the
/// [`SessionCoordinator`](crate::session::SessionCoordinator); reset on
/// logout and rehydrated at startup from the credential store.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    /// Current authenticated principal, if any
    pub principal: Option<Principal>,
    /// Whether a valid session is established
    pub authenticated: bool,
}

/// Storage lifetime chosen at login based on the "remember me" input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceScope {
    /// Survives process restarts
    Durable,
    /// Lives for the current process only
    Ephemeral,
}

impl PersistenceScope {
    /// Scope for a "remember me" choice
    #[must_use]
    pub fn from_remember_me(remember_me: bool) -> Self {
        if remember_me { Self::Durable } else { Self::Ephemeral }
    }

    /// The "remember me" flag this scope encodes
    #[must_use]
    pub fn remembered(&self) -> bool {
        matches!(self, Self::Durable)
    }
}

// ============================================================================
// Authority wire shapes
// ============================================================================

/// Body of `POST /auth/login`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Phone number in international format
    pub phone_number: String,
    /// Account password
    pub password: String,
}

/// Body of `POST /auth/register`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    /// Display name
    pub name: String,
    /// Phone number in international format
    pub phone_number: String,
    /// Chosen password
    pub password: String,
}

/// Response of `POST /auth/register`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    /// Whether registration was accepted
    pub success: bool,
    /// Server-provided status message
    pub message: String,
    /// Identifier to use for OTP verification
    pub user_id: String,
}

/// Response of `POST /auth/login` and `POST /auth/verify-otp`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    /// Whether authentication succeeded
    pub success: bool,
    /// Issued access token
    pub access_token: String,
    /// Issued refresh token
    pub refresh_token: String,
    /// Authenticated principal
    pub user: Principal,
}

/// Body of `POST /auth/verify-otp`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpRequest {
    /// Identifier returned at registration
    pub user_id: String,
    /// One-time code received out of band
    pub code: String,
}

/// Body of `POST /auth/resend-otp`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResendOtpRequest {
    /// Identifier returned at registration
    pub user_id: String,
}

/// Response of `POST /auth/resend-otp`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResendOtpResponse {
    /// Whether a new code was sent
    pub success: bool,
    /// Optional status message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Body of `POST /auth/refresh-token`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    /// Current refresh token
    pub refresh_token: String,
}

/// Response of `POST /auth/refresh-token`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    /// Newly issued access token
    pub access_token: String,
}
