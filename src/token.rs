//! Bearer token claim decoding and expiry checks
//!
//! Tokens are treated as opaque bearer credentials issued by the remote
//! authority. The validator reads the claim payload without any
//! cryptographic verification - just enough to answer "is this token
//! structurally valid and unexpired". Malformed input is treated as an
//! expired token, never as an error.

use base64::{
    Engine,
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use serde::Deserialize;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Claims read from a bearer token payload
///
/// Unknown claims are ignored; both fields are optional because the token
/// format is not trusted.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenClaims {
    /// Subject (user id)
    #[serde(default)]
    pub sub: Option<String>,
    /// Expiry as epoch seconds
    #[serde(default)]
    pub exp: Option<i64>,
}

/// Stateless validator for bearer tokens
///
/// Pure queries only - no storage access, no network, no error propagation
/// beyond soft-fail options and booleans.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenValidator;

impl TokenValidator {
    /// Decode a token's claim payload
    ///
    /// Accepts the standard three-segment form (claims in the middle
    /// segment) as well as a bare base64 JSON payload. Returns `None` on any
    /// malformed input rather than raising.
    #[must_use]
    pub fn decode(token: &str) -> Option<TokenClaims> {
        if token.is_empty() {
            return None;
        }

        let segments: Vec<&str> = token.split('.').collect();
        let payload = match segments.len() {
            3 => segments[1],
            1 => segments[0],
            _ => return None,
        };

        let bytes = decode_segment(payload)?;
        match serde_json::from_slice(&bytes) {
            Ok(claims) => Some(claims),
            Err(e) => {
                tracing::debug!("Token payload is not valid claims JSON: {e}");
                None
            }
        }
    }

    /// Expiry instant of the token, if it carries a parsable `exp` claim
    #[must_use]
    pub fn expiry(token: &str) -> Option<SystemTime> {
        let exp = Self::decode(token)?.exp?;
        u64::try_from(exp).ok().map(|secs| UNIX_EPOCH + Duration::from_secs(secs))
    }

    /// True if claims are absent, unparsable, or the expiry is at or before now
    #[must_use]
    pub fn is_expired(token: &str) -> bool {
        match Self::expiry(token) {
            Some(expiry) => expiry <= SystemTime::now(),
            None => true,
        }
    }

    /// True iff claims are present and the token is unexpired
    #[must_use]
    pub fn is_valid(token: &str) -> bool {
        !token.is_empty() && Self::decode(token).is_some() && !Self::is_expired(token)
    }

    /// Non-negative duration until expiry; zero if expired or unparsable
    #[must_use]
    pub fn time_until_expiry(token: &str) -> Duration {
        Self::expiry(token)
            .and_then(|expiry| expiry.duration_since(SystemTime::now()).ok())
            .unwrap_or(Duration::ZERO)
    }

    /// True iff the token is still valid but expires within `buffer`
    ///
    /// Used to renew slightly before hard expiry instead of waiting for a
    /// 401 on a live request.
    #[must_use]
    pub fn should_preemptively_refresh(token: &str, buffer: Duration) -> bool {
        let remaining = Self::time_until_expiry(token);
        remaining > Duration::ZERO && remaining < buffer
    }
}

/// Decode a base64 segment, tolerating both url-safe and standard alphabets
fn decode_segment(segment: &str) -> Option<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .or_else(|_| STANDARD.decode(segment))
        .ok()
}
