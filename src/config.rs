//! Session layer configuration

use std::time::Duration;
use typed_builder::TypedBuilder;

const DEFAULT_API_URL: &str = "http://localhost:3000/api";
const DEFAULT_STORAGE_PREFIX: &str = "hivefund_";

/// Configuration for the session layer
///
/// Constructed by the embedding application; no files or environment
/// variables are read here.
///
/// # Example
///
/// ```
/// use hivefund_session::SessionConfig;
/// use std::time::Duration;
///
/// let config = SessionConfig::builder()
///     .api_url("https://api.example.com/api")
///     .refresh_buffer(Duration::from_secs(120))
///     .build();
/// assert_eq!(config.storage_prefix, "hivefund_");
/// ```
#[derive(Debug, Clone, TypedBuilder)]
pub struct SessionConfig {
    /// Base URL of the remote authority, without a trailing slash
    #[builder(default = DEFAULT_API_URL.to_string(), setter(into))]
    pub api_url: String,

    /// Per-request timeout applied by the transport layer
    #[builder(default = Duration::from_secs(30))]
    pub request_timeout: Duration,

    /// Refresh the access token preemptively when it expires within this window
    #[builder(default = Duration::from_secs(300))]
    pub refresh_buffer: Duration,

    /// Key prefix for the credential store media
    #[builder(default = DEFAULT_STORAGE_PREFIX.to_string(), setter(into))]
    pub storage_prefix: String,

    /// Minimum wait between OTP resend requests
    ///
    /// Advisory only: the session layer does not throttle
    /// [`resend_otp`](crate::session::SessionCoordinator::resend_otp) calls
    /// itself. The embedding UI reads this value to drive its resend
    /// countdown, matching the server's own rate limit.
    #[builder(default = Duration::from_secs(60))]
    pub otp_resend_cooldown: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl SessionConfig {
    /// Full URL for an authority endpoint path (e.g. `/auth/login`)
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.api_url.trim_end_matches('/'))
    }
}
