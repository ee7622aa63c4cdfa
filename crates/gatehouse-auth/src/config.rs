//! Authorization service configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the authorization flow engine and token services.
///
/// # Example (TOML)
///
/// ```toml
/// [auth]
/// issuer = "https://auth.example.com"
/// session_lifetime = "10m"
/// access_token_lifetime = "2h"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Issuer name stamped into the `iss` claim of every token.
    pub issuer: String,

    /// Authorization session lifetime.
    #[serde(with = "humantime_serde")]
    pub session_lifetime: Duration,

    /// Authorization code lifetime. Codes are short-lived by design.
    #[serde(with = "humantime_serde")]
    pub code_lifetime: Duration,

    /// Access token lifetime.
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    /// Refresh token lifetime.
    #[serde(with = "humantime_serde")]
    pub refresh_token_lifetime: Duration,

    /// Email one-time-code lifetime.
    #[serde(with = "humantime_serde")]
    pub otp_lifetime: Duration,

    /// Upper bound of live refresh tokens per user; the oldest are pruned
    /// when a new one is issued.
    pub max_refresh_tokens_per_user: usize,

    /// Deadline for any single outbound authenticator call. An elapsed
    /// deadline fails the login with a retryable error instead of hanging
    /// the session.
    #[serde(with = "humantime_serde")]
    pub authenticator_timeout: Duration,

    /// Name of the HttpOnly cookie carrying the session id.
    pub session_cookie: String,

    /// Whether the email one-time-code connection is offered to sessions.
    pub email_otp_enabled: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: "gatehouse".to_string(),
            session_lifetime: Duration::from_secs(600),
            code_lifetime: Duration::from_secs(300),
            access_token_lifetime: Duration::from_secs(7200),
            refresh_token_lifetime: Duration::from_secs(365 * 24 * 3600),
            otp_lifetime: Duration::from_secs(300),
            max_refresh_tokens_per_user: 10,
            authenticator_timeout: Duration::from_secs(10),
            session_cookie: "gh_session".to_string(),
            email_otp_enabled: true,
        }
    }
}

impl AuthConfig {
    /// Session lifetime as a `time::Duration`.
    #[must_use]
    pub fn session_ttl(&self) -> time::Duration {
        to_time(self.session_lifetime)
    }

    /// Code lifetime as a `time::Duration`.
    #[must_use]
    pub fn code_ttl(&self) -> time::Duration {
        to_time(self.code_lifetime)
    }

    /// Access token lifetime as a `time::Duration`.
    #[must_use]
    pub fn access_token_ttl(&self) -> time::Duration {
        to_time(self.access_token_lifetime)
    }

    /// Refresh token lifetime as a `time::Duration`.
    #[must_use]
    pub fn refresh_token_ttl(&self) -> time::Duration {
        to_time(self.refresh_token_lifetime)
    }

    /// OTP lifetime as a `time::Duration`.
    #[must_use]
    pub fn otp_ttl(&self) -> time::Duration {
        to_time(self.otp_lifetime)
    }
}

fn to_time(d: Duration) -> time::Duration {
    time::Duration::seconds(i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}
