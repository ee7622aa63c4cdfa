//! Pluggable authentication strategies.
//!
//! A session's connection map names which connections it may use; the flow
//! engine dispatches a login to the first registered [`Authenticator`] whose
//! `supports` returns true for the chosen connection.

pub mod email;
pub mod idp;

pub use email::{EmailOtpAuthenticator, LogOtpSender, OtpSender};
pub use idp::IdpAuthenticator;

use async_trait::async_trait;

use crate::oauth::session::ConnectionKind;
use crate::AuthResult;

/// Normalized authentication result.
#[derive(Debug, Clone)]
pub struct Authentication {
    /// Provider-side user identifier (an openid, an email address, ...).
    pub provider_id: String,

    /// Cross-application union identifier, when the provider has one.
    pub union_id: Option<String>,

    /// Raw provider data, retained for auditing.
    pub raw_data: Option<String>,
}

/// One authentication strategy.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Which kind of connection this strategy serves.
    fn kind(&self) -> ConnectionKind;

    /// Returns `true` if this strategy handles the connection.
    fn supports(&self, connection: &str) -> bool;

    /// Authenticates opaque connection data.
    ///
    /// # Errors
    ///
    /// Returns `AuthenticationFailed` on bad credentials and
    /// `InvalidRequest` on missing inputs. Failures are never retried by
    /// the engine.
    async fn authenticate(
        &self,
        connection: &str,
        data: &serde_json::Value,
    ) -> AuthResult<Authentication>;
}

/// Reads a required string field from login data.
pub(crate) fn required_str<'a>(
    data: &'a serde_json::Value,
    field: &str,
) -> AuthResult<&'a str> {
    data.get(field)
        .and_then(serde_json::Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| crate::error::AuthError::invalid_request(format!("{field} is required")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_str() {
        let data = serde_json::json!({"email": "a@b.com", "empty": ""});
        assert_eq!(required_str(&data, "email").unwrap(), "a@b.com");
        assert!(required_str(&data, "empty").is_err());
        assert!(required_str(&data, "missing").is_err());
    }
}
