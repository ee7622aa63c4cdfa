//! Email one-time-code authentication strategy.
//!
//! Codes are 6 numeric digits stored under `email:<address>` with a short
//! TTL. Verification failure is one opaque error: it never reveals whether
//! the code was missing, expired, or wrong.

use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, info};

use crate::error::AuthError;
use crate::oauth::session::ConnectionKind;
use crate::store::SessionStore;
use crate::AuthResult;

use super::{Authentication, Authenticator, required_str};

/// Connection string served by this strategy.
pub const EMAIL_CONNECTION: &str = "email";

/// Number of digits in a one-time code.
const OTP_DIGITS: usize = 6;

/// Delivers one-time codes. The mail pipeline itself lives elsewhere.
#[async_trait]
pub trait OtpSender: Send + Sync {
    /// Sends a code to a recipient.
    ///
    /// # Errors
    ///
    /// Returns an error if delivery fails; the code stays stored either way.
    async fn send(&self, recipient: &str, code: &str) -> AuthResult<()>;
}

/// Development sender that only logs. Codes appear at debug level.
#[derive(Debug, Default)]
pub struct LogOtpSender;

#[async_trait]
impl OtpSender for LogOtpSender {
    async fn send(&self, recipient: &str, code: &str) -> AuthResult<()> {
        info!(recipient, "one-time code issued");
        debug!(recipient, code, "one-time code (development sender)");
        Ok(())
    }
}

/// Email one-time-code [`Authenticator`].
pub struct EmailOtpAuthenticator {
    store: Arc<dyn SessionStore>,
    sender: Arc<dyn OtpSender>,
    ttl: time::Duration,
}

impl EmailOtpAuthenticator {
    /// Creates the strategy.
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, sender: Arc<dyn OtpSender>, ttl: time::Duration) -> Self {
        Self { store, sender, ttl }
    }

    /// Issues a fresh code for an address and hands it to the sender.
    /// A previous unexpired code for the same address is replaced.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the code cannot be stored, or the sender's
    /// error if delivery fails.
    pub async fn send_code(&self, email: &str) -> AuthResult<()> {
        let code = generate_otp();
        self.store.save_otp(&otp_key(email), &code, self.ttl).await?;
        self.sender.send(email, &code).await?;
        info!(email, "email one-time code sent");
        Ok(())
    }
}

#[async_trait]
impl Authenticator for EmailOtpAuthenticator {
    fn kind(&self) -> ConnectionKind {
        ConnectionKind::EmailOtp
    }

    fn supports(&self, connection: &str) -> bool {
        connection == EMAIL_CONNECTION
    }

    async fn authenticate(
        &self,
        _connection: &str,
        data: &serde_json::Value,
    ) -> AuthResult<Authentication> {
        let email = required_str(data, "email")?;
        let code = required_str(data, "code")?;

        let stored = self.store.get_otp(&otp_key(email)).await?;
        match stored {
            Some(expected) if expected == code => {
                self.store.delete_otp(&otp_key(email)).await?;
                info!(email, "email one-time code verified");
                Ok(Authentication {
                    provider_id: email.to_string(),
                    union_id: None,
                    raw_data: None,
                })
            }
            // One error for missing, expired, and mismatched codes.
            _ => Err(AuthError::authentication_failed("invalid or expired code")),
        }
    }
}

fn otp_key(email: &str) -> String {
    format!("email:{email}")
}

fn generate_otp() -> String {
    let mut rng = rand::thread_rng();
    (0..OTP_DIGITS)
        .map(|_| char::from(b'0' + rng.gen_range(0..10)))
        .collect()
}
