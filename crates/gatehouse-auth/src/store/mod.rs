//! Session, authorization-code, refresh-token, and one-time-code storage.
//!
//! The contract is implementation-agnostic. Two implementations exist:
//! an in-process map store and a Redis-backed store. Both guarantee:
//!
//! - lookups never return entries past their `expires_at`
//! - `mark_code_used` is a single atomic check-and-mark; of N concurrent
//!   callers exactly one succeeds, the rest fail with `CodeUsed`

pub mod memory;
pub mod redis;

pub use memory::MemoryStore;
pub use self::redis::RedisStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::oauth::session::{AuthSession, AuthorizationCode};
use crate::AuthResult;

/// A refresh token record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshToken {
    /// The opaque token value.
    pub token: String,

    /// Owning user.
    pub user_id: String,

    /// Client the token was issued to.
    pub client_id: String,

    /// Relying service the access tokens target.
    pub audience: String,

    /// Scope carried over to refreshed access tokens.
    pub scope: String,

    /// When the token expires.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// Whether the token has been revoked.
    pub revoked: bool,

    /// When the token was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl RefreshToken {
    /// Returns `true` if the token is neither revoked nor expired.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.revoked && OffsetDateTime::now_utc() < self.expires_at
    }
}

/// Generates an opaque refresh token value (256 bits of entropy).
#[must_use]
pub fn generate_refresh_token_value() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Storage contract for flow state.
///
/// Lookups distinguish "never existed" from "existed but expired"
/// (`FlowNotFound` vs `FlowExpired`, `CodeNotFound` vs `CodeExpired`); both
/// read as a miss to callers, never as stale data.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persists a new session with its TTL.
    async fn save_session(&self, session: &AuthSession) -> AuthResult<()>;

    /// Loads a live session.
    ///
    /// # Errors
    ///
    /// `FlowNotFound` on miss, `FlowExpired` past `expires_at`.
    async fn get_session(&self, session_id: &str) -> AuthResult<AuthSession>;

    /// Replaces a session's stored state.
    async fn update_session(&self, session: &AuthSession) -> AuthResult<()>;

    /// Removes a session.
    async fn delete_session(&self, session_id: &str) -> AuthResult<()>;

    /// Persists a new authorization code.
    async fn save_code(&self, code: &AuthorizationCode) -> AuthResult<()>;

    /// Loads a live, unredeemed authorization code.
    ///
    /// # Errors
    ///
    /// `CodeNotFound` on miss, `CodeExpired` past `expires_at`, `CodeUsed`
    /// after redemption.
    async fn get_code(&self, code: &str) -> AuthResult<AuthorizationCode>;

    /// Atomically checks and marks a code as redeemed.
    ///
    /// # Errors
    ///
    /// `CodeUsed` for every caller after the first winner; `CodeNotFound` /
    /// `CodeExpired` as for [`Self::get_code`].
    async fn mark_code_used(&self, code: &str) -> AuthResult<()>;

    /// Removes a code.
    async fn delete_code(&self, code: &str) -> AuthResult<()>;

    /// Persists a refresh token.
    async fn save_refresh_token(&self, token: &RefreshToken) -> AuthResult<()>;

    /// Loads a live refresh token.
    ///
    /// # Errors
    ///
    /// `RefreshTokenNotFound`, `RefreshTokenExpired`, or
    /// `RefreshTokenRevoked`.
    async fn get_refresh_token(&self, token: &str) -> AuthResult<RefreshToken>;

    /// Revokes a refresh token. Unknown tokens are not an error.
    async fn revoke_refresh_token(&self, token: &str) -> AuthResult<()>;

    /// Revokes every refresh token belonging to a user. Returns how many
    /// were revoked.
    async fn revoke_user_refresh_tokens(&self, user_id: &str) -> AuthResult<u64>;

    /// Lists a user's live refresh tokens, oldest first, optionally
    /// filtered by client.
    async fn list_user_refresh_tokens(
        &self,
        user_id: &str,
        client_id: Option<&str>,
    ) -> AuthResult<Vec<RefreshToken>>;

    /// Stores a one-time code under a key with a TTL.
    async fn save_otp(&self, key: &str, code: &str, ttl: time::Duration) -> AuthResult<()>;

    /// Reads a live one-time code. Expired and missing read identically as
    /// `None`.
    async fn get_otp(&self, key: &str) -> AuthResult<Option<String>>;

    /// Removes a one-time code.
    async fn delete_otp(&self, key: &str) -> AuthResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_token_validity() {
        let now = OffsetDateTime::now_utc();
        let mut token = RefreshToken {
            token: generate_refresh_token_value(),
            user_id: "u_1".to_string(),
            client_id: "c1".to_string(),
            audience: "svc1".to_string(),
            scope: "openid".to_string(),
            expires_at: now + time::Duration::days(365),
            revoked: false,
            created_at: now,
        };
        assert!(token.is_valid());

        token.revoked = true;
        assert!(!token.is_valid());

        token.revoked = false;
        token.expires_at = now - time::Duration::seconds(1);
        assert!(!token.is_valid());
    }

    #[test]
    fn test_refresh_token_value_entropy() {
        let a = generate_refresh_token_value();
        let b = generate_refresh_token_value();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }
}
