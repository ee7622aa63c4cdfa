//! Token issuer.
//!
//! Builds the double envelope: identity claims are scope-filtered, sealed
//! with the audience service's symmetric key into `sub`, and the whole
//! envelope is signed with the issuing domain's private key. The relying
//! service's key is only touched at mint time, never escrowed.

use std::sync::Arc;

use jsonwebtoken::{Header, encode};
use time::OffsetDateTime;

use crate::error::AuthError;
use crate::AuthResult;

use super::claims::{Claims, EnvelopeClaims};
use super::KeyProvider;

/// Mints signed (and, for users, sealed) access tokens.
pub struct TokenIssuer {
    issuer: String,
    keys: Arc<dyn KeyProvider>,
}

impl TokenIssuer {
    /// Creates a new issuer.
    #[must_use]
    pub fn new(issuer: impl Into<String>, keys: Arc<dyn KeyProvider>) -> Self {
        Self {
            issuer: issuer.into(),
            keys,
        }
    }

    /// The issuer name stamped into minted tokens.
    #[must_use]
    pub fn issuer_name(&self) -> &str {
        &self.issuer
    }

    /// Issues a user access token.
    ///
    /// The claims are filtered to the granted scope, sealed with the
    /// audience service's key, and carried as the envelope's `sub`.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedAudience` for unknown services and `Crypto` for
    /// key or signing failures.
    pub async fn issue_user_token(
        &self,
        client_id: &str,
        domain_id: &str,
        audience: &str,
        scope: &str,
        ttl: time::Duration,
        user: &Claims,
    ) -> AuthResult<String> {
        let service_key = self.keys.service_key(audience).await?;

        let filtered = user.filtered_by_scope(scope);
        let payload = serde_json::to_vec(&filtered)
            .map_err(|e| AuthError::crypto(format!("serialize claims: {e}")))?;
        let sealed = service_key.seal(&payload)?;

        let envelope = self.envelope(client_id, audience, scope, ttl, Some(sealed));
        self.sign(domain_id, &envelope).await
    }

    /// Issues a machine-to-machine service access token. No subject.
    ///
    /// # Errors
    ///
    /// Returns `Crypto` for key or signing failures.
    pub async fn issue_service_token(
        &self,
        client_id: &str,
        domain_id: &str,
        audience: &str,
        scope: &str,
        ttl: time::Duration,
    ) -> AuthResult<String> {
        let envelope = self.envelope(client_id, audience, scope, ttl, None);
        self.sign(domain_id, &envelope).await
    }

    fn envelope(
        &self,
        client_id: &str,
        audience: &str,
        scope: &str,
        ttl: time::Duration,
        sub: Option<String>,
    ) -> EnvelopeClaims {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        EnvelopeClaims {
            iss: self.issuer.clone(),
            aud: audience.to_string(),
            cli: client_id.to_string(),
            iat: now,
            exp: now + ttl.whole_seconds(),
            nbf: now,
            jti: generate_jti(),
            scope: scope.to_string(),
            sub,
        }
    }

    async fn sign(&self, domain_id: &str, envelope: &EnvelopeClaims) -> AuthResult<String> {
        let key_pair = self.keys.signing_key(domain_id).await?;

        let mut header = Header::new(key_pair.algorithm.to_jwt_algorithm());
        header.kid = Some(key_pair.kid.clone());

        encode(&header, envelope, key_pair.encoding_key())
            .map_err(|e| AuthError::crypto(format!("sign token: {e}")))
    }
}

/// Generates a fresh random token id.
#[must_use]
pub fn generate_jti() -> String {
    let mut bytes = [0u8; 16];
    rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut bytes);
    hex::encode(bytes)
}
