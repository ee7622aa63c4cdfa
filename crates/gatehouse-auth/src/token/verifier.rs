//! Token verifier.
//!
//! Verification resolves both halves of the double envelope from the token
//! itself: the audience names the service whose key opens `sub`, and the
//! `cli` claim names the client whose domain public key must verify the
//! signature.

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Validation, decode};
use serde::Deserialize;

use crate::directory::Directory;
use crate::error::AuthError;
use crate::AuthResult;

use super::claims::{Claims, EnvelopeClaims, Identity};
use super::KeyProvider;

/// Verifies access tokens minted by [`super::TokenIssuer`].
pub struct TokenVerifier {
    directory: Arc<dyn Directory>,
    keys: Arc<dyn KeyProvider>,
}

/// The claims read before signature verification. Only enough to route the
/// key lookups; nothing here is trusted until the signature checks out.
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(default)]
    aud: Option<String>,
    #[serde(default)]
    cli: Option<String>,
}

impl TokenVerifier {
    /// Creates a new verifier.
    #[must_use]
    pub fn new(directory: Arc<dyn Directory>, keys: Arc<dyn KeyProvider>) -> Self {
        Self { directory, keys }
    }

    /// Verifies an access token and returns the caller's identity.
    ///
    /// Steps: read `aud`/`cli` without verifying, resolve the service key
    /// and the client's domain public key, verify the signature (with
    /// `exp`/`nbf`), then open `sub` when present. Service tokens carry no
    /// `sub` and yield an identity with an empty `open_id`.
    ///
    /// # Errors
    ///
    /// - `MissingClaims` when `aud` or `cli` is absent
    /// - `UnsupportedAudience` when the audience is not a known service
    /// - `UnknownClient` when `cli` does not resolve
    /// - `InvalidSignature` / `TokenExpired` on failed validation
    /// - `Crypto` when `sub` cannot be opened with the service key
    pub async fn verify(&self, token: &str) -> AuthResult<Identity> {
        // 1. Route the key lookups from the unverified payload.
        let raw = decode_unverified(token)?;
        let audience = raw
            .aud
            .filter(|a| !a.is_empty())
            .ok_or_else(|| AuthError::missing_claim("aud"))?;
        let client_id = raw
            .cli
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AuthError::missing_claim("cli"))?;

        // 2. Service key for the sealed subject.
        let service_key = self.keys.service_key(&audience).await?;

        // 3. Client -> domain -> public key.
        let client = self
            .directory
            .client(&client_id)
            .await?
            .ok_or_else(|| AuthError::unknown_client(&client_id))?;
        let key_pair = self.keys.signing_key(&client.domain_id).await?;

        // 4. Signature and time-claim validation.
        let mut validation = Validation::new(key_pair.algorithm.to_jwt_algorithm());
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.validate_aud = false;

        let data = decode::<EnvelopeClaims>(token, key_pair.decoding_key(), &validation)
            .map_err(map_jwt_error)?;
        let envelope = data.claims;

        // 5. Open the sealed subject, if any.
        let mut identity = Identity {
            client_id,
            audience,
            issuer: envelope.iss,
            scope: envelope.scope,
            ..Identity::default()
        };

        if let Some(sealed) = envelope.sub.filter(|s| !s.is_empty()) {
            let plaintext = service_key.open(&sealed)?;
            let claims: Claims = serde_json::from_slice(&plaintext)
                .map_err(|e| AuthError::crypto(format!("decode sealed claims: {e}")))?;
            identity.open_id = claims.open_id;
            identity.nickname = claims.nickname;
            identity.picture = claims.picture;
            identity.email = claims.email;
            identity.phone = claims.phone;
        }

        Ok(identity)
    }
}

/// Decodes the payload segment of a JWT without verifying the signature.
fn decode_unverified(token: &str) -> AuthResult<RawEnvelope> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| AuthError::unauthorized("malformed token"))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| AuthError::unauthorized("malformed token payload"))?;
    serde_json::from_slice(&bytes).map_err(|_| AuthError::unauthorized("malformed token claims"))
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    use jsonwebtoken::errors::ErrorKind;

    match err.kind() {
        ErrorKind::ExpiredSignature | ErrorKind::ImmatureSignature => AuthError::TokenExpired,
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::MissingRequiredClaim(claim) => AuthError::missing_claim(claim.clone()),
        _ => AuthError::InvalidSignature,
    }
}
