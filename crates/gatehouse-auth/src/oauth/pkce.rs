//! PKCE (RFC 7636), S256 method only.
//!
//! The legacy `plain` method is not accepted.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};

use crate::error::AuthError;

/// Errors from PKCE validation and verification.
#[derive(Debug, thiserror::Error)]
pub enum PkceError {
    /// Verifier length outside the 43-128 character range.
    #[error("Invalid verifier length: must be 43-128 characters, got {0}")]
    InvalidVerifierLength(usize),

    /// Verifier contains characters outside `[A-Za-z0-9-._~]`.
    #[error("Invalid verifier characters")]
    InvalidVerifierCharacters,

    /// Challenge is not valid base64url.
    #[error("Invalid challenge format")]
    InvalidChallengeFormat,

    /// Method other than S256.
    #[error("Unsupported challenge method: {0}. Only S256 is supported.")]
    UnsupportedMethod(String),

    /// Recomputed challenge does not match.
    #[error("PKCE verification failed")]
    VerificationFailed,
}

impl From<PkceError> for AuthError {
    fn from(err: PkceError) -> Self {
        match err {
            PkceError::VerificationFailed => AuthError::invalid_grant("invalid code verifier"),
            other => AuthError::invalid_request(other.to_string()),
        }
    }
}

/// PKCE challenge method. Only S256 exists here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PkceChallengeMethod {
    /// SHA-256 of the verifier, base64url-encoded.
    #[default]
    S256,
}

impl PkceChallengeMethod {
    /// Parses a method name, rejecting everything but `S256`.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedMethod` for anything else, including `plain`.
    pub fn parse(method: &str) -> Result<Self, PkceError> {
        match method {
            "S256" => Ok(Self::S256),
            other => Err(PkceError::UnsupportedMethod(other.to_string())),
        }
    }

    /// The method name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        "S256"
    }
}

/// PKCE code verifier: 43-128 characters of `[A-Za-z0-9-._~]`.
#[derive(Debug, Clone)]
pub struct PkceVerifier(String);

impl PkceVerifier {
    /// Validates and wraps a verifier string.
    ///
    /// # Errors
    ///
    /// Returns an error on bad length or characters.
    pub fn new(verifier: String) -> Result<Self, PkceError> {
        let len = verifier.len();
        if !(43..=128).contains(&len) {
            return Err(PkceError::InvalidVerifierLength(len));
        }
        if !verifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_' || c == '~')
        {
            return Err(PkceError::InvalidVerifierCharacters);
        }
        Ok(Self(verifier))
    }

    /// Generates a random verifier (32 random bytes, base64url).
    #[must_use]
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// The verifier string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// PKCE code challenge: `BASE64URL(SHA256(ASCII(code_verifier)))`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceChallenge(String);

impl PkceChallenge {
    /// Wraps a challenge received from a client.
    ///
    /// # Errors
    ///
    /// Returns `InvalidChallengeFormat` if not valid base64url.
    pub fn new(challenge: String) -> Result<Self, PkceError> {
        if URL_SAFE_NO_PAD.decode(&challenge).is_err() {
            return Err(PkceError::InvalidChallengeFormat);
        }
        Ok(Self(challenge))
    }

    /// Computes the S256 challenge for a verifier.
    #[must_use]
    pub fn from_verifier(verifier: &PkceVerifier) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(verifier.0.as_bytes());
        Self(URL_SAFE_NO_PAD.encode(hasher.finalize()))
    }

    /// Verifies a verifier against this challenge.
    ///
    /// # Errors
    ///
    /// Returns `VerificationFailed` on mismatch.
    pub fn verify(&self, verifier: &PkceVerifier) -> Result<(), PkceError> {
        if Self::from_verifier(verifier).0 == self.0 {
            Ok(())
        } else {
            Err(PkceError::VerificationFailed)
        }
    }

    /// The challenge string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
