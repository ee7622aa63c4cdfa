//! Per-domain signing key pairs.
//!
//! Each tenant domain owns one asymmetric key pair; tokens minted for any
//! client in that domain are signed with it. `jsonwebtoken` does not generate
//! keys, so generation goes through the `rsa` and `p384` crates.

use std::fmt;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use p384::SecretKey as EcSecretKey;
use rand::rngs::OsRng;
use rsa::RsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};

use crate::error::AuthError;
use crate::AuthResult;

/// Supported signing algorithms for the token envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningAlgorithm {
    /// RSA with SHA-256 (for imported keys).
    RS256,
    /// ECDSA with P-384 curve (default for generated keys).
    ES384,
}

impl SigningAlgorithm {
    /// Converts to the `jsonwebtoken` Algorithm type.
    #[must_use]
    pub fn to_jwt_algorithm(self) -> Algorithm {
        match self {
            Self::RS256 => Algorithm::RS256,
            Self::ES384 => Algorithm::ES384,
        }
    }

    /// Returns the algorithm name as used in JWT headers.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RS256 => "RS256",
            Self::ES384 => "ES384",
        }
    }

    /// Parses an algorithm name.
    ///
    /// # Errors
    ///
    /// Returns `Crypto` if the name is not a supported algorithm.
    pub fn parse(name: &str) -> AuthResult<Self> {
        match name {
            "RS256" => Ok(Self::RS256),
            "ES384" => Ok(Self::ES384),
            other => Err(AuthError::crypto(format!("unsupported signing algorithm: {other}"))),
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A domain's signing key pair.
///
/// Holds both the `jsonwebtoken` encoding/decoding keys and the PEM forms
/// so a directory backend can persist what it handed out.
pub struct DomainKeyPair {
    /// Key identifier.
    pub kid: String,

    /// Signing algorithm this key pair is used with.
    pub algorithm: SigningAlgorithm,

    encoding_key: EncodingKey,
    decoding_key: DecodingKey,

    /// PKCS#8 PEM private key.
    pub private_pem: String,
    /// SPKI PEM public key.
    pub public_pem: String,
}

impl fmt::Debug for DomainKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainKeyPair")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl DomainKeyPair {
    /// Generates a new ES384 key pair.
    ///
    /// # Errors
    ///
    /// Returns `Crypto` if key generation or encoding fails.
    pub fn generate_es384() -> AuthResult<Self> {
        let secret_key = EcSecretKey::random(&mut OsRng);

        let private_pem = secret_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| AuthError::crypto(format!("encode EC private key: {e}")))?
            .to_string();

        let public_pem = secret_key
            .public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| AuthError::crypto(format!("encode EC public key: {e}")))?;

        Self::from_pem(
            uuid::Uuid::new_v4().to_string(),
            SigningAlgorithm::ES384,
            &private_pem,
            &public_pem,
        )
    }

    /// Generates a new RS256 key pair (2048 bits).
    ///
    /// # Errors
    ///
    /// Returns `Crypto` if key generation or encoding fails.
    pub fn generate_rs256() -> AuthResult<Self> {
        let private_key = RsaPrivateKey::new(&mut OsRng, 2048)
            .map_err(|e| AuthError::crypto(format!("generate RSA key: {e}")))?;

        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| AuthError::crypto(format!("encode RSA private key: {e}")))?
            .to_string();

        let public_pem = private_key
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| AuthError::crypto(format!("encode RSA public key: {e}")))?;

        Self::from_pem(
            uuid::Uuid::new_v4().to_string(),
            SigningAlgorithm::RS256,
            &private_pem,
            &public_pem,
        )
    }

    /// Loads a key pair from PEM strings.
    ///
    /// # Errors
    ///
    /// Returns `Crypto` if the PEM data does not match the algorithm.
    pub fn from_pem(
        kid: impl Into<String>,
        algorithm: SigningAlgorithm,
        private_pem: &str,
        public_pem: &str,
    ) -> AuthResult<Self> {
        let (encoding_key, decoding_key) = match algorithm {
            SigningAlgorithm::RS256 => {
                let enc = EncodingKey::from_rsa_pem(private_pem.as_bytes())
                    .map_err(|e| AuthError::crypto(format!("parse RSA private key: {e}")))?;
                let dec = DecodingKey::from_rsa_pem(public_pem.as_bytes())
                    .map_err(|e| AuthError::crypto(format!("parse RSA public key: {e}")))?;
                (enc, dec)
            }
            SigningAlgorithm::ES384 => {
                let enc = EncodingKey::from_ec_pem(private_pem.as_bytes())
                    .map_err(|e| AuthError::crypto(format!("parse EC private key: {e}")))?;
                let dec = DecodingKey::from_ec_pem(public_pem.as_bytes())
                    .map_err(|e| AuthError::crypto(format!("parse EC public key: {e}")))?;
                (enc, dec)
            }
        };

        Ok(Self {
            kid: kid.into(),
            algorithm,
            encoding_key,
            decoding_key,
            private_pem: private_pem.to_string(),
            public_pem: public_pem.to_string(),
        })
    }

    /// The key used to sign envelopes.
    #[must_use]
    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    /// The key used to verify envelopes.
    #[must_use]
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}
