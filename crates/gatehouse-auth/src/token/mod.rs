//! Double-envelope token issuance and verification.
//!
//! The outer envelope is a signed JWT whose signing key belongs to the
//! client's tenant domain. The `sub` field of a user token is itself a
//! sealed payload only the audience service can open. Signing authority and
//! decryption authority never live in the same hands.

pub mod claims;
pub mod crypto;
pub mod issuer;
pub mod keys;
pub mod verifier;

pub use claims::{Claims, EnvelopeClaims, Identity};
pub use crypto::{SERVICE_KEY_SIZE, ServiceKey};
pub use issuer::TokenIssuer;
pub use keys::{DomainKeyPair, SigningAlgorithm};
pub use verifier::TokenVerifier;

use std::sync::Arc;

use async_trait::async_trait;

use crate::AuthResult;

/// Resolves signing keys by tenant domain and decryption keys by relying
/// service. The directory crate provides the canonical implementation.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Resolves the signing key pair for a tenant domain.
    ///
    /// # Errors
    ///
    /// Returns `Crypto` if the domain is unknown or its key cannot be loaded.
    async fn signing_key(&self, domain_id: &str) -> AuthResult<Arc<DomainKeyPair>>;

    /// Resolves the symmetric key for a relying service.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedAudience` if the service is unknown.
    async fn service_key(&self, service_id: &str) -> AuthResult<ServiceKey>;
}
