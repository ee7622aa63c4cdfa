//! Per-service claim sealing with AES-256-GCM.
//!
//! A relying service holds exactly one symmetric key. Identity claims are
//! sealed with that key before they go into the token's `sub` field, so the
//! service can read the caller's identity while holding no key that could
//! forge a token. The sealed form is `base64url(nonce ‖ ciphertext)`.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;

use crate::error::AuthError;
use crate::AuthResult;

/// Nonce size for AES-256-GCM (96 bits).
const NONCE_SIZE: usize = 12;

/// Key size for AES-256 (256 bits).
pub const SERVICE_KEY_SIZE: usize = 32;

/// A relying service's symmetric decryption key.
#[derive(Clone)]
pub struct ServiceKey([u8; SERVICE_KEY_SIZE]);

impl std::fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ServiceKey(..)")
    }
}

impl ServiceKey {
    /// Generates a fresh random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; SERVICE_KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Builds a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns `Crypto` if the slice is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> AuthResult<Self> {
        let arr: [u8; SERVICE_KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| AuthError::crypto("service key must be 32 bytes"))?;
        Ok(Self(arr))
    }

    /// Decodes a key from base64url.
    ///
    /// # Errors
    ///
    /// Returns `Crypto` on invalid base64 or wrong length.
    pub fn from_base64(encoded: &str) -> AuthResult<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| AuthError::crypto(format!("decode service key: {e}")))?;
        Self::from_bytes(&bytes)
    }

    /// Encodes the key as base64url.
    #[must_use]
    pub fn to_base64(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }

    /// Seals a plaintext into the `sub` wire form.
    ///
    /// # Errors
    ///
    /// Returns `Crypto` if encryption fails.
    pub fn seal(&self, plaintext: &[u8]) -> AuthResult<String> {
        let cipher = Aes256Gcm::new_from_slice(&self.0)
            .map_err(|e| AuthError::crypto(format!("create cipher: {e}")))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| AuthError::crypto(format!("seal claims: {e}")))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(out))
    }

    /// Opens a sealed `sub` value back into plaintext.
    ///
    /// # Errors
    ///
    /// Returns `Crypto` on malformed input or authentication failure
    /// (including a wrong key).
    pub fn open(&self, sealed: &str) -> AuthResult<Vec<u8>> {
        let data = URL_SAFE_NO_PAD
            .decode(sealed)
            .map_err(|e| AuthError::crypto(format!("decode sealed claims: {e}")))?;

        if data.len() <= NONCE_SIZE {
            return Err(AuthError::crypto("sealed claims too short"));
        }

        let cipher = Aes256Gcm::new_from_slice(&self.0)
            .map_err(|e| AuthError::crypto(format!("create cipher: {e}")))?;

        let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| AuthError::crypto("open sealed claims failed"))
    }
}
