//! Token claim types.
//!
//! `EnvelopeClaims` is the signed outer token. `Claims` is the identity
//! payload sealed into its `sub` field. `Identity` is what a verified token
//! yields to resource handlers.

use serde::{Deserialize, Serialize};

use crate::scope;

/// The signed envelope carried by every access token.
///
/// `sub` is absent on machine-to-machine tokens; on user tokens it holds the
/// sealed [`Claims`], not a raw user id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnvelopeClaims {
    /// Issuer.
    pub iss: String,

    /// Audience: the relying service id whose key decrypts `sub`.
    pub aud: String,

    /// The client the token was minted for; selects the signing domain.
    pub cli: String,

    /// Issued at (Unix timestamp).
    pub iat: i64,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// Not before (Unix timestamp).
    pub nbf: i64,

    /// Unique token id.
    pub jti: String,

    /// Granted scopes (space-separated).
    pub scope: String,

    /// Sealed identity claims (user tokens only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
}

/// Identity payload sealed into a user token's `sub` field.
///
/// The populated subset is filtered by granted scope before sealing, so a
/// relying service never sees more than the user consented to.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// Stable user identifier.
    #[serde(rename = "openid")]
    pub open_id: String,

    /// Display name (`profile` scope).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,

    /// Avatar URL (`profile` scope).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,

    /// Email address (`email` scope).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Phone number (`phone` scope).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl Claims {
    /// Creates claims carrying only the user identifier.
    #[must_use]
    pub fn new(open_id: impl Into<String>) -> Self {
        Self {
            open_id: open_id.into(),
            ..Self::default()
        }
    }

    /// Returns a copy restricted to what the granted scope permits:
    /// `profile` keeps nickname/picture, `email` keeps email, `phone` keeps
    /// phone. The identifier is always kept.
    #[must_use]
    pub fn filtered_by_scope(&self, granted: &str) -> Self {
        let scopes = scope::parse(granted);
        Self {
            open_id: self.open_id.clone(),
            nickname: scope::contains(&scopes, scope::SCOPE_PROFILE)
                .then(|| self.nickname.clone())
                .flatten(),
            picture: scope::contains(&scopes, scope::SCOPE_PROFILE)
                .then(|| self.picture.clone())
                .flatten(),
            email: scope::contains(&scopes, scope::SCOPE_EMAIL)
                .then(|| self.email.clone())
                .flatten(),
            phone: scope::contains(&scopes, scope::SCOPE_PHONE)
                .then(|| self.phone.clone())
                .flatten(),
        }
    }
}

/// The result of verifying an access token.
#[derive(Debug, Clone, Default)]
pub struct Identity {
    /// Stable user identifier; empty for service tokens.
    pub open_id: String,

    /// Client the token was minted for.
    pub client_id: String,

    /// Relying service the token targets.
    pub audience: String,

    /// Issuer.
    pub issuer: String,

    /// Granted scopes (space-separated).
    pub scope: String,

    /// Display name, if `profile` was granted.
    pub nickname: Option<String>,

    /// Avatar URL, if `profile` was granted.
    pub picture: Option<String>,

    /// Email, if `email` was granted.
    pub email: Option<String>,

    /// Phone, if `phone` was granted.
    pub phone: Option<String>,
}

impl Identity {
    /// Returns `true` if the granted scope contains `target`.
    #[must_use]
    pub fn has_scope(&self, target: &str) -> bool {
        self.scope.split_whitespace().any(|s| s == target)
    }

    /// Returns `true` if this identity belongs to a user (not a machine).
    #[must_use]
    pub fn is_user(&self) -> bool {
        !self.open_id.is_empty()
    }
}
