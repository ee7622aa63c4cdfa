//! Authorization and token error types.
//!
//! Every failure surfaced to a caller is one of these kinds. Internal
//! store/crypto error text is wrapped with context and never echoed to the
//! client beyond a generic description.

/// Errors that can occur during authorization flows and token operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The authorization session was not found in the store.
    #[error("Authorization session not found")]
    FlowNotFound,

    /// The authorization session exists but its TTL has elapsed.
    #[error("Authorization session expired")]
    FlowExpired,

    /// The requested operation is not legal in the session's current state.
    #[error("Authorization session state does not permit this operation")]
    FlowStateInvalid,

    /// The requested connection is not available for this session.
    #[error("Connection not available for this session: {connection}")]
    ConnectionNotFound {
        /// The connection the caller asked for.
        connection: String,
    },

    /// No registered authenticator supports the requested connection.
    #[error("No authenticator supports connection: {connection}")]
    UnsupportedAuth {
        /// The connection no authenticator claimed.
        connection: String,
    },

    /// Authentication itself failed (bad OTP, IDP exchange rejection).
    #[error("Authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the failure.
        message: String,
    },

    /// The authorization code was not found.
    #[error("Authorization code not found")]
    CodeNotFound,

    /// The authorization code exists but its TTL has elapsed.
    #[error("Authorization code expired")]
    CodeExpired,

    /// The authorization code has already been redeemed.
    #[error("Authorization code already used")]
    CodeUsed,

    /// The refresh token was not found.
    #[error("Refresh token not found")]
    RefreshTokenNotFound,

    /// The refresh token has expired.
    #[error("Refresh token expired")]
    RefreshTokenExpired,

    /// The refresh token has been revoked.
    #[error("Refresh token revoked")]
    RefreshTokenRevoked,

    /// The token signature did not verify against the domain key.
    #[error("Invalid token signature")]
    InvalidSignature,

    /// The token is past its `exp` (or before its `nbf`).
    #[error("Token expired")]
    TokenExpired,

    /// A required claim (`aud`, `cli`, ...) is absent from the token.
    #[error("Missing required claim: {claim}")]
    MissingClaims {
        /// Name of the missing claim.
        claim: String,
    },

    /// The token's audience does not resolve to a known service.
    #[error("Unsupported audience: {audience}")]
    UnsupportedAudience {
        /// The audience value carried by the token.
        audience: String,
    },

    /// The token's `cli` claim does not resolve to a known client.
    #[error("Unknown client: {client_id}")]
    UnknownClient {
        /// The client id carried by the token.
        client_id: String,
    },

    /// The request is malformed or missing required parameters.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of what is wrong with the request.
        message: String,
    },

    /// The grant (code, verifier, refresh token) is invalid.
    #[error("Invalid grant: {message}")]
    InvalidGrant {
        /// Description of why the grant is invalid.
        message: String,
    },

    /// The token endpoint was asked for a grant type it does not support.
    #[error("Unsupported grant type: {grant_type}")]
    UnsupportedGrantType {
        /// The unsupported grant type.
        grant_type: String,
    },

    /// The request lacks valid bearer credentials.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Description of why the request is unauthorized.
        message: String,
    },

    /// A downstream authenticator call timed out; the caller may retry.
    #[error("Authenticator unavailable: {message}")]
    Unavailable {
        /// Description of the outage.
        message: String,
    },

    /// A storage operation failed.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// A signing, sealing, or key-resolution operation failed.
    #[error("Crypto error: {message}")]
    Crypto {
        /// Description of the crypto error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `ConnectionNotFound` error.
    #[must_use]
    pub fn connection_not_found(connection: impl Into<String>) -> Self {
        Self::ConnectionNotFound {
            connection: connection.into(),
        }
    }

    /// Creates a new `UnsupportedAuth` error.
    #[must_use]
    pub fn unsupported_auth(connection: impl Into<String>) -> Self {
        Self::UnsupportedAuth {
            connection: connection.into(),
        }
    }

    /// Creates a new `AuthenticationFailed` error.
    #[must_use]
    pub fn authentication_failed(message: impl Into<String>) -> Self {
        Self::AuthenticationFailed {
            message: message.into(),
        }
    }

    /// Creates a new `MissingClaims` error.
    #[must_use]
    pub fn missing_claim(claim: impl Into<String>) -> Self {
        Self::MissingClaims {
            claim: claim.into(),
        }
    }

    /// Creates a new `UnsupportedAudience` error.
    #[must_use]
    pub fn unsupported_audience(audience: impl Into<String>) -> Self {
        Self::UnsupportedAudience {
            audience: audience.into(),
        }
    }

    /// Creates a new `UnknownClient` error.
    #[must_use]
    pub fn unknown_client(client_id: impl Into<String>) -> Self {
        Self::UnknownClient {
            client_id: client_id.into(),
        }
    }

    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidGrant` error.
    #[must_use]
    pub fn invalid_grant(message: impl Into<String>) -> Self {
        Self::InvalidGrant {
            message: message.into(),
        }
    }

    /// Creates a new `UnsupportedGrantType` error.
    #[must_use]
    pub fn unsupported_grant_type(grant_type: impl Into<String>) -> Self {
        Self::UnsupportedGrantType {
            grant_type: grant_type.into(),
        }
    }

    /// Creates a new `Unauthorized` error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates a new `Unavailable` error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Crypto` error.
    #[must_use]
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this error relates to the session lifecycle
    /// (the client should restart at the authorize endpoint).
    #[must_use]
    pub fn is_flow_error(&self) -> bool {
        matches!(self, Self::FlowNotFound | Self::FlowExpired)
    }

    /// Returns `true` if this error relates to code redemption.
    #[must_use]
    pub fn is_code_error(&self) -> bool {
        matches!(self, Self::CodeNotFound | Self::CodeExpired | Self::CodeUsed)
    }

    /// Returns `true` if this error relates to token verification.
    #[must_use]
    pub fn is_token_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidSignature
                | Self::TokenExpired
                | Self::MissingClaims { .. }
                | Self::UnsupportedAudience { .. }
                | Self::UnknownClient { .. }
        )
    }

    /// Returns `true` if this is a server-side error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Storage { .. } | Self::Crypto { .. } | Self::Internal { .. } | Self::Unavailable { .. }
        )
    }

    /// Returns the OAuth 2.0 error code for this error.
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::FlowNotFound | Self::FlowExpired | Self::FlowStateInvalid => "invalid_request",
            Self::ConnectionNotFound { .. } | Self::UnsupportedAuth { .. } => "invalid_request",
            Self::AuthenticationFailed { .. } => "invalid_grant",
            Self::CodeNotFound
            | Self::CodeExpired
            | Self::CodeUsed
            | Self::RefreshTokenNotFound
            | Self::RefreshTokenExpired
            | Self::RefreshTokenRevoked
            | Self::InvalidGrant { .. } => "invalid_grant",
            Self::InvalidSignature
            | Self::TokenExpired
            | Self::MissingClaims { .. }
            | Self::UnsupportedAudience { .. }
            | Self::UnknownClient { .. }
            | Self::Unauthorized { .. } => "invalid_token",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::UnsupportedGrantType { .. } => "unsupported_grant_type",
            Self::Unavailable { .. } => "temporarily_unavailable",
            Self::Storage { .. } | Self::Crypto { .. } | Self::Internal { .. } => "server_error",
        }
    }

    /// Returns the HTTP status code for this error.
    ///
    /// 412 is reserved for session lifecycle failures so a client can tell
    /// "restart the whole flow" apart from "bad credentials".
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::FlowNotFound | Self::FlowExpired => 412,
            Self::FlowStateInvalid
            | Self::ConnectionNotFound { .. }
            | Self::UnsupportedAuth { .. }
            | Self::InvalidRequest { .. }
            | Self::UnsupportedGrantType { .. } => 400,
            Self::AuthenticationFailed { .. } => 401,
            Self::CodeNotFound
            | Self::CodeExpired
            | Self::CodeUsed
            | Self::RefreshTokenNotFound
            | Self::RefreshTokenExpired
            | Self::RefreshTokenRevoked
            | Self::InvalidGrant { .. } => 400,
            Self::InvalidSignature
            | Self::TokenExpired
            | Self::MissingClaims { .. }
            | Self::UnsupportedAudience { .. }
            | Self::UnknownClient { .. }
            | Self::Unauthorized { .. } => 401,
            Self::Unavailable { .. } => 503,
            Self::Storage { .. } | Self::Crypto { .. } | Self::Internal { .. } => 500,
        }
    }

    /// A description safe to echo to clients. Server-side failures collapse
    /// to a generic message.
    #[must_use]
    pub fn public_description(&self) -> String {
        if self.is_server_error() {
            match self {
                Self::Unavailable { .. } => "authentication service temporarily unavailable, retry later".to_string(),
                _ => "internal server error".to_string(),
            }
        } else {
            self.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oauth_error_codes() {
        assert_eq!(AuthError::CodeUsed.oauth_error_code(), "invalid_grant");
        assert_eq!(AuthError::CodeExpired.oauth_error_code(), "invalid_grant");
        assert_eq!(
            AuthError::invalid_request("bad").oauth_error_code(),
            "invalid_request"
        );
        assert_eq!(
            AuthError::unsupported_grant_type("implicit").oauth_error_code(),
            "unsupported_grant_type"
        );
        assert_eq!(AuthError::storage("down").oauth_error_code(), "server_error");
        assert_eq!(AuthError::InvalidSignature.oauth_error_code(), "invalid_token");
    }

    #[test]
    fn test_http_status_mapping() {
        // Expired sessions signal "restart the flow", not "bad credentials".
        assert_eq!(AuthError::FlowExpired.http_status(), 412);
        assert_eq!(AuthError::FlowNotFound.http_status(), 412);
        assert_eq!(AuthError::FlowStateInvalid.http_status(), 400);
        assert_eq!(AuthError::invalid_grant("x").http_status(), 400);
        assert_eq!(AuthError::InvalidSignature.http_status(), 401);
        assert_eq!(AuthError::unavailable("timeout").http_status(), 503);
        assert_eq!(AuthError::internal("boom").http_status(), 500);
    }

    #[test]
    fn test_server_errors_are_not_echoed() {
        let err = AuthError::storage("connection refused to 10.0.0.3:6379");
        assert_eq!(err.public_description(), "internal server error");
        assert!(!err.public_description().contains("10.0.0.3"));

        let err = AuthError::CodeUsed;
        assert_eq!(err.public_description(), "Authorization code already used");
    }

    #[test]
    fn test_predicates() {
        assert!(AuthError::FlowExpired.is_flow_error());
        assert!(!AuthError::CodeUsed.is_flow_error());
        assert!(AuthError::CodeUsed.is_code_error());
        assert!(AuthError::InvalidSignature.is_token_error());
        assert!(AuthError::crypto("bad key").is_server_error());
    }
}
