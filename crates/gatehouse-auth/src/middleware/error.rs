//! `AuthError` to HTTP response mapping.
//!
//! Every error renders as an OAuth2 error body. 401 responses carry
//! `WWW-Authenticate: Bearer`.

use axum::Json;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// OAuth2 error body: `{"error": "...", "error_description": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthErrorBody {
    /// OAuth2 error code.
    pub error: String,

    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl From<&AuthError> for OAuthErrorBody {
    fn from(err: &AuthError) -> Self {
        Self {
            error: err.oauth_error_code().to_string(),
            error_description: Some(err.public_description()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let challenge = self.is_token_error() || matches!(self, AuthError::Unauthorized { .. });
        let body = Json(OAuthErrorBody::from(&self));

        if challenge {
            (status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_shape() {
        let body = OAuthErrorBody::from(&AuthError::CodeUsed);
        assert_eq!(body.error, "invalid_grant");
        assert!(body.error_description.is_some());
    }

    #[test]
    fn test_unauthorized_carries_www_authenticate() {
        let response = AuthError::InvalidSignature.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response
                .headers()
                .get(header::WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok()),
            Some("Bearer")
        );
    }

    #[test]
    fn test_expired_session_is_precondition_failed() {
        let response = AuthError::FlowExpired.into_response();
        assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);
    }

    #[test]
    fn test_server_error_description_is_generic() {
        let body = OAuthErrorBody::from(&AuthError::storage("redis at 10.0.0.3 down"));
        assert_eq!(body.error, "server_error");
        assert_eq!(body.error_description.as_deref(), Some("internal server error"));
    }
}
