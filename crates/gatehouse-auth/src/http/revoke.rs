//! `POST /auth/revoke` — RFC 7009 token revocation.

use axum::Form;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;

use super::AuthState;

/// Revocation body.
#[derive(Debug, Clone, Deserialize)]
pub struct RevokeRequest {
    /// The refresh token to revoke.
    pub token: String,
}

/// Revokes a refresh token. Always answers 200, whatever the token was.
pub async fn revoke_handler(
    State(state): State<AuthState>,
    Form(request): Form<RevokeRequest>,
) -> StatusCode {
    state.tokens.revoke(&request.token).await;
    StatusCode::OK
}
