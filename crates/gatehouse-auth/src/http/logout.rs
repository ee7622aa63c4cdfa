//! `POST /auth/logout`.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::error::AuthError;
use crate::middleware::BearerAuth;

use super::AuthState;

/// Body of a successful logout.
#[derive(Debug, Clone, Serialize)]
pub struct LogoutResponse {
    /// Number of refresh tokens revoked.
    pub revoked: u64,
}

/// Revokes every refresh token of the authenticated user.
pub async fn logout_handler(
    State(state): State<AuthState>,
    BearerAuth(identity): BearerAuth,
) -> Result<Json<LogoutResponse>, AuthError> {
    if !identity.is_user() {
        return Err(AuthError::unauthorized("a user token is required"));
    }
    let revoked = state.tokens.logout(&identity.open_id).await?;
    Ok(Json(LogoutResponse { revoked }))
}
