//! `POST /auth/token` — the OAuth2 token endpoint.

use axum::Form;
use axum::Json;
use axum::extract::State;
use tracing::{debug, warn};

use crate::error::AuthError;
use crate::grants::{TokenRequest, TokenResponse};

use super::AuthState;

/// Exchanges an authorization code or a refresh token for tokens.
///
/// Form-encoded per OAuth2; errors render as OAuth2 error bodies
/// (`invalid_request`, `invalid_grant`, `unsupported_grant_type`,
/// `server_error`).
pub async fn token_handler(
    State(state): State<AuthState>,
    Form(request): Form<TokenRequest>,
) -> Result<Json<TokenResponse>, AuthError> {
    debug!(grant_type = %request.grant_type, client_id = ?request.client_id, "token request");

    match state.tokens.exchange(&request).await {
        Ok(response) => Ok(Json(response)),
        Err(err) => {
            warn!(
                grant_type = %request.grant_type,
                error = %err,
                "token request failed"
            );
            Err(err)
        }
    }
}
