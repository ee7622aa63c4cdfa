//! `POST /auth/authorize`.

use axum::Json;
use axum::extract::State;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Serialize;

use crate::error::AuthError;
use crate::oauth::session::{AuthorizeRequest, ConnectionInfo};

use super::AuthState;

/// Body of a successful authorize call.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizeResponse {
    /// The new session id. Also carried by the session cookie.
    pub session_id: String,

    /// Connections the client may present to the user.
    pub connections: Vec<ConnectionInfo>,
}

/// Starts an authorization session.
///
/// Returns the session id and available connections; the session id is
/// additionally set as an HttpOnly cookie so `login` can pick it up without
/// trusting the body.
pub async fn authorize_handler(
    State(state): State<AuthState>,
    jar: CookieJar,
    Json(request): Json<AuthorizeRequest>,
) -> Result<(CookieJar, Json<AuthorizeResponse>), AuthError> {
    let outcome = state.engine.authorize(request).await?;

    let cookie = Cookie::build((state.config.session_cookie.clone(), outcome.session_id.clone()))
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(state.config.session_ttl())
        .build();

    Ok((
        jar.add(cookie),
        Json(AuthorizeResponse {
            session_id: outcome.session_id,
            connections: outcome.connections,
        }),
    ))
}
