//! `POST /auth/login` and `POST /auth/otp`.
//!
//! Both read the session id exclusively from the session cookie. A missing
//! or expired session answers 412 so the client restarts at authorize.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

use super::AuthState;

/// Login body.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    /// The connection to authenticate through.
    pub connection: String,

    /// Connection-specific data (e.g. `{"email": ..., "code": ...}`).
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Body of a successful login.
#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    /// The authorization code to exchange at the token endpoint.
    pub code: String,

    /// State echo from the authorization request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// One-time-code issuance body.
#[derive(Debug, Clone, Deserialize)]
pub struct OtpRequest {
    /// Address to send the code to.
    pub email: String,
}

/// Authenticates the session and returns the authorization code.
pub async fn login_handler(
    State(state): State<AuthState>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), AuthError> {
    let session_id = session_cookie(&state, &jar)?;

    let outcome = state
        .engine
        .login(&session_id, &request.connection, &request.data)
        .await?;

    // The flow is complete; the cookie has nothing left to point at.
    let jar = jar.remove(Cookie::build((state.config.session_cookie.clone(), "")).path("/"));

    Ok((
        jar,
        Json(LoginResponse {
            code: outcome.code,
            state: outcome.state,
        }),
    ))
}

/// Sends an email one-time code for the cookie's session.
pub async fn otp_handler(
    State(state): State<AuthState>,
    jar: CookieJar,
    Json(request): Json<OtpRequest>,
) -> Result<StatusCode, AuthError> {
    let session_id = session_cookie(&state, &jar)?;
    state.engine.send_email_code(&session_id, &request.email).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn session_cookie(state: &AuthState, jar: &CookieJar) -> Result<String, AuthError> {
    jar.get(&state.config.session_cookie)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(AuthError::FlowNotFound)
}
