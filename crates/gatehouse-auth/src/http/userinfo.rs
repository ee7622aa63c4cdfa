//! `GET/PUT /auth/userinfo`.
//!
//! Returns the profile subset the token's scope permits, with email and
//! phone masked. PUT updates the mutable profile fields.

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::middleware::BearerAuth;
use crate::token::Identity;
use crate::users::User;

use super::AuthState;

/// Scope-filtered, masked profile.
#[derive(Debug, Clone, Serialize)]
pub struct UserInfoResponse {
    /// The user identifier.
    pub sub: String,

    /// Display name (`profile` scope).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,

    /// Avatar URL (`profile` scope).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,

    /// Masked email (`email` scope).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Masked phone (`phone` scope).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Profile update body. Absent fields are left unchanged.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateProfileRequest {
    /// New display name.
    #[serde(default)]
    pub nickname: Option<String>,

    /// New avatar URL.
    #[serde(default)]
    pub picture: Option<String>,
}

/// Returns the caller's profile, limited by the token's scope.
pub async fn userinfo_handler(
    State(state): State<AuthState>,
    BearerAuth(identity): BearerAuth,
) -> Result<Json<UserInfoResponse>, AuthError> {
    let user = load_user(&state, &identity).await?;
    Ok(Json(profile_response(&user, &identity)))
}

/// Updates the caller's profile and returns the refreshed view.
pub async fn update_userinfo_handler(
    State(state): State<AuthState>,
    BearerAuth(identity): BearerAuth,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<UserInfoResponse>, AuthError> {
    if !identity.is_user() {
        return Err(AuthError::unauthorized("a user token is required"));
    }

    let user = state
        .users
        .update_profile(&identity.open_id, request.nickname, request.picture)
        .await?
        .ok_or_else(|| AuthError::unauthorized("user no longer exists"))?;

    Ok(Json(profile_response(&user, &identity)))
}

async fn load_user(state: &AuthState, identity: &Identity) -> Result<User, AuthError> {
    if !identity.is_user() {
        return Err(AuthError::unauthorized("a user token is required"));
    }
    state
        .users
        .find_by_open_id(&identity.open_id)
        .await?
        .ok_or_else(|| AuthError::unauthorized("user no longer exists"))
}

fn profile_response(user: &User, identity: &Identity) -> UserInfoResponse {
    let mut response = UserInfoResponse {
        sub: user.open_id.clone(),
        nickname: None,
        picture: None,
        email: None,
        phone: None,
    };

    if identity.has_scope(crate::scope::SCOPE_PROFILE) {
        response.nickname = user.nickname.clone();
        response.picture = user.picture.clone();
    }
    if identity.has_scope(crate::scope::SCOPE_EMAIL) {
        response.email = user.email.as_deref().map(mask_email);
    }
    if identity.has_scope(crate::scope::SCOPE_PHONE) {
        response.phone = user.phone.as_deref().map(mask_phone);
    }

    response
}

/// Masks an email address: `ada@example.com` -> `a***@example.com`.
fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let head = local.chars().next().map(String::from).unwrap_or_default();
            format!("{head}***@{domain}")
        }
        None => "***".to_string(),
    }
}

/// Masks a phone number, keeping at most the first 3 and last 4 digits.
fn mask_phone(phone: &str) -> String {
    if phone.len() <= 7 {
        return "****".to_string();
    }
    let head = &phone[..3];
    let tail = &phone[phone.len() - 4..];
    format!("{head}****{tail}")
}
