//! Axum HTTP handlers for the authorization endpoints.

pub mod authorize;
pub mod login;
pub mod logout;
pub mod revoke;
pub mod token;
pub mod userinfo;

pub use authorize::{AuthorizeResponse, authorize_handler};
pub use login::{LoginRequest, LoginResponse, OtpRequest, login_handler, otp_handler};
pub use logout::{LogoutResponse, logout_handler};
pub use revoke::{RevokeRequest, revoke_handler};
pub use token::token_handler;
pub use userinfo::{
    UpdateProfileRequest, UserInfoResponse, update_userinfo_handler, userinfo_handler,
};

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use crate::config::AuthConfig;
use crate::grants::TokenService;
use crate::oauth::FlowEngine;
use crate::token::TokenVerifier;
use crate::users::UserStore;

/// Shared state behind all handlers.
#[derive(Clone)]
pub struct AuthState {
    /// Flow engine driving authorize/login.
    pub engine: Arc<FlowEngine>,

    /// Token endpoint grants.
    pub tokens: Arc<TokenService>,

    /// Verifier backing the bearer extractor.
    pub verifier: Arc<TokenVerifier>,

    /// User records for the userinfo endpoint.
    pub users: Arc<dyn UserStore>,

    /// Auth configuration (cookie name, lifetimes).
    pub config: AuthConfig,
}

/// Builds the authorization router.
#[must_use]
pub fn router(state: AuthState) -> Router {
    Router::new()
        .route("/auth/authorize", post(authorize_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/otp", post(otp_handler))
        .route("/auth/token", post(token_handler))
        .route("/auth/revoke", post(revoke_handler))
        .route("/auth/logout", post(logout_handler))
        .route(
            "/auth/userinfo",
            get(userinfo_handler).put(update_userinfo_handler),
        )
        .with_state(state)
}
