//! Bearer token extractor.

use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::error::AuthError;
use crate::http::AuthState;
use crate::token::Identity;

/// Axum extractor that verifies the `Authorization: Bearer` token and
/// yields the caller's [`Identity`].
///
/// # Example
///
/// ```ignore
/// async fn handler(BearerAuth(identity): BearerAuth) -> String {
///     identity.open_id
/// }
/// ```
pub struct BearerAuth(pub Identity);

impl<S> FromRequestParts<S> for BearerAuth
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_state = AuthState::from_ref(state);

        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| AuthError::unauthorized("missing Authorization header"))?;

        let token = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::unauthorized("expected Bearer token"))?;

        let identity = auth_state.verifier.verify(token).await?;
        Ok(Self(identity))
    }
}
