//! Token endpoint grants: authorization-code exchange, refresh, revocation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::config::AuthConfig;
use crate::directory::Directory;
use crate::error::AuthError;
use crate::oauth::pkce::{PkceChallenge, PkceVerifier};
use crate::oauth::session::AuthSession;
use crate::scope;
use crate::store::{RefreshToken, SessionStore, generate_refresh_token_value};
use crate::token::TokenIssuer;
use crate::users::UserStore;
use crate::AuthResult;

/// `grant_type` value for code exchange.
pub const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";
/// `grant_type` value for refresh.
pub const GRANT_REFRESH_TOKEN: &str = "refresh_token";

/// Form body of the token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRequest {
    /// One of `authorization_code` or `refresh_token`.
    pub grant_type: String,

    /// Authorization code (code exchange).
    #[serde(default)]
    pub code: Option<String>,

    /// Redirect URI; must match the authorization request.
    #[serde(default)]
    pub redirect_uri: Option<String>,

    /// Requesting client.
    #[serde(default)]
    pub client_id: Option<String>,

    /// PKCE verifier (code exchange).
    #[serde(default)]
    pub code_verifier: Option<String>,

    /// Refresh token (refresh grant).
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Successful token response.
#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    /// The signed access token.
    pub access_token: String,

    /// Always `Bearer`.
    pub token_type: String,

    /// Access token lifetime in seconds.
    pub expires_in: u64,

    /// Granted scopes (space-separated).
    pub scope: String,

    /// Refresh token, when `offline_access` was granted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl TokenResponse {
    /// Creates a response without a refresh token.
    #[must_use]
    pub fn new(access_token: String, expires_in: u64, scope: String) -> Self {
        Self {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in,
            scope,
            refresh_token: None,
        }
    }

    /// Attaches a refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, token: String) -> Self {
        self.refresh_token = Some(token);
        self
    }
}

/// Handles the token endpoint grants plus revocation and logout.
pub struct TokenService {
    config: AuthConfig,
    store: Arc<dyn SessionStore>,
    directory: Arc<dyn Directory>,
    users: Arc<dyn UserStore>,
    issuer: TokenIssuer,
}

impl TokenService {
    /// Wires the service.
    #[must_use]
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn SessionStore>,
        directory: Arc<dyn Directory>,
        users: Arc<dyn UserStore>,
        issuer: TokenIssuer,
    ) -> Self {
        Self {
            config,
            store,
            directory,
            users,
            issuer,
        }
    }

    /// Dispatches a token request by grant type.
    ///
    /// # Errors
    ///
    /// `UnsupportedGrantType` for anything but the two supported grants;
    /// otherwise the grant's own errors.
    pub async fn exchange(&self, request: &TokenRequest) -> AuthResult<TokenResponse> {
        match request.grant_type.as_str() {
            GRANT_AUTHORIZATION_CODE => self.exchange_code(request).await,
            GRANT_REFRESH_TOKEN => self.refresh(request).await,
            other => Err(AuthError::unsupported_grant_type(other)),
        }
    }

    /// Redeems an authorization code for tokens.
    async fn exchange_code(&self, request: &TokenRequest) -> AuthResult<TokenResponse> {
        let code = require(request.code.as_deref(), "code")?;
        let redirect_uri = require(request.redirect_uri.as_deref(), "redirect_uri")?;
        let client_id = require(request.client_id.as_deref(), "client_id")?;
        let verifier = require(request.code_verifier.as_deref(), "code_verifier")?;

        let record = self.store.get_code(code).await?;

        let session = self
            .store
            .get_session(&record.session_id)
            .await
            .map_err(|err| match err {
                AuthError::FlowNotFound | AuthError::FlowExpired => {
                    AuthError::invalid_grant("authorization session no longer valid")
                }
                other => other,
            })?;

        if client_id != session.request.client_id {
            return Err(AuthError::invalid_grant("client_id mismatch"));
        }
        if redirect_uri != session.request.redirect_uri {
            return Err(AuthError::invalid_grant("redirect_uri mismatch"));
        }

        let challenge = PkceChallenge::new(session.request.code_challenge.clone())?;
        let verifier = PkceVerifier::new(verifier.to_string())?;
        challenge.verify(&verifier)?;

        // The atomic redemption point: of concurrent exchanges for the same
        // code, exactly one gets past this line.
        self.store.mark_code_used(code).await?;

        let response = self.mint_for_session(&session).await?;

        // The session has served its purpose; the code record follows it.
        if let Err(err) = self.store.delete_session(&session.id).await {
            warn!(session_id = %session.id, error = %err, "session cleanup failed");
        }
        if let Err(err) = self.store.delete_code(code).await {
            warn!(error = %err, "code cleanup failed");
        }

        Ok(response)
    }

    async fn mint_for_session(&self, session: &AuthSession) -> AuthResult<TokenResponse> {
        let user_id = session
            .user_id
            .as_deref()
            .ok_or_else(|| AuthError::internal("completed session has no user"))?;
        let user = self
            .users
            .find_by_open_id(user_id)
            .await?
            .ok_or_else(|| AuthError::invalid_grant("user no longer exists"))?;

        let audience = &session.request.audience;
        let service = self
            .directory
            .service(audience)
            .await?
            .ok_or_else(|| AuthError::unsupported_audience(audience))?;

        let granted = scope::join(&session.granted_scopes);
        let access_ttl = service
            .access_token_lifetime
            .map_or(self.config.access_token_ttl(), time::Duration::seconds);

        let access_token = self
            .issuer
            .issue_user_token(
                &session.request.client_id,
                &session.domain_id,
                audience,
                &granted,
                access_ttl,
                &user.claims(),
            )
            .await?;

        let expires_in = u64::try_from(access_ttl.whole_seconds()).unwrap_or(0);
        let mut response = TokenResponse::new(access_token, expires_in, granted.clone());

        if scope::contains(&session.granted_scopes, scope::SCOPE_OFFLINE_ACCESS) {
            let refresh_ttl = service
                .refresh_token_lifetime
                .map_or(self.config.refresh_token_ttl(), time::Duration::seconds);
            let refresh = self
                .create_refresh_token(
                    &user.open_id,
                    &session.request.client_id,
                    audience,
                    &granted,
                    refresh_ttl,
                )
                .await?;
            response = response.with_refresh_token(refresh);
        }

        info!(
            client_id = %session.request.client_id,
            audience = %audience,
            scope = %response.scope,
            "access token issued"
        );

        Ok(response)
    }

    /// Re-mints an access token from a refresh token. The refresh token
    /// value itself is kept.
    async fn refresh(&self, request: &TokenRequest) -> AuthResult<TokenResponse> {
        let token = require(request.refresh_token.as_deref(), "refresh_token")?;

        let record = self.store.get_refresh_token(token).await?;

        if let Some(client_id) = request.client_id.as_deref() {
            if client_id != record.client_id {
                return Err(AuthError::invalid_grant("client_id mismatch"));
            }
        }

        let user = self
            .users
            .find_by_open_id(&record.user_id)
            .await?
            .ok_or_else(|| AuthError::invalid_grant("user no longer exists"))?;

        let client = self
            .directory
            .client(&record.client_id)
            .await?
            .ok_or_else(|| AuthError::invalid_grant("client no longer exists"))?;

        let service = self
            .directory
            .service(&record.audience)
            .await?
            .ok_or_else(|| AuthError::unsupported_audience(&record.audience))?;

        let access_ttl = service
            .access_token_lifetime
            .map_or(self.config.access_token_ttl(), time::Duration::seconds);

        let access_token = self
            .issuer
            .issue_user_token(
                &record.client_id,
                &client.domain_id,
                &record.audience,
                &record.scope,
                access_ttl,
                &user.claims(),
            )
            .await?;

        let expires_in = u64::try_from(access_ttl.whole_seconds()).unwrap_or(0);
        Ok(
            TokenResponse::new(access_token, expires_in, record.scope.clone())
                .with_refresh_token(record.token),
        )
    }

    /// Creates and stores a refresh token, pruning the user's oldest tokens
    /// past the configured cap first. Pruning is best-effort cleanup.
    async fn create_refresh_token(
        &self,
        user_id: &str,
        client_id: &str,
        audience: &str,
        granted: &str,
        ttl: time::Duration,
    ) -> AuthResult<String> {
        self.prune_refresh_tokens(user_id).await;

        let now = OffsetDateTime::now_utc();
        let token = RefreshToken {
            token: generate_refresh_token_value(),
            user_id: user_id.to_string(),
            client_id: client_id.to_string(),
            audience: audience.to_string(),
            scope: granted.to_string(),
            expires_at: now + ttl,
            revoked: false,
            created_at: now,
        };
        self.store.save_refresh_token(&token).await?;
        Ok(token.token)
    }

    async fn prune_refresh_tokens(&self, user_id: &str) {
        let max = self.config.max_refresh_tokens_per_user;
        if max == 0 {
            return;
        }

        let tokens = match self.store.list_user_refresh_tokens(user_id, None).await {
            Ok(tokens) => tokens,
            Err(err) => {
                warn!(user_id, error = %err, "refresh token listing failed, skipping prune");
                return;
            }
        };

        if tokens.len() < max {
            return;
        }

        // Oldest first; leave room for the token about to be created.
        let excess = tokens.len() - max + 1;
        for old in tokens.iter().take(excess) {
            if let Err(err) = self.store.revoke_refresh_token(&old.token).await {
                warn!(user_id, error = %err, "refresh token prune failed");
            } else {
                info!(user_id, created_at = %old.created_at, "pruned oldest refresh token");
            }
        }
    }

    /// Revokes a refresh token. Per RFC 7009 this succeeds no matter what
    /// the token was.
    pub async fn revoke(&self, token: &str) {
        if let Err(err) = self.store.revoke_refresh_token(token).await {
            warn!(error = %err, "revocation failed");
        }
    }

    /// Revokes every refresh token belonging to a user.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the store operation fails.
    pub async fn logout(&self, user_id: &str) -> AuthResult<u64> {
        let revoked = self.store.revoke_user_refresh_tokens(user_id).await?;
        info!(user_id, revoked, "user logged out everywhere");
        Ok(revoked)
    }
}

fn require<'a>(value: Option<&'a str>, field: &str) -> AuthResult<&'a str> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AuthError::invalid_request(format!("{field} is required")))
}
