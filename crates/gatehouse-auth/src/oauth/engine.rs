//! The authorization flow engine.
//!
//! Drives one session from `authorize` through `login`. Login is one-step:
//! a successful authentication immediately computes granted scopes and
//! mints the authorization code in the same call.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::authn::{Authenticator, EmailOtpAuthenticator, IdpAuthenticator, OtpSender};
use crate::authn::email::EMAIL_CONNECTION;
use crate::config::AuthConfig;
use crate::directory::{Client, Directory, Service};
use crate::error::AuthError;
use crate::idp::IdpRegistry;
use crate::scope;
use crate::store::SessionStore;
use crate::users::{User, UserStore};
use crate::AuthResult;

use super::pkce::{PkceChallenge, PkceChallengeMethod};
use super::session::{
    AuthSession, AuthorizationCode, AuthorizeRequest, ConnectionInfo, ConnectionKind,
};

/// What `authorize` hands back to the client.
#[derive(Debug, Clone)]
pub struct AuthorizeOutcome {
    /// The new session's id; also set as the session cookie.
    pub session_id: String,

    /// Connections the session may authenticate through.
    pub connections: Vec<ConnectionInfo>,
}

/// What `login` hands back to the client.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    /// The authorization code to exchange at the token endpoint.
    pub code: String,

    /// State echo from the authorization request.
    pub state: Option<String>,
}

/// Orchestrates sessions, authenticators, and the stores.
pub struct FlowEngine {
    config: AuthConfig,
    store: Arc<dyn SessionStore>,
    directory: Arc<dyn Directory>,
    users: Arc<dyn UserStore>,
    authenticators: Vec<Arc<dyn Authenticator>>,
    email_otp: Arc<EmailOtpAuthenticator>,
    registry: Arc<IdpRegistry>,
}

impl FlowEngine {
    /// Wires the engine. The authenticator set is fixed at construction:
    /// the IDP strategy over `registry` and the email one-time-code
    /// strategy over `store`.
    #[must_use]
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn SessionStore>,
        directory: Arc<dyn Directory>,
        users: Arc<dyn UserStore>,
        registry: Arc<IdpRegistry>,
        otp_sender: Arc<dyn OtpSender>,
    ) -> Self {
        let email_otp = Arc::new(EmailOtpAuthenticator::new(
            store.clone(),
            otp_sender,
            config.otp_ttl(),
        ));
        let authenticators: Vec<Arc<dyn Authenticator>> = vec![
            Arc::new(IdpAuthenticator::new(registry.clone())),
            email_otp.clone(),
        ];

        Self {
            config,
            store,
            directory,
            users,
            authenticators,
            email_otp,
            registry,
        }
    }

    /// Starts a new authorization session.
    ///
    /// Validates the request, resolves client/service/relation, builds the
    /// session's connection map, and persists an `Initialized` session.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for malformed requests, unknown
    /// client/audience, disallowed redirect URIs, or a client with no
    /// usable connection.
    pub async fn authorize(&self, request: AuthorizeRequest) -> AuthResult<AuthorizeOutcome> {
        if request.response_type != "code" {
            return Err(AuthError::invalid_request("response_type must be 'code'"));
        }

        PkceChallengeMethod::parse(&request.code_challenge_method)?;
        PkceChallenge::new(request.code_challenge.clone())?;

        let client = self.require_client(&request.client_id).await?;
        if !client.active {
            return Err(AuthError::invalid_request("client is inactive"));
        }
        if !client.is_redirect_uri_allowed(&request.redirect_uri) {
            return Err(AuthError::invalid_request("invalid redirect_uri"));
        }

        if self.directory.service(&request.audience).await?.is_none() {
            return Err(AuthError::invalid_request(format!(
                "unknown audience: {}",
                request.audience
            )));
        }
        if !self
            .directory
            .client_has_service(&request.client_id, &request.audience)
            .await?
        {
            return Err(AuthError::invalid_request(
                "client has no access to the requested audience",
            ));
        }

        let connection_map = self.build_connection_map(&client);
        if connection_map.is_empty() {
            return Err(AuthError::invalid_request("no connection available"));
        }

        let mut session = AuthSession::new(request, &client.domain_id, self.config.session_ttl());
        session.connection_map = connection_map;

        self.store.save_session(&session).await?;

        info!(
            session_id = %session.id,
            client_id = %session.request.client_id,
            "authorization session created"
        );

        Ok(AuthorizeOutcome {
            connections: session.connection_map.values().cloned().collect(),
            session_id: session.id,
        })
    }

    /// Authenticates a session through a connection and, on success, grants
    /// scopes and mints the authorization code in the same call.
    ///
    /// # Errors
    ///
    /// - `FlowNotFound` / `FlowExpired` when the session is gone
    /// - `FlowStateInvalid` when the session already advanced
    /// - `ConnectionNotFound` / `UnsupportedAuth` on dispatch failures
    /// - `Unavailable` when the authenticator call times out
    /// - the authenticator's own failure otherwise (never retried)
    pub async fn login(
        &self,
        session_id: &str,
        connection: &str,
        data: &serde_json::Value,
    ) -> AuthResult<LoginOutcome> {
        let mut session = self.store.get_session(session_id).await?;

        if !session.can_authenticate() {
            return Err(AuthError::FlowStateInvalid);
        }
        if !session.connection_map.contains_key(connection) {
            return Err(AuthError::connection_not_found(connection));
        }

        let authenticator = self
            .authenticators
            .iter()
            .find(|a| a.supports(connection))
            .ok_or_else(|| AuthError::unsupported_auth(connection))?;

        // The store is never held across this call; a slow provider fails
        // the login instead of hanging the session.
        let authentication = tokio::time::timeout(
            self.config.authenticator_timeout,
            authenticator.authenticate(connection, data),
        )
        .await
        .map_err(|_| AuthError::unavailable("authenticator timed out"))??;

        let (user, is_new_user) = self.resolve_user(connection, &authentication).await?;

        session.set_authenticated(
            connection,
            &authentication.provider_id,
            &user.open_id,
            is_new_user,
        );

        // One-step variant: scopes and code in the same call.
        let granted = self.grant_scopes(&session).await?;
        session.set_authorized(granted);

        let code = AuthorizationCode::new(
            &session.id,
            session.request.state.clone(),
            self.config.code_ttl(),
        );
        self.store.save_code(&code).await?;

        session.set_completed();
        // The session outlives code issuance; redemption deletes it.
        self.store.update_session(&session).await?;

        info!(
            session_id = %session.id,
            connection,
            user_id = %user.open_id,
            new_user = is_new_user,
            "login complete, authorization code issued"
        );

        Ok(LoginOutcome {
            code: code.code,
            state: code.state,
        })
    }

    /// Issues an email one-time code for a live session.
    ///
    /// # Errors
    ///
    /// Returns session lookup errors, `ConnectionNotFound` when the session
    /// does not offer `email`, and delivery errors from the sender.
    pub async fn send_email_code(&self, session_id: &str, email: &str) -> AuthResult<()> {
        let session = self.store.get_session(session_id).await?;
        if !session.can_authenticate() {
            return Err(AuthError::FlowStateInvalid);
        }
        if !session.connection_map.contains_key(EMAIL_CONNECTION) {
            return Err(AuthError::connection_not_found(EMAIL_CONNECTION));
        }
        self.email_otp.send_code(email).await
    }

    async fn require_client(&self, client_id: &str) -> AuthResult<Client> {
        self.directory
            .client(client_id)
            .await?
            .ok_or_else(|| AuthError::invalid_request(format!("unknown client: {client_id}")))
    }

    fn build_connection_map(&self, client: &Client) -> BTreeMap<String, ConnectionInfo> {
        let mut map = BTreeMap::new();
        for connection in &client.connections {
            if connection == EMAIL_CONNECTION {
                if self.config.email_otp_enabled {
                    map.insert(
                        connection.clone(),
                        ConnectionInfo {
                            connection: connection.clone(),
                            kind: ConnectionKind::EmailOtp,
                            name: Some("Email code".to_string()),
                        },
                    );
                }
            } else if self.registry.has(connection) {
                map.insert(
                    connection.clone(),
                    ConnectionInfo {
                        connection: connection.clone(),
                        kind: ConnectionKind::Idp,
                        name: None,
                    },
                );
            } else {
                warn!(connection, client_id = %client.id, "configured connection has no provider");
            }
        }
        map
    }

    async fn resolve_user(
        &self,
        connection: &str,
        authentication: &crate::authn::Authentication,
    ) -> AuthResult<(User, bool)> {
        if let Some(user) = self
            .users
            .find_by_provider(connection, &authentication.provider_id)
            .await?
        {
            return Ok((user, false));
        }

        let user = User::from_authentication(connection, authentication);
        self.users.create(&user).await?;
        Ok((user, true))
    }

    /// Requested ∩ client-allowed ∩ service-allowed, `openid` always in.
    async fn grant_scopes(&self, session: &AuthSession) -> AuthResult<Vec<String>> {
        let mut requested = session
            .request
            .scope
            .as_deref()
            .map(scope::parse)
            .unwrap_or_default();
        if !scope::contains(&requested, scope::SCOPE_OPENID) {
            requested.insert(0, scope::SCOPE_OPENID.to_string());
        }

        let client = self.require_client(&session.request.client_id).await?;
        let service: Service = self
            .directory
            .service(&session.request.audience)
            .await?
            .ok_or_else(|| AuthError::unsupported_audience(&session.request.audience))?;

        let allowed = |configured: &[String]| -> Vec<String> {
            if configured.is_empty() {
                scope::STANDARD_SCOPES.iter().map(|s| (*s).to_string()).collect()
            } else {
                configured.to_vec()
            }
        };

        let mut granted = scope::intersection(&requested, &allowed(&client.allowed_scopes));
        granted = scope::intersection(&granted, &allowed(&service.allowed_scopes));

        if !scope::contains(&granted, scope::SCOPE_OPENID) {
            granted.insert(0, scope::SCOPE_OPENID.to_string());
        }

        Ok(granted)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use crate::authn::LogOtpSender;
    use crate::directory::{Domain, MemoryDirectory, Service};
    use crate::idp::testing::StaticProvider;
    use crate::oauth::session::FlowState;
    use crate::store::{MemoryStore, SessionStore};
    use crate::token::{DomainKeyPair, ServiceKey};
    use crate::users::MemoryUserStore;

    use super::*;

    struct Fixture {
        engine: FlowEngine,
        store: Arc<MemoryStore>,
    }

    async fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let users = Arc::new(MemoryUserStore::new());
        let registry = Arc::new(IdpRegistry::new());
        registry.register(Arc::new(StaticProvider {
            provider_type: "wechat:mp".to_string(),
            accept_code: "wx-code".to_string(),
            provider_id: "wx_9".to_string(),
        }));

        let directory = Arc::new(MemoryDirectory::new());
        directory
            .insert_domain(Domain {
                id: "consumer".to_string(),
                name: "Consumer".to_string(),
                keys: Arc::new(DomainKeyPair::generate_es384().unwrap()),
            })
            .await;
        directory
            .insert_service(Service {
                id: "svc1".to_string(),
                name: "Svc".to_string(),
                key: ServiceKey::generate(),
                allowed_scopes: vec![],
                access_token_lifetime: None,
                refresh_token_lifetime: None,
            })
            .await;
        directory
            .insert_client(crate::directory::Client {
                id: "c1".to_string(),
                domain_id: "consumer".to_string(),
                name: "App".to_string(),
                redirect_uris: vec!["https://app/cb".to_string()],
                connections: vec!["email".to_string(), "wechat:mp".to_string()],
                allowed_scopes: vec![],
                active: true,
            })
            .await;
        directory.link("c1", "svc1").await;

        let engine = FlowEngine::new(
            AuthConfig::default(),
            store.clone(),
            directory,
            users,
            registry,
            Arc::new(LogOtpSender),
        );

        Fixture { engine, store }
    }

    fn request() -> AuthorizeRequest {
        AuthorizeRequest {
            response_type: "code".to_string(),
            client_id: "c1".to_string(),
            audience: "svc1".to_string(),
            redirect_uri: "https://app/cb".to_string(),
            code_challenge: "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM".to_string(),
            code_challenge_method: "S256".to_string(),
            state: Some("xyz".to_string()),
            scope: Some("openid profile email".to_string()),
            extra: HashMap::new(),
        }
    }

    async fn login_via_email(fx: &Fixture, session_id: &str) -> AuthResult<LoginOutcome> {
        fx.engine.send_email_code(session_id, "a@b.com").await?;
        let code = fx.store.get_otp("email:a@b.com").await?.unwrap();
        fx.engine
            .login(
                session_id,
                "email",
                &serde_json::json!({"email": "a@b.com", "code": code}),
            )
            .await
    }

    #[tokio::test]
    async fn test_authorize_creates_session_with_connections() {
        let fx = fixture().await;
        let outcome = fx.engine.authorize(request()).await.unwrap();

        assert!(outcome.session_id.starts_with("sess_"));
        let connections: Vec<&str> = outcome
            .connections
            .iter()
            .map(|c| c.connection.as_str())
            .collect();
        assert!(connections.contains(&"email"));
        assert!(connections.contains(&"wechat:mp"));

        let session = fx.store.get_session(&outcome.session_id).await.unwrap();
        assert_eq!(session.state, FlowState::Initialized);
    }

    #[tokio::test]
    async fn test_authorize_rejects_bad_requests() {
        let fx = fixture().await;

        let mut bad = request();
        bad.response_type = "token".to_string();
        assert!(fx.engine.authorize(bad).await.is_err());

        let mut bad = request();
        bad.code_challenge_method = "plain".to_string();
        assert!(fx.engine.authorize(bad).await.is_err());

        let mut bad = request();
        bad.client_id = "ghost".to_string();
        assert!(fx.engine.authorize(bad).await.is_err());

        let mut bad = request();
        bad.redirect_uri = "https://evil/cb".to_string();
        assert!(fx.engine.authorize(bad).await.is_err());

        let mut bad = request();
        bad.audience = "svc-unlinked".to_string();
        assert!(fx.engine.authorize(bad).await.is_err());
    }

    #[tokio::test]
    async fn test_email_login_mints_code_one_step() {
        let fx = fixture().await;
        let outcome = fx.engine.authorize(request()).await.unwrap();

        let login = login_via_email(&fx, &outcome.session_id).await.unwrap();
        assert_eq!(login.code.len(), 64);
        assert_eq!(login.state.as_deref(), Some("xyz"));

        let session = fx.store.get_session(&outcome.session_id).await.unwrap();
        assert_eq!(session.state, FlowState::Completed);
        assert_eq!(session.connection.as_deref(), Some("email"));
        assert!(session.is_new_user);
        assert!(session.user_id.is_some());
        // requested profile+email granted, openid always present
        assert_eq!(session.granted_scopes, vec!["openid", "profile", "email"]);

        let code = fx.store.get_code(&login.code).await.unwrap();
        assert_eq!(code.session_id, outcome.session_id);
        assert!(!code.used);
    }

    #[tokio::test]
    async fn test_idp_login() {
        let fx = fixture().await;
        let outcome = fx.engine.authorize(request()).await.unwrap();

        let login = fx
            .engine
            .login(
                &outcome.session_id,
                "wechat:mp",
                &serde_json::json!({"code": "wx-code"}),
            )
            .await
            .unwrap();
        assert!(!login.code.is_empty());

        let session = fx.store.get_session(&outcome.session_id).await.unwrap();
        assert_eq!(session.provider_id.as_deref(), Some("wx_9"));
    }

    #[tokio::test]
    async fn test_login_on_completed_session_is_state_invalid() {
        let fx = fixture().await;
        let outcome = fx.engine.authorize(request()).await.unwrap();
        login_via_email(&fx, &outcome.session_id).await.unwrap();

        let err = login_via_email(&fx, &outcome.session_id).await.unwrap_err();
        assert!(matches!(err, AuthError::FlowStateInvalid));
    }

    #[tokio::test]
    async fn test_login_unknown_session_and_connection() {
        let fx = fixture().await;

        let err = fx
            .engine
            .login("sess_missing", "email", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::FlowNotFound));

        let outcome = fx.engine.authorize(request()).await.unwrap();
        let err = fx
            .engine
            .login(&outcome.session_id, "github", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::ConnectionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_login_expired_session() {
        let fx = fixture().await;
        let outcome = fx.engine.authorize(request()).await.unwrap();

        let mut session = fx.store.get_session(&outcome.session_id).await.unwrap();
        session.expires_at = time::OffsetDateTime::now_utc() - time::Duration::seconds(1);
        fx.store.update_session(&session).await.unwrap();

        let err = login_via_email(&fx, &outcome.session_id).await.unwrap_err();
        assert!(matches!(err, AuthError::FlowExpired));
    }

    #[tokio::test]
    async fn test_failed_authentication_keeps_session_initialized() {
        let fx = fixture().await;
        let outcome = fx.engine.authorize(request()).await.unwrap();

        let err = fx
            .engine
            .login(
                &outcome.session_id,
                "email",
                &serde_json::json!({"email": "a@b.com", "code": "000000"}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AuthenticationFailed { .. }));

        let session = fx.store.get_session(&outcome.session_id).await.unwrap();
        assert_eq!(session.state, FlowState::Initialized);
        assert!(session.connection.is_none());
    }

    #[tokio::test]
    async fn test_second_login_keeps_connection_immutable() {
        let fx = fixture().await;
        let outcome = fx.engine.authorize(request()).await.unwrap();
        login_via_email(&fx, &outcome.session_id).await.unwrap();

        // Authenticating again through another connection must not move the
        // session or change its connection.
        let err = fx
            .engine
            .login(
                &outcome.session_id,
                "wechat:mp",
                &serde_json::json!({"code": "wx-code"}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::FlowStateInvalid));

        let session = fx.store.get_session(&outcome.session_id).await.unwrap();
        assert_eq!(session.connection.as_deref(), Some("email"));
    }

    #[tokio::test]
    async fn test_returning_user_is_not_new() {
        let fx = fixture().await;

        let outcome = fx.engine.authorize(request()).await.unwrap();
        login_via_email(&fx, &outcome.session_id).await.unwrap();
        let first = fx.store.get_session(&outcome.session_id).await.unwrap();
        assert!(first.is_new_user);

        let outcome = fx.engine.authorize(request()).await.unwrap();
        login_via_email(&fx, &outcome.session_id).await.unwrap();
        let second = fx.store.get_session(&outcome.session_id).await.unwrap();
        assert!(!second.is_new_user);
        assert_eq!(first.user_id, second.user_id);
    }

    #[tokio::test]
    async fn test_scope_grant_defaults_to_openid() {
        let fx = fixture().await;
        let mut bare = request();
        bare.scope = None;

        let outcome = fx.engine.authorize(bare).await.unwrap();
        login_via_email(&fx, &outcome.session_id).await.unwrap();

        let session = fx.store.get_session(&outcome.session_id).await.unwrap();
        assert_eq!(session.granted_scopes, vec!["openid"]);
    }
}
