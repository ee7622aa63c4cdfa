//! Authorization session and code types.
//!
//! A session tracks one authorization-code flow from `authorize` to code
//! redemption. State only moves forward:
//! `Initialized -> Authenticated -> Authorized -> Completed`.

use std::collections::{BTreeMap, HashMap};

use rand::RngCore;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Authorization flow state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    /// Session created, no authentication yet.
    Initialized,
    /// User verified through a connection.
    Authenticated,
    /// Granted scopes computed.
    Authorized,
    /// Authorization code minted. Terminal.
    Completed,
}

/// The immutable authorization request a session was started with.
///
/// Unknown parameters are retained in `extra` so connection-specific inputs
/// survive the round trip through the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizeRequest {
    /// Must be `code`.
    pub response_type: String,

    /// Requesting client.
    pub client_id: String,

    /// Target relying service.
    pub audience: String,

    /// Redirect URI; must exactly match a registered one.
    pub redirect_uri: String,

    /// PKCE challenge (base64url of SHA-256 of the verifier).
    pub code_challenge: String,

    /// PKCE method; only `S256` is accepted.
    pub code_challenge_method: String,

    /// Opaque client state, echoed back with the code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// Requested scopes (space-separated).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Extension parameters, flattened on the wire.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Which strategy serves a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    /// Federated identity provider.
    Idp,
    /// Email one-time code.
    EmailOtp,
}

/// A connection offered to a session, in the shape returned to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Connection identifier (e.g. `wechat:mp`, `email`).
    pub connection: String,

    /// Which strategy handles it.
    pub kind: ConnectionKind,

    /// Display name, if configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// One authorization-code flow in progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    /// Session identifier (also the session cookie value).
    pub id: String,

    /// When the session was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the session expires.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// Current flow state. Moves forward only.
    pub state: FlowState,

    /// The request that started the flow.
    pub request: AuthorizeRequest,

    /// Domain of the resolved client.
    pub domain_id: String,

    /// Connections available to this session, keyed by connection id.
    pub connection_map: BTreeMap<String, ConnectionInfo>,

    /// The connection actually used. Never changes once authentication
    /// succeeds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<String>,

    /// Provider-side user identifier from authentication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,

    /// Whether authentication created a new user.
    #[serde(default)]
    pub is_new_user: bool,

    /// Resolved user identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Scopes granted at authorization.
    #[serde(default)]
    pub granted_scopes: Vec<String>,
}

impl AuthSession {
    /// Creates a fresh `Initialized` session.
    #[must_use]
    pub fn new(request: AuthorizeRequest, domain_id: impl Into<String>, ttl: time::Duration) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: generate_session_id(),
            created_at: now,
            expires_at: now + ttl,
            state: FlowState::Initialized,
            request,
            domain_id: domain_id.into(),
            connection_map: BTreeMap::new(),
            connection: None,
            provider_id: None,
            is_new_user: false,
            user_id: None,
            granted_scopes: Vec::new(),
        }
    }

    /// Returns `true` if the session is past its expiry.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() > self.expires_at
    }

    /// Returns `true` if a login attempt is legal.
    #[must_use]
    pub fn can_authenticate(&self) -> bool {
        self.state == FlowState::Initialized && !self.is_expired()
    }

    /// Returns `true` if scope computation is legal.
    #[must_use]
    pub fn can_authorize(&self) -> bool {
        self.state == FlowState::Authenticated && !self.is_expired()
    }

    /// Records a successful authentication. The connection is fixed from
    /// here on.
    pub fn set_authenticated(
        &mut self,
        connection: impl Into<String>,
        provider_id: impl Into<String>,
        user_id: impl Into<String>,
        is_new_user: bool,
    ) {
        self.state = FlowState::Authenticated;
        self.connection = Some(connection.into());
        self.provider_id = Some(provider_id.into());
        self.user_id = Some(user_id.into());
        self.is_new_user = is_new_user;
    }

    /// Records the granted scopes.
    pub fn set_authorized(&mut self, granted_scopes: Vec<String>) {
        self.state = FlowState::Authorized;
        self.granted_scopes = granted_scopes;
    }

    /// Marks the flow complete (code minted).
    pub fn set_completed(&mut self) {
        self.state = FlowState::Completed;
    }
}

/// An authorization code bound to a session.
///
/// The back-reference is by id only; the code does not own the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    /// The opaque code value handed to the client.
    pub code: String,

    /// The session this code belongs to.
    pub session_id: String,

    /// State echo from the authorization request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// When the code was minted.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the code expires.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// Whether the code has been redeemed. Checked-and-set atomically by
    /// the store.
    pub used: bool,
}

impl AuthorizationCode {
    /// Mints a new code for a session.
    #[must_use]
    pub fn new(session_id: impl Into<String>, state: Option<String>, ttl: time::Duration) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            code: generate_code(),
            session_id: session_id.into(),
            state,
            created_at: now,
            expires_at: now + ttl,
            used: false,
        }
    }

    /// Returns `true` if the code is past its expiry.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() > self.expires_at
    }
}

/// Generates a session id (128 bits of entropy).
#[must_use]
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("sess_{}", hex::encode(bytes))
}

/// Generates an authorization code (256 bits of entropy).
#[must_use]
pub fn generate_code() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_fixture() -> AuthorizeRequest {
        AuthorizeRequest {
            response_type: "code".to_string(),
            client_id: "c1".to_string(),
            audience: "svc1".to_string(),
            redirect_uri: "https://app/cb".to_string(),
            code_challenge: "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM".to_string(),
            code_challenge_method: "S256".to_string(),
            state: Some("xyz".to_string()),
            scope: Some("openid profile".to_string()),
            extra: HashMap::new(),
        }
    }

    #[test]
    fn test_new_session_is_initialized() {
        let session = AuthSession::new(request_fixture(), "consumer", time::Duration::minutes(10));
        assert_eq!(session.state, FlowState::Initialized);
        assert!(session.can_authenticate());
        assert!(!session.can_authorize());
        assert!(session.id.starts_with("sess_"));
        assert!(!session.is_expired());
    }

    #[test]
    fn test_state_progression() {
        let mut session = AuthSession::new(request_fixture(), "consumer", time::Duration::minutes(10));

        session.set_authenticated("email", "a@b.com", "u_1", true);
        assert_eq!(session.state, FlowState::Authenticated);
        assert!(!session.can_authenticate());
        assert!(session.can_authorize());
        assert_eq!(session.connection.as_deref(), Some("email"));

        session.set_authorized(vec!["openid".to_string()]);
        assert_eq!(session.state, FlowState::Authorized);

        session.set_completed();
        assert_eq!(session.state, FlowState::Completed);
        assert!(!session.can_authenticate());
    }

    #[test]
    fn test_state_ordering_is_monotonic() {
        assert!(FlowState::Initialized < FlowState::Authenticated);
        assert!(FlowState::Authenticated < FlowState::Authorized);
        assert!(FlowState::Authorized < FlowState::Completed);
    }

    #[test]
    fn test_expired_session_cannot_authenticate() {
        let mut session = AuthSession::new(request_fixture(), "consumer", time::Duration::minutes(10));
        session.expires_at = OffsetDateTime::now_utc() - time::Duration::seconds(1);
        assert!(session.is_expired());
        assert!(!session.can_authenticate());
    }

    #[test]
    fn test_extra_params_round_trip() {
        let mut request = request_fixture();
        request
            .extra
            .insert("invite".to_string(), serde_json::json!("team-7"));

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains(r#""invite":"team-7""#));

        let parsed: AuthorizeRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.extra.get("invite"), Some(&serde_json::json!("team-7")));
        assert_eq!(parsed.client_id, "c1");
    }

    #[test]
    fn test_session_serialization_round_trip() {
        let mut session = AuthSession::new(request_fixture(), "consumer", time::Duration::minutes(10));
        session.connection_map.insert(
            "email".to_string(),
            ConnectionInfo {
                connection: "email".to_string(),
                kind: ConnectionKind::EmailOtp,
                name: Some("Email code".to_string()),
            },
        );

        let json = serde_json::to_string(&session).unwrap();
        let parsed: AuthSession = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, session.id);
        assert_eq!(parsed.state, FlowState::Initialized);
        assert!(parsed.connection_map.contains_key("email"));
    }

    #[test]
    fn test_code_generation_entropy() {
        let a = generate_code();
        let b = generate_code();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }
}
