//! End-to-end authorization flow over the HTTP surface.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use tower::ServiceExt;

use gatehouse_auth::authn::LogOtpSender;
use gatehouse_auth::config::AuthConfig;
use gatehouse_auth::directory::{Client, DirectoryKeyProvider, Domain, MemoryDirectory, Service};
use gatehouse_auth::grants::TokenService;
use gatehouse_auth::http::{AuthState, router};
use gatehouse_auth::idp::IdpRegistry;
use gatehouse_auth::oauth::{FlowEngine, PkceChallenge, PkceVerifier};
use gatehouse_auth::store::{MemoryStore, SessionStore};
use gatehouse_auth::token::{DomainKeyPair, KeyProvider, ServiceKey, TokenIssuer, TokenVerifier};
use gatehouse_auth::users::MemoryUserStore;

struct Harness {
    app: Router,
    store: Arc<MemoryStore>,
}

async fn harness() -> Harness {
    let config = AuthConfig::default();
    let store = MemoryStore::new();
    let users = Arc::new(MemoryUserStore::new());
    let registry = Arc::new(IdpRegistry::new());

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
            name: "Service One".to_string(),
            key: ServiceKey::generate(),
            allowed_scopes: vec![],
            access_token_lifetime: None,
            refresh_token_lifetime: None,
        })
        .await;
    directory
        .insert_client(Client {
            id: "c1".to_string(),
            domain_id: "consumer".to_string(),
            name: "App".to_string(),
            redirect_uris: vec!["https://app/cb".to_string()],
            connections: vec!["email".to_string()],
            allowed_scopes: vec![],
            active: true,
        })
        .await;
    directory.link("c1", "svc1").await;

    let keys: Arc<dyn KeyProvider> = Arc::new(DirectoryKeyProvider::new(directory.clone()));
    let issuer = TokenIssuer::new(config.issuer.clone(), keys.clone());
    let verifier = Arc::new(TokenVerifier::new(directory.clone(), keys));

    let engine = Arc::new(FlowEngine::new(
        config.clone(),
        store.clone(),
        directory.clone(),
        users.clone(),
        registry,
        Arc::new(LogOtpSender),
    ));
    let tokens = Arc::new(TokenService::new(
        config.clone(),
        store.clone(),
        directory,
        users.clone(),
        issuer,
    ));

    let app = router(AuthState {
        engine,
        tokens,
        verifier,
        users,
        config,
    });

    Harness { app, store }
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn session_cookie(response: &axum::response::Response) -> String {
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("session cookie expected")
        .to_str()
        .unwrap();
    // "gh_session=sess_...; HttpOnly; ..." -> "gh_session=sess_..."
    set_cookie.split(';').next().unwrap().to_string()
}

async fn start_session(harness: &Harness, verifier: &PkceVerifier, scope: &str) -> (String, String) {
    let challenge = PkceChallenge::from_verifier(verifier);
    let body = serde_json::json!({
        "response_type": "code",
        "client_id": "c1",
        "audience": "svc1",
        "redirect_uri": "https://app/cb",
        "code_challenge": challenge.as_str(),
        "code_challenge_method": "S256",
        "state": "st-123",
        "scope": scope,
    });

    let response = harness
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/authorize")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = session_cookie(&response);
    let json = body_json(response).await;
    let session_id = json["session_id"].as_str().unwrap().to_string();
    assert!(
        json["connections"]
            .as_array()
            .unwrap()
            .iter()
            .any(|c| c["connection"] == "email")
    );

    (session_id, cookie)
}

async fn login_with_email(harness: &Harness, cookie: &str) -> String {
    // Request a one-time code for the session.
    let response = harness
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/otp")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::COOKIE, cookie)
                .body(Body::from(r#"{"email":"a@b.com"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let otp = harness
        .store
        .get_otp("email:a@b.com")
        .await
        .unwrap()
        .expect("otp stored");

    let body = serde_json::json!({
        "connection": "email",
        "data": {"email": "a@b.com", "code": otp},
    });
    let response = harness
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::COOKIE, cookie)
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["state"], "st-123");
    json["code"].as_str().unwrap().to_string()
}

async fn exchange_code(
    harness: &Harness,
    code: &str,
    verifier: &PkceVerifier,
) -> axum::response::Response {
    let form = format!(
        "grant_type=authorization_code&code={}&redirect_uri={}&client_id=c1&code_verifier={}",
        code,
        urlencode("https://app/cb"),
        verifier.as_str(),
    );
    harness
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/token")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(form))
                .unwrap(),
        )
        .await
        .unwrap()
}

fn urlencode(s: &str) -> String {
    s.replace(':', "%3A").replace('/', "%2F")
}

#[tokio::test]
async fn test_full_flow_authorize_login_token() {
    let harness = harness().await;
    let verifier = PkceVerifier::generate();

    let (_session_id, cookie) = start_session(&harness, &verifier, "openid profile email").await;
    let code = login_with_email(&harness, &cookie).await;

    let response = exchange_code(&harness, &code, &verifier).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert!(!json["access_token"].as_str().unwrap().is_empty());
    assert_eq!(json["token_type"], "Bearer");
    assert_eq!(json["expires_in"], 7200);
    assert_eq!(json["scope"], "openid profile email");
}

#[tokio::test]
async fn test_bearer_protected_userinfo() {
    let harness = harness().await;
    let verifier = PkceVerifier::generate();

    let (_, cookie) = start_session(&harness, &verifier, "openid profile email").await;
    let code = login_with_email(&harness, &cookie).await;
    let token_json = body_json(exchange_code(&harness, &code, &verifier).await).await;
    let access_token = token_json["access_token"].as_str().unwrap();

    // Without a token: 401 + WWW-Authenticate.
    let response = harness
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/auth/userinfo")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok()),
        Some("Bearer")
    );

    // With the token: scope-filtered profile, masked email.
    let response = harness
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/auth/userinfo")
                .header(header::AUTHORIZATION, format!("Bearer {access_token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["sub"].as_str().unwrap().starts_with("u_"));
    assert!(json["nickname"].is_string());
    assert_eq!(json["email"], "a***@b.com");
    assert!(json.get("phone").is_none());
}

#[tokio::test]
async fn test_login_without_session_cookie_is_412() {
    let harness = harness().await;

    let body = serde_json::json!({
        "connection": "email",
        "data": {"email": "a@b.com", "code": "123456"},
    });
    let response = harness
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);
}

#[tokio::test]
async fn test_code_is_single_use_over_http() {
    let harness = harness().await;
    let verifier = PkceVerifier::generate();

    let (_, cookie) = start_session(&harness, &verifier, "openid").await;
    let code = login_with_email(&harness, &cookie).await;

    let first = exchange_code(&harness, &code, &verifier).await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = exchange_code(&harness, &code, &verifier).await;
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);
    let json = body_json(second).await;
    assert_eq!(json["error"], "invalid_grant");
}

#[tokio::test]
async fn test_revoke_always_succeeds_and_logout_requires_bearer() {
    let harness = harness().await;

    let response = harness
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/revoke")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("token=not-a-real-token"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = harness
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/logout")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_revokes_refresh_tokens() {
    let harness = harness().await;
    let verifier = PkceVerifier::generate();

    let (_, cookie) = start_session(&harness, &verifier, "openid offline_access").await;
    let code = login_with_email(&harness, &cookie).await;
    let token_json = body_json(exchange_code(&harness, &code, &verifier).await).await;
    let access_token = token_json["access_token"].as_str().unwrap().to_string();
    let refresh_token = token_json["refresh_token"].as_str().unwrap().to_string();

    let response = harness
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/logout")
                .header(header::AUTHORIZATION, format!("Bearer {access_token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["revoked"], 1);

    // The revoked refresh token no longer refreshes.
    let form = format!("grant_type=refresh_token&refresh_token={refresh_token}");
    let response = harness
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/token")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(form))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "invalid_grant");
}
