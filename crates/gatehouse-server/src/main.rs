//! Gatehouse authorization server.

mod settings;

use std::sync::Arc;

use anyhow::Context;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use gatehouse_auth::authn::LogOtpSender;
use gatehouse_auth::directory::{
    Client, Directory, DirectoryKeyProvider, Domain, MemoryDirectory, Service,
};
use gatehouse_auth::grants::TokenService;
use gatehouse_auth::http::{AuthState, router};
use gatehouse_auth::idp::IdpRegistry;
use gatehouse_auth::oauth::FlowEngine;
use gatehouse_auth::store::{MemoryStore, RedisStore, SessionStore};
use gatehouse_auth::token::{
    DomainKeyPair, KeyProvider, ServiceKey, SigningAlgorithm, TokenIssuer, TokenVerifier,
};
use gatehouse_auth::users::MemoryUserStore;

use settings::{ServerConfig, StoreBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path =
        std::env::var("GATEHOUSE_CONFIG").unwrap_or_else(|_| "gatehouse.toml".to_string());
    let config = settings::load(&config_path)
        .with_context(|| format!("load configuration from {config_path}"))?;

    let store: Arc<dyn SessionStore> = match config.store.backend {
        StoreBackend::Memory => {
            info!("using in-memory session store");
            MemoryStore::new()
        }
        StoreBackend::Redis => {
            info!(url = %config.store.redis_url, "using redis session store");
            Arc::new(
                RedisStore::connect(&config.store.redis_url)
                    .await
                    .context("connect to redis")?,
            )
        }
    };

    let directory = seed_directory(&config).await?;
    let keys: Arc<dyn KeyProvider> = Arc::new(DirectoryKeyProvider::new(directory.clone()));
    let users = Arc::new(MemoryUserStore::new());
    let registry = Arc::new(IdpRegistry::new());

    let issuer = TokenIssuer::new(config.auth.issuer.clone(), keys.clone());
    let verifier = Arc::new(TokenVerifier::new(directory.clone(), keys));

    let engine = Arc::new(FlowEngine::new(
        config.auth.clone(),
        store.clone(),
        directory.clone(),
        users.clone(),
        registry,
        Arc::new(LogOtpSender),
    ));
    let tokens = Arc::new(TokenService::new(
        config.auth.clone(),
        store,
        directory,
        users.clone(),
        issuer,
    ));

    let app = router(AuthState {
        engine,
        tokens,
        verifier,
        users,
        config: config.auth.clone(),
    })
    .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("bind {}", config.bind))?;
    info!(bind = %config.bind, "gatehouse listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shut down cleanly");
    Ok(())
}

/// Builds the in-memory directory from the seed configuration. Domains
/// without key material and services without keys get fresh generated
/// keys, which only suits development.
async fn seed_directory(config: &ServerConfig) -> anyhow::Result<Arc<MemoryDirectory>> {
    let directory = Arc::new(MemoryDirectory::new());

    if config.directory.domains.is_empty() {
        warn!("no domains configured; authorization requests will fail");
    }

    for seed in &config.directory.domains {
        let keys = match (&seed.private_key_pem, &seed.public_key_pem) {
            (Some(private_pem), Some(public_pem)) => {
                let algorithm = seed
                    .algorithm
                    .as_deref()
                    .map(SigningAlgorithm::parse)
                    .transpose()?
                    .unwrap_or(SigningAlgorithm::ES384);
                DomainKeyPair::from_pem(seed.id.clone(), algorithm, private_pem, public_pem)?
            }
            _ => {
                warn!(domain = %seed.id, "no key material configured, generating a fresh key pair");
                DomainKeyPair::generate_es384()?
            }
        };
        directory
            .insert_domain(Domain {
                id: seed.id.clone(),
                name: seed.name.clone(),
                keys: Arc::new(keys),
            })
            .await;
    }

    for seed in &config.directory.services {
        let key = match &seed.key {
            Some(encoded) => ServiceKey::from_base64(encoded)?,
            None => {
                warn!(service = %seed.id, "no key configured, generating a fresh service key");
                ServiceKey::generate()
            }
        };
        directory
            .insert_service(Service {
                id: seed.id.clone(),
                name: seed.name.clone(),
                key,
                allowed_scopes: seed.allowed_scopes.clone(),
                access_token_lifetime: seed.access_token_lifetime,
                refresh_token_lifetime: seed.refresh_token_lifetime,
            })
            .await;
    }

    for seed in &config.directory.clients {
        if directory.domain(&seed.domain).await?.is_none() {
            anyhow::bail!("client {} references unknown domain {}", seed.id, seed.domain);
        }
        directory
            .insert_client(Client {
                id: seed.id.clone(),
                domain_id: seed.domain.clone(),
                name: seed.name.clone(),
                redirect_uris: seed.redirect_uris.clone(),
                connections: seed.connections.clone(),
                allowed_scopes: seed.allowed_scopes.clone(),
                active: seed.active,
            })
            .await;
        for service in &seed.services {
            directory.link(&seed.id, service).await;
        }
    }

    info!(
        domains = config.directory.domains.len(),
        services = config.directory.services.len(),
        clients = config.directory.clients.len(),
        "directory seeded"
    );

    Ok(directory)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
