//! Server configuration: bind address, store backend, and the seeded
//! domain/client/service directory.

use serde::Deserialize;

use gatehouse_auth::AuthConfig;

/// Root server configuration.
///
/// Loaded from a TOML file plus `GATEHOUSE_`-prefixed environment
/// overrides (`GATEHOUSE_BIND`, `GATEHOUSE_STORE__BACKEND`, ...).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address.
    pub bind: String,

    /// Store backend selection.
    pub store: StoreConfig,

    /// Flow engine and token configuration.
    pub auth: AuthConfig,

    /// Seeded directory records.
    pub directory: DirectorySeed,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            store: StoreConfig::default(),
            auth: AuthConfig::default(),
            directory: DirectorySeed::default(),
        }
    }
}

/// Which session store to run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// `memory` or `redis`.
    pub backend: StoreBackend,

    /// Redis connection URL for the `redis` backend.
    pub redis_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

/// Store backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// In-process maps with a background sweep.
    #[default]
    Memory,
    /// External Redis cache.
    Redis,
}

/// Directory records created at startup.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DirectorySeed {
    /// Tenant domains.
    pub domains: Vec<DomainSeed>,

    /// Relying services.
    pub services: Vec<ServiceSeed>,

    /// Registered clients.
    pub clients: Vec<ClientSeed>,
}

/// A tenant domain. Without PEM material a fresh ES384 key pair is
/// generated at startup (development mode; tokens do not survive restarts).
#[derive(Debug, Clone, Deserialize)]
pub struct DomainSeed {
    /// Domain id.
    pub id: String,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// Signing algorithm for provided PEM keys (`ES384` or `RS256`).
    #[serde(default)]
    pub algorithm: Option<String>,

    /// PKCS#8 PEM private key.
    #[serde(default)]
    pub private_key_pem: Option<String>,

    /// SPKI PEM public key.
    #[serde(default)]
    pub public_key_pem: Option<String>,
}

/// A relying service. Without a key a fresh one is generated at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSeed {
    /// Service id (token audience).
    pub id: String,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// base64url-encoded 32-byte decryption key.
    #[serde(default)]
    pub key: Option<String>,

    /// Scopes this service accepts. Empty means all.
    #[serde(default)]
    pub allowed_scopes: Vec<String>,

    /// Access token lifetime override, seconds.
    #[serde(default)]
    pub access_token_lifetime: Option<i64>,

    /// Refresh token lifetime override, seconds.
    #[serde(default)]
    pub refresh_token_lifetime: Option<i64>,
}

/// A registered client.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSeed {
    /// Client id.
    pub id: String,

    /// Owning domain.
    pub domain: String,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// Allowed redirect URIs.
    #[serde(default)]
    pub redirect_uris: Vec<String>,

    /// Connections offered to this client's sessions.
    #[serde(default)]
    pub connections: Vec<String>,

    /// Scopes the client may request. Empty means all.
    #[serde(default)]
    pub allowed_scopes: Vec<String>,

    /// Services this client may request tokens for.
    #[serde(default)]
    pub services: Vec<String>,

    /// Whether the client is enabled.
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

/// Loads configuration from `path` (optional file) and the environment.
///
/// # Errors
///
/// Returns an error when the file or environment values cannot be parsed.
pub fn load(path: &str) -> anyhow::Result<ServerConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name(path).required(false))
        .add_source(config::Environment::with_prefix("GATEHOUSE").separator("__"))
        .build()?;
    Ok(settings.try_deserialize()?)
}
