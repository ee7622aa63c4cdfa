//! Domain / client / service directory.
//!
//! The directory is the collaborator that knows which tenants, applications,
//! and relying services exist and which keys belong to them. Persistence
//! behind it is out of scope; an in-memory implementation is provided for
//! wiring and tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::AuthError;
use crate::token::{DomainKeyPair, KeyProvider, ServiceKey};
use crate::AuthResult;

/// A tenant partition. Each domain owns the signing key for every client
/// registered under it.
#[derive(Debug, Clone)]
pub struct Domain {
    /// Stable domain identifier (e.g. `consumer`, `partner`).
    pub id: String,

    /// Human-readable name.
    pub name: String,

    /// The domain's signing key pair.
    pub keys: Arc<DomainKeyPair>,
}

/// A registered application.
#[derive(Debug, Clone)]
pub struct Client {
    /// Unique client identifier used in OAuth flows.
    pub id: String,

    /// The tenant domain this client belongs to.
    pub domain_id: String,

    /// Human-readable name.
    pub name: String,

    /// Allowed redirect URIs; must match exactly.
    pub redirect_uris: Vec<String>,

    /// Authentication connections this client may offer
    /// (e.g. `wechat:mp`, `email`).
    pub connections: Vec<String>,

    /// Scopes this client may request. Empty means all standard scopes.
    pub allowed_scopes: Vec<String>,

    /// Whether the client can currently be used.
    pub active: bool,
}

impl Client {
    /// Returns `true` if `uri` exactly matches a registered redirect URI.
    #[must_use]
    pub fn is_redirect_uri_allowed(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|u| u == uri)
    }
}

/// A relying party. Holds the only key that can open user claims sealed for
/// it.
#[derive(Debug, Clone)]
pub struct Service {
    /// Stable service identifier, used as token audience.
    pub id: String,

    /// Human-readable name.
    pub name: String,

    /// The service's symmetric decryption key.
    pub key: ServiceKey,

    /// Scopes this service accepts. Empty means all standard scopes.
    pub allowed_scopes: Vec<String>,

    /// Access token lifetime override, in seconds.
    pub access_token_lifetime: Option<i64>,

    /// Refresh token lifetime override, in seconds.
    pub refresh_token_lifetime: Option<i64>,
}

/// Read access to the domain/client/service records.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Looks up a client by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing lookup fails.
    async fn client(&self, client_id: &str) -> AuthResult<Option<Client>>;

    /// Looks up a service by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing lookup fails.
    async fn service(&self, service_id: &str) -> AuthResult<Option<Service>>;

    /// Looks up a domain by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing lookup fails.
    async fn domain(&self, domain_id: &str) -> AuthResult<Option<Domain>>;

    /// Returns `true` if the client is allowed to request tokens for the
    /// service.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing lookup fails.
    async fn client_has_service(&self, client_id: &str, service_id: &str) -> AuthResult<bool>;
}

/// In-memory directory for wiring and tests.
#[derive(Default)]
pub struct MemoryDirectory {
    inner: RwLock<DirectoryRecords>,
}

#[derive(Default)]
struct DirectoryRecords {
    domains: HashMap<String, Domain>,
    clients: HashMap<String, Client>,
    services: HashMap<String, Service>,
    links: HashSet<(String, String)>,
}

impl MemoryDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a domain.
    pub async fn insert_domain(&self, domain: Domain) {
        self.inner.write().await.domains.insert(domain.id.clone(), domain);
    }

    /// Inserts or replaces a client. Service access is granted separately
    /// through [`Self::link`].
    pub async fn insert_client(&self, client: Client) {
        self.inner.write().await.clients.insert(client.id.clone(), client);
    }

    /// Inserts or replaces a service.
    pub async fn insert_service(&self, service: Service) {
        self.inner.write().await.services.insert(service.id.clone(), service);
    }

    /// Grants a client access to a service.
    pub async fn link(&self, client_id: &str, service_id: &str) {
        self.inner
            .write()
            .await
            .links
            .insert((client_id.to_string(), service_id.to_string()));
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn client(&self, client_id: &str) -> AuthResult<Option<Client>> {
        Ok(self.inner.read().await.clients.get(client_id).cloned())
    }

    async fn service(&self, service_id: &str) -> AuthResult<Option<Service>> {
        Ok(self.inner.read().await.services.get(service_id).cloned())
    }

    async fn domain(&self, domain_id: &str) -> AuthResult<Option<Domain>> {
        Ok(self.inner.read().await.domains.get(domain_id).cloned())
    }

    async fn client_has_service(&self, client_id: &str, service_id: &str) -> AuthResult<bool> {
        Ok(self
            .inner
            .read()
            .await
            .links
            .contains(&(client_id.to_string(), service_id.to_string())))
    }
}

/// [`KeyProvider`] backed by the directory: signing keys come from domains,
/// decryption keys from services.
pub struct DirectoryKeyProvider {
    directory: Arc<dyn Directory>,
}

impl DirectoryKeyProvider {
    /// Creates a key provider over a directory.
    #[must_use]
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl KeyProvider for DirectoryKeyProvider {
    async fn signing_key(&self, domain_id: &str) -> AuthResult<Arc<DomainKeyPair>> {
        let domain = self
            .directory
            .domain(domain_id)
            .await?
            .ok_or_else(|| AuthError::crypto(format!("unknown signing domain: {domain_id}")))?;
        Ok(domain.keys)
    }

    async fn service_key(&self, service_id: &str) -> AuthResult<ServiceKey> {
        let service = self
            .directory
            .service(service_id)
            .await?
            .ok_or_else(|| AuthError::unsupported_audience(service_id))?;
        Ok(service.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_fixture() -> Client {
        Client {
            id: "c1".to_string(),
            domain_id: "consumer".to_string(),
            name: "App".to_string(),
            redirect_uris: vec!["https://app/cb".to_string()],
            connections: vec!["email".to_string()],
            allowed_scopes: vec![],
            active: true,
        }
    }

    #[test]
    fn test_redirect_uri_exact_match() {
        let client = client_fixture();
        assert!(client.is_redirect_uri_allowed("https://app/cb"));
        assert!(!client.is_redirect_uri_allowed("https://app/cb/"));
        assert!(!client.is_redirect_uri_allowed("https://evil/cb"));
    }

    #[tokio::test]
    async fn test_memory_directory_lookups() {
        let directory = MemoryDirectory::new();
        directory.insert_client(client_fixture()).await;
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

        assert!(directory.client("c1").await.unwrap().is_some());
        assert!(directory.client("nope").await.unwrap().is_none());
        assert!(directory.service("svc1").await.unwrap().is_some());

        assert!(!directory.client_has_service("c1", "svc1").await.unwrap());
        directory.link("c1", "svc1").await;
        assert!(directory.client_has_service("c1", "svc1").await.unwrap());
    }

    #[tokio::test]
    async fn test_key_provider_resolution() {
        let directory = Arc::new(MemoryDirectory::new());
        directory
            .insert_domain(Domain {
                id: "consumer".to_string(),
                name: "Consumer".to_string(),
                keys: Arc::new(DomainKeyPair::generate_es384().unwrap()),
            })
            .await;

        let provider = DirectoryKeyProvider::new(directory);
        assert!(provider.signing_key("consumer").await.is_ok());
        assert!(provider.signing_key("nope").await.is_err());

        let err = provider.service_key("ghost").await.unwrap_err();
        assert!(matches!(err, AuthError::UnsupportedAudience { .. }));
    }
}
