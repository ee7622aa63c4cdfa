//! Identity-provider adapters and their registry.
//!
//! Concrete HTTP clients for third-party platforms live outside this crate;
//! they plug in through [`IdpProvider`]. The registry dispatches by the
//! provider-type string a connection names (e.g. `wechat:mp`).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::AuthError;
use crate::AuthResult;

/// Normalized result of exchanging an authorization code with a provider.
#[derive(Debug, Clone)]
pub struct IdpExchange {
    /// Provider-side user identifier.
    pub provider_id: String,

    /// Cross-application union identifier, when the platform has one.
    pub union_id: Option<String>,

    /// Raw provider response, retained for auditing.
    pub raw_data: String,
}

/// A federated identity provider.
#[async_trait]
pub trait IdpProvider: Send + Sync {
    /// The provider-type string connections refer to.
    fn provider_type(&self) -> &str;

    /// Exchanges an authorization code for the provider-side identity.
    ///
    /// # Errors
    ///
    /// Returns `AuthenticationFailed` when the provider rejects the code.
    async fn exchange(&self, code: &str) -> AuthResult<IdpExchange>;

    /// Fetches the user's phone number from the provider.
    ///
    /// # Errors
    ///
    /// Providers without phone support return `UnsupportedAuth`.
    async fn phone_number(&self, _code: &str) -> AuthResult<String> {
        Err(AuthError::unsupported_auth(self.provider_type()))
    }
}

/// Concurrent-safe map of providers keyed by type string.
#[derive(Default)]
pub struct IdpRegistry {
    providers: RwLock<HashMap<String, Arc<dyn IdpProvider>>>,
}

impl IdpRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider under its type string.
    pub fn register(&self, provider: Arc<dyn IdpProvider>) {
        let key = provider.provider_type().to_string();
        self.providers
            .write()
            .expect("idp registry lock poisoned")
            .insert(key, provider);
    }

    /// Looks up a provider.
    #[must_use]
    pub fn get(&self, provider_type: &str) -> Option<Arc<dyn IdpProvider>> {
        self.providers
            .read()
            .expect("idp registry lock poisoned")
            .get(provider_type)
            .cloned()
    }

    /// Returns `true` if a provider of this type is registered.
    #[must_use]
    pub fn has(&self, provider_type: &str) -> bool {
        self.providers
            .read()
            .expect("idp registry lock poisoned")
            .contains_key(provider_type)
    }

    /// Lists the registered provider types.
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        self.providers
            .read()
            .expect("idp registry lock poisoned")
            .keys()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// A provider that accepts one fixed code.
    pub struct StaticProvider {
        pub provider_type: String,
        pub accept_code: String,
        pub provider_id: String,
    }

    #[async_trait]
    impl IdpProvider for StaticProvider {
        fn provider_type(&self) -> &str {
            &self.provider_type
        }

        async fn exchange(&self, code: &str) -> AuthResult<IdpExchange> {
            if code == self.accept_code {
                Ok(IdpExchange {
                    provider_id: self.provider_id.clone(),
                    union_id: None,
                    raw_data: format!(r#"{{"openid":"{}"}}"#, self.provider_id),
                })
            } else {
                Err(AuthError::authentication_failed("provider rejected code"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::StaticProvider;
    use super::*;

    #[test]
    fn test_register_and_dispatch() {
        let registry = IdpRegistry::new();
        assert!(!registry.has("wechat:mp"));

        registry.register(Arc::new(StaticProvider {
            provider_type: "wechat:mp".to_string(),
            accept_code: "ok".to_string(),
            provider_id: "wx_1".to_string(),
        }));

        assert!(registry.has("wechat:mp"));
        assert!(registry.get("wechat:mp").is_some());
        assert!(registry.get("github").is_none());
        assert_eq!(registry.list(), vec!["wechat:mp".to_string()]);
    }

    #[tokio::test]
    async fn test_exchange_through_registry() {
        let registry = IdpRegistry::new();
        registry.register(Arc::new(StaticProvider {
            provider_type: "wechat:mp".to_string(),
            accept_code: "code-1".to_string(),
            provider_id: "wx_1".to_string(),
        }));

        let provider = registry.get("wechat:mp").unwrap();
        let exchange = provider.exchange("code-1").await.unwrap();
        assert_eq!(exchange.provider_id, "wx_1");
        assert!(provider.exchange("wrong").await.is_err());
    }

    #[tokio::test]
    async fn test_phone_number_default_unsupported() {
        let provider = StaticProvider {
            provider_type: "wechat:mp".to_string(),
            accept_code: "x".to_string(),
            provider_id: "wx_1".to_string(),
        };
        assert!(provider.phone_number("x").await.is_err());
    }
}
