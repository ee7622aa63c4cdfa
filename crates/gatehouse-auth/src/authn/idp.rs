//! Federated-provider authentication strategy.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AuthError;
use crate::idp::IdpRegistry;
use crate::oauth::session::ConnectionKind;
use crate::AuthResult;

use super::{Authentication, Authenticator, required_str};

/// Bridges the common [`Authenticator`] capability onto the IDP registry.
/// Connection strings are provider-type strings.
pub struct IdpAuthenticator {
    registry: Arc<IdpRegistry>,
}

impl IdpAuthenticator {
    /// Creates the strategy over a registry.
    #[must_use]
    pub fn new(registry: Arc<IdpRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Authenticator for IdpAuthenticator {
    fn kind(&self) -> ConnectionKind {
        ConnectionKind::Idp
    }

    fn supports(&self, connection: &str) -> bool {
        self.registry.has(connection)
    }

    async fn authenticate(
        &self,
        connection: &str,
        data: &serde_json::Value,
    ) -> AuthResult<Authentication> {
        let provider = self
            .registry
            .get(connection)
            .ok_or_else(|| AuthError::unsupported_auth(connection))?;

        let code = required_str(data, "code")?;
        let exchange = provider.exchange(code).await?;

        Ok(Authentication {
            provider_id: exchange.provider_id,
            union_id: exchange.union_id,
            raw_data: Some(exchange.raw_data),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::idp::testing::StaticProvider;

    use super::*;

    fn registry_with_wechat() -> Arc<IdpRegistry> {
        let registry = Arc::new(IdpRegistry::new());
        registry.register(Arc::new(StaticProvider {
            provider_type: "wechat:mp".to_string(),
            accept_code: "good".to_string(),
            provider_id: "wx_7".to_string(),
        }));
        registry
    }

    #[test]
    fn test_supports_follows_registry() {
        let authenticator = IdpAuthenticator::new(registry_with_wechat());
        assert!(authenticator.supports("wechat:mp"));
        assert!(!authenticator.supports("email"));
        assert_eq!(authenticator.kind(), ConnectionKind::Idp);
    }

    #[tokio::test]
    async fn test_authenticate_exchanges_code() {
        let authenticator = IdpAuthenticator::new(registry_with_wechat());
        let result = authenticator
            .authenticate("wechat:mp", &serde_json::json!({"code": "good"}))
            .await
            .unwrap();
        assert_eq!(result.provider_id, "wx_7");
        assert!(result.raw_data.is_some());
    }

    #[tokio::test]
    async fn test_missing_code_is_invalid_request() {
        let authenticator = IdpAuthenticator::new(registry_with_wechat());
        let err = authenticator
            .authenticate("wechat:mp", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn test_provider_rejection_propagates() {
        let authenticator = IdpAuthenticator::new(registry_with_wechat());
        let err = authenticator
            .authenticate("wechat:mp", &serde_json::json!({"code": "bad"}))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AuthenticationFailed { .. }));
    }
}
