//! In-process store.
//!
//! All maps sit behind a single read/write lock: lookups take the read
//! lock, mutations and the background sweep take the write lock. The sweep
//! runs on its own cadence and only reclaims memory; correctness never
//! depends on it because lookups check `expires_at` themselves. No lock is
//! held across any I/O.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::AuthError;
use crate::oauth::session::{AuthSession, AuthorizationCode};
use crate::AuthResult;

use super::{RefreshToken, SessionStore};

/// How often the sweep reclaims expired entries.
const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct OtpEntry {
    code: String,
    expires_at: OffsetDateTime,
}

#[derive(Default)]
struct Maps {
    sessions: HashMap<String, AuthSession>,
    codes: HashMap<String, AuthorizationCode>,
    refresh_tokens: HashMap<String, RefreshToken>,
    user_tokens: HashMap<String, Vec<String>>,
    otps: HashMap<String, OtpEntry>,
}

/// Map-backed [`SessionStore`] for development and tests.
pub struct MemoryStore {
    inner: RwLock<Maps>,
}

impl MemoryStore {
    /// Creates a store and spawns its sweep task. The task stops when the
    /// last strong reference is dropped.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    #[must_use]
    pub fn new() -> Arc<Self> {
        let store = Arc::new(Self {
            inner: RwLock::new(Maps::default()),
        });

        let weak = Arc::downgrade(&store);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.tick().await; // immediate first tick
            loop {
                ticker.tick().await;
                let Some(store) = weak.upgrade() else { break };
                store.sweep().await;
            }
        });

        store
    }

    /// Removes entries past their `expires_at`.
    pub async fn sweep(&self) {
        let now = OffsetDateTime::now_utc();
        let mut maps = self.inner.write().await;

        maps.sessions.retain(|_, s| now <= s.expires_at);
        maps.codes.retain(|_, c| now <= c.expires_at);
        maps.refresh_tokens.retain(|_, t| now <= t.expires_at);
        maps.otps.retain(|_, o| now <= o.expires_at);

        let live: std::collections::HashSet<String> =
            maps.refresh_tokens.keys().cloned().collect();
        maps.user_tokens.retain(|_, tokens| {
            tokens.retain(|t| live.contains(t));
            !tokens.is_empty()
        });

        debug!(
            sessions = maps.sessions.len(),
            codes = maps.codes.len(),
            refresh_tokens = maps.refresh_tokens.len(),
            "memory store sweep complete"
        );
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn save_session(&self, session: &AuthSession) -> AuthResult<()> {
        self.inner
            .write()
            .await
            .sessions
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> AuthResult<AuthSession> {
        let maps = self.inner.read().await;
        let session = maps.sessions.get(session_id).ok_or(AuthError::FlowNotFound)?;
        if session.is_expired() {
            return Err(AuthError::FlowExpired);
        }
        Ok(session.clone())
    }

    async fn update_session(&self, session: &AuthSession) -> AuthResult<()> {
        self.inner
            .write()
            .await
            .sessions
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> AuthResult<()> {
        self.inner.write().await.sessions.remove(session_id);
        Ok(())
    }

    async fn save_code(&self, code: &AuthorizationCode) -> AuthResult<()> {
        self.inner
            .write()
            .await
            .codes
            .insert(code.code.clone(), code.clone());
        Ok(())
    }

    async fn get_code(&self, code: &str) -> AuthResult<AuthorizationCode> {
        let maps = self.inner.read().await;
        let record = maps.codes.get(code).ok_or(AuthError::CodeNotFound)?;
        if record.is_expired() {
            return Err(AuthError::CodeExpired);
        }
        if record.used {
            return Err(AuthError::CodeUsed);
        }
        Ok(record.clone())
    }

    async fn mark_code_used(&self, code: &str) -> AuthResult<()> {
        // Check and mark under one write-lock acquisition; this is the
        // at-most-once redemption point.
        let mut maps = self.inner.write().await;
        let record = maps.codes.get_mut(code).ok_or(AuthError::CodeNotFound)?;
        if record.is_expired() {
            return Err(AuthError::CodeExpired);
        }
        if record.used {
            return Err(AuthError::CodeUsed);
        }
        record.used = true;
        Ok(())
    }

    async fn delete_code(&self, code: &str) -> AuthResult<()> {
        self.inner.write().await.codes.remove(code);
        Ok(())
    }

    async fn save_refresh_token(&self, token: &RefreshToken) -> AuthResult<()> {
        let mut maps = self.inner.write().await;
        maps.refresh_tokens
            .insert(token.token.clone(), token.clone());
        maps.user_tokens
            .entry(token.user_id.clone())
            .or_default()
            .push(token.token.clone());
        Ok(())
    }

    async fn get_refresh_token(&self, token: &str) -> AuthResult<RefreshToken> {
        let maps = self.inner.read().await;
        let record = maps
            .refresh_tokens
            .get(token)
            .ok_or(AuthError::RefreshTokenNotFound)?;
        if OffsetDateTime::now_utc() > record.expires_at {
            return Err(AuthError::RefreshTokenExpired);
        }
        if record.revoked {
            return Err(AuthError::RefreshTokenRevoked);
        }
        Ok(record.clone())
    }

    async fn revoke_refresh_token(&self, token: &str) -> AuthResult<()> {
        if let Some(record) = self.inner.write().await.refresh_tokens.get_mut(token) {
            record.revoked = true;
        }
        Ok(())
    }

    async fn revoke_user_refresh_tokens(&self, user_id: &str) -> AuthResult<u64> {
        let mut maps = self.inner.write().await;
        let Some(tokens) = maps.user_tokens.get(user_id).cloned() else {
            return Ok(0);
        };
        let mut revoked = 0;
        for token in tokens {
            if let Some(record) = maps.refresh_tokens.get_mut(&token) {
                if !record.revoked {
                    record.revoked = true;
                    revoked += 1;
                }
            }
        }
        Ok(revoked)
    }

    async fn list_user_refresh_tokens(
        &self,
        user_id: &str,
        client_id: Option<&str>,
    ) -> AuthResult<Vec<RefreshToken>> {
        let maps = self.inner.read().await;
        let mut result: Vec<RefreshToken> = maps
            .user_tokens
            .get(user_id)
            .into_iter()
            .flatten()
            .filter_map(|t| maps.refresh_tokens.get(t))
            .filter(|t| t.is_valid())
            .filter(|t| client_id.is_none_or(|c| t.client_id == c))
            .cloned()
            .collect();
        result.sort_by_key(|t| t.created_at);
        Ok(result)
    }

    async fn save_otp(&self, key: &str, code: &str, ttl: time::Duration) -> AuthResult<()> {
        self.inner.write().await.otps.insert(
            key.to_string(),
            OtpEntry {
                code: code.to_string(),
                expires_at: OffsetDateTime::now_utc() + ttl,
            },
        );
        Ok(())
    }

    async fn get_otp(&self, key: &str) -> AuthResult<Option<String>> {
        let maps = self.inner.read().await;
        Ok(maps
            .otps
            .get(key)
            .filter(|o| OffsetDateTime::now_utc() <= o.expires_at)
            .map(|o| o.code.clone()))
    }

    async fn delete_otp(&self, key: &str) -> AuthResult<()> {
        self.inner.write().await.otps.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use crate::oauth::session::AuthorizeRequest;
    use crate::store::generate_refresh_token_value;

    use super::*;

    fn session_fixture() -> AuthSession {
        let request = AuthorizeRequest {
            response_type: "code".to_string(),
            client_id: "c1".to_string(),
            audience: "svc1".to_string(),
            redirect_uri: "https://app/cb".to_string(),
            code_challenge: "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM".to_string(),
            code_challenge_method: "S256".to_string(),
            state: None,
            scope: None,
            extra: HashMap::new(),
        };
        AuthSession::new(request, "consumer", time::Duration::minutes(10))
    }

    fn refresh_token_fixture(user: &str, created_offset_secs: i64) -> RefreshToken {
        let now = OffsetDateTime::now_utc();
        RefreshToken {
            token: generate_refresh_token_value(),
            user_id: user.to_string(),
            client_id: "c1".to_string(),
            audience: "svc1".to_string(),
            scope: "openid".to_string(),
            expires_at: now + time::Duration::days(365),
            revoked: false,
            created_at: now + time::Duration::seconds(created_offset_secs),
        }
    }

    #[tokio::test]
    async fn test_session_round_trip() {
        let store = MemoryStore::new();
        let session = session_fixture();

        store.save_session(&session).await.unwrap();
        let loaded = store.get_session(&session.id).await.unwrap();
        assert_eq!(loaded.id, session.id);

        store.delete_session(&session.id).await.unwrap();
        assert!(matches!(
            store.get_session(&session.id).await.unwrap_err(),
            AuthError::FlowNotFound
        ));
    }

    #[tokio::test]
    async fn test_expired_session_reads_as_expired_never_stale() {
        let store = MemoryStore::new();
        let mut session = session_fixture();
        session.expires_at = OffsetDateTime::now_utc() - time::Duration::seconds(1);

        store.save_session(&session).await.unwrap();
        assert!(matches!(
            store.get_session(&session.id).await.unwrap_err(),
            AuthError::FlowExpired
        ));
    }

    #[tokio::test]
    async fn test_code_redeemed_at_most_once() {
        let store = MemoryStore::new();
        let code = AuthorizationCode::new("sess_x", None, time::Duration::minutes(5));
        store.save_code(&code).await.unwrap();

        store.mark_code_used(&code.code).await.unwrap();
        assert!(matches!(
            store.mark_code_used(&code.code).await.unwrap_err(),
            AuthError::CodeUsed
        ));
        assert!(matches!(
            store.get_code(&code.code).await.unwrap_err(),
            AuthError::CodeUsed
        ));
    }

    #[tokio::test]
    async fn test_concurrent_redemption_has_one_winner() {
        let store = MemoryStore::new();
        let code = AuthorizationCode::new("sess_x", None, time::Duration::minutes(5));
        store.save_code(&code).await.unwrap();

        let (a, b) = tokio::join!(
            store.mark_code_used(&code.code),
            store.mark_code_used(&code.code)
        );
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
    }

    #[tokio::test]
    async fn test_expired_code() {
        let store = MemoryStore::new();
        let mut code = AuthorizationCode::new("sess_x", None, time::Duration::minutes(5));
        code.expires_at = OffsetDateTime::now_utc() - time::Duration::seconds(1);
        store.save_code(&code).await.unwrap();

        assert!(matches!(
            store.get_code(&code.code).await.unwrap_err(),
            AuthError::CodeExpired
        ));
        assert!(matches!(
            store.mark_code_used(&code.code).await.unwrap_err(),
            AuthError::CodeExpired
        ));
    }

    #[tokio::test]
    async fn test_refresh_token_lifecycle() {
        let store = MemoryStore::new();
        let token = refresh_token_fixture("u_1", 0);
        store.save_refresh_token(&token).await.unwrap();

        assert!(store.get_refresh_token(&token.token).await.is_ok());

        store.revoke_refresh_token(&token.token).await.unwrap();
        assert!(matches!(
            store.get_refresh_token(&token.token).await.unwrap_err(),
            AuthError::RefreshTokenRevoked
        ));
    }

    #[tokio::test]
    async fn test_list_user_refresh_tokens_oldest_first() {
        let store = MemoryStore::new();
        let newer = refresh_token_fixture("u_1", 10);
        let older = refresh_token_fixture("u_1", -10);
        let other_user = refresh_token_fixture("u_2", 0);

        store.save_refresh_token(&newer).await.unwrap();
        store.save_refresh_token(&older).await.unwrap();
        store.save_refresh_token(&other_user).await.unwrap();

        let listed = store.list_user_refresh_tokens("u_1", None).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].token, older.token);
        assert_eq!(listed[1].token, newer.token);
    }

    #[tokio::test]
    async fn test_revoke_all_user_tokens() {
        let store = MemoryStore::new();
        for i in 0..3 {
            store
                .save_refresh_token(&refresh_token_fixture("u_1", i))
                .await
                .unwrap();
        }
        assert_eq!(store.revoke_user_refresh_tokens("u_1").await.unwrap(), 3);
        assert!(store
            .list_user_refresh_tokens("u_1", None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_otp_round_trip_and_expiry() {
        let store = MemoryStore::new();
        store
            .save_otp("email:a@b.com", "123456", time::Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(
            store.get_otp("email:a@b.com").await.unwrap().as_deref(),
            Some("123456")
        );

        store.delete_otp("email:a@b.com").await.unwrap();
        assert!(store.get_otp("email:a@b.com").await.unwrap().is_none());

        store
            .save_otp("email:c@d.com", "654321", time::Duration::seconds(-1))
            .await
            .unwrap();
        assert!(store.get_otp("email:c@d.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sweep_reclaims_expired_entries() {
        let store = MemoryStore::new();
        let mut session = session_fixture();
        session.expires_at = OffsetDateTime::now_utc() - time::Duration::seconds(1);
        store.save_session(&session).await.unwrap();

        let live = session_fixture();
        store.save_session(&live).await.unwrap();

        store.sweep().await;

        assert!(matches!(
            store.get_session(&session.id).await.unwrap_err(),
            AuthError::FlowNotFound
        ));
        assert!(store.get_session(&live.id).await.is_ok());
    }
}
