//! Redis-backed store.
//!
//! Values are JSON with PX TTLs derived from each record's `expires_at`, so
//! the cache expires entries on its own; lookups still check `expires_at`
//! and never trust a stale read. At-most-once code redemption uses `SET NX`
//! on a per-code marker key, which is a compare-and-set — a get-then-set
//! pair would race.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use time::OffsetDateTime;

use crate::error::AuthError;
use crate::oauth::session::{AuthSession, AuthorizationCode};
use crate::AuthResult;

use super::{RefreshToken, SessionStore};

/// Margin added to the used-marker TTL so the marker outlives its code.
const USED_MARKER_MARGIN_MS: i64 = 60_000;

/// Redis-backed [`SessionStore`].
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connects to a Redis instance.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the URL is invalid or the connection fails.
    pub async fn connect(url: &str) -> AuthResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| AuthError::storage(format!("open redis client: {e}")))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| AuthError::storage(format!("connect to redis: {e}")))?;
        Ok(Self { conn })
    }

    /// Wraps an existing connection manager.
    #[must_use]
    pub fn with_connection(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }

    async fn set_json<T: serde::Serialize>(
        &self,
        key: &str,
        value: &T,
        expires_at: OffsetDateTime,
    ) -> AuthResult<()> {
        let json = serde_json::to_string(value)
            .map_err(|e| AuthError::storage(format!("serialize record: {e}")))?;
        let ttl_ms = remaining_ms(expires_at);

        let mut conn = self.conn();
        redis::cmd("SET")
            .arg(key)
            .arg(json)
            .arg("PX")
            .arg(ttl_ms)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| AuthError::storage(format!("write record: {e}")))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> AuthResult<Option<T>> {
        let mut conn = self.conn();
        let raw: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| AuthError::storage(format!("read record: {e}")))?;
        match raw {
            None => Ok(None),
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| AuthError::storage(format!("decode record: {e}"))),
        }
    }

    async fn delete(&self, key: &str) -> AuthResult<()> {
        let mut conn = self.conn();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| AuthError::storage(format!("delete record: {e}")))
    }
}

fn session_key(id: &str) -> String {
    format!("session:{id}")
}

fn code_key(code: &str) -> String {
    format!("code:{code}")
}

fn code_used_key(code: &str) -> String {
    format!("code:used:{code}")
}

fn refresh_key(token: &str) -> String {
    format!("rt:{token}")
}

fn user_tokens_key(user_id: &str) -> String {
    format!("rt:user:{user_id}")
}

fn otp_key(key: &str) -> String {
    format!("otp:{key}")
}

/// Milliseconds until `expires_at`, at least 1.
fn remaining_ms(expires_at: OffsetDateTime) -> i64 {
    let ms = (expires_at - OffsetDateTime::now_utc()).whole_milliseconds();
    i64::try_from(ms).unwrap_or(i64::MAX).max(1)
}

#[async_trait]
impl SessionStore for RedisStore {
    async fn save_session(&self, session: &AuthSession) -> AuthResult<()> {
        self.set_json(&session_key(&session.id), session, session.expires_at)
            .await
    }

    async fn get_session(&self, session_id: &str) -> AuthResult<AuthSession> {
        let session: AuthSession = self
            .get_json(&session_key(session_id))
            .await?
            .ok_or(AuthError::FlowNotFound)?;
        if session.is_expired() {
            return Err(AuthError::FlowExpired);
        }
        Ok(session)
    }

    async fn update_session(&self, session: &AuthSession) -> AuthResult<()> {
        self.save_session(session).await
    }

    async fn delete_session(&self, session_id: &str) -> AuthResult<()> {
        self.delete(&session_key(session_id)).await
    }

    async fn save_code(&self, code: &AuthorizationCode) -> AuthResult<()> {
        self.set_json(&code_key(&code.code), code, code.expires_at)
            .await
    }

    async fn get_code(&self, code: &str) -> AuthResult<AuthorizationCode> {
        let record: AuthorizationCode = self
            .get_json(&code_key(code))
            .await?
            .ok_or(AuthError::CodeNotFound)?;
        if record.is_expired() {
            return Err(AuthError::CodeExpired);
        }
        let mut conn = self.conn();
        let used: bool = conn
            .exists(code_used_key(code))
            .await
            .map_err(|e| AuthError::storage(format!("read used marker: {e}")))?;
        if used {
            return Err(AuthError::CodeUsed);
        }
        Ok(record)
    }

    async fn mark_code_used(&self, code: &str) -> AuthResult<()> {
        let record: AuthorizationCode = self
            .get_json(&code_key(code))
            .await?
            .ok_or(AuthError::CodeNotFound)?;
        if record.is_expired() {
            return Err(AuthError::CodeExpired);
        }

        // SET NX is the compare-and-set: exactly one caller creates the
        // marker, everyone else observes it.
        let marker_ttl = remaining_ms(record.expires_at) + USED_MARKER_MARGIN_MS;
        let mut conn = self.conn();
        let created: Option<String> = redis::cmd("SET")
            .arg(code_used_key(code))
            .arg(1)
            .arg("NX")
            .arg("PX")
            .arg(marker_ttl)
            .query_async(&mut conn)
            .await
            .map_err(|e| AuthError::storage(format!("write used marker: {e}")))?;

        if created.is_none() {
            return Err(AuthError::CodeUsed);
        }
        Ok(())
    }

    async fn delete_code(&self, code: &str) -> AuthResult<()> {
        self.delete(&code_key(code)).await
    }

    async fn save_refresh_token(&self, token: &RefreshToken) -> AuthResult<()> {
        self.set_json(&refresh_key(&token.token), token, token.expires_at)
            .await?;

        let mut conn = self.conn();
        let index = user_tokens_key(&token.user_id);
        let score = token.created_at.unix_timestamp();
        conn.zadd::<_, _, _, ()>(&index, &token.token, score)
            .await
            .map_err(|e| AuthError::storage(format!("index refresh token: {e}")))?;
        conn.pexpire::<_, ()>(&index, remaining_ms(token.expires_at))
            .await
            .map_err(|e| AuthError::storage(format!("expire token index: {e}")))?;
        Ok(())
    }

    async fn get_refresh_token(&self, token: &str) -> AuthResult<RefreshToken> {
        let record: RefreshToken = self
            .get_json(&refresh_key(token))
            .await?
            .ok_or(AuthError::RefreshTokenNotFound)?;
        if OffsetDateTime::now_utc() > record.expires_at {
            return Err(AuthError::RefreshTokenExpired);
        }
        if record.revoked {
            return Err(AuthError::RefreshTokenRevoked);
        }
        Ok(record)
    }

    async fn revoke_refresh_token(&self, token: &str) -> AuthResult<()> {
        let Some(mut record) = self.get_json::<RefreshToken>(&refresh_key(token)).await? else {
            return Ok(());
        };
        record.revoked = true;
        self.set_json(&refresh_key(token), &record, record.expires_at)
            .await
    }

    async fn revoke_user_refresh_tokens(&self, user_id: &str) -> AuthResult<u64> {
        let mut conn = self.conn();
        let tokens: Vec<String> = conn
            .zrange(user_tokens_key(user_id), 0, -1)
            .await
            .map_err(|e| AuthError::storage(format!("list token index: {e}")))?;

        let mut revoked = 0;
        for token in tokens {
            if let Some(mut record) = self.get_json::<RefreshToken>(&refresh_key(&token)).await? {
                if !record.revoked {
                    record.revoked = true;
                    self.set_json(&refresh_key(&token), &record, record.expires_at)
                        .await?;
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
        let mut conn = self.conn();
        // ZRANGE returns ascending score order: oldest first.
        let tokens: Vec<String> = conn
            .zrange(user_tokens_key(user_id), 0, -1)
            .await
            .map_err(|e| AuthError::storage(format!("list token index: {e}")))?;

        let mut result = Vec::with_capacity(tokens.len());
        for token in tokens {
            if let Some(record) = self.get_json::<RefreshToken>(&refresh_key(&token)).await? {
                if record.is_valid() && client_id.is_none_or(|c| record.client_id == c) {
                    result.push(record);
                }
            }
        }
        Ok(result)
    }

    async fn save_otp(&self, key: &str, code: &str, ttl: time::Duration) -> AuthResult<()> {
        let expires_at = OffsetDateTime::now_utc() + ttl;
        let mut conn = self.conn();
        redis::cmd("SET")
            .arg(otp_key(key))
            .arg(code)
            .arg("PX")
            .arg(remaining_ms(expires_at))
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| AuthError::storage(format!("write otp: {e}")))
    }

    async fn get_otp(&self, key: &str) -> AuthResult<Option<String>> {
        let mut conn = self.conn();
        conn.get(otp_key(key))
            .await
            .map_err(|e| AuthError::storage(format!("read otp: {e}")))
    }

    async fn delete_otp(&self, key: &str) -> AuthResult<()> {
        self.delete(&otp_key(key)).await
    }
}
