//! User records and the user-store collaborator.

use std::collections::HashMap;

use async_trait::async_trait;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::authn::Authentication;
use crate::token::Claims;
use crate::AuthResult;

/// A user known to the authorization server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Stable identifier exposed to relying services.
    pub open_id: String,

    /// Connection the user first authenticated through.
    pub connection: String,

    /// Provider-side identifier for that connection.
    pub provider_id: String,

    /// Cross-application union identifier, when the provider has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub union_id: Option<String>,

    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,

    /// Avatar URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,

    /// Email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Phone number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    /// When the record was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl User {
    /// Builds a new user from a successful authentication. Email
    /// connections seed the email field; everyone gets a default profile.
    #[must_use]
    pub fn from_authentication(connection: &str, auth: &Authentication) -> Self {
        let open_id = generate_open_id();
        let email = (connection == crate::authn::email::EMAIL_CONNECTION)
            .then(|| auth.provider_id.clone());

        Self {
            open_id: open_id.clone(),
            connection: connection.to_string(),
            provider_id: auth.provider_id.clone(),
            union_id: auth.union_id.clone(),
            nickname: Some(default_nickname(&open_id)),
            picture: Some(default_picture(&open_id)),
            email,
            phone: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// The user's identity claims, unfiltered. Scope filtering happens at
    /// token mint time.
    #[must_use]
    pub fn claims(&self) -> Claims {
        Claims {
            open_id: self.open_id.clone(),
            nickname: self.nickname.clone(),
            picture: self.picture.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
        }
    }
}

/// Persistence collaborator for users.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Finds a user by the identity a connection reported.
    async fn find_by_provider(
        &self,
        connection: &str,
        provider_id: &str,
    ) -> AuthResult<Option<User>>;

    /// Finds a user by open id.
    async fn find_by_open_id(&self, open_id: &str) -> AuthResult<Option<User>>;

    /// Persists a new user.
    async fn create(&self, user: &User) -> AuthResult<()>;

    /// Updates the mutable profile fields. `None` leaves a field unchanged.
    async fn update_profile(
        &self,
        open_id: &str,
        nickname: Option<String>,
        picture: Option<String>,
    ) -> AuthResult<Option<User>>;
}

/// In-memory [`UserStore`] for wiring and tests.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<String, User>>,
}

impl MemoryUserStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_provider(
        &self,
        connection: &str,
        provider_id: &str,
    ) -> AuthResult<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.connection == connection && u.provider_id == provider_id)
            .cloned())
    }

    async fn find_by_open_id(&self, open_id: &str) -> AuthResult<Option<User>> {
        Ok(self.users.read().await.get(open_id).cloned())
    }

    async fn create(&self, user: &User) -> AuthResult<()> {
        self.users
            .write()
            .await
            .insert(user.open_id.clone(), user.clone());
        Ok(())
    }

    async fn update_profile(
        &self,
        open_id: &str,
        nickname: Option<String>,
        picture: Option<String>,
    ) -> AuthResult<Option<User>> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(open_id) else {
            return Ok(None);
        };
        if let Some(nickname) = nickname {
            user.nickname = Some(nickname);
        }
        if let Some(picture) = picture {
            user.picture = Some(picture);
        }
        Ok(Some(user.clone()))
    }
}

/// Generates a user open id (96 bits of entropy).
#[must_use]
pub fn generate_open_id() -> String {
    let mut bytes = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("u_{}", hex::encode(bytes))
}

fn default_nickname(open_id: &str) -> String {
    // Last few hex chars keep default names distinguishable.
    let suffix = &open_id[open_id.len().saturating_sub(6)..];
    format!("user-{suffix}")
}

fn default_picture(open_id: &str) -> String {
    format!("https://api.dicebear.com/7.x/fun-emoji/svg?seed={open_id}")
}
