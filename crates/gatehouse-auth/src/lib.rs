//! # gatehouse-auth
//!
//! Multi-tenant authorization and token issuance for the Gatehouse server.
//!
//! This crate provides:
//! - an OAuth2-flavored authorization-code flow with mandatory PKCE (S256)
//! - pluggable authentication connections (federated identity providers and
//!   email one-time codes)
//! - a double-envelope token scheme: the outer JWT is signed with the
//!   client domain's key, while the `sub` field of user tokens is sealed
//!   with the audience service's symmetric key
//! - session/code/refresh-token stores (in-process and Redis)
//! - axum handlers and a bearer-token extractor for the HTTP surface
//!
//! ## Modules
//!
//! - [`config`] - engine and token lifetimes
//! - [`directory`] - domain/client/service records and key resolution
//! - [`oauth`] - session state machine, PKCE, flow engine
//! - [`authn`] / [`idp`] - authentication strategies and the provider registry
//! - [`token`] - issuer, verifier, keys, claim sealing
//! - [`grants`] - the token endpoint grants
//! - [`store`] - session/code/refresh-token persistence
//! - [`users`] - user records
//! - [`http`] / [`middleware`] - the axum surface

pub mod authn;
pub mod config;
pub mod directory;
pub mod error;
pub mod grants;
pub mod http;
pub mod idp;
pub mod middleware;
pub mod oauth;
pub mod scope;
pub mod store;
pub mod token;
pub mod users;

pub use config::AuthConfig;
pub use error::AuthError;

/// Type alias for results in this crate.
pub type AuthResult<T> = Result<T, AuthError>;
