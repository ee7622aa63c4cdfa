//! HTTP middleware: bearer-token extraction and error rendering.

pub mod auth;
pub mod error;

pub use auth::BearerAuth;
pub use error::OAuthErrorBody;
