//! OAuth 2.0 authorization server for the HTTP transport.
//!
//! Enabled with `AUTH_ENABLED`. The pre-configured client from
//! `OAUTH_CLIENT_ID`/`OAUTH_CLIENT_SECRET` may use any grant; clients added by
//! dynamic registration are public and must use PKCE.
//!
//! ## Supported Standards
//! - RFC 9728: OAuth Protected Resource Metadata
//! - RFC 8414: OAuth Authorization Server Metadata
//! - RFC 7591: Dynamic Client Registration
//! - RFC 7636: PKCE
//! - RFC 6749: Authorization Code, Client Credentials and Refresh Token grants
//! - RFC 7662: Token Introspection

pub mod handlers;
pub mod pages;
pub mod store;
mod types;

pub use store::{DEFAULT_SCOPE, OAuthStore, TokenInfo};
pub use types::OAuthClient;
