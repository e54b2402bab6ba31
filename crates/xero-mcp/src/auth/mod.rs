//! Outbound authentication against Xero.
//!
//! - [`CredentialStrategy`] picks how tokens are obtained (bearer, client credentials,
//!   browser PKCE, or stored refreshable tokens)
//! - [`Authenticator`] caches the current token, refreshes it once per expiry window,
//!   and resolves the tenant
//! - [`TokenStore`] persists refreshable tokens between runs

mod authenticator;
pub mod callback;
pub mod flow;
pub mod identity;
pub mod pkce;
pub mod store;
pub mod strategy;
pub mod token;

pub use authenticator::{AccessGrant, Authenticator, TenantBinding};
pub use callback::{AuthorizationRequestState, CallbackServer};
pub use flow::InteractiveOptions;
pub use identity::{ClientCredentials, Connection, IdentityClient};
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use strategy::{Acquired, CredentialStrategy};
pub use token::TokenRecord;
