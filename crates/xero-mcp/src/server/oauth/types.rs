//! OAuth 2.0 records kept by the inbound authorization server.

use std::time::Instant;

/// A client allowed to request tokens.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    pub client_id: String,
    /// `None` for public clients registered dynamically; those must use PKCE.
    pub client_secret: Option<String>,
    pub client_name: Option<String>,
    /// Exact redirect URIs this client may use.
    pub redirect_uris: Vec<String>,
    pub created_at: Instant,
}

impl OAuthClient {
    #[must_use]
    pub fn is_confidential(&self) -> bool {
        self.client_secret.is_some()
    }

    #[must_use]
    pub fn allows_redirect(&self, redirect_uri: &str) -> bool {
        self.redirect_uris.iter().any(|u| u == redirect_uri)
    }
}

/// An authorization code issued after user approval.
#[derive(Debug, Clone)]
pub struct AuthCode {
    pub client_id: String,
    pub redirect_uri: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub scope: String,
    pub expires_at: Instant,
}

/// An access token for the MCP endpoints.
#[derive(Debug)]
pub struct AccessToken {
    pub client_id: String,
    pub scope: String,
    pub expires_at: Instant,
    /// Expiry as Unix seconds, reported by introspection.
    pub exp: i64,
}

/// A refresh token bound to the access token it was issued with.
#[derive(Debug)]
pub struct RefreshToken {
    pub client_id: String,
    pub access_token: String,
    pub scope: String,
    pub expires_at: Instant,
}

impl AuthCode {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

impl AccessToken {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

impl RefreshToken {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}
