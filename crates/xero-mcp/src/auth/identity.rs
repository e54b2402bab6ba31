//! Client for the Xero identity endpoint and the connections listing.
//!
//! Deliberately has no retry middleware: connectivity failures surface as
//! [`AuthError::TransientNetwork`] so the caller decides whether to back off.

use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use url::Url;

use super::token::{TokenErrorResponse, TokenRecord, TokenResponse};
use crate::config::Config;
use crate::error::{AuthError, AuthResult};

/// Xero app credentials, sent to the token endpoint with HTTP Basic.
#[derive(Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl ClientCredentials {
    #[must_use]
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self { client_id: client_id.into(), client_secret: client_secret.into() }
    }
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id_len", &self.client_id.len())
            .field("client_secret_len", &self.client_secret.len())
            .finish()
    }
}

/// An organisation (tenant) the token is authorised for.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    #[serde(default)]
    pub id: Option<String>,
    pub tenant_id: String,
    #[serde(default)]
    pub tenant_name: Option<String>,
    #[serde(default)]
    pub tenant_type: Option<String>,
}

/// HTTP client for token grants and tenant discovery.
#[derive(Debug, Clone)]
pub struct IdentityClient {
    http: Client,
    token_url: String,
    authorize_url: String,
    connections_url: String,
}

impl IdentityClient {
    /// Create a new identity client.
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails.
    pub fn new(config: &Config) -> AuthResult<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| AuthError::configuration(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            http,
            token_url: config.identity_url.clone(),
            authorize_url: config.authorize_url.clone(),
            connections_url: config.connections_url.clone(),
        })
    }

    /// Custom connection token via the client credentials grant.
    pub async fn client_credentials(
        &self,
        credentials: &ClientCredentials,
        scope: &str,
    ) -> AuthResult<TokenRecord> {
        tracing::info!(
            client_id_len = credentials.client_id.len(),
            scope = %scope,
            "Requesting Xero access token via client credentials"
        );
        self.token_request(credentials, &[("grant_type", "client_credentials"), ("scope", scope)])
            .await
    }

    /// Exchange an authorization code (plus PKCE verifier) for tokens.
    pub async fn exchange_code(
        &self,
        credentials: &ClientCredentials,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> AuthResult<TokenRecord> {
        tracing::info!("Exchanging authorization code for Xero tokens");
        self.token_request(
            credentials,
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("code_verifier", code_verifier),
            ],
        )
        .await
    }

    /// Redeem a refresh token.
    pub async fn refresh(
        &self,
        credentials: &ClientCredentials,
        refresh_token: &str,
    ) -> AuthResult<TokenRecord> {
        tracing::info!("Refreshing Xero access token");
        self.token_request(
            credentials,
            &[("grant_type", "refresh_token"), ("refresh_token", refresh_token)],
        )
        .await
    }

    /// List the organisations the token can access, most recently connected first.
    pub async fn list_connections(&self, access_token: &str) -> AuthResult<Vec<Connection>> {
        let response = self
            .http
            .get(&self.connections_url)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(AuthError::network)?;

        let status = response.status();
        tracing::debug!(status = status.as_u16(), "Connections response");

        if status.is_success() {
            return response.json().await.map_err(|e| {
                AuthError::exchange(status.as_u16(), format!("malformed connections response: {e}"))
            });
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(status, &body))
    }

    /// Build the browser authorization URL.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the configured authorize URL is invalid.
    pub fn authorization_url(
        &self,
        client_id: &str,
        redirect_uri: &str,
        scope: &str,
        state: &str,
        code_challenge: &str,
    ) -> AuthResult<Url> {
        let mut url = Url::parse(&self.authorize_url).map_err(|e| {
            AuthError::configuration(format!("invalid authorize URL {}: {e}", self.authorize_url))
        })?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", scope)
            .append_pair("state", state)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", "S256");
        Ok(url)
    }

    async fn token_request(
        &self,
        credentials: &ClientCredentials,
        form: &[(&str, &str)],
    ) -> AuthResult<TokenRecord> {
        let issued_at = Utc::now();
        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
            .header(reqwest::header::ACCEPT, "application/json")
            .form(form)
            .send()
            .await
            .map_err(AuthError::network)?;

        let status = response.status();
        tracing::debug!(status = status.as_u16(), "Token response");

        if status.is_success() {
            let token: TokenResponse = response.json().await.map_err(|e| {
                AuthError::exchange(status.as_u16(), format!("malformed token response: {e}"))
            })?;
            return Ok(token.into_record(issued_at));
        }

        let body = response.text().await.unwrap_or_default();
        let err = classify_failure(status, &body);
        tracing::warn!(status = status.as_u16(), error = %err, "Xero token request failed");
        Err(err)
    }
}

fn classify_failure(status: StatusCode, body: &str) -> AuthError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        AuthError::network(format!("Xero returned {status}"))
    } else {
        AuthError::exchange(status.as_u16(), TokenErrorResponse::describe(body))
    }
}
