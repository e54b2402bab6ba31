//! Credential strategies.
//!
//! One strategy is chosen at startup from configuration. Each variant knows how to obtain
//! a token from scratch and how to renew one; caching, persistence and tenant resolution
//! live in the [`Authenticator`](super::Authenticator).

use super::flow::{self, InteractiveOptions};
use super::identity::{ClientCredentials, IdentityClient};
use super::store::TokenStore;
use super::token::TokenRecord;
use crate::config::{AuthMode, Config, api};
use crate::error::{AuthError, AuthResult};

/// A token obtained by [`CredentialStrategy::acquire`].
#[derive(Debug, Clone)]
pub enum Acquired {
    /// Loaded from the token store as-is.
    Stored(TokenRecord),
    /// Freshly issued by Xero (or the static bearer token).
    Issued(TokenRecord),
}

/// How the server obtains Xero access tokens.
#[derive(Debug, Clone)]
pub enum CredentialStrategy {
    /// A fixed bearer token. Never refreshed.
    StaticBearer { token: String },

    /// Custom connection: client credentials grant, cached in memory until near expiry.
    ClientCredentials { credentials: ClientCredentials, scope: String },

    /// Browser-based authorization code flow with PKCE. Tokens are persisted and
    /// refreshed on later runs.
    AuthorizationCodePkce { credentials: ClientCredentials, options: InteractiveOptions },

    /// Stored tokens from a previous interactive login, refreshed near expiry.
    RefreshableOAuth { credentials: ClientCredentials },
}

impl CredentialStrategy {
    /// Select the strategy by priority:
    /// static bearer > interactive > refreshable > client credentials.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no credentials are set.
    pub fn from_config(config: &Config) -> AuthResult<Self> {
        let mode = config.auth_mode().ok_or_else(|| {
            AuthError::configuration(
                "Xero credentials not set - set XERO_CLIENT_BEARER_TOKEN, or XERO_CLIENT_ID \
                 and XERO_CLIENT_SECRET",
            )
        })?;
        Self::for_mode(mode, config)
    }

    /// Build the strategy for an explicit mode.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the mode's credentials are missing.
    pub fn for_mode(mode: AuthMode, config: &Config) -> AuthResult<Self> {
        match mode {
            AuthMode::StaticBearer => {
                let token = config.bearer_token.clone().ok_or_else(|| {
                    AuthError::configuration("XERO_CLIENT_BEARER_TOKEN is not set")
                })?;
                Ok(Self::StaticBearer { token })
            }
            AuthMode::ClientCredentials => Ok(Self::ClientCredentials {
                credentials: client_credentials(config)?,
                scope: api::CLIENT_CREDENTIALS_SCOPES.to_string(),
            }),
            AuthMode::Interactive => Ok(Self::AuthorizationCodePkce {
                credentials: client_credentials(config)?,
                options: InteractiveOptions {
                    redirect_uri: config.redirect_uri.clone(),
                    scope: api::INTERACTIVE_SCOPES.to_string(),
                    timeout: config.callback_timeout,
                    open_browser: config.open_browser,
                    url_sink: None,
                },
            }),
            AuthMode::Refreshable => {
                Ok(Self::RefreshableOAuth { credentials: client_credentials(config)? })
            }
        }
    }

    #[must_use]
    pub const fn mode(&self) -> AuthMode {
        match self {
            Self::StaticBearer { .. } => AuthMode::StaticBearer,
            Self::ClientCredentials { .. } => AuthMode::ClientCredentials,
            Self::AuthorizationCodePkce { .. } => AuthMode::Interactive,
            Self::RefreshableOAuth { .. } => AuthMode::Refreshable,
        }
    }

    /// Whether tokens from this strategy carry a meaningful expiry.
    #[must_use]
    pub const fn expires(&self) -> bool {
        !matches!(self, Self::StaticBearer { .. })
    }

    /// Whether tokens are written to the token store.
    #[must_use]
    pub const fn persists_tokens(&self) -> bool {
        matches!(self, Self::AuthorizationCodePkce { .. } | Self::RefreshableOAuth { .. })
    }

    /// Obtain a token without any in-memory state.
    ///
    /// Stored records are returned as loaded; the caller checks their expiry. The
    /// interactive variant only starts the browser flow when `allow_browser` is set.
    pub async fn acquire(
        &self,
        identity: &IdentityClient,
        store: &dyn TokenStore,
        allow_browser: bool,
    ) -> AuthResult<Acquired> {
        match self {
            Self::StaticBearer { token } => {
                Ok(Acquired::Issued(TokenRecord::non_expiring(token.clone())))
            }
            Self::ClientCredentials { credentials, scope } => {
                identity.client_credentials(credentials, scope).await.map(Acquired::Issued)
            }
            Self::AuthorizationCodePkce { credentials, options } => {
                if let Some(record) = store.load().await {
                    tracing::debug!("Using stored tokens from previous authorization");
                    return Ok(Acquired::Stored(record));
                }
                if !allow_browser {
                    return Err(AuthError::configuration(
                        "Stored Xero tokens were rejected and interactive fallback is disabled. \
                         Run `xero-mcp login` to authorize again.",
                    ));
                }
                tracing::info!("No stored tokens, starting browser authorization");
                flow::run_authorization_code_flow(identity, credentials, options)
                    .await
                    .map(Acquired::Issued)
            }
            Self::RefreshableOAuth { .. } => store.load().await.map(Acquired::Stored).ok_or_else(|| {
                AuthError::configuration(
                    "No stored Xero tokens found. Run `xero-mcp login` to authorize this \
                     server interactively first.",
                )
            }),
        }
    }

    /// Renew `current`.
    pub async fn refresh(
        &self,
        identity: &IdentityClient,
        current: &TokenRecord,
    ) -> AuthResult<TokenRecord> {
        match self {
            Self::StaticBearer { .. } => Ok(current.clone()),
            Self::ClientCredentials { credentials, scope } => {
                identity.client_credentials(credentials, scope).await
            }
            Self::AuthorizationCodePkce { credentials, .. }
            | Self::RefreshableOAuth { credentials } => {
                let refresh_token = current.refresh_token.as_deref().ok_or_else(|| {
                    AuthError::configuration(
                        "Stored Xero tokens have no refresh token. Run `xero-mcp login` again.",
                    )
                })?;
                let mut renewed = identity.refresh(credentials, refresh_token).await?;
                if renewed.refresh_token.is_none() {
                    renewed.refresh_token = current.refresh_token.clone();
                }
                Ok(renewed)
            }
        }
    }

    /// Run the browser flow, regardless of stored state.
    ///
    /// Only available for the interactive strategy.
    pub async fn reauthorize(&self, identity: &IdentityClient) -> AuthResult<TokenRecord> {
        match self {
            Self::AuthorizationCodePkce { credentials, options } => {
                flow::run_authorization_code_flow(identity, credentials, options).await
            }
            other => Err(AuthError::configuration(format!(
                "interactive authorization is not available in {} mode",
                other.mode().as_str()
            ))),
        }
    }
}

fn client_credentials(config: &Config) -> AuthResult<ClientCredentials> {
    match (&config.client_id, &config.client_secret) {
        (Some(id), Some(secret)) => Ok(ClientCredentials::new(id.clone(), secret.clone())),
        _ => Err(AuthError::configuration("XERO_CLIENT_ID and XERO_CLIENT_SECRET must both be set")),
    }
}
