//! Configuration for the Xero MCP server.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

/// API configuration constants.
pub mod api {
    use std::time::Duration;

    /// Xero identity token endpoint.
    pub const IDENTITY_TOKEN_URL: &str = "https://identity.xero.com/connect/token";

    /// Xero authorization endpoint for the browser flow.
    pub const AUTHORIZE_URL: &str = "https://login.xero.com/identity/connect/authorize";

    /// Connections listing (tenants authorised for a token).
    pub const CONNECTIONS_URL: &str = "https://api.xero.com/connections";

    /// Accounting API base.
    pub const ACCOUNTING_API: &str = "https://api.xero.com/api.xro/2.0";

    /// Redirect URI registered for the local callback listener.
    pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:5000/callback";

    /// Token file used when `XERO_TOKEN_FILE` is unset.
    pub const DEFAULT_TOKEN_FILE: &str = ".xero-tokens.json";

    /// Scopes requested by the interactive browser flow.
    pub const INTERACTIVE_SCOPES: &str = "openid profile email accounting.transactions \
        accounting.contacts accounting.settings accounting.reports.read payroll.settings \
        payroll.employees payroll.timesheets offline_access";

    /// Scopes requested by custom connections (client credentials).
    pub const CLIENT_CREDENTIALS_SCOPES: &str = "accounting.transactions accounting.contacts \
        accounting.settings accounting.reports.read payroll.settings payroll.employees \
        payroll.timesheets";

    /// Tokens are treated as expired this long before their real expiry.
    pub const TOKEN_SAFETY_MARGIN: Duration = Duration::from_secs(60);

    /// Time budget for the interactive browser flow.
    pub const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

    /// Request timeout.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connection timeout.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Xero allows 60 calls per minute per tenant.
    pub const RATE_LIMIT_PER_MINUTE: u32 = 60;

    /// Retries for transient accounting API failures.
    pub const MAX_RETRIES: u32 = 3;

    /// Cache TTL for read-only accounting responses.
    pub const CACHE_TTL: Duration = Duration::from_secs(30);

    /// Maximum cache size.
    pub const CACHE_MAX_SIZE: u64 = 500;

    /// Maximum keepalive connections.
    pub const MAX_KEEPALIVE: usize = 10;

    /// Keepalive expiry.
    pub const KEEPALIVE_EXPIRY: Duration = Duration::from_secs(30);

    /// Idle time after which an HTTP session is evicted.
    pub const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

    /// How often the session sweeper runs.
    pub const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

    /// Lifetime of access tokens issued by the inbound OAuth server.
    pub const INBOUND_TOKEN_EXPIRY: Duration = Duration::from_secs(3600);
}

/// How the server authenticates against Xero, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// A fixed bearer token from `XERO_CLIENT_BEARER_TOKEN`.
    StaticBearer,
    /// Browser-based authorization code flow with PKCE.
    Interactive,
    /// Tokens from a previous interactive login, refreshed as needed.
    Refreshable,
    /// Custom connection using the client credentials grant.
    ClientCredentials,
}

impl AuthMode {
    /// Short label used in logs and the readiness endpoint.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StaticBearer => "bearer_token",
            Self::Interactive => "interactive_oauth",
            Self::Refreshable => "refreshable_oauth",
            Self::ClientCredentials => "client_credentials",
        }
    }
}

/// Settings for the inbound OAuth server guarding the HTTP transport.
#[derive(Clone)]
pub struct InboundAuthConfig {
    /// Pre-registered client id for the client credentials grant.
    pub client_id: String,
    /// Pre-registered client secret.
    pub client_secret: String,
    /// Lifetime of issued access tokens.
    pub token_expiry: Duration,
    /// Redirect URIs the pre-registered client may use. Empty allows none.
    pub redirect_uris: Vec<String>,
}

impl std::fmt::Debug for InboundAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundAuthConfig")
            .field("client_id", &self.client_id)
            .field("token_expiry", &self.token_expiry)
            .field("redirect_uris", &self.redirect_uris)
            .finish()
    }
}

/// Server configuration.
#[derive(Clone)]
pub struct Config {
    /// Xero app client id.
    pub client_id: Option<String>,

    /// Xero app client secret.
    pub client_secret: Option<String>,

    /// Fixed bearer token (takes priority over everything else).
    pub bearer_token: Option<String>,

    /// Run the browser flow when no stored tokens exist.
    pub interactive: bool,

    /// Use stored tokens from a previous `login`, refreshing them near expiry.
    pub oauth_mode: bool,

    /// Fall back to the browser flow once when a refresh token is rejected.
    pub interactive_fallback: bool,

    /// Open the system browser automatically during the interactive flow.
    pub open_browser: bool,

    /// Where tokens are persisted.
    pub token_file: PathBuf,

    /// Redirect URI for the local callback listener.
    pub redirect_uri: String,

    /// Identity token endpoint (overridable for mock servers).
    pub identity_url: String,

    /// Authorization endpoint.
    pub authorize_url: String,

    /// Connections listing endpoint.
    pub connections_url: String,

    /// Accounting API base URL.
    pub accounting_api_url: String,

    /// Safety margin before token expiry.
    pub token_safety_margin: Duration,

    /// Interactive flow time budget.
    pub callback_timeout: Duration,

    /// Request timeout.
    pub request_timeout: Duration,

    /// Connection timeout.
    pub connect_timeout: Duration,

    /// Accounting API calls per minute.
    pub rate_limit_per_minute: u32,

    /// Retries for transient accounting API failures.
    pub max_retries: u32,

    /// Cache TTL.
    pub cache_ttl: Duration,

    /// Maximum cache size.
    pub cache_max_size: u64,

    /// Static API key accepted as a bearer token on the HTTP transport.
    pub api_key: Option<String>,

    /// Inbound OAuth server, when `AUTH_ENABLED` is set.
    pub inbound_auth: Option<InboundAuthConfig>,

    /// HTTP session idle timeout.
    pub session_idle_timeout: Duration,

    /// HTTP session sweep interval.
    pub session_sweep_interval: Duration,

    /// CORS origins for the HTTP transport. Empty allows any origin.
    pub allowed_origins: Vec<String>,
}

impl Config {
    /// Create a configuration with production endpoints and no credentials.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            bearer_token: None,
            interactive: false,
            oauth_mode: false,
            interactive_fallback: false,
            open_browser: true,
            token_file: PathBuf::from(api::DEFAULT_TOKEN_FILE),
            redirect_uri: api::DEFAULT_REDIRECT_URI.to_string(),
            identity_url: api::IDENTITY_TOKEN_URL.to_string(),
            authorize_url: api::AUTHORIZE_URL.to_string(),
            connections_url: api::CONNECTIONS_URL.to_string(),
            accounting_api_url: api::ACCOUNTING_API.to_string(),
            token_safety_margin: api::TOKEN_SAFETY_MARGIN,
            callback_timeout: api::CALLBACK_TIMEOUT,
            request_timeout: api::REQUEST_TIMEOUT,
            connect_timeout: api::CONNECT_TIMEOUT,
            rate_limit_per_minute: api::RATE_LIMIT_PER_MINUTE,
            max_retries: api::MAX_RETRIES,
            cache_ttl: api::CACHE_TTL,
            cache_max_size: api::CACHE_MAX_SIZE,
            api_key: None,
            inbound_auth: None,
            session_idle_timeout: api::SESSION_IDLE_TIMEOUT,
            session_sweep_interval: api::SESSION_SWEEP_INTERVAL,
            allowed_origins: Vec::new(),
        }
    }

    /// Create a test configuration with custom URLs for mock servers.
    #[must_use]
    pub fn for_testing(base_url: &str) -> Self {
        Self {
            identity_url: format!("{base_url}/connect/token"),
            authorize_url: format!("{base_url}/identity/connect/authorize"),
            connections_url: format!("{base_url}/connections"),
            accounting_api_url: format!("{base_url}/api.xro/2.0"),
            open_browser: false,
            request_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
            callback_timeout: Duration::from_secs(5),
            rate_limit_per_minute: 10_000,
            max_retries: 0,
            cache_ttl: Duration::from_secs(0), // No caching in tests
            cache_max_size: 0,
            ..Self::new()
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns error if environment variables are invalid.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns error if a numeric variable cannot be parsed, or `AUTH_ENABLED` is set
    /// without `OAUTH_CLIENT_ID` and `OAUTH_CLIENT_SECRET`.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let flag = |key: &str| var(key).is_some_and(|v| parse_flag(&v));
        let secs = |key: &str, default: Duration| -> anyhow::Result<Duration> {
            var(key).map_or(Ok(default), |v| {
                v.parse::<u64>()
                    .map(Duration::from_secs)
                    .with_context(|| format!("{key} must be a whole number of seconds, got {v:?}"))
            })
        };

        let mut config = Self::new();
        config.client_id = var("XERO_CLIENT_ID");
        config.client_secret = var("XERO_CLIENT_SECRET");
        config.bearer_token = var("XERO_CLIENT_BEARER_TOKEN");
        config.interactive = flag("XERO_INTERACTIVE");
        config.oauth_mode = flag("XERO_OAUTH_MODE");
        config.interactive_fallback = flag("XERO_INTERACTIVE_FALLBACK");
        if let Some(path) = var("XERO_TOKEN_FILE") {
            config.token_file = PathBuf::from(path);
        }
        if let Some(uri) = var("XERO_REDIRECT_URI") {
            config.redirect_uri = uri;
        }
        config.token_safety_margin =
            secs("XERO_TOKEN_SAFETY_MARGIN_SECS", api::TOKEN_SAFETY_MARGIN)?;
        config.callback_timeout = secs("XERO_CALLBACK_TIMEOUT_SECS", api::CALLBACK_TIMEOUT)?;
        config.session_idle_timeout =
            secs("MCP_SESSION_IDLE_TIMEOUT_SECS", api::SESSION_IDLE_TIMEOUT)?;
        config.session_sweep_interval =
            secs("MCP_SESSION_SWEEP_SECS", api::SESSION_SWEEP_INTERVAL)?;
        config.api_key = var("MCP_API_KEY");
        config.allowed_origins = var("ALLOWED_ORIGINS").map(|v| split_list(&v)).unwrap_or_default();

        if flag("AUTH_ENABLED") {
            let client_id = var("OAUTH_CLIENT_ID")
                .context("AUTH_ENABLED requires OAUTH_CLIENT_ID to be set")?;
            let client_secret = var("OAUTH_CLIENT_SECRET")
                .context("AUTH_ENABLED requires OAUTH_CLIENT_SECRET to be set")?;
            config.inbound_auth = Some(InboundAuthConfig {
                client_id,
                client_secret,
                token_expiry: secs("TOKEN_EXPIRY", api::INBOUND_TOKEN_EXPIRY)?,
                redirect_uris: var("OAUTH_REDIRECT_URIS").map(|v| split_list(&v)).unwrap_or_default(),
            });
        }

        Ok(config)
    }

    /// Select the authentication mode by priority:
    /// static bearer > interactive > refreshable > client credentials.
    ///
    /// Returns `None` when no usable credentials are configured.
    #[must_use]
    pub fn auth_mode(&self) -> Option<AuthMode> {
        let has_client = self.client_id.is_some() && self.client_secret.is_some();

        if self.bearer_token.is_some() {
            Some(AuthMode::StaticBearer)
        } else if self.interactive && has_client {
            Some(AuthMode::Interactive)
        } else if self.oauth_mode && has_client {
            Some(AuthMode::Refreshable)
        } else if has_client {
            Some(AuthMode::ClientCredentials)
        } else {
            None
        }
    }

    /// Check if the HTTP transport requires a bearer token.
    #[must_use]
    pub const fn requires_inbound_auth(&self) -> bool {
        self.api_key.is_some() || self.inbound_auth.is_some()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("client_id_set", &self.client_id.is_some())
            .field("client_secret_set", &self.client_secret.is_some())
            .field("bearer_token_set", &self.bearer_token.is_some())
            .field("auth_mode", &self.auth_mode())
            .field("token_file", &self.token_file)
            .field("redirect_uri", &self.redirect_uri)
            .field("interactive_fallback", &self.interactive_fallback)
            .field("api_key_set", &self.api_key.is_some())
            .field("inbound_auth", &self.inbound_auth)
            .finish()
    }
}

/// Comma-separated list, blanks dropped.
fn split_list(value: &str) -> Vec<String> {
    value.split(',').map(str::trim).filter(|v| !v.is_empty()).map(str::to_string).collect()
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
