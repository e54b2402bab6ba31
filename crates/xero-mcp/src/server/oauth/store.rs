//! In-memory OAuth store following the session registry pattern.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use super::types::{AccessToken, AuthCode, OAuthClient, RefreshToken};
use crate::auth::pkce::constant_time_eq;
use crate::config::InboundAuthConfig;

/// Auth code lifetime: 10 minutes.
const AUTH_CODE_LIFETIME: Duration = Duration::from_secs(600);
/// Refresh token lifetime: 30 days.
const REFRESH_TOKEN_LIFETIME: Duration = Duration::from_secs(30 * 24 * 3600);
/// Cleanup interval: 5 minutes.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Scope granted when the client asks for none.
pub const DEFAULT_SCOPE: &str = "mcp:access";

/// Parameters recorded with an authorization code.
#[derive(Debug, Clone, Default)]
pub struct NewAuthCode {
    pub client_id: String,
    pub redirect_uri: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub scope: Option<String>,
}

/// Tokens returned from the token endpoint.
#[derive(Debug)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: u64,
    pub scope: String,
}

/// Active token details for introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub client_id: String,
    pub scope: String,
    pub exp: i64,
}

/// In-memory OAuth state store.
#[derive(Clone)]
pub struct OAuthStore {
    access_token_lifetime: Duration,
    clients: Arc<RwLock<HashMap<String, OAuthClient>>>,
    auth_codes: Arc<RwLock<HashMap<String, AuthCode>>>,
    access_tokens: Arc<RwLock<HashMap<String, AccessToken>>>,
    refresh_tokens: Arc<RwLock<HashMap<String, RefreshToken>>>,
}

impl OAuthStore {
    #[must_use]
    pub fn new(access_token_lifetime: Duration) -> Self {
        Self {
            access_token_lifetime,
            clients: Arc::new(RwLock::new(HashMap::new())),
            auth_codes: Arc::new(RwLock::new(HashMap::new())),
            access_tokens: Arc::new(RwLock::new(HashMap::new())),
            refresh_tokens: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Build a store with the pre-configured confidential client registered.
    #[must_use]
    pub fn from_config(config: &InboundAuthConfig) -> Self {
        let client = OAuthClient {
            client_id: config.client_id.clone(),
            client_secret: Some(config.client_secret.clone()),
            client_name: Some("Configured client".to_string()),
            redirect_uris: config.redirect_uris.clone(),
            created_at: Instant::now(),
        };
        let clients = HashMap::from([(client.client_id.clone(), client)]);

        Self { clients: Arc::new(RwLock::new(clients)), ..Self::new(config.token_expiry) }
    }

    /// Generate a random token using two UUIDs (256 bits).
    fn generate_token() -> String {
        format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple())
    }

    /// Register a public client (Dynamic Client Registration).
    pub async fn register_client(
        &self,
        client_name: Option<String>,
        redirect_uris: Vec<String>,
    ) -> OAuthClient {
        let client = OAuthClient {
            client_id: uuid::Uuid::new_v4().simple().to_string(),
            client_secret: None,
            client_name,
            redirect_uris,
            created_at: Instant::now(),
        };

        self.clients.write().await.insert(client.client_id.clone(), client.clone());
        client
    }

    /// Look up a client by ID.
    pub async fn get_client(&self, client_id: &str) -> Option<OAuthClient> {
        self.clients.read().await.get(client_id).cloned()
    }

    /// Check a confidential client's secret.
    pub async fn authenticate_client(&self, client_id: &str, client_secret: &str) -> bool {
        let clients = self.clients.read().await;
        clients
            .get(client_id)
            .and_then(|c| c.client_secret.as_deref())
            .is_some_and(|secret| constant_time_eq(secret.as_bytes(), client_secret.as_bytes()))
    }

    /// Create an authorization code for an approved request.
    pub async fn create_auth_code(&self, request: NewAuthCode) -> String {
        let code = Self::generate_token();

        self.auth_codes.write().await.insert(
            code.clone(),
            AuthCode {
                client_id: request.client_id,
                redirect_uri: request.redirect_uri.filter(|u| !u.is_empty()),
                code_challenge: request.code_challenge.filter(|c| !c.is_empty()),
                code_challenge_method: request.code_challenge_method,
                scope: request.scope.unwrap_or_else(|| DEFAULT_SCOPE.to_string()),
                expires_at: Instant::now() + AUTH_CODE_LIFETIME,
            },
        );

        code
    }

    /// Remove an authorization code. Codes are single-use whatever the outcome.
    ///
    /// Returns `None` for unknown or expired codes.
    pub async fn consume_auth_code(&self, code: &str) -> Option<AuthCode> {
        let auth_code = self.auth_codes.write().await.remove(code)?;
        (!auth_code.is_expired()).then_some(auth_code)
    }

    fn new_access_token(&self, client_id: &str, scope: &str) -> (String, AccessToken) {
        let lifetime = self.access_token_lifetime;
        let exp = chrono::Utc::now().timestamp()
            + i64::try_from(lifetime.as_secs()).unwrap_or(i64::MAX / 2);
        (
            Self::generate_token(),
            AccessToken {
                client_id: client_id.to_owned(),
                scope: scope.to_owned(),
                expires_at: Instant::now() + lifetime,
                exp,
            },
        )
    }

    /// Issue an access token with no refresh token (client credentials grant).
    pub async fn create_access_token(&self, client_id: &str, scope: &str) -> TokenPair {
        let (access, record) = self.new_access_token(client_id, scope);
        self.access_tokens.write().await.insert(access.clone(), record);

        TokenPair {
            access_token: access,
            refresh_token: None,
            expires_in: self.access_token_lifetime.as_secs(),
            scope: scope.to_owned(),
        }
    }

    /// Create an access + refresh token pair.
    pub async fn create_token_pair(&self, client_id: &str, scope: &str) -> TokenPair {
        let (access, record) = self.new_access_token(client_id, scope);
        let refresh = Self::generate_token();

        self.access_tokens.write().await.insert(access.clone(), record);
        self.refresh_tokens.write().await.insert(
            refresh.clone(),
            RefreshToken {
                client_id: client_id.to_owned(),
                access_token: access.clone(),
                scope: scope.to_owned(),
                expires_at: Instant::now() + REFRESH_TOKEN_LIFETIME,
            },
        );

        TokenPair {
            access_token: access,
            refresh_token: Some(refresh),
            expires_in: self.access_token_lifetime.as_secs(),
            scope: scope.to_owned(),
        }
    }

    /// Validate an access token. Returns the client_id if valid.
    pub async fn validate_access_token(&self, token: &str) -> Option<String> {
        self.introspect(token).await.map(|info| info.client_id)
    }

    /// Details of an active access token.
    pub async fn introspect(&self, token: &str) -> Option<TokenInfo> {
        let tokens = self.access_tokens.read().await;
        let access = tokens.get(token).filter(|t| !t.is_expired())?;
        Some(TokenInfo {
            client_id: access.client_id.clone(),
            scope: access.scope.clone(),
            exp: access.exp,
        })
    }

    /// Refresh a token pair: invalidate old tokens and issue new ones.
    pub async fn refresh_token_pair(&self, refresh_token: &str) -> Option<TokenPair> {
        let old = self.refresh_tokens.write().await.remove(refresh_token)?;
        if old.is_expired() {
            return None;
        }

        self.access_tokens.write().await.remove(&old.access_token);
        Some(self.create_token_pair(&old.client_id, &old.scope).await)
    }

    /// Start background cleanup task for expired tokens and codes.
    pub fn start_cleanup_task(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                self.cleanup_expired().await;
            }
        })
    }

    async fn cleanup_expired(&self) {
        self.auth_codes.write().await.retain(|_, code| !code.is_expired());

        {
            let mut tokens = self.access_tokens.write().await;
            let before = tokens.len();
            tokens.retain(|_, token| !token.is_expired());
            let removed = before - tokens.len();
            if removed > 0 {
                tracing::debug!(count = removed, "Cleaned up expired access tokens");
            }
        }

        self.refresh_tokens.write().await.retain(|_, token| !token.is_expired());
    }
}

impl std::fmt::Debug for OAuthStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthStore")
            .field("access_token_lifetime", &self.access_token_lifetime)
            .finish()
    }
}
