//! Produces a currently-valid access token and the tenant it is bound to.
//!
//! All token work happens under one async mutex, so concurrent callers holding a
//! near-expiry token trigger a single refresh and then reuse its result.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, OnceCell};

use super::identity::{Connection, IdentityClient};
use super::store::{FileTokenStore, TokenStore};
use super::strategy::{Acquired, CredentialStrategy};
use super::token::TokenRecord;
use crate::config::Config;
use crate::error::{AuthError, AuthResult};

/// The organisation API calls are scoped to.
#[derive(Debug)]
pub struct TenantBinding {
    pub tenant_id: String,
    pub tenant_name: Option<String>,
    short_code: OnceCell<String>,
}

impl TenantBinding {
    #[must_use]
    pub fn new(tenant_id: impl Into<String>, tenant_name: Option<String>) -> Self {
        Self { tenant_id: tenant_id.into(), tenant_name, short_code: OnceCell::new() }
    }

    /// The organisation short code, if it has been fetched.
    #[must_use]
    pub fn short_code(&self) -> Option<&str> {
        self.short_code.get().map(String::as_str)
    }

    /// Return the memoized short code, fetching it with `init` the first time.
    pub async fn short_code_or_try_init<F, Fut, E>(&self, init: F) -> Result<&str, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, E>>,
    {
        self.short_code.get_or_try_init(init).await.map(String::as_str)
    }
}

/// Token and tenant for one accounting API call.
#[derive(Clone)]
pub struct AccessGrant {
    pub access_token: String,
    pub tenant: Arc<TenantBinding>,
}

impl std::fmt::Debug for AccessGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGrant").field("tenant_id", &self.tenant.tenant_id).finish()
    }
}

#[derive(Default)]
struct AuthState {
    token: Option<TokenRecord>,
    tenant: Option<Arc<TenantBinding>>,
    /// Set once a refresh token was rejected and no fallback ran; cleared by `login`.
    reauthorization_required: bool,
}

/// Authentication core shared by every tool call.
pub struct Authenticator {
    strategy: CredentialStrategy,
    identity: IdentityClient,
    store: Arc<dyn TokenStore>,
    safety_margin: Duration,
    interactive_fallback: bool,
    state: Mutex<AuthState>,
}

impl Authenticator {
    #[must_use]
    pub fn new(
        strategy: CredentialStrategy,
        identity: IdentityClient,
        store: Arc<dyn TokenStore>,
        config: &Config,
    ) -> Self {
        Self {
            strategy,
            identity,
            store,
            safety_margin: config.token_safety_margin,
            interactive_fallback: config.interactive_fallback,
            state: Mutex::new(AuthState::default()),
        }
    }

    /// Build the strategy, identity client and file token store from configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no credentials are configured.
    pub fn from_config(config: &Config) -> AuthResult<Self> {
        let strategy = CredentialStrategy::from_config(config)?;
        let identity = IdentityClient::new(config)?;
        let store: Arc<dyn TokenStore> = Arc::new(FileTokenStore::new(&config.token_file));
        tracing::info!(
            mode = strategy.mode().as_str(),
            token_file = %config.token_file.display(),
            interactive_fallback = config.interactive_fallback,
            "Xero authentication configured"
        );
        Ok(Self::new(strategy, identity, store, config))
    }

    #[must_use]
    pub const fn strategy(&self) -> &CredentialStrategy {
        &self.strategy
    }

    /// Return a token valid for at least the safety margin, plus the resolved tenant.
    pub async fn ensure_valid_token(&self) -> AuthResult<AccessGrant> {
        let mut state = self.state.lock().await;
        let token = self.current_token(&mut state).await?;

        let tenant = match &state.tenant {
            Some(tenant) => Arc::clone(tenant),
            None => {
                let tenant = Arc::new(self.resolve_tenant(&token.access_token).await?);
                state.tenant = Some(Arc::clone(&tenant));
                tenant
            }
        };

        Ok(AccessGrant { access_token: token.access_token, tenant })
    }

    /// Forget the cached token so the next call renews it.
    ///
    /// Called when the accounting API rejects a token the authenticator still considered
    /// valid. Static bearer tokens are kept since renewal cannot help.
    pub async fn invalidate(&self) {
        if self.strategy.expires() {
            let mut state = self.state.lock().await;
            if let Some(token) = state.token.as_mut() {
                token.expires_at = Utc::now();
            }
        }
    }

    /// Run the interactive flow unconditionally and persist the result.
    ///
    /// Returns every organisation the new token can access; the first becomes active.
    pub async fn login(&self) -> AuthResult<Vec<Connection>> {
        let mut state = self.state.lock().await;
        let record = self.strategy.reauthorize(&self.identity).await?;
        self.persist(&record).await?;

        let connections = self.identity.list_connections(&record.access_token).await?;
        let tenant = first_tenant(&connections)?;
        state.token = Some(record);
        state.tenant = Some(Arc::new(tenant));
        state.reauthorization_required = false;
        Ok(connections)
    }

    async fn current_token(&self, state: &mut AuthState) -> AuthResult<TokenRecord> {
        let now = Utc::now();

        if let Some(token) = &state.token {
            if !self.strategy.expires() || token.is_valid_at(now, self.safety_margin) {
                return Ok(token.clone());
            }
            tracing::info!(
                seconds_remaining = token.seconds_remaining(now),
                "Access token within safety margin, refreshing"
            );
            let current = token.clone();
            return self.renew(&current, state).await;
        }

        let allow_browser = !state.reauthorization_required || self.interactive_fallback;
        match self.strategy.acquire(&self.identity, self.store.as_ref(), allow_browser).await? {
            Acquired::Stored(record) if !record.is_valid_at(now, self.safety_margin) => {
                tracing::info!(
                    seconds_remaining = record.seconds_remaining(now),
                    "Stored token within safety margin, refreshing"
                );
                self.renew(&record, state).await
            }
            Acquired::Stored(record) => {
                state.token = Some(record.clone());
                Ok(record)
            }
            Acquired::Issued(record) => {
                if self.strategy.persists_tokens() {
                    self.persist(&record).await?;
                }
                state.token = Some(record.clone());
                Ok(record)
            }
        }
    }

    async fn renew(&self, current: &TokenRecord, state: &mut AuthState) -> AuthResult<TokenRecord> {
        match self.strategy.refresh(&self.identity, current).await {
            Ok(renewed) => {
                if self.strategy.persists_tokens() {
                    self.persist(&renewed).await?;
                }
                tracing::info!(expires_at = %renewed.expires_at, "Access token renewed");
                state.token = Some(renewed.clone());
                state.reauthorization_required = false;
                Ok(renewed)
            }
            Err(err) if err.is_rejection() && self.strategy.persists_tokens() => {
                tracing::warn!(error = %err, "Refresh token rejected, discarding stored tokens");
                state.token = None;
                state.tenant = None;
                self.store.delete().await?;

                if self.interactive_fallback
                    && matches!(self.strategy, CredentialStrategy::AuthorizationCodePkce { .. })
                {
                    tracing::warn!("Falling back to interactive authorization");
                    let record = self.strategy.reauthorize(&self.identity).await?;
                    self.persist(&record).await?;
                    state.token = Some(record.clone());
                    return Ok(record);
                }

                state.reauthorization_required = true;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    async fn persist(&self, record: &TokenRecord) -> AuthResult<()> {
        if record.is_expired_at(Utc::now()) {
            tracing::warn!(expires_at = %record.expires_at, "Not persisting an already expired token");
            return Ok(());
        }
        self.store.save(record).await
    }

    async fn resolve_tenant(&self, access_token: &str) -> AuthResult<TenantBinding> {
        let connections = self.identity.list_connections(access_token).await?;
        first_tenant(&connections)
    }
}

fn first_tenant(connections: &[Connection]) -> AuthResult<TenantBinding> {
    let Some(first) = connections.first().filter(|c| !c.tenant_id.is_empty()) else {
        tracing::warn!("No Xero tenant resolved from /connections");
        return Err(AuthError::configuration(
            "No Xero organisation is connected to these credentials",
        ));
    };

    tracing::info!(
        tenant_id = %first.tenant_id,
        tenant_name = first.tenant_name.as_deref().unwrap_or(""),
        connections = connections.len(),
        "Using Xero tenant"
    );
    Ok(TenantBinding::new(first.tenant_id.clone(), first.tenant_name.clone()))
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("mode", &self.strategy.mode())
            .field("safety_margin", &self.safety_margin)
            .field("interactive_fallback", &self.interactive_fallback)
            .finish()
    }
}
