//! One-shot local listener for the OAuth redirect.
//!
//! Holds at most one pending authorization request. The first callback that reaches the
//! listener consumes it, whether it succeeds or fails; later callbacks (including a replay
//! of the same `state`) are rejected.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use url::Url;

use super::pkce;
use crate::error::{AuthError, AuthResult};

/// Default lifetime of a pending authorization request.
pub const DEFAULT_REQUEST_TTL: Duration = Duration::from_secs(300);

/// In-memory state for one in-flight authorization request.
#[derive(Clone)]
pub struct AuthorizationRequestState {
    pub state: String,
    pub code_verifier: String,
    pub code_challenge: String,
    pub expires_at: Instant,
}

impl AuthorizationRequestState {
    /// Generate a fresh state nonce and PKCE pair.
    #[must_use]
    pub fn generate(ttl: Duration) -> Self {
        let code_verifier = pkce::generate_verifier();
        let code_challenge = pkce::compute_challenge(&code_verifier);
        Self {
            state: pkce::generate_state(),
            code_verifier,
            code_challenge,
            expires_at: Instant::now() + ttl,
        }
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

impl std::fmt::Debug for AuthorizationRequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationRequestState")
            .field("code_challenge", &self.code_challenge)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Query parameters Xero appends to the redirect URI.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

struct PendingRequest {
    state: String,
    expires_at: Instant,
    tx: oneshot::Sender<AuthResult<String>>,
}

type PendingSlot = Arc<Mutex<Option<PendingRequest>>>;

/// Receiver for the authorization code of a registered request.
pub struct PendingCallback {
    rx: oneshot::Receiver<AuthResult<String>>,
    slot: PendingSlot,
}

impl PendingCallback {
    /// Wait for the callback, up to `timeout`.
    ///
    /// On timeout the pending request is discarded so a late callback is rejected.
    pub async fn wait(self, timeout: Duration) -> AuthResult<String> {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(AuthError::callback("callback listener closed before a response")),
            Err(_) => {
                self.slot.lock().await.take();
                tracing::warn!(?timeout, "Timed out waiting for OAuth callback");
                Err(AuthError::Timeout(timeout))
            }
        }
    }
}

/// Local HTTP listener on the redirect URI.
pub struct CallbackServer {
    redirect_uri: Url,
    local_addr: SocketAddr,
    pending: PendingSlot,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl CallbackServer {
    /// Bind the listener described by `redirect_uri`.
    ///
    /// A port of `0` binds an ephemeral port; [`CallbackServer::redirect_uri`] then
    /// reports the effective URI.
    pub async fn bind(redirect_uri: &str) -> AuthResult<Self> {
        let mut redirect_uri = Url::parse(redirect_uri)
            .map_err(|e| AuthError::configuration(format!("invalid redirect URI: {e}")))?;
        let addr = listen_addr(&redirect_uri)?;

        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            AuthError::configuration(format!("failed to bind callback listener on {addr}: {e}"))
        })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| AuthError::configuration(format!("callback listener address: {e}")))?;
        if redirect_uri.port_or_known_default() == Some(0) {
            let _ = redirect_uri.set_port(Some(local_addr.port()));
        }

        let pending: PendingSlot = Arc::new(Mutex::new(None));
        let app = Router::new()
            .route(redirect_uri.path(), get(handle_callback))
            .with_state(Arc::clone(&pending));

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = serve.await {
                tracing::warn!(error = %e, "Callback listener stopped with error");
            }
        });

        tracing::info!(%local_addr, redirect_uri = %redirect_uri, "OAuth callback listener started");

        Ok(Self {
            redirect_uri,
            local_addr,
            pending,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        self.redirect_uri.as_str()
    }

    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Register the single pending request. Rejects a second concurrent registration.
    pub async fn expect(&self, request: &AuthorizationRequestState) -> AuthResult<PendingCallback> {
        let mut slot = self.pending.lock().await;
        if slot.as_ref().is_some_and(|p| Instant::now() < p.expires_at) {
            return Err(AuthError::callback("an authorization request is already in flight"));
        }

        let (tx, rx) = oneshot::channel();
        *slot = Some(PendingRequest {
            state: request.state.clone(),
            expires_at: request.expires_at,
            tx,
        });

        Ok(PendingCallback { rx, slot: Arc::clone(&self.pending) })
    }

    /// Stop the listener and wait for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        tracing::debug!(local_addr = %self.local_addr, "OAuth callback listener stopped");
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

impl std::fmt::Debug for CallbackServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackServer")
            .field("redirect_uri", &self.redirect_uri.as_str())
            .field("local_addr", &self.local_addr)
            .finish()
    }
}

fn listen_addr(redirect_uri: &Url) -> AuthResult<SocketAddr> {
    let port = redirect_uri
        .port_or_known_default()
        .ok_or_else(|| AuthError::configuration("redirect URI has no port"))?;
    let ip = match redirect_uri.host_str() {
        Some("localhost") | None => IpAddr::V4(Ipv4Addr::LOCALHOST),
        Some(host) => host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse()
            .map_err(|_| AuthError::configuration(format!("redirect host {host} is not local")))?,
    };
    Ok(SocketAddr::new(ip, port))
}

async fn handle_callback(
    State(pending): State<PendingSlot>,
    Query(params): Query<CallbackParams>,
) -> Response {
    let Some(request) = pending.lock().await.take() else {
        tracing::warn!("OAuth callback received with no pending request");
        return page(
            StatusCode::BAD_REQUEST,
            "Authorization Failed",
            "No authorization request is pending. Start the login again from the terminal.",
        );
    };

    let result = validate(&request, params);
    let response = match &result {
        Ok(_) => page(
            StatusCode::OK,
            "Authorization Successful",
            "You can close this window and return to the terminal.",
        ),
        Err(e) => page(StatusCode::BAD_REQUEST, "Authorization Failed", &e.to_string()),
    };

    if request.tx.send(result).is_err() {
        tracing::debug!("OAuth callback arrived after the waiter gave up");
    }
    response
}

fn validate(request: &PendingRequest, params: CallbackParams) -> AuthResult<String> {
    if Instant::now() >= request.expires_at {
        return Err(AuthError::callback("authorization request expired"));
    }

    if let Some(error) = params.error {
        let detail = params.error_description.map(|d| format!(": {d}")).unwrap_or_default();
        return Err(AuthError::callback(format!("authorization server returned {error}{detail}")));
    }

    let state_matches = params
        .state
        .as_deref()
        .is_some_and(|s| pkce::constant_time_eq(s.as_bytes(), request.state.as_bytes()));
    if !state_matches {
        tracing::warn!("OAuth callback state mismatch");
        return Err(AuthError::callback("state mismatch in OAuth callback"));
    }

    params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AuthError::callback("missing authorization code in OAuth callback"))
}

fn page(status: StatusCode, title: &str, message: &str) -> Response {
    let color = if status.is_success() { "#13b5ea" } else { "#c00" };
    let body = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title} - Xero MCP</title>
<style>
body {{ font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif; background: #f5f5f5; display: flex; justify-content: center; align-items: center; height: 100vh; margin: 0; }}
.card {{ background: #fff; border-radius: 8px; box-shadow: 0 2px 8px rgba(0,0,0,0.1); padding: 32px; text-align: center; max-width: 420px; }}
h1 {{ color: {color}; font-size: 20px; }}
p {{ color: #666; }}
</style>
</head>
<body>
<div class="card">
<h1>{title}</h1>
<p>{message}</p>
</div>
</body>
</html>"#,
        title = crate::server::oauth::pages::html_escape(title),
        message = crate::server::oauth::pages::html_escape(message),
    );
    (status, Html(body)).into_response()
}
