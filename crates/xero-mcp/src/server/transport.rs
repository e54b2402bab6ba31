//! Transport layer implementations.
//!
//! JSON-RPC types shared with stdio, and the HTTP router:
//! - Streamable HTTP on `/mcp` (POST, GET for SSE, DELETE)
//! - Legacy HTTP+SSE on `/sse` + `/message`
//! - Health, readiness and the inbound OAuth endpoints
//!
//! Sessions are correlated by the `Mcp-Session-Id` header, the
//! `mcp-session-id` cookie, or the `sessionId` query parameter.

use std::borrow::Cow;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handler::{SERVER_NAME, codes};
use super::oauth::{OAuthStore, handlers as oauth};
use super::session::{HandlerFactory, McpSession, SessionRegistry};
use crate::auth::pkce::constant_time_eq;
use crate::config::{AuthMode, Config};
use crate::error::SessionError;

/// Session id header for streamable HTTP.
pub const SESSION_HEADER: &str = "Mcp-Session-Id";

/// Session cookie set on initialize.
pub const SESSION_COOKIE: &str = "mcp-session-id";

/// JSON-RPC 2.0 request.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub id: Option<serde_json::Value>,
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: Cow<'static, str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
}

/// JSON-RPC 2.0 error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcResponse {
    /// JSON-RPC version constant.
    const VERSION: &'static str = "2.0";

    #[must_use]
    pub fn success(id: Option<serde_json::Value>, result: serde_json::Value) -> Self {
        Self { jsonrpc: Cow::Borrowed(Self::VERSION), result: Some(result), error: None, id }
    }

    #[must_use]
    pub fn error(id: Option<serde_json::Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(Self::VERSION),
            result: None,
            error: Some(JsonRpcError { code, message: message.into(), data: None }),
            id,
        }
    }
}

/// MCP tool info for tools/list response.
#[derive(Debug, Serialize)]
pub struct McpToolInfo {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

/// Query parameters carrying a session id.
#[derive(Debug, Default, Deserialize)]
pub struct SessionQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

/// Shared state for HTTP handlers.
pub struct HttpState {
    pub sessions: Arc<SessionRegistry>,
    /// Public base URL used in endpoint announcements and OAuth metadata.
    pub base_url: String,
    /// Present when the inbound OAuth server is enabled.
    pub oauth_store: Option<Arc<OAuthStore>>,
    /// Static bearer accepted in place of an OAuth token.
    pub api_key: Option<String>,
    /// Outbound Xero credential mode; `None` means not ready.
    pub auth_mode: Option<AuthMode>,
    /// CORS origins; empty allows any.
    pub allowed_origins: Vec<String>,
}

impl HttpState {
    /// Build state from configuration with a per-session handler factory.
    #[must_use]
    pub fn new(config: &Config, factory: HandlerFactory, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            sessions: Arc::new(SessionRegistry::new(
                factory,
                config.session_idle_timeout,
                config.session_sweep_interval,
            )),
            base_url: base_url.trim_end_matches('/').to_string(),
            oauth_store: config.inbound_auth.as_ref().map(|c| Arc::new(OAuthStore::from_config(c))),
            api_key: config.api_key.clone(),
            auth_mode: config.auth_mode(),
            allowed_origins: config.allowed_origins.clone(),
        }
    }

    /// Whether `/mcp` and the legacy endpoints require a bearer token.
    #[must_use]
    pub fn requires_auth(&self) -> bool {
        self.api_key.is_some() || self.oauth_store.is_some()
    }

    async fn accepts_bearer(&self, token: &str) -> bool {
        if let Some(ref key) = self.api_key {
            if constant_time_eq(key.as_bytes(), token.as_bytes()) {
                return true;
            }
        }
        match self.oauth_store {
            Some(ref store) => store.validate_access_token(token).await.is_some(),
            None => false,
        }
    }
}

impl std::fmt::Debug for HttpState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpState")
            .field("base_url", &self.base_url)
            .field("oauth_enabled", &self.oauth_store.is_some())
            .field("api_key", &self.api_key.is_some())
            .finish()
    }
}

/// Create the HTTP router for MCP.
pub fn create_router(state: Arc<HttpState>) -> Router {
    let cors = cors_layer(&state.allowed_origins);
    let protected = Router::new()
        .route("/mcp", post(handle_mcp_post).get(handle_mcp_get).delete(handle_mcp_delete))
        .route("/sse", get(handle_sse_legacy))
        .route("/message", post(handle_message_post))
        .route_layer(middleware::from_fn_with_state(Arc::clone(&state), require_bearer));

    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route("/healthz", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/.well-known/oauth-protected-resource", get(oauth::handle_protected_resource))
        .route("/.well-known/oauth-authorization-server", get(oauth::handle_auth_server_metadata))
        .route("/register", post(oauth::handle_register))
        .route("/authorize", get(oauth::handle_authorize_get).post(oauth::handle_authorize_post))
        .route("/token", post(oauth::handle_token))
        .route("/oauth/token", post(oauth::handle_token))
        .route("/oauth/introspect", post(oauth::handle_introspect))
        .merge(protected)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    tracing::info!(origins = ?allowed_origins, "CORS restricted to configured origins");

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any)
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": SERVER_NAME,
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn readiness_check(State(state): State<Arc<HttpState>>) -> Response {
    let sessions = state.sessions.session_count().await;
    match state.auth_mode {
        Some(mode) => Json(serde_json::json!({
            "status": "ready",
            "service": SERVER_NAME,
            "auth_mode": mode.as_str(),
            "oauth_enabled": state.oauth_store.is_some(),
            "sessions": sessions
        }))
        .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not ready",
                "reason": "No Xero credentials configured",
                "oauth_enabled": state.oauth_store.is_some(),
                "sessions": sessions
            })),
        )
            .into_response(),
    }
}

/// Reject requests without an accepted bearer token.
async fn require_bearer(State(state): State<Arc<HttpState>>, request: Request, next: Next) -> Response {
    if !state.requires_auth() {
        return next.run(request).await;
    }

    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());

    if let Some(token) = token {
        if state.accepts_bearer(token).await {
            return next.run(request).await;
        }
    }

    tracing::debug!(path = %request.uri().path(), "Rejected request without valid bearer token");
    unauthorized(&state.base_url)
}

fn unauthorized(base_url: &str) -> Response {
    let challenge = format!(
        r#"Bearer realm="{SERVER_NAME}", resource_metadata="{base_url}/.well-known/oauth-protected-resource""#
    );
    let mut response = (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": "invalid_token",
            "error_description": "Missing or invalid Bearer token"
        })),
    )
        .into_response();

    if let Ok(value) = HeaderValue::from_str(&challenge) {
        response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
    }
    response
}

/// Session id from header, then cookie, then query.
fn session_id_from(headers: &HeaderMap, jar: &CookieJar, query: &SessionQuery) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .or_else(|| jar.get(SESSION_COOKIE).map(|c| c.value().to_owned()))
        .or_else(|| query.session_id.clone())
        .filter(|id| !id.is_empty())
}

fn session_cookie(id: &str) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, id.to_owned()))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::None)
        .build()
}

fn session_error(id: Option<serde_json::Value>, err: &SessionError) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(JsonRpcResponse::error(id, codes::SERVER_ERROR, err.to_string())),
    )
        .into_response()
}

fn parse_request(body: &[u8]) -> Result<JsonRpcRequest, Response> {
    serde_json::from_slice(body).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(JsonRpcResponse::error(None, codes::PARSE_ERROR, format!("Parse error: {e}"))),
        )
            .into_response()
    })
}

fn last_event_id(headers: &HeaderMap) -> u64 {
    headers
        .get("Last-Event-ID")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0)
}

/// Handle POST requests to /mcp (Streamable HTTP transport).
async fn handle_mcp_post(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    jar: CookieJar,
    Query(query): Query<SessionQuery>,
    body: Bytes,
) -> Response {
    let request = match parse_request(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let is_initialize = request.method == "initialize";
    let session_id = match session_id_from(&headers, &jar, &query) {
        Some(id) => id,
        None if is_initialize => uuid::Uuid::new_v4().to_string(),
        None => return session_error(request.id, &SessionError::MissingSessionId),
    };

    let session = match state.sessions.get_or_create(&session_id, is_initialize).await {
        Ok(session) => session,
        Err(e) => {
            tracing::debug!(session_id = %session_id, method = %request.method, "Rejected request");
            return session_error(request.id, &e);
        }
    };

    let is_tool_call = request.method == "tools/call";
    let Some(response) = session.handler().handle(request).await else {
        return StatusCode::ACCEPTED.into_response();
    };

    if is_tool_call {
        if let Ok(data) = serde_json::to_string(&response) {
            session.push_event("message", data).await;
        }
    }

    let mut res = (jar.add(session_cookie(&session.id)), Json(response)).into_response();
    if let Ok(value) = HeaderValue::from_str(&session.id) {
        res.headers_mut().insert(SESSION_HEADER, value);
    }
    res
}

/// Handle GET requests to /mcp (SSE stream for server-initiated messages).
async fn handle_mcp_get(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    jar: CookieJar,
    Query(query): Query<SessionQuery>,
) -> Response {
    let Some(session_id) = session_id_from(&headers, &jar, &query) else {
        return session_error(None, &SessionError::MissingSessionId);
    };
    let session = match state.sessions.get_or_create(&session_id, false).await {
        Ok(session) => session,
        Err(e) => return session_error(None, &e),
    };

    let last_event_id = last_event_id(&headers);
    tracing::info!(session_id = %session.id, last_event_id, "New SSE stream connection");

    sse_response(build_sse_stream(session, last_event_id).await)
}

/// Handle DELETE requests to /mcp (explicit session termination).
async fn handle_mcp_delete(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    jar: CookieJar,
    Query(query): Query<SessionQuery>,
) -> Response {
    let Some(session_id) = session_id_from(&headers, &jar, &query) else {
        return session_error(None, &SessionError::MissingSessionId);
    };

    let status =
        if state.sessions.remove(&session_id).await { StatusCode::NO_CONTENT } else { StatusCode::NOT_FOUND };

    (jar.remove(Cookie::build(SESSION_COOKIE).path("/")), status).into_response()
}

/// Legacy SSE endpoint for the old HTTP+SSE transport.
async fn handle_sse_legacy(State(state): State<Arc<HttpState>>, headers: HeaderMap) -> Response {
    let session = state.sessions.open().await;
    let endpoint = format!("{}/message?sessionId={}", state.base_url, session.id);
    session.push_event("endpoint", endpoint).await;

    let last_event_id = last_event_id(&headers);
    tracing::info!(session_id = %session.id, last_event_id, "New legacy SSE connection");

    sse_response(build_sse_stream(session, last_event_id).await)
}

/// Handle POST requests to /message; the reply is delivered on the SSE stream.
async fn handle_message_post(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<SessionQuery>,
    body: Bytes,
) -> Response {
    let request = match parse_request(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let Some(session_id) = query.session_id.filter(|id| !id.is_empty()) else {
        return session_error(request.id, &SessionError::MissingSessionId);
    };
    let session = match state.sessions.get_or_create(&session_id, false).await {
        Ok(session) => session,
        Err(e) => return session_error(request.id, &e),
    };

    if let Some(response) = session.handler().handle(request).await {
        match serde_json::to_string(&response) {
            Ok(data) => {
                session.push_event("message", data).await;
            }
            Err(e) => tracing::error!(error = %e, "Failed to serialize response"),
        }
    }

    StatusCode::ACCEPTED.into_response()
}

fn sse_response<S>(stream: S) -> Response
where
    S: Stream<Item = Result<Event, Infallible>> + Send + 'static,
{
    (
        [
            ("X-Accel-Buffering", "no"),
            ("Cache-Control", "no-cache, no-store, must-revalidate"),
        ],
        Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("ping")),
    )
        .into_response()
}

/// Replay buffered events after `last_event_id`, then follow live events.
///
/// The subscription is taken before the history snapshot, so an event pushed in
/// between is seen once: live events at or below the replay high-water mark are skipped.
async fn build_sse_stream(
    session: Arc<McpSession>,
    last_event_id: u64,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let receiver = session.subscribe();
    let missed = session.get_events_after(last_event_id).await;
    let high_water = missed.last().map_or(last_event_id, |e| e.id);

    let replay_stream = stream::iter(missed.into_iter().map(|e| {
        tracing::debug!(event_id = e.id, "Replaying missed event");
        Ok::<_, Infallible>(e.to_sse_event())
    }));

    let live_stream = BroadcastStream::new(receiver).filter_map(move |result| async move {
        match result {
            Ok(event) if event.id > high_water => Some(Ok(event.to_sse_event())),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(error = %e, "Broadcast lag, client will catch up");
                None
            }
        }
    });

    replay_stream.chain(live_stream)
}
