//! OAuth 2.0 endpoint handlers guarding the HTTP transport.
//!
//! Implements:
//! - RFC 9728: OAuth Protected Resource Metadata
//! - RFC 8414: OAuth Authorization Server Metadata
//! - RFC 7591: Dynamic Client Registration
//! - RFC 7636: PKCE (S256 and plain)
//! - RFC 6749: authorization code, client credentials and refresh token grants
//! - RFC 7662: Token Introspection

use std::sync::Arc;

use axum::{
    Form, Json,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use url::Url;

use super::pages;
use super::store::{NewAuthCode, OAuthStore, TokenPair};
use crate::auth::pkce::{self, ChallengeMethod};
use crate::server::transport::HttpState;

fn not_configured() -> Response {
    (StatusCode::NOT_FOUND, "OAuth not configured").into_response()
}

// ─── RFC 9728: Protected Resource Metadata ───────────────────────────────────

/// `GET /.well-known/oauth-protected-resource`
pub async fn handle_protected_resource(State(state): State<Arc<HttpState>>) -> Response {
    if state.oauth_store.is_none() {
        return not_configured();
    }

    Json(serde_json::json!({
        "resource": state.base_url,
        "authorization_servers": [state.base_url],
        "bearer_methods_supported": ["header"],
        "scopes_supported": ["mcp:access"]
    }))
    .into_response()
}

// ─── RFC 8414: Authorization Server Metadata ─────────────────────────────────

/// `GET /.well-known/oauth-authorization-server`
pub async fn handle_auth_server_metadata(State(state): State<Arc<HttpState>>) -> Response {
    if state.oauth_store.is_none() {
        return not_configured();
    }

    let base = &state.base_url;
    Json(serde_json::json!({
        "issuer": base,
        "authorization_endpoint": format!("{base}/authorize"),
        "token_endpoint": format!("{base}/token"),
        "registration_endpoint": format!("{base}/register"),
        "introspection_endpoint": format!("{base}/oauth/introspect"),
        "scopes_supported": ["mcp:access"],
        "response_types_supported": ["code"],
        "grant_types_supported": ["authorization_code", "client_credentials", "refresh_token"],
        "token_endpoint_auth_methods_supported": ["client_secret_basic", "client_secret_post", "none"],
        "code_challenge_methods_supported": ["S256", "plain"]
    }))
    .into_response()
}

// ─── RFC 7591: Dynamic Client Registration ───────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub client_name: Option<String>,
    pub redirect_uris: Option<Vec<String>>,
}

/// `POST /register`
///
/// Registered clients are public: no secret, PKCE mandatory.
pub async fn handle_register(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<RegisterRequest>,
) -> Response {
    let Some(ref oauth_store) = state.oauth_store else {
        return not_configured();
    };

    let redirect_uris = req.redirect_uris.unwrap_or_default();
    if redirect_uris.is_empty() || redirect_uris.iter().any(|u| Url::parse(u).is_err()) {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": "invalid_client_metadata",
                "error_description": "redirect_uris must be a non-empty list of absolute URLs"
            })),
        )
            .into_response();
    }

    let client = oauth_store.register_client(req.client_name, redirect_uris).await;

    tracing::info!(client_id = %client.client_id, "Registered OAuth client");

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "client_id": client.client_id,
            "client_name": client.client_name,
            "redirect_uris": client.redirect_uris,
            "grant_types": ["authorization_code", "refresh_token"],
            "response_types": ["code"],
            "token_endpoint_auth_method": "none"
        })),
    )
        .into_response()
}

// ─── Authorization Endpoint ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizeParams {
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub response_type: Option<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub scope: Option<String>,
}

/// Consent form submission.
#[derive(Debug, Default, Deserialize)]
pub struct ApprovalForm {
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub state: Option<String>,
    pub scope: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub approved: Option<String>,
}

fn bad_authorize(title: &str, message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Html(pages::error_page(title, message))).into_response()
}

/// `GET /authorize`
///
/// Validates the request and renders a consent page.
pub async fn handle_authorize_get(
    State(state): State<Arc<HttpState>>,
    Query(params): Query<AuthorizeParams>,
) -> Response {
    let Some(ref oauth_store) = state.oauth_store else {
        return not_configured();
    };

    if params.response_type.as_deref() != Some("code") {
        return bad_authorize("Invalid Request", "Only response_type=code is supported");
    }
    let Some(client_id) = params.client_id.as_deref() else {
        return bad_authorize("Invalid Request", "Missing required parameter: client_id");
    };
    let Some(client) = oauth_store.get_client(client_id).await else {
        return bad_authorize("Invalid Client", "Unknown client_id");
    };

    if let Some(redirect_uri) = params.redirect_uri.as_deref() {
        if Url::parse(redirect_uri).is_err() || !client.allows_redirect(redirect_uri) {
            return bad_authorize("Invalid Request", "redirect_uri not registered for this client");
        }
    } else if !client.is_confidential() {
        return bad_authorize("Invalid Request", "Missing required parameter: redirect_uri");
    }

    if !client.is_confidential() && params.code_challenge.is_none() {
        return bad_authorize("Invalid Request", "code_challenge is required for public clients");
    }
    if let Some(method) = params.code_challenge_method.as_deref() {
        if method.parse::<ChallengeMethod>().is_err() {
            return bad_authorize("Invalid Request", "Unsupported code_challenge_method");
        }
    }

    let client_name = client.client_name.as_deref().unwrap_or(client_id);
    Html(pages::consent_page(&params, client_name)).into_response()
}

fn redirect_with(redirect_uri: &str, pairs: &[(&str, &str)]) -> Option<Response> {
    let mut url = Url::parse(redirect_uri).ok()?;
    {
        let mut query = url.query_pairs_mut();
        for (key, value) in pairs {
            query.append_pair(key, value);
        }
    }
    Some(Redirect::to(url.as_str()).into_response())
}

/// `POST /authorize`
///
/// Approve issues a ten minute code; deny redirects with `access_denied`.
pub async fn handle_authorize_post(
    State(state): State<Arc<HttpState>>,
    Form(form): Form<ApprovalForm>,
) -> Response {
    let Some(ref oauth_store) = state.oauth_store else {
        return not_configured();
    };

    let redirect_uri = form.redirect_uri.as_deref().filter(|u| !u.is_empty());
    let oauth_state = form.state.as_deref().filter(|s| !s.is_empty());

    let Some(client) = oauth_store.get_client(form.client_id.as_deref().unwrap_or_default()).await
    else {
        return bad_authorize("Invalid Client", "Invalid client_id");
    };
    if let Some(uri) = redirect_uri {
        if !client.allows_redirect(uri) {
            return bad_authorize("Invalid Request", "redirect_uri not registered for this client");
        }
    }

    if form.approved.as_deref() != Some("true") {
        tracing::info!(client_id = %client.client_id, "Authorization denied");
        let mut pairs = vec![("error", "access_denied"), ("error_description", "User denied access")];
        if let Some(s) = oauth_state {
            pairs.push(("state", s));
        }
        return redirect_uri
            .and_then(|uri| redirect_with(uri, &pairs))
            .unwrap_or_else(|| (StatusCode::FORBIDDEN, "Access denied").into_response());
    }

    let code = oauth_store
        .create_auth_code(NewAuthCode {
            client_id: client.client_id.clone(),
            redirect_uri: redirect_uri.map(str::to_owned),
            code_challenge: form.code_challenge.clone(),
            code_challenge_method: form.code_challenge_method.clone(),
            scope: form.scope.clone().filter(|s| !s.is_empty()),
        })
        .await;

    tracing::info!(
        client_id = %client.client_id,
        pkce = form.code_challenge.is_some(),
        "Authorization approved"
    );

    match redirect_uri {
        Some(uri) => {
            let mut pairs = vec![("code", code.as_str())];
            if let Some(s) = oauth_state {
                pairs.push(("state", s));
            }
            redirect_with(uri, &pairs)
                .unwrap_or_else(|| bad_authorize("Invalid Request", "Malformed redirect_uri"))
        }
        None => Html(pages::code_page(&code)).into_response(),
    }
}

// ─── Token Endpoint ──────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

/// Client credentials from the form, falling back to HTTP Basic.
fn client_credentials(headers: &HeaderMap, form: &TokenRequest) -> (Option<String>, Option<String>) {
    let basic = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .and_then(|encoded| STANDARD.decode(encoded.trim()).ok())
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .and_then(|decoded| {
            decoded.split_once(':').map(|(id, secret)| (id.to_string(), secret.to_string()))
        });

    let (basic_id, basic_secret) = basic.map_or((None, None), |(id, s)| (Some(id), Some(s)));
    let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());

    (
        non_empty(form.client_id.clone()).or(non_empty(basic_id)),
        non_empty(form.client_secret.clone()).or(non_empty(basic_secret)),
    )
}

/// `POST /token` and `POST /oauth/token`
pub async fn handle_token(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    Form(form): Form<TokenRequest>,
) -> Response {
    let Some(ref oauth_store) = state.oauth_store else {
        return not_configured();
    };

    match form.grant_type.as_deref() {
        Some("authorization_code") => {
            handle_authorization_code_grant(oauth_store, &headers, &form).await
        }
        Some("client_credentials") => {
            handle_client_credentials_grant(oauth_store, &headers, &form).await
        }
        Some("refresh_token") => handle_refresh_token_grant(oauth_store, &form).await,
        other => {
            tracing::debug!(grant_type = ?other, "Unsupported grant type");
            token_error(
                StatusCode::BAD_REQUEST,
                "unsupported_grant_type",
                "Supported grant types: authorization_code, client_credentials, refresh_token",
            )
        }
    }
}

async fn handle_authorization_code_grant(
    store: &OAuthStore,
    headers: &HeaderMap,
    form: &TokenRequest,
) -> Response {
    let Some(ref code) = form.code else {
        return bad_token_request("invalid_request", "Missing required parameter: code");
    };

    let (client_id, client_secret) = client_credentials(headers, form);
    let Some(client_id) = client_id else {
        return bad_token_request("invalid_request", "Missing client_id");
    };
    let Some(client) = store.get_client(&client_id).await else {
        return token_error(StatusCode::UNAUTHORIZED, "invalid_client", "Unknown client");
    };

    if client.is_confidential() {
        let Some(secret) = client_secret else {
            return bad_token_request("invalid_request", "Missing client_id or client_secret");
        };
        if !store.authenticate_client(&client_id, &secret).await {
            return token_error(
                StatusCode::UNAUTHORIZED,
                "invalid_client",
                "Invalid client credentials",
            );
        }
    }

    // Consumed before any further check: a code is never usable twice.
    let Some(auth_code) = store.consume_auth_code(code).await else {
        return bad_token_request("invalid_grant", "Invalid or expired authorization code");
    };

    if auth_code.client_id != client_id {
        tracing::warn!(client_id = %client_id, "Authorization code presented by another client");
        return bad_token_request("invalid_grant", "Authorization code was not issued to this client");
    }

    if let Some(ref expected) = auth_code.redirect_uri {
        if form.redirect_uri.as_deref() != Some(expected.as_str()) {
            return bad_token_request("invalid_grant", "redirect_uri does not match");
        }
    }

    match auth_code.code_challenge {
        Some(ref challenge) => {
            let Some(ref verifier) = form.code_verifier else {
                return bad_token_request("invalid_request", "code_verifier is required for PKCE");
            };
            // RFC 7636 4.3: the method defaults to plain when omitted.
            let method = auth_code.code_challenge_method.as_deref().unwrap_or("plain");
            let Ok(method) = method.parse::<ChallengeMethod>() else {
                return bad_token_request("invalid_request", "Unsupported code_challenge_method");
            };
            if pkce::verify(method, verifier, challenge).is_err() {
                tracing::warn!(client_id = %client_id, "PKCE verification failed");
                return bad_token_request("invalid_grant", "Invalid code_verifier");
            }
        }
        None if !client.is_confidential() => {
            return bad_token_request("invalid_grant", "PKCE is required for public clients");
        }
        None => {}
    }

    let pair = store.create_token_pair(&client_id, &auth_code.scope).await;

    tracing::info!(client_id = %client_id, "Issued token pair");

    token_success(&pair)
}

async fn handle_client_credentials_grant(
    store: &OAuthStore,
    headers: &HeaderMap,
    form: &TokenRequest,
) -> Response {
    let (Some(client_id), Some(client_secret)) = client_credentials(headers, form) else {
        return bad_token_request("invalid_request", "Missing client_id or client_secret");
    };

    if !store.authenticate_client(&client_id, &client_secret).await {
        tracing::warn!(client_id = %client_id, "Client authentication failed");
        return token_error(StatusCode::UNAUTHORIZED, "invalid_client", "Invalid client credentials");
    }

    let scope = form.scope.as_deref().filter(|s| !s.is_empty()).unwrap_or(super::DEFAULT_SCOPE);
    let pair = store.create_access_token(&client_id, scope).await;

    tracing::info!(client_id = %client_id, "Issued client credentials token");

    token_success(&pair)
}

async fn handle_refresh_token_grant(store: &OAuthStore, form: &TokenRequest) -> Response {
    let Some(ref refresh_token) = form.refresh_token else {
        return bad_token_request("invalid_request", "Missing refresh_token");
    };

    let Some(pair) = store.refresh_token_pair(refresh_token).await else {
        return bad_token_request("invalid_grant", "Invalid or expired refresh token");
    };

    tracing::info!("Refreshed token pair");

    token_success(&pair)
}

// ─── RFC 7662: Token Introspection ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct IntrospectRequest {
    pub token: Option<String>,
}

/// `POST /oauth/introspect`
pub async fn handle_introspect(
    State(state): State<Arc<HttpState>>,
    Form(form): Form<IntrospectRequest>,
) -> Response {
    let Some(ref oauth_store) = state.oauth_store else {
        return not_configured();
    };

    let info = match form.token.as_deref() {
        Some(token) if !token.is_empty() => oauth_store.introspect(token).await,
        _ => None,
    };

    let body = match info {
        Some(info) => serde_json::json!({
            "active": true,
            "client_id": info.client_id,
            "scope": info.scope,
            "exp": info.exp,
            "token_type": "Bearer"
        }),
        None => serde_json::json!({ "active": false }),
    };

    Json(body).into_response()
}

/// Build a token response with required OAuth 2.0 cache headers (RFC 6749 §5.1).
fn token_success(pair: &TokenPair) -> Response {
    let mut body = serde_json::json!({
        "access_token": pair.access_token,
        "token_type": "Bearer",
        "expires_in": pair.expires_in,
        "scope": pair.scope
    });
    if let Some(ref refresh) = pair.refresh_token {
        body["refresh_token"] = serde_json::Value::String(refresh.clone());
    }

    let mut response = Json(body).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    response
}

fn bad_token_request(error: &str, description: &str) -> Response {
    token_error(StatusCode::BAD_REQUEST, error, description)
}

fn token_error(status: StatusCode, error: &str, description: &str) -> Response {
    (
        status,
        Json(serde_json::json!({
            "error": error,
            "error_description": description
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_credentials_prefers_form_then_basic() {
        let mut headers = HeaderMap::new();
        let encoded = STANDARD.encode("basic-id:basic:secret");
        headers.insert(header::AUTHORIZATION, format!("Basic {encoded}").parse().unwrap());

        let form = TokenRequest::default();
        assert_eq!(
            client_credentials(&headers, &form),
            (Some("basic-id".into()), Some("basic:secret".into()))
        );

        let form = TokenRequest { client_id: Some("form-id".into()), ..TokenRequest::default() };
        assert_eq!(
            client_credentials(&headers, &form),
            (Some("form-id".into()), Some("basic:secret".into()))
        );
    }

    #[test]
    fn test_client_credentials_ignores_malformed_basic() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Basic !!!".parse().unwrap());
        assert_eq!(client_credentials(&headers, &TokenRequest::default()), (None, None));
    }

    #[test]
    fn test_redirect_with_appends_query() {
        let response =
            redirect_with("https://agent.example.com/cb?x=1", &[("code", "abc"), ("state", "a b")]).unwrap();
        let location = response.headers().get(header::LOCATION).unwrap().to_str().unwrap();
        assert_eq!(location, "https://agent.example.com/cb?x=1&code=abc&state=a+b");
        assert!(redirect_with("not a url", &[]).is_none());
    }
}
