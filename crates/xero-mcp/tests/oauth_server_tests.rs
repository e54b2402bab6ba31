//! End-to-end tests for the inbound OAuth authorization server via HTTP.
//!
//! Registration, consent, code exchange with PKCE, client credentials,
//! refresh rotation and introspection, all through the axum router.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tower::ServiceExt;
use url::Url;

use xero_mcp::auth::Authenticator;
use xero_mcp::client::XeroClient;
use xero_mcp::config::{Config, InboundAuthConfig};
use xero_mcp::server::{McpServer, create_router};

const BASE_URL: &str = "https://mcp.example.com";
const OAUTH_CLIENT_ID: &str = "inbound-client";
const OAUTH_CLIENT_SECRET: &str = "inbound-secret";
const REDIRECT_URI: &str = "https://client.example.com/cb";
const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";

fn build_router(inbound: bool) -> axum::Router {
    let mut config = Config::for_testing("http://unused.localhost");
    config.bearer_token = Some("static-token".to_string());
    if inbound {
        config.inbound_auth = Some(InboundAuthConfig {
            client_id: OAUTH_CLIENT_ID.to_string(),
            client_secret: OAUTH_CLIENT_SECRET.to_string(),
            token_expiry: Duration::from_secs(3600),
            redirect_uris: vec![REDIRECT_URI.to_string()],
        });
    }

    let auth = Arc::new(Authenticator::from_config(&config).unwrap());
    let client = XeroClient::new(&config, auth).unwrap();
    create_router(McpServer::new(client).http_state(&config, BASE_URL))
}

fn challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

fn form(pairs: &[(&str, &str)]) -> Body {
    Body::from(serde_urlencoded::to_string(pairs).unwrap())
}

async fn post_form(app: &axum::Router, uri: &str, pairs: &[(&str, &str)]) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(form(pairs))
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn location_query(response: &axum::response::Response) -> HashMap<String, String> {
    let location = response.headers().get(header::LOCATION).unwrap().to_str().unwrap();
    Url::parse(location).unwrap().query_pairs().into_owned().collect()
}

async fn register(app: &axum::Router) -> String {
    let response = app
        .clone()
        .oneshot(
            Request::post("/register")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "client_name": "Test Agent", "redirect_uris": [REDIRECT_URI] }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["client_id"].as_str().unwrap().to_string()
}

/// Approve consent for `client_id` and return the issued code.
async fn approve(app: &axum::Router, client_id: &str, code_challenge: &str) -> String {
    let response = post_form(
        app,
        "/authorize",
        &[
            ("client_id", client_id),
            ("redirect_uri", REDIRECT_URI),
            ("state", "xyz"),
            ("scope", "mcp:access"),
            ("code_challenge", code_challenge),
            ("code_challenge_method", "S256"),
            ("approved", "true"),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let query = location_query(&response);
    assert_eq!(query["state"], "xyz");
    query["code"].clone()
}

async fn exchange(app: &axum::Router, client_id: &str, code: &str, verifier: &str) -> axum::response::Response {
    post_form(
        app,
        "/token",
        &[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", REDIRECT_URI),
            ("client_id", client_id),
            ("code_verifier", verifier),
        ],
    )
    .await
}

// =============================================================================
// Discovery
// =============================================================================

#[tokio::test]
async fn test_discovery_metadata() {
    let app = build_router(true);

    let response = app
        .clone()
        .oneshot(Request::get("/.well-known/oauth-protected-resource").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["resource"], BASE_URL);
    assert_eq!(body["authorization_servers"][0], BASE_URL);

    let response = app
        .oneshot(Request::get("/.well-known/oauth-authorization-server").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["token_endpoint"], format!("{BASE_URL}/token"));
    assert_eq!(body["registration_endpoint"], format!("{BASE_URL}/register"));
    assert!(body["code_challenge_methods_supported"].as_array().unwrap().contains(&json!("S256")));
}

#[tokio::test]
async fn test_oauth_endpoints_absent_when_disabled() {
    let app = build_router(false);

    for uri in ["/.well-known/oauth-protected-resource", "/.well-known/oauth-authorization-server"] {
        let response = app.clone().oneshot(Request::get(uri).body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
    }

    let response = post_form(&app, "/token", &[("grant_type", "client_credentials")]).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Authorization code flow
// =============================================================================

#[tokio::test]
async fn test_full_authorization_code_flow_grants_mcp_access() {
    let app = build_router(true);
    let client_id = register(&app).await;

    // Consent page
    let authorize_uri = format!(
        "/authorize?response_type=code&client_id={client_id}&redirect_uri={}&state=xyz&code_challenge={}&code_challenge_method=S256",
        urlencode(REDIRECT_URI),
        challenge(VERIFIER),
    );
    let response =
        app.clone().oneshot(Request::get(authorize_uri).body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_text(response).await;
    assert!(page.contains("Test Agent"));
    assert!(page.contains(r#"name="approved""#));

    let code = approve(&app, &client_id, &challenge(VERIFIER)).await;

    let response = exchange(&app, &client_id, &code, VERIFIER).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get(header::CACHE_CONTROL).unwrap(), "no-store");
    let tokens = body_json(response).await;
    assert_eq!(tokens["token_type"], "Bearer");
    assert!(tokens["refresh_token"].is_string());
    let access_token = tokens["access_token"].as_str().unwrap().to_string();

    // The token opens the MCP endpoint.
    let response = app
        .clone()
        .oneshot(
            Request::post("/mcp")
                .header(header::AUTHORIZATION, format!("Bearer {access_token}"))
                .body(Body::from(
                    json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {} }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Without it the endpoint stays closed.
    let response = app
        .oneshot(
            Request::post("/mcp")
                .body(Body::from(
                    json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {} }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_code_cannot_be_redeemed_twice() {
    let app = build_router(true);
    let client_id = register(&app).await;
    let code = approve(&app, &client_id, &challenge(VERIFIER)).await;

    assert_eq!(exchange(&app, &client_id, &code, VERIFIER).await.status(), StatusCode::OK);

    let response = exchange(&app, &client_id, &code, VERIFIER).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_grant");
}

#[tokio::test]
async fn test_wrong_verifier_is_rejected_and_consumes_code() {
    let app = build_router(true);
    let client_id = register(&app).await;
    let code = approve(&app, &client_id, &challenge(VERIFIER)).await;

    let response = exchange(&app, &client_id, &code, "wrong-verifier-wrong-verifier-wrong-verifier").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "invalid_grant");
    assert_eq!(body["error_description"], "Invalid code_verifier");

    // The correct verifier is now too late.
    let response = exchange(&app, &client_id, &code, VERIFIER).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_grant");
}

#[tokio::test]
async fn test_missing_verifier_is_invalid_request() {
    let app = build_router(true);
    let client_id = register(&app).await;
    let code = approve(&app, &client_id, &challenge(VERIFIER)).await;

    let response = post_form(
        &app,
        "/token",
        &[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", REDIRECT_URI),
            ("client_id", client_id.as_str()),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "invalid_request");
    assert_eq!(body["error_description"], "code_verifier is required for PKCE");
}

#[tokio::test]
async fn test_redirect_uri_mismatch_is_rejected() {
    let app = build_router(true);
    let client_id = register(&app).await;
    let code = approve(&app, &client_id, &challenge(VERIFIER)).await;

    let response = post_form(
        &app,
        "/token",
        &[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", "https://evil.example.com/cb"),
            ("client_id", client_id.as_str()),
            ("code_verifier", VERIFIER),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error_description"], "redirect_uri does not match");
}

#[tokio::test]
async fn test_public_client_must_send_code_challenge() {
    let app = build_router(true);
    let client_id = register(&app).await;

    let uri = format!(
        "/authorize?response_type=code&client_id={client_id}&redirect_uri={}",
        urlencode(REDIRECT_URI)
    );
    let response = app.oneshot(Request::get(uri).body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(response).await.contains("code_challenge is required"));
}

#[tokio::test]
async fn test_unregistered_redirect_is_rejected() {
    let app = build_router(true);
    let client_id = register(&app).await;

    let uri = format!(
        "/authorize?response_type=code&client_id={client_id}&redirect_uri={}&code_challenge={}",
        urlencode("https://evil.example.com/cb"),
        challenge(VERIFIER),
    );
    let response = app.oneshot(Request::get(uri).body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_denied_consent_redirects_with_access_denied() {
    let app = build_router(true);
    let client_id = register(&app).await;

    let response = post_form(
        &app,
        "/authorize",
        &[
            ("client_id", client_id.as_str()),
            ("redirect_uri", REDIRECT_URI),
            ("state", "xyz"),
            ("code_challenge", challenge(VERIFIER).as_str()),
            ("code_challenge_method", "S256"),
            ("approved", "false"),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let query = location_query(&response);
    assert_eq!(query["error"], "access_denied");
    assert_eq!(query["state"], "xyz");
    assert!(!query.contains_key("code"));
}

#[tokio::test]
async fn test_configured_client_cannot_redirect_to_unlisted_uri() {
    let app = build_router(true);

    let response = post_form(
        &app,
        "/authorize",
        &[
            ("client_id", OAUTH_CLIENT_ID),
            ("redirect_uri", "https://evil.example.com/cb"),
            ("state", "xyz"),
            ("approved", "false"),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.headers().get(header::LOCATION).is_none());

    let response = post_form(
        &app,
        "/authorize",
        &[
            ("client_id", OAUTH_CLIENT_ID),
            ("redirect_uri", REDIRECT_URI),
            ("state", "xyz"),
            ("approved", "false"),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location_query(&response)["error"], "access_denied");
}

#[tokio::test]
async fn test_register_requires_redirect_uris() {
    let app = build_router(true);

    let response = app
        .oneshot(
            Request::post("/register")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "client_name": "No Redirects" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_client_metadata");
}

// =============================================================================
// Client credentials, refresh, introspection
// =============================================================================

#[tokio::test]
async fn test_client_credentials_via_basic_auth() {
    let app = build_router(true);
    let basic = STANDARD.encode(format!("{OAUTH_CLIENT_ID}:{OAUTH_CLIENT_SECRET}"));

    let response = app
        .clone()
        .oneshot(
            Request::post("/oauth/token")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .header(header::AUTHORIZATION, format!("Basic {basic}"))
                .body(form(&[("grant_type", "client_credentials")]))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["scope"], "mcp:access");
    assert_eq!(body["expires_in"], 3600);
    assert!(body.get("refresh_token").is_none());
    let access_token = body["access_token"].as_str().unwrap().to_string();

    let response = post_form(&app, "/oauth/introspect", &[("token", access_token.as_str())]).await;
    let info = body_json(response).await;
    assert_eq!(info["active"], true);
    assert_eq!(info["client_id"], OAUTH_CLIENT_ID);
    assert_eq!(info["token_type"], "Bearer");
}

#[tokio::test]
async fn test_client_credentials_rejects_bad_secret() {
    let app = build_router(true);

    let response = post_form(
        &app,
        "/token",
        &[
            ("grant_type", "client_credentials"),
            ("client_id", OAUTH_CLIENT_ID),
            ("client_secret", "wrong"),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "invalid_client");

    let response = post_form(&app, "/token", &[("grant_type", "client_credentials")]).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_request");
}

#[tokio::test]
async fn test_refresh_token_rotates() {
    let app = build_router(true);
    let client_id = register(&app).await;
    let code = approve(&app, &client_id, &challenge(VERIFIER)).await;
    let tokens = body_json(exchange(&app, &client_id, &code, VERIFIER).await).await;
    let refresh_token = tokens["refresh_token"].as_str().unwrap().to_string();

    let response =
        post_form(&app, "/token", &[("grant_type", "refresh_token"), ("refresh_token", refresh_token.as_str())]).await;
    assert_eq!(response.status(), StatusCode::OK);
    let rotated = body_json(response).await;
    assert_ne!(rotated["access_token"], tokens["access_token"]);
    assert_ne!(rotated["refresh_token"], tokens["refresh_token"]);

    // The old refresh token is spent.
    let response =
        post_form(&app, "/token", &[("grant_type", "refresh_token"), ("refresh_token", refresh_token.as_str())]).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_grant");
}

#[tokio::test]
async fn test_introspect_unknown_token_is_inactive() {
    let app = build_router(true);

    let response = post_form(&app, "/oauth/introspect", &[("token", "not-a-token")]).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "active": false }));
}

#[tokio::test]
async fn test_unsupported_grant_type() {
    let app = build_router(true);

    let response = post_form(&app, "/token", &[("grant_type", "password")]).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "unsupported_grant_type");
}

fn urlencode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
