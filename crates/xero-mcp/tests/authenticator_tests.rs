//! Token lifecycle tests for the authenticator against a mocked identity endpoint.
//!
//! Tests: startup without stored tokens, refresh inside the safety margin,
//! single-flight refresh, rejected refresh tokens, interactive fallback, client
//! credentials, static bearer.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{TimeDelta, Utc};
use serde_json::json;
use tokio::sync::mpsc;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use xero_mcp::auth::{
    Authenticator, CredentialStrategy, FileTokenStore, IdentityClient, MemoryTokenStore,
    TokenRecord, TokenStore,
};
use xero_mcp::config::Config;
use xero_mcp::error::AuthError;

const CLIENT_ID: &str = "client-abc";
const CLIENT_SECRET: &str = "secret-xyz";

fn refreshable_config(mock_server: &MockServer) -> Config {
    let mut config = Config::for_testing(&mock_server.uri());
    config.client_id = Some(CLIENT_ID.to_string());
    config.client_secret = Some(CLIENT_SECRET.to_string());
    config.oauth_mode = true;
    config
}

fn client_credentials_config(mock_server: &MockServer) -> Config {
    let mut config = refreshable_config(mock_server);
    config.oauth_mode = false;
    config
}

fn authenticator(config: &Config, store: Arc<dyn TokenStore>) -> Authenticator {
    let strategy = CredentialStrategy::from_config(config).unwrap();
    let identity = IdentityClient::new(config).unwrap();
    Authenticator::new(strategy, identity, store, config)
}

fn basic_auth() -> String {
    format!("Basic {}", STANDARD.encode(format!("{CLIENT_ID}:{CLIENT_SECRET}")))
}

fn record_expiring_in(seconds: i64, access: &str, refresh: &str) -> TokenRecord {
    TokenRecord {
        access_token: access.to_string(),
        refresh_token: Some(refresh.to_string()),
        expires_at: Utc::now() + TimeDelta::seconds(seconds),
        token_type: Some("Bearer".to_string()),
        scope: None,
    }
}

async fn mount_connections(mock_server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/connections"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": "c-1",
                "tenantId": "tenant-1",
                "tenantName": "Demo Company (NZ)",
                "tenantType": "ORGANISATION"
            },
            {
                "id": "c-2",
                "tenantId": "tenant-2",
                "tenantName": "Second Org",
                "tenantType": "ORGANISATION"
            }
        ])))
        .mount(mock_server)
        .await;
}

// =============================================================================
// Refreshable mode
// =============================================================================

#[tokio::test]
async fn test_refreshable_without_stored_tokens_fails_without_network() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/connect/token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let config = refreshable_config(&mock_server);
    let auth = authenticator(&config, Arc::new(MemoryTokenStore::new()));

    let err = auth.ensure_valid_token().await.unwrap_err();
    match err {
        AuthError::Configuration(message) => assert!(message.contains("xero-mcp login")),
        other => panic!("expected configuration error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_token_inside_safety_margin_is_refreshed_once() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/connect/token"))
        .and(header("authorization", basic_auth().as_str()))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-2",
            "refresh_token": "refresh-2",
            "expires_in": 1800,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_connections(&mock_server).await;

    let config = refreshable_config(&mock_server);
    let old = record_expiring_in(30, "access-1", "refresh-1");
    let store = Arc::new(MemoryTokenStore::with_record(old.clone()));
    let auth = authenticator(&config, store.clone());

    let grant = auth.ensure_valid_token().await.unwrap();
    assert_eq!(grant.access_token, "access-2");
    assert_eq!(grant.tenant.tenant_id, "tenant-1");
    assert_eq!(grant.tenant.tenant_name.as_deref(), Some("Demo Company (NZ)"));

    let saved = store.load().await.unwrap();
    assert_eq!(saved.access_token, "access-2");
    assert_eq!(saved.refresh_token.as_deref(), Some("refresh-2"));
    assert!(saved.expires_at > old.expires_at);

    // Fresh token now; no second refresh.
    let again = auth.ensure_valid_token().await.unwrap();
    assert_eq!(again.access_token, "access-2");
}

#[tokio::test]
async fn test_token_outside_safety_margin_is_used_as_is() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/connect/token"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&mock_server)
        .await;
    mount_connections(&mock_server).await;

    let config = refreshable_config(&mock_server);
    let store = Arc::new(MemoryTokenStore::with_record(record_expiring_in(
        600, "access-1", "refresh-1",
    )));
    let auth = authenticator(&config, store);

    let grant = auth.ensure_valid_token().await.unwrap();
    assert_eq!(grant.access_token, "access-1");
}

#[tokio::test]
async fn test_refresh_keeps_previous_refresh_token_when_none_returned() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/connect/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-2",
            "expires_in": 1800
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_connections(&mock_server).await;

    let config = refreshable_config(&mock_server);
    let store = Arc::new(MemoryTokenStore::with_record(record_expiring_in(
        10, "access-1", "refresh-1",
    )));
    let auth = authenticator(&config, store.clone());

    auth.ensure_valid_token().await.unwrap();
    let saved = store.load().await.unwrap();
    assert_eq!(saved.refresh_token.as_deref(), Some("refresh-1"));
}

#[tokio::test]
async fn test_concurrent_callers_share_one_refresh() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/connect/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "access_token": "access-2",
                    "refresh_token": "refresh-2",
                    "expires_in": 1800
                }))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/connections"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{ "tenantId": "tenant-1" }])),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = refreshable_config(&mock_server);
    let store = Arc::new(MemoryTokenStore::with_record(record_expiring_in(
        5, "access-1", "refresh-1",
    )));
    let auth = Arc::new(authenticator(&config, store));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let auth = Arc::clone(&auth);
            tokio::spawn(async move { auth.ensure_valid_token().await })
        })
        .collect();

    for handle in handles {
        let grant = handle.await.unwrap().unwrap();
        assert_eq!(grant.access_token, "access-2");
        assert_eq!(grant.tenant.tenant_id, "tenant-1");
    }
}

#[tokio::test]
async fn test_rejected_refresh_token_clears_store() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/connect/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = refreshable_config(&mock_server);
    let store = Arc::new(MemoryTokenStore::with_record(record_expiring_in(
        -60, "access-1", "refresh-1",
    )));
    let auth = authenticator(&config, store.clone());

    let err = auth.ensure_valid_token().await.unwrap_err();
    assert!(matches!(err, AuthError::AuthExchange { status: 400, .. }), "got {err:?}");
    assert!(err.is_rejection());
    assert!(store.load().await.is_none());

    // The record is gone, so the next call fails before any network traffic.
    let err = auth.ensure_valid_token().await.unwrap_err();
    assert!(matches!(err, AuthError::Configuration(_)), "got {err:?}");
}

#[tokio::test]
async fn test_server_error_on_refresh_is_retryable_and_keeps_store() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/connect/token"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&mock_server)
        .await;

    let config = refreshable_config(&mock_server);
    let old = record_expiring_in(-60, "access-1", "refresh-1");
    let store = Arc::new(MemoryTokenStore::with_record(old.clone()));
    let auth = authenticator(&config, store.clone());

    let err = auth.ensure_valid_token().await.unwrap_err();
    assert!(err.is_retryable(), "got {err:?}");
    assert_eq!(store.load().await, Some(old));
}

#[tokio::test]
async fn test_refreshed_tokens_are_written_to_token_file() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/connect/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-2",
            "refresh_token": "refresh-2",
            "expires_in": 1800
        })))
        .mount(&mock_server)
        .await;
    mount_connections(&mock_server).await;

    let dir = tempfile::tempdir().unwrap();
    let token_path = dir.path().join("tokens.json");
    let file_store = FileTokenStore::new(&token_path);
    file_store.save(&record_expiring_in(20, "access-1", "refresh-1")).await.unwrap();

    let config = refreshable_config(&mock_server);
    let auth = authenticator(&config, Arc::new(file_store));
    auth.ensure_valid_token().await.unwrap();

    let raw = std::fs::read_to_string(&token_path).unwrap();
    let on_disk: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(on_disk["access_token"], "access-2");
    assert_eq!(on_disk["refresh_token"], "refresh-2");
    assert!(on_disk["expires_at"].as_i64().unwrap() > Utc::now().timestamp_millis());
}

#[tokio::test]
async fn test_invalidate_forces_renewal() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/connect/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-2",
            "refresh_token": "refresh-2",
            "expires_in": 1800
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_connections(&mock_server).await;

    let config = refreshable_config(&mock_server);
    let store = Arc::new(MemoryTokenStore::with_record(record_expiring_in(
        900, "access-1", "refresh-1",
    )));
    let auth = authenticator(&config, store);

    assert_eq!(auth.ensure_valid_token().await.unwrap().access_token, "access-1");
    auth.invalidate().await;
    assert_eq!(auth.ensure_valid_token().await.unwrap().access_token, "access-2");
}

// =============================================================================
// Client credentials mode
// =============================================================================

#[tokio::test]
async fn test_client_credentials_token_is_cached_in_memory() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/connect/token"))
        .and(header("authorization", basic_auth().as_str()))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "cc-token",
            "expires_in": 1800,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_connections(&mock_server).await;

    let config = client_credentials_config(&mock_server);
    let store = Arc::new(MemoryTokenStore::new());
    let auth = authenticator(&config, store.clone());

    for _ in 0..3 {
        let grant = auth.ensure_valid_token().await.unwrap();
        assert_eq!(grant.access_token, "cc-token");
    }
    // Client credentials tokens never touch the store.
    assert!(store.load().await.is_none());
}

#[tokio::test]
async fn test_client_credentials_without_connections_is_configuration_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/connect/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "cc-token",
            "expires_in": 1800
        })))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/connections"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let config = client_credentials_config(&mock_server);
    let auth = authenticator(&config, Arc::new(MemoryTokenStore::new()));

    let err = auth.ensure_valid_token().await.unwrap_err();
    assert!(matches!(err, AuthError::Configuration(_)), "got {err:?}");
}

#[tokio::test]
async fn test_client_credentials_rejected_reports_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/connect/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_client"
        })))
        .mount(&mock_server)
        .await;

    let config = client_credentials_config(&mock_server);
    let auth = authenticator(&config, Arc::new(MemoryTokenStore::new()));

    let err = auth.ensure_valid_token().await.unwrap_err();
    match err {
        AuthError::AuthExchange { status, message } => {
            assert_eq!(status, 401);
            assert!(message.contains("invalid_client"));
        }
        other => panic!("expected exchange error, got {other:?}"),
    }
}

// =============================================================================
// Static bearer mode
// =============================================================================

#[tokio::test]
async fn test_static_bearer_skips_identity_endpoint() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/connect/token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/connections"))
        .and(header("authorization", "Bearer static-token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{ "tenantId": "tenant-9" }])),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut config = Config::for_testing(&mock_server.uri());
    config.bearer_token = Some("static-token".to_string());
    // Bearer wins even when client credentials are present.
    config.client_id = Some(CLIENT_ID.to_string());
    config.client_secret = Some(CLIENT_SECRET.to_string());

    let auth = authenticator(&config, Arc::new(MemoryTokenStore::new()));
    let grant = auth.ensure_valid_token().await.unwrap();
    assert_eq!(grant.access_token, "static-token");
    assert_eq!(grant.tenant.tenant_id, "tenant-9");

    auth.invalidate().await;
    assert_eq!(auth.ensure_valid_token().await.unwrap().access_token, "static-token");
}

// =============================================================================
// Interactive mode: rejected refresh token
// =============================================================================

fn interactive_config(mock_server: &MockServer, interactive_fallback: bool) -> Config {
    let port = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
    let mut config = refreshable_config(mock_server);
    config.oauth_mode = false;
    config.interactive = true;
    config.interactive_fallback = interactive_fallback;
    config.redirect_uri = format!("http://127.0.0.1:{port}/callback");
    config.callback_timeout = Duration::from_secs(10);
    config
}

#[tokio::test]
async fn test_interactive_rejection_without_fallback_requires_login() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/connect/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_grant"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = interactive_config(&mock_server, false);
    let store = Arc::new(MemoryTokenStore::with_record(record_expiring_in(
        -60, "access-1", "refresh-1",
    )));
    let auth = authenticator(&config, store.clone());

    let err = auth.ensure_valid_token().await.unwrap_err();
    assert!(matches!(err, AuthError::AuthExchange { status: 401, .. }), "got {err:?}");
    assert!(store.load().await.is_none());

    // No callback listener is bound, so this returns well inside the callback timeout.
    let second = tokio::time::timeout(Duration::from_secs(2), auth.ensure_valid_token())
        .await
        .expect("next call waited for a browser callback");
    match second {
        Err(AuthError::Configuration(message)) => assert!(message.contains("xero-mcp login")),
        other => panic!("expected configuration error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_interactive_rejection_with_fallback_reauthorizes() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/connect/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/connect/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=fresh-code"))
        .and(header("authorization", basic_auth().as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-3",
            "refresh_token": "refresh-3",
            "expires_in": 1800
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_connections(&mock_server).await;

    let config = interactive_config(&mock_server, true);
    let (url_tx, mut url_rx) = mpsc::unbounded_channel();
    let mut strategy = CredentialStrategy::from_config(&config).unwrap();
    match &mut strategy {
        CredentialStrategy::AuthorizationCodePkce { options, .. } => options.url_sink = Some(url_tx),
        other => panic!("expected interactive strategy, got {other:?}"),
    }
    let store = Arc::new(MemoryTokenStore::with_record(record_expiring_in(
        -60, "access-1", "refresh-1",
    )));
    let identity = IdentityClient::new(&config).unwrap();
    let auth = Arc::new(Authenticator::new(strategy, identity, store.clone(), &config));

    let call = tokio::spawn({
        let auth = Arc::clone(&auth);
        async move { auth.ensure_valid_token().await }
    });

    let authorize_url = tokio::time::timeout(Duration::from_secs(5), url_rx.recv())
        .await
        .unwrap()
        .unwrap();
    let authorize_url = url::Url::parse(&authorize_url).unwrap();
    let state = authorize_url
        .query_pairs()
        .find(|(key, _)| key == "state")
        .map(|(_, value)| value.into_owned())
        .unwrap();

    let callback = format!("{}?code=fresh-code&state={state}", config.redirect_uri);
    let response = reqwest::get(&callback).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let grant = call.await.unwrap().unwrap();
    assert_eq!(grant.access_token, "access-3");
    assert_eq!(grant.tenant.tenant_id, "tenant-1");

    let persisted = store.load().await.unwrap();
    assert_eq!(persisted.access_token, "access-3");
    assert_eq!(persisted.refresh_token.as_deref(), Some("refresh-3"));
}
