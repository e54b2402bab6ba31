//! Interactive authorization code flow with PKCE.

use std::time::Duration;

use tokio::sync::mpsc;

use super::callback::{AuthorizationRequestState, CallbackServer};
use super::identity::{ClientCredentials, IdentityClient};
use super::token::TokenRecord;
use crate::error::AuthResult;

/// Settings for the browser flow.
#[derive(Debug, Clone)]
pub struct InteractiveOptions {
    pub redirect_uri: String,
    pub scope: String,
    pub timeout: Duration,
    pub open_browser: bool,
    /// Receives each authorization URL, for hosts that present it themselves.
    pub url_sink: Option<mpsc::UnboundedSender<String>>,
}

/// Run the full browser flow and return the exchanged token.
///
/// Binds the callback listener, opens the authorization URL, waits for exactly one
/// callback and exchanges the code. Nothing is persisted here; on any failure the
/// listener is shut down and the pending request discarded.
pub async fn run_authorization_code_flow(
    identity: &IdentityClient,
    credentials: &ClientCredentials,
    options: &InteractiveOptions,
) -> AuthResult<TokenRecord> {
    let server = CallbackServer::bind(&options.redirect_uri).await?;
    let result = authorize_with(&server, identity, credentials, options).await;
    server.shutdown().await;
    result
}

async fn authorize_with(
    server: &CallbackServer,
    identity: &IdentityClient,
    credentials: &ClientCredentials,
    options: &InteractiveOptions,
) -> AuthResult<TokenRecord> {
    let request = AuthorizationRequestState::generate(options.timeout);
    let pending = server.expect(&request).await?;

    let url = identity.authorization_url(
        &credentials.client_id,
        server.redirect_uri(),
        &options.scope,
        &request.state,
        &request.code_challenge,
    )?;

    eprintln!("\nOpen this URL in your browser to authorize Xero access:\n\n  {url}\n");
    if let Some(sink) = &options.url_sink {
        if sink.send(url.to_string()).is_err() {
            tracing::debug!("Authorization URL receiver dropped");
        }
    }
    if options.open_browser {
        try_open_browser(url.as_str());
    }

    let code = pending.wait(options.timeout).await?;
    tracing::info!("Received authorization code");

    identity.exchange_code(credentials, &code, &request.code_verifier, server.redirect_uri()).await
}

/// Best-effort attempt to open the system browser.
fn try_open_browser(url: &str) {
    match webbrowser::open(url) {
        Ok(()) => tracing::debug!("Opened system browser"),
        Err(e) => tracing::warn!(error = %e, "Could not open a browser; use the printed URL"),
    }
}
