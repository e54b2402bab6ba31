//! MCP server implementation.
//!
//! Provides stdio and HTTP transports. There is no global server instance:
//! stdio serves a single handler built at startup, HTTP builds one handler per
//! session through [`McpServer::handler_factory`].

pub mod handler;
pub mod oauth;
pub mod session;
pub mod stdio;
pub mod transport;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::client::XeroClient;
use crate::config::Config;
use crate::tools::{self, McpTool, ToolContext};

pub use handler::{McpHandler, ProtocolHandler};
pub use session::{HandlerFactory, McpSession, SessionRegistry};
pub use transport::{HttpState, JsonRpcRequest, JsonRpcResponse, create_router};

/// MCP server for Xero.
pub struct McpServer {
    /// Tool execution context.
    ctx: Arc<ToolContext>,

    /// Registered tools.
    tools: Arc<[Box<dyn McpTool>]>,
}

impl McpServer {
    /// Create a new MCP server.
    #[must_use]
    pub fn new(client: XeroClient) -> Self {
        let ctx = Arc::new(ToolContext::new(Arc::new(client)));
        let tools = Arc::from(tools::register_all_tools());

        Self { ctx, tools }
    }

    /// Build a protocol handler sharing this server's tools and client.
    #[must_use]
    pub fn handler(&self) -> McpHandler {
        McpHandler::new(Arc::clone(&self.tools), Arc::clone(&self.ctx))
    }

    /// Factory producing one handler per HTTP session.
    #[must_use]
    pub fn handler_factory(&self) -> HandlerFactory {
        let tools = Arc::clone(&self.tools);
        let ctx = Arc::clone(&self.ctx);
        Arc::new(move || {
            Arc::new(McpHandler::new(Arc::clone(&tools), Arc::clone(&ctx))) as Arc<dyn ProtocolHandler>
        })
    }

    /// Shared HTTP state for this server.
    #[must_use]
    pub fn http_state(&self, config: &Config, base_url: impl Into<String>) -> Arc<HttpState> {
        Arc::new(HttpState::new(config, self.handler_factory(), base_url))
    }

    /// Run the server in stdio mode.
    ///
    /// # Errors
    ///
    /// Returns error on I/O failure.
    pub async fn run_stdio(self) -> anyhow::Result<()> {
        tracing::info!("Starting MCP server in stdio mode");
        tracing::info!("Registered {} tools", self.tools.len());

        let handler = self.handler();
        stdio::run_stdio(&handler).await
    }

    /// Run the server in HTTP mode.
    ///
    /// # Errors
    ///
    /// Returns error if the address cannot be bound or the server fails.
    pub async fn run_http(
        self,
        config: &Config,
        host: &str,
        port: u16,
        base_url: Option<String>,
    ) -> anyhow::Result<()> {
        let base_url = base_url.unwrap_or_else(|| format!("http://localhost:{port}"));

        tracing::info!("Starting MCP server in HTTP mode on {}:{}", host, port);
        tracing::info!("Registered {} tools", self.tools.len());

        let state = self.http_state(config, base_url);
        let sweep = Arc::clone(&state.sessions).start_sweep_task();
        let cleanup = state.oauth_store.as_ref().map(|store| Arc::clone(store).start_cleanup_task());

        if state.requires_auth() {
            tracing::info!(
                oauth = state.oauth_store.is_some(),
                api_key = state.api_key.is_some(),
                "Bearer authentication required on MCP endpoints"
            );
        } else {
            tracing::warn!("MCP endpoints are unauthenticated; set MCP_API_KEY or AUTH_ENABLED");
        }

        let router = create_router(Arc::clone(&state));
        let listener = tokio::net::TcpListener::bind((host, port)).await?;
        let addr: SocketAddr = listener.local_addr()?;

        tracing::info!("HTTP server listening on http://{}", addr);

        axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;

        sweep.abort();
        if let Some(cleanup) = cleanup {
            cleanup.abort();
        }
        state.sessions.close_all().await;

        tracing::info!("HTTP server shut down");
        Ok(())
    }

    /// Get tool by name.
    #[must_use]
    pub fn get_tool(&self, name: &str) -> Option<&dyn McpTool> {
        self.tools.iter().find(|t| t.name() == name).map(|t| t.as_ref())
    }

    /// List all available tools.
    #[must_use]
    pub fn list_tools(&self) -> Vec<(&str, &str)> {
        self.tools.iter().map(|t| (t.name(), t.description())).collect()
    }

    /// Get tool context for execution.
    #[must_use]
    pub fn context(&self) -> &ToolContext {
        &self.ctx
    }
}

impl std::fmt::Debug for McpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServer").field("tools", &self.tools.len()).finish()
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received shutdown signal");
}
