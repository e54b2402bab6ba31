//! MCP protocol handling shared by every transport.
//!
//! stdio builds one [`McpHandler`] at startup; the HTTP transport builds one per
//! session through the factory held by the session registry.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::json;

use super::transport::{JsonRpcRequest, JsonRpcResponse, McpToolInfo};
use crate::tools::{McpTool, ToolContext};

/// Protocol version announced when the client does not send one.
pub const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

/// Server name reported in `initialize`.
pub const SERVER_NAME: &str = "xero-mcp-server";

/// JSON-RPC error codes used by the server.
pub mod codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const SERVER_ERROR: i32 = -32000;
}

/// A per-connection MCP protocol handler.
#[async_trait::async_trait]
pub trait ProtocolHandler: Send + Sync {
    /// Handle one request. Notifications produce no response.
    async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse>;

    /// Release resources held for the connection.
    async fn close(&self);
}

/// Handler backed by the registered Xero tools.
pub struct McpHandler {
    tools: Arc<[Box<dyn McpTool>]>,
    ctx: Arc<ToolContext>,
    initialized: AtomicBool,
    closed: AtomicBool,
}

impl McpHandler {
    #[must_use]
    pub fn new(tools: Arc<[Box<dyn McpTool>]>, ctx: Arc<ToolContext>) -> Self {
        Self { tools, ctx, initialized: AtomicBool::new(false), closed: AtomicBool::new(false) }
    }

    /// Whether `initialize` has completed on this handler.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    fn initialize(&self, id: Option<serde_json::Value>, params: &serde_json::Value) -> JsonRpcResponse {
        let protocol_version = params
            .get("protocolVersion")
            .and_then(|v| v.as_str())
            .unwrap_or(DEFAULT_PROTOCOL_VERSION);

        let client_name = params
            .pointer("/clientInfo/name")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");

        tracing::info!(protocol_version, client = client_name, "MCP initialize");
        self.initialized.store(true, Ordering::Release);

        JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": protocol_version,
                "capabilities": {
                    "tools": {
                        "listChanged": false
                    }
                },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION")
                }
            }),
        )
    }

    fn tools_list(&self, id: Option<serde_json::Value>) -> JsonRpcResponse {
        let tool_list: Vec<McpToolInfo> = self
            .tools
            .iter()
            .map(|t| McpToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect();

        JsonRpcResponse::success(id, json!({ "tools": tool_list }))
    }

    async fn tools_call(
        &self,
        id: Option<serde_json::Value>,
        params: &serde_json::Value,
    ) -> JsonRpcResponse {
        let Some(tool_name) = params.get("name").and_then(|v| v.as_str()) else {
            return JsonRpcResponse::error(id, codes::INVALID_PARAMS, "Missing 'name' parameter");
        };

        let arguments = match params.get("arguments") {
            Some(serde_json::Value::Null) | None => json!({}),
            Some(args) => args.clone(),
        };

        let Some(tool) = self.tools.iter().find(|t| t.name() == tool_name) else {
            return JsonRpcResponse::error(
                id,
                codes::INVALID_PARAMS,
                format!("Tool not found: {tool_name}"),
            );
        };

        tracing::info!(tool = %tool_name, "Executing tool");

        match tool.execute(&self.ctx, arguments).await {
            Ok(text) => JsonRpcResponse::success(
                id,
                json!({
                    "content": [{ "type": "text", "text": text }]
                }),
            ),
            Err(e) => {
                tracing::warn!(tool = %tool_name, error = %e, "Tool execution failed");
                JsonRpcResponse::success(
                    id,
                    json!({
                        "content": [{ "type": "text", "text": e.to_user_message() }],
                        "isError": true
                    }),
                )
            }
        }
    }
}

#[async_trait::async_trait]
impl ProtocolHandler for McpHandler {
    async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let JsonRpcRequest { method, params, id, .. } = request;
        tracing::debug!(method = %method, "Handling request");

        // Requests without an id are notifications and never get a reply.
        if id.is_none() {
            return None;
        }

        if self.closed.load(Ordering::Acquire) {
            return Some(JsonRpcResponse::error(id, codes::SERVER_ERROR, "Session closed"));
        }

        let response = match method.as_str() {
            "initialize" => self.initialize(id, &params),
            "tools/list" => self.tools_list(id),
            "tools/call" => self.tools_call(id, &params).await,
            "ping" | "notifications/initialized" | "initialized" => {
                JsonRpcResponse::success(id, json!({}))
            }
            _ => JsonRpcResponse::error(
                id,
                codes::METHOD_NOT_FOUND,
                format!("Method not found: {method}"),
            ),
        };

        Some(response)
    }

    /// Ends the protocol session. Later requests are refused; buffered SSE events
    /// belong to the session and are dropped with it.
    async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.initialized.store(false, Ordering::Release);
            tracing::debug!("MCP handler closed");
        }
    }
}

impl std::fmt::Debug for McpHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpHandler")
            .field("tools", &self.tools.len())
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Authenticator;
    use crate::client::XeroClient;
    use crate::config::Config;

    fn handler() -> McpHandler {
        let mut config = Config::for_testing("http://127.0.0.1:9");
        config.bearer_token = Some("static-token".into());
        let auth = Arc::new(Authenticator::from_config(&config).unwrap());
        let client = XeroClient::new(&config, auth).unwrap();
        let tools: Arc<[Box<dyn McpTool>]> = Arc::from(Vec::<Box<dyn McpTool>>::new());
        McpHandler::new(tools, Arc::new(ToolContext::new(Arc::new(client))))
    }

    fn request(method: &str, id: Option<serde_json::Value>) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params: json!({}),
            id,
        }
    }

    #[tokio::test]
    async fn test_initialize_marks_handler() {
        let handler = handler();
        let response = handler.handle(request("initialize", Some(json!(1)))).await.unwrap();
        assert!(response.error.is_none());
        assert!(handler.is_initialized());
    }

    #[tokio::test]
    async fn test_notification_gets_no_reply() {
        let handler = handler();
        assert!(handler.handle(request("notifications/initialized", None)).await.is_none());
    }

    #[tokio::test]
    async fn test_closed_handler_refuses_requests() {
        let handler = handler();
        handler.handle(request("initialize", Some(json!(1)))).await.unwrap();

        handler.close().await;
        handler.close().await;
        assert!(!handler.is_initialized());

        let response = handler.handle(request("tools/list", Some(json!(2)))).await.unwrap();
        let error = response.error.unwrap();
        assert_eq!(error.code, codes::SERVER_ERROR);
        assert_eq!(error.message, "Session closed");
    }
}
