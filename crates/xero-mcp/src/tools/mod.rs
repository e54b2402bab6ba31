//! MCP tool implementations.
//!
//! Each tool:
//! 1. Parses and validates its input parameters
//! 2. Calls the Xero client, which authenticates before every request
//! 3. Formats the result as plain text

mod accounts;
mod contacts;
mod deep_links;
mod invoices;
mod organisation;

pub use accounts::*;
pub use contacts::*;
pub use deep_links::*;
pub use invoices::*;
pub use organisation::*;

use std::sync::Arc;

use crate::client::XeroClient;
use crate::error::ToolResult;

/// Tool execution context.
pub struct ToolContext {
    /// API client.
    pub client: Arc<XeroClient>,
}

impl ToolContext {
    /// Create a new tool context.
    #[must_use]
    pub fn new(client: Arc<XeroClient>) -> Self {
        Self { client }
    }
}

/// Trait for MCP tools.
#[async_trait::async_trait]
pub trait McpTool: Send + Sync {
    /// Tool name (e.g., "list-contacts").
    fn name(&self) -> &'static str;

    /// Tool description for LLM.
    fn description(&self) -> &'static str;

    /// JSON Schema for input parameters.
    fn input_schema(&self) -> serde_json::Value;

    /// Execute the tool with given input.
    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String>;
}

/// Register all tools.
#[must_use]
pub fn register_all_tools() -> Vec<Box<dyn McpTool>> {
    vec![
        Box::new(contacts::ListContactsTool),
        Box::new(contacts::CreateContactTool),
        Box::new(invoices::ListInvoicesTool),
        Box::new(accounts::ListAccountsTool),
        Box::new(organisation::ListOrganisationDetailsTool),
        Box::new(deep_links::GetDeepLinkTool),
    ]
}
