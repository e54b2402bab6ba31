//! Deep link tools: get-deep-link.

use serde_json::json;

use super::{McpTool, ToolContext};
use crate::error::{ToolError, ToolResult};
use crate::models::{DeepLinkKind, GetDeepLinkInput, deep_link};

/// Builds a link that opens a record in the Xero web app.
pub struct GetDeepLinkTool;

#[async_trait::async_trait]
impl McpTool for GetDeepLinkTool {
    fn name(&self) -> &'static str {
        "get-deep-link"
    }

    fn description(&self) -> &'static str {
        "Get a link that opens a contact, invoice, bill, quote, credit note, payment or \
         manual journal in the Xero web app."
    }

    fn input_schema(&self) -> serde_json::Value {
        let kinds: Vec<&str> = DeepLinkKind::ALL.iter().map(|k| k.as_str()).collect();
        json!({
            "type": "object",
            "properties": {
                "type": {"type": "string", "enum": kinds},
                "itemId": {"type": "string", "description": "Xero ID of the record"}
            },
            "required": ["type", "itemId"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: GetDeepLinkInput = serde_json::from_value(input)?;
        let item_id = params.item_id.trim();
        if item_id.is_empty() {
            return Err(ToolError::validation("itemId", "cannot be empty"));
        }

        let short_code = if params.kind.requires_short_code() {
            ctx.client.organisation_short_code().await.map_err(ToolError::from)?
        } else {
            String::new()
        };

        Ok(deep_link(params.kind, &short_code, item_id))
    }
}
