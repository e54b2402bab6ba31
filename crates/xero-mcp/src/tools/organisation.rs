//! Organisation tools: list-organisation-details.

use serde_json::json;

use super::{McpTool, ToolContext};
use crate::error::{ToolError, ToolResult};
use crate::formatters;

pub struct ListOrganisationDetailsTool;

#[async_trait::async_trait]
impl McpTool for ListOrganisationDetailsTool {
    fn name(&self) -> &'static str {
        "list-organisation-details"
    }

    fn description(&self) -> &'static str {
        "Lists the organisation details from Xero. Use this tool to get information about \
         the current Xero organisation."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, ctx: &ToolContext, _input: serde_json::Value) -> ToolResult<String> {
        let organisation = ctx.client.get_organisation().await.map_err(ToolError::from)?;
        Ok(formatters::format_organisation(&organisation))
    }
}
