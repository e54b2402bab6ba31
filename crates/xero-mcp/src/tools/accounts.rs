//! Account tools: list-accounts.

use serde_json::json;

use super::{McpTool, ToolContext};
use crate::error::{ToolError, ToolResult};
use crate::formatters;
use crate::models::ListAccountsInput;

/// Chart-of-accounts listing tool.
pub struct ListAccountsTool;

#[async_trait::async_trait]
impl McpTool for ListAccountsTool {
    fn name(&self) -> &'static str {
        "list-accounts"
    }

    fn description(&self) -> &'static str {
        "Lists all accounts in Xero. Use this tool to get the account codes and names \
         needed when creating invoices."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "where": {
                    "type": "string",
                    "description": "Optional filter, e.g. Status==\"ACTIVE\" AND Type==\"BANK\""
                }
            }
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: ListAccountsInput = serde_json::from_value(input)?;
        let accounts = ctx
            .client
            .get_accounts(params.where_filter.as_deref())
            .await
            .map_err(ToolError::from)?;
        Ok(formatters::format_accounts(&accounts))
    }
}
