//! Invoice tools: list-invoices.

use serde_json::json;

use super::{McpTool, ToolContext};
use crate::error::{ToolError, ToolResult};
use crate::formatters;
use crate::models::ListInvoicesInput;

/// Invoice listing tool.
pub struct ListInvoicesTool;

#[async_trait::async_trait]
impl McpTool for ListInvoicesTool {
    fn name(&self) -> &'static str {
        "list-invoices"
    }

    fn description(&self) -> &'static str {
        "List invoices in Xero, ten per page. To filter by type use the 'where' parameter: \
         Type==\"ACCREC\" for sales invoices, Type==\"ACCPAY\" for bills. The same parameter \
         accepts Status, Date, DueDate, AmountDue and Contact.Name filters combined with AND/OR. \
         Line items are included when invoiceNumbers is given. Ask the user if they want the \
         next page after returning 10 invoices."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "page": {"type": "integer", "minimum": 1, "default": 1},
                "contactIds": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Filter by contact IDs"
                },
                "invoiceNumbers": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Filter by invoice numbers; line items are returned too"
                },
                "statuses": {
                    "type": "array",
                    "items": {
                        "type": "string",
                        "enum": ["DRAFT", "SUBMITTED", "DELETED", "AUTHORISED", "PAID", "VOIDED"]
                    }
                },
                "where": {
                    "type": "string",
                    "description": "Xero filter expression, e.g. Type==\"ACCREC\" AND Status==\"AUTHORISED\""
                },
                "order": {
                    "type": "string",
                    "description": "Order by field, default 'UpdatedDateUTC DESC'"
                }
            }
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: ListInvoicesInput = serde_json::from_value(input)?;
        if params.page == Some(0) {
            return Err(ToolError::validation("page", "pages start at 1"));
        }

        let invoices = ctx.client.get_invoices(&params).await.map_err(ToolError::from)?;
        let with_line_items = params.invoice_numbers.as_ref().is_some_and(|n| !n.is_empty());

        Ok(formatters::format_invoices(&invoices, with_line_items))
    }
}
