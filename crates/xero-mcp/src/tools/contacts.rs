//! Contact tools: list-contacts, create-contact.

use serde_json::json;

use super::{McpTool, ToolContext};
use crate::error::{ToolError, ToolResult};
use crate::formatters;
use crate::models::{Contact, CreateContactInput, DeepLinkKind, ListContactsInput, Phone, deep_link};

/// Contact listing tool.
pub struct ListContactsTool;

#[async_trait::async_trait]
impl McpTool for ListContactsTool {
    fn name(&self) -> &'static str {
        "list-contacts"
    }

    fn description(&self) -> &'static str {
        "List all contacts in Xero. This includes Suppliers and Customers. \
         Pages hold 100 contacts; ask the user before fetching the next page."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "page": {
                    "type": "integer",
                    "minimum": 1,
                    "default": 1,
                    "description": "Page number"
                },
                "searchTerm": {
                    "type": "string",
                    "description": "Match against name, email address or account number"
                }
            }
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: ListContactsInput = serde_json::from_value(input)?;

        let contacts = ctx
            .client
            .get_contacts(params.page, params.search_term.as_deref())
            .await
            .map_err(ToolError::from)?;

        Ok(formatters::format_contacts(&contacts))
    }
}

/// Contact creation tool.
pub struct CreateContactTool;

#[async_trait::async_trait]
impl McpTool for CreateContactTool {
    fn name(&self) -> &'static str {
        "create-contact"
    }

    fn description(&self) -> &'static str {
        "Create a contact in Xero. When a contact is created, a deep link to the contact \
         in Xero is returned."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "Contact name"},
                "email": {"type": "string", "format": "email"},
                "phone": {"type": "string", "description": "Stored as a mobile number"}
            },
            "required": ["name"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: CreateContactInput = serde_json::from_value(input)?;
        params.validate().map_err(|(field, message)| ToolError::validation(field, message))?;

        let contact = Contact {
            name: Some(params.name.trim().to_string()),
            email_address: params.email,
            phones: params
                .phone
                .map(|number| {
                    vec![Phone {
                        phone_type: Some("MOBILE".to_string()),
                        phone_number: Some(number),
                    }]
                })
                .unwrap_or_default(),
            ..Contact::default()
        };

        let created = ctx.client.create_contact(&contact).await.map_err(ToolError::from)?;
        let id = created.contact_id.clone().unwrap_or_default();

        let mut output =
            format!("Contact created: {} (ID: {})", created.name_or_default(), id);

        if !id.is_empty() {
            match ctx.client.organisation_short_code().await {
                Ok(short_code) => {
                    output.push_str("\nLink to view: ");
                    output.push_str(&deep_link(DeepLinkKind::Contact, &short_code, &id));
                }
                Err(e) => tracing::warn!(error = %e, "Could not build contact deep link"),
            }
        }

        Ok(output)
    }
}
