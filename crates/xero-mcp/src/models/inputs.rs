//! Input models for MCP tool parameters.

use serde::{Deserialize, Serialize};

use super::DeepLinkKind;

/// Input for listing contacts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListContactsInput {
    /// Page number (Xero pages hold 100 contacts).
    #[serde(default)]
    pub page: Option<u32>,

    /// Match against name, email or account number.
    #[serde(default)]
    pub search_term: Option<String>,
}

/// Input for listing invoices.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListInvoicesInput {
    #[serde(default)]
    pub page: Option<u32>,

    #[serde(default)]
    pub contact_ids: Option<Vec<String>>,

    /// When set, line items are included in the output.
    #[serde(default)]
    pub invoice_numbers: Option<Vec<String>>,

    #[serde(default)]
    pub statuses: Option<Vec<String>>,

    /// Raw Xero `where` filter, e.g. `Type=="ACCREC"`.
    #[serde(default, rename = "where")]
    pub where_filter: Option<String>,

    #[serde(default)]
    pub order: Option<String>,
}

/// Input for listing accounts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListAccountsInput {
    #[serde(default, rename = "where")]
    pub where_filter: Option<String>,
}

/// Input for creating a contact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateContactInput {
    pub name: String,

    #[serde(default)]
    pub email: Option<String>,

    /// Stored as a mobile number.
    #[serde(default)]
    pub phone: Option<String>,
}

impl CreateContactInput {
    /// Check the fields Xero would reject with a less helpful message.
    pub fn validate(&self) -> Result<(), (&'static str, &'static str)> {
        if self.name.trim().is_empty() {
            return Err(("name", "cannot be empty"));
        }
        if let Some(email) = &self.email {
            let valid = email
                .split_once('@')
                .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
            if !valid {
                return Err(("email", "must be a valid email address"));
            }
        }
        Ok(())
    }
}

/// Input for building a deep link.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetDeepLinkInput {
    #[serde(rename = "type")]
    pub kind: DeepLinkKind,
    pub item_id: String,
}
