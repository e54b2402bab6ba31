//! Xero accounting API entities.
//!
//! Xero serializes fields in PascalCase with upper-case `ID` suffixes, so identifier
//! fields carry explicit renames.

use serde::{Deserialize, Serialize};

/// A phone number attached to a contact or organisation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Phone {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

/// A postal or street address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Address {
    #[serde(default)]
    pub address_type: Option<String>,
    #[serde(default)]
    pub address_line1: Option<String>,
    #[serde(default)]
    pub address_line2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

impl Address {
    /// Non-empty address parts joined with commas.
    #[must_use]
    pub fn one_line(&self) -> String {
        [
            &self.address_line1,
            &self.address_line2,
            &self.city,
            &self.postal_code,
            &self.country,
        ]
        .into_iter()
        .filter_map(|part| part.as_deref().filter(|s| !s.is_empty()))
        .collect::<Vec<_>>()
        .join(", ")
    }
}

/// A customer or supplier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Contact {
    #[serde(rename = "ContactID", default, skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_supplier: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_customer: Option<bool>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phones: Vec<Phone>,

    #[serde(rename = "UpdatedDateUTC", default, skip_serializing_if = "Option::is_none")]
    pub updated_date_utc: Option<String>,
}

impl Contact {
    #[must_use]
    pub fn name_or_default(&self) -> &str {
        self.name.as_deref().unwrap_or("Unnamed")
    }
}

/// Contact reference embedded in an invoice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContactRef {
    #[serde(rename = "ContactID", default)]
    pub contact_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// A line on an invoice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LineItem {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub unit_amount: Option<f64>,
    #[serde(default)]
    pub account_code: Option<String>,
    #[serde(default)]
    pub line_amount: Option<f64>,
}

/// A sales invoice (`ACCREC`) or bill (`ACCPAY`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Invoice {
    #[serde(rename = "InvoiceID", default)]
    pub invoice_id: Option<String>,
    #[serde(default)]
    pub invoice_number: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(rename = "Type", default)]
    pub invoice_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub contact: Option<ContactRef>,
    #[serde(default)]
    pub date_string: Option<String>,
    #[serde(default)]
    pub due_date_string: Option<String>,
    #[serde(default)]
    pub line_amount_types: Option<String>,
    #[serde(default)]
    pub sub_total: Option<f64>,
    #[serde(default)]
    pub total_tax: Option<f64>,
    #[serde(default)]
    pub total: Option<f64>,
    #[serde(default)]
    pub amount_due: Option<f64>,
    #[serde(default)]
    pub amount_paid: Option<f64>,
    #[serde(default)]
    pub currency_code: Option<String>,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    #[serde(rename = "UpdatedDateUTC", default)]
    pub updated_date_utc: Option<String>,
}

/// A chart-of-accounts entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Account {
    #[serde(rename = "AccountID", default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "Type", default)]
    pub account_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tax_type: Option<String>,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub bank_account_number: Option<String>,
}

/// The connected organisation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Organisation {
    #[serde(rename = "OrganisationID", default)]
    pub organisation_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub legal_name: Option<String>,
    #[serde(default)]
    pub short_code: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub organisation_type: Option<String>,
    #[serde(default)]
    pub base_currency: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub addresses: Vec<Address>,
    #[serde(default)]
    pub phones: Vec<Phone>,
}

/// `{"Contacts": [...]}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContactsEnvelope {
    #[serde(default)]
    pub contacts: Vec<Contact>,
}

/// `{"Invoices": [...]}`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InvoicesEnvelope {
    #[serde(default)]
    pub invoices: Vec<Invoice>,
}

/// `{"Accounts": [...]}`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AccountsEnvelope {
    #[serde(default)]
    pub accounts: Vec<Account>,
}

/// `{"Organisations": [...]}`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OrganisationsEnvelope {
    #[serde(default)]
    pub organisations: Vec<Organisation>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ValidationError {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorElement {
    #[serde(default)]
    validation_errors: Vec<ValidationError>,
}

/// Error body returned by the accounting API.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct XeroErrorBody {
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    elements: Vec<ErrorElement>,
}

impl XeroErrorBody {
    /// Parse an error body, falling back to an empty one for non-JSON payloads.
    #[must_use]
    pub fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    /// Validation messages of the first element, joined with `"; "`.
    #[must_use]
    pub fn validation_message(&self) -> Option<String> {
        let messages: Vec<&str> = self
            .elements
            .first()?
            .validation_errors
            .iter()
            .filter_map(|ve| ve.message.as_deref().filter(|m| !m.is_empty()))
            .collect();
        (!messages.is_empty()).then(|| messages.join("; "))
    }

    /// The `Detail` field, or `Message` if Detail is absent.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref().or(self.message.as_deref()).filter(|d| !d.is_empty())
    }
}
