//! Data models for Xero accounting entities and tool inputs.
//!
//! API entities use `#[serde(rename_all = "PascalCase")]` to match Xero naming;
//! tool inputs use camelCase like the rest of the MCP surface.

mod deep_link;
mod inputs;
mod xero;

pub use deep_link::{DeepLinkKind, deep_link};
pub use inputs::*;
pub use xero::{
    Account, AccountsEnvelope, Address, Contact, ContactRef, ContactsEnvelope, Invoice,
    InvoicesEnvelope, LineItem, Organisation, OrganisationsEnvelope, Phone, XeroErrorBody,
};
