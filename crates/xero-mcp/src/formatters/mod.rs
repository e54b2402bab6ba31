//! Plain-text formatting of Xero entities for tool responses.

use crate::models::{Account, Contact, Invoice, LineItem, Organisation};

/// Join the present lines of a record.
fn lines(parts: Vec<Option<String>>) -> String {
    parts.into_iter().flatten().collect::<Vec<_>>().join("\n")
}

fn opt<T: std::fmt::Display>(label: &str, value: Option<T>) -> Option<String> {
    value.map(|v| format!("{label}: {v}"))
}

/// Format a list of contacts.
#[must_use]
pub fn format_contacts(contacts: &[Contact]) -> String {
    if contacts.is_empty() {
        return "No contacts found.".to_string();
    }

    let mut output = format!("Found {} contacts:\n\n", contacts.len());
    let blocks: Vec<String> = contacts.iter().map(format_contact).collect();
    output.push_str(&blocks.join("\n\n"));
    output
}

/// Format a single contact.
#[must_use]
pub fn format_contact(contact: &Contact) -> String {
    let roles: Vec<&str> = [
        contact.is_customer.unwrap_or(false).then_some("Customer"),
        contact.is_supplier.unwrap_or(false).then_some("Supplier"),
    ]
    .into_iter()
    .flatten()
    .collect();

    let phones: Vec<String> = contact
        .phones
        .iter()
        .filter_map(|p| {
            let number = p.phone_number.as_deref().filter(|n| !n.is_empty())?;
            Some(format!("{} ({})", number, p.phone_type.as_deref().unwrap_or("Unknown type")))
        })
        .collect();

    lines(vec![
        Some(format!("Contact: {}", contact.name_or_default())),
        opt("ID", contact.contact_id.as_deref()),
        opt("Email", contact.email_address.as_deref().filter(|e| !e.is_empty())),
        (!phones.is_empty()).then(|| format!("Phone: {}", phones.join(", "))),
        opt("Status", contact.contact_status.as_deref()),
        (!roles.is_empty()).then(|| format!("Type: {}", roles.join(", "))),
    ])
}

/// Format a list of invoices. Line items are included when `with_line_items` is set.
#[must_use]
pub fn format_invoices(invoices: &[Invoice], with_line_items: bool) -> String {
    if invoices.is_empty() {
        return "No invoices found.".to_string();
    }

    let mut output = format!("Found {} invoices:\n\n", invoices.len());
    let blocks: Vec<String> =
        invoices.iter().map(|invoice| format_invoice(invoice, with_line_items)).collect();
    output.push_str(&blocks.join("\n\n"));
    output
}

#[must_use]
pub fn format_invoice(invoice: &Invoice, with_line_items: bool) -> String {
    let contact = invoice.contact.as_ref().map(|c| {
        format!(
            "{} ({})",
            c.name.as_deref().unwrap_or("Unnamed"),
            c.contact_id.as_deref().unwrap_or("no ID")
        )
    });

    let mut out = lines(vec![
        opt("Invoice ID", invoice.invoice_id.as_deref()),
        opt("Invoice", invoice.invoice_number.as_deref()),
        opt("Reference", invoice.reference.as_deref().filter(|r| !r.is_empty())),
        Some(format!("Type: {}", invoice.invoice_type.as_deref().unwrap_or("Unknown"))),
        Some(format!("Status: {}", invoice.status.as_deref().unwrap_or("Unknown"))),
        opt("Contact", contact),
        opt("Date", invoice.date_string.as_deref()),
        opt("Due Date", invoice.due_date_string.as_deref()),
        opt("Line Amount Types", invoice.line_amount_types.as_deref()),
        opt("Sub Total", invoice.sub_total),
        opt("Total Tax", invoice.total_tax),
        Some(format!("Total: {}", invoice.total.unwrap_or(0.0))),
        opt("Currency", invoice.currency_code.as_deref()),
        opt("Amount Due", invoice.amount_due.filter(|a| *a != 0.0)),
        opt("Amount Paid", invoice.amount_paid.filter(|a| *a != 0.0)),
        opt("Last Updated", invoice.updated_date_utc.as_deref()),
    ]);

    if with_line_items && !invoice.line_items.is_empty() {
        out.push_str("\nLine Items:");
        for item in &invoice.line_items {
            out.push_str("\n  - ");
            out.push_str(&format_line_item(item));
        }
    }

    out
}

fn format_line_item(item: &LineItem) -> String {
    let mut parts = vec![item.description.clone().unwrap_or_else(|| "No description".into())];
    if let (Some(qty), Some(unit)) = (item.quantity, item.unit_amount) {
        parts.push(format!("{qty} x {unit}"));
    }
    if let Some(code) = &item.account_code {
        parts.push(format!("account {code}"));
    }
    if let Some(amount) = item.line_amount {
        parts.push(format!("= {amount}"));
    }
    parts.join(" ")
}

/// Format the chart of accounts.
#[must_use]
pub fn format_accounts(accounts: &[Account]) -> String {
    if accounts.is_empty() {
        return "No accounts found.".to_string();
    }

    let mut output = format!("Found {} accounts:\n\n", accounts.len());
    let blocks: Vec<String> = accounts
        .iter()
        .map(|account| {
            lines(vec![
                Some(format!("Account: {}", account.name.as_deref().unwrap_or("Unnamed"))),
                opt("Code", account.code.as_deref()),
                opt("ID", account.account_id.as_deref()),
                opt("Type", account.account_type.as_deref()),
                opt("Class", account.class.as_deref()),
                opt("Status", account.status.as_deref()),
                opt("Tax Type", account.tax_type.as_deref()),
                opt("Description", account.description.as_deref().filter(|d| !d.is_empty())),
                opt("Bank Account Number", account.bank_account_number.as_deref()),
            ])
        })
        .collect();
    output.push_str(&blocks.join("\n\n"));
    output
}

/// Format organisation details.
#[must_use]
pub fn format_organisation(organisation: &Organisation) -> String {
    fn or<'a>(value: Option<&'a str>, fallback: &'a str) -> &'a str {
        value.filter(|v| !v.is_empty()).unwrap_or(fallback)
    }

    let addresses = if organisation.addresses.is_empty() {
        "No addresses available.".to_string()
    } else {
        organisation
            .addresses
            .iter()
            .enumerate()
            .map(|(i, address)| {
                format!(
                    "Address {} ({}): {}",
                    i + 1,
                    address.address_type.as_deref().unwrap_or(""),
                    address.one_line()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let phones = if organisation.phones.is_empty() {
        "No phone numbers available.".to_string()
    } else {
        organisation
            .phones
            .iter()
            .enumerate()
            .map(|(i, phone)| {
                format!(
                    "Phone {}: {} - {}",
                    i + 1,
                    or(phone.phone_type.as_deref(), "Unknown type"),
                    or(phone.phone_number.as_deref(), "No number")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    [
        "Organisation Details:".to_string(),
        format!("Name: {}", or(organisation.name.as_deref(), "Unnamed")),
        format!("Legal Name: {}", or(organisation.legal_name.as_deref(), "Unnamed")),
        format!("Short Code: {}", or(organisation.short_code.as_deref(), "No short code")),
        format!("Organisation ID: {}", or(organisation.organisation_id.as_deref(), "No ID")),
        format!("Version: {}", or(organisation.version.as_deref(), "Unknown version")),
        format!(
            "Organisation Type: {}",
            or(organisation.organisation_type.as_deref(), "Unknown type")
        ),
        format!("Base Currency: {}", or(organisation.base_currency.as_deref(), "Unknown currency")),
        format!("Country Code: {}", or(organisation.country_code.as_deref(), "Unknown country")),
        format!("Timezone: {}", or(organisation.timezone.as_deref(), "Unknown timezone")),
        format!("Addresses:\n{addresses}"),
        format!("Phone Numbers:\n{phones}"),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContactRef, Phone};

    #[test]
    fn test_empty_lists() {
        assert_eq!(format_contacts(&[]), "No contacts found.");
        assert_eq!(format_invoices(&[], false), "No invoices found.");
        assert_eq!(format_accounts(&[]), "No accounts found.");
    }

    #[test]
    fn test_contact_skips_missing_fields() {
        let contact = Contact {
            contact_id: Some("c-1".into()),
            name: Some("Acme".into()),
            is_customer: Some(true),
            phones: vec![
                Phone { phone_type: Some("MOBILE".into()), phone_number: Some("021".into()) },
                Phone { phone_type: Some("FAX".into()), phone_number: Some(String::new()) },
            ],
            ..Contact::default()
        };
        let text = format_contact(&contact);
        assert_eq!(text, "Contact: Acme\nID: c-1\nPhone: 021 (MOBILE)\nType: Customer");
    }

    #[test]
    fn test_invoice_line_items_only_when_requested() {
        let invoice = Invoice {
            invoice_id: Some("i-1".into()),
            invoice_type: Some("ACCREC".into()),
            contact: Some(ContactRef { contact_id: Some("c-1".into()), name: Some("Acme".into()) }),
            total: Some(115.0),
            line_items: vec![LineItem {
                description: Some("Consulting".into()),
                quantity: Some(1.0),
                unit_amount: Some(100.0),
                ..LineItem::default()
            }],
            ..Invoice::default()
        };

        let brief = format_invoice(&invoice, false);
        assert!(brief.contains("Contact: Acme (c-1)"));
        assert!(brief.contains("Status: Unknown"));
        assert!(!brief.contains("Consulting"));

        let full = format_invoice(&invoice, true);
        assert!(full.contains("Line Items:\n  - Consulting 1 x 100"));
    }

    #[test]
    fn test_organisation_fallbacks() {
        let text = format_organisation(&Organisation {
            name: Some("Demo Company (NZ)".into()),
            short_code: Some("!abc12".into()),
            ..Organisation::default()
        });
        assert!(text.contains("Name: Demo Company (NZ)"));
        assert!(text.contains("Short Code: !abc12"));
        assert!(text.contains("Legal Name: Unnamed"));
        assert!(text.contains("No addresses available."));
    }
}
