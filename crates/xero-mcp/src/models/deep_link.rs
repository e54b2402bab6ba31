//! Links into the Xero web app.

use serde::{Deserialize, Serialize};

const ORG_LOGIN: &str = "https://go.xero.com/organisationlogin/default.aspx";

/// Kinds of Xero records that can be linked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeepLinkKind {
    Contact,
    CreditNote,
    Invoice,
    ManualJournal,
    Quote,
    Payment,
    Bill,
}

impl DeepLinkKind {
    pub const ALL: [Self; 7] = [
        Self::Contact,
        Self::CreditNote,
        Self::Invoice,
        Self::ManualJournal,
        Self::Quote,
        Self::Payment,
        Self::Bill,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Contact => "CONTACT",
            Self::CreditNote => "CREDIT_NOTE",
            Self::Invoice => "INVOICE",
            Self::ManualJournal => "MANUAL_JOURNAL",
            Self::Quote => "QUOTE",
            Self::Payment => "PAYMENT",
            Self::Bill => "BILL",
        }
    }

    /// Manual journals link directly; everything else goes through the organisation login
    /// redirect and needs the short code.
    #[must_use]
    pub const fn requires_short_code(self) -> bool {
        !matches!(self, Self::ManualJournal)
    }

    fn redirect_path(self, item_id: &str) -> String {
        match self {
            Self::Contact => format!("/Contacts/View/{item_id}"),
            Self::CreditNote => {
                format!("/AccountsReceivable/ViewCreditNote.aspx?creditNoteID={item_id}")
            }
            Self::Invoice => format!("/AccountsReceivable/View.aspx?InvoiceID={item_id}"),
            Self::Bill => format!("/AccountsPayable/View.aspx?InvoiceID={item_id}"),
            Self::Quote => format!("/app/quotes/view/{item_id}"),
            Self::Payment => format!("/Bank/ViewTransaction.aspx?bankTransactionID={item_id}"),
            Self::ManualJournal => format!("/Journal/View.aspx?invoiceID={item_id}"),
        }
    }
}

/// Build the web link for `item_id`.
///
/// `short_code` is ignored for kinds that do not need it.
#[must_use]
pub fn deep_link(kind: DeepLinkKind, short_code: &str, item_id: &str) -> String {
    let path = kind.redirect_path(item_id);
    if kind.requires_short_code() {
        let mut url = String::from(ORG_LOGIN);
        url.push_str("?shortcode=");
        url.push_str(short_code);
        url.push_str("&redirecturl=");
        url.push_str(&path);
        url
    } else {
        format!("https://go.xero.com{path}")
    }
}
