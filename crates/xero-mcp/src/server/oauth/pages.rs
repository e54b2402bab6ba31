//! HTML pages served by the authorization endpoint.

use super::handlers::AuthorizeParams;

/// Escape text for inclusion in HTML element content or attribute values.
pub(crate) fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

const STYLE: &str = r"
body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; background: #f5f5f5; display: flex; justify-content: center; align-items: center; min-height: 100vh; margin: 0; }
.card { background: #fff; border-radius: 8px; box-shadow: 0 2px 8px rgba(0,0,0,0.1); padding: 32px; max-width: 460px; }
h1 { color: #13b5ea; font-size: 22px; margin-top: 0; }
.error h1 { color: #c00; }
p, li { color: #555; line-height: 1.5; }
.buttons { display: flex; gap: 12px; margin-top: 24px; }
button { flex: 1; padding: 10px; border-radius: 4px; font-size: 15px; cursor: pointer; border: 1px solid #13b5ea; }
.approve { background: #13b5ea; color: #fff; }
.deny { background: #fff; color: #13b5ea; }
code { word-break: break-all; background: #f0f0f0; padding: 4px; display: block; }
";

fn layout(title: &str, class: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title} - Xero MCP</title>
<style>{STYLE}</style>
</head>
<body>
<div class="card {class}">
{body}
</div>
</body>
</html>"#,
        title = html_escape(title),
    )
}

/// Page shown for a malformed authorization request.
#[must_use]
pub fn error_page(title: &str, message: &str) -> String {
    layout(
        title,
        "error",
        &format!("<h1>{}</h1>\n<p>{}</p>", html_escape(title), html_escape(message)),
    )
}

fn hidden(name: &str, value: Option<&str>) -> String {
    format!(
        r#"<input type="hidden" name="{name}" value="{}">"#,
        html_escape(value.unwrap_or_default())
    )
}

/// Consent form posting back to `/authorize`.
#[must_use]
pub fn consent_page(params: &AuthorizeParams, client_name: &str) -> String {
    let fields = [
        hidden("client_id", params.client_id.as_deref()),
        hidden("redirect_uri", params.redirect_uri.as_deref()),
        hidden("state", params.state.as_deref()),
        hidden("scope", params.scope.as_deref()),
        hidden("code_challenge", params.code_challenge.as_deref()),
        hidden("code_challenge_method", params.code_challenge_method.as_deref()),
    ]
    .join("\n");

    let body = format!(
        r#"<h1>Authorize access to Xero</h1>
<p><strong>{client}</strong> is requesting access to this Xero MCP server.</p>
<ul>
<li>Read contacts, invoices, accounts and organisation details</li>
<li>Create contacts</li>
</ul>
<form method="POST" action="/authorize">
{fields}
<div class="buttons">
<button type="submit" name="approved" value="true" class="approve">Approve</button>
<button type="submit" name="approved" value="false" class="deny">Deny</button>
</div>
</form>"#,
        client = html_escape(client_name),
    );

    layout("Authorize", "", &body)
}

/// Shown when an approved request carried no redirect URI.
#[must_use]
pub fn code_page(code: &str) -> String {
    layout(
        "Authorization code",
        "",
        &format!(
            "<h1>Authorization code</h1>\n<p>Exchange this code at the token endpoint:</p>\n<code>{}</code>",
            html_escape(code)
        ),
    )
}
