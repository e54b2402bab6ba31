//! Token records and identity endpoint responses.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// A credential obtained from the Xero identity endpoint.
///
/// Serialized in the token file with `expires_at` as Unix milliseconds.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl TokenRecord {
    /// A token that never expires (used for static bearer tokens).
    #[must_use]
    pub fn non_expiring(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: DateTime::<Utc>::MAX_UTC,
            token_type: Some("Bearer".to_string()),
            scope: None,
        }
    }

    /// True if the token is still usable at `now` with `margin` to spare.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        let margin = TimeDelta::from_std(margin).unwrap_or(TimeDelta::MAX);
        self.expires_at.checked_sub_signed(margin).is_some_and(|deadline| now < deadline)
    }

    /// True once the real expiry has passed.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Seconds until expiry (negative once expired).
    #[must_use]
    pub fn seconds_remaining(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds()
    }
}

impl std::fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRecord")
            .field("access_token_len", &self.access_token.len())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Token endpoint response body.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

const fn default_expires_in() -> i64 {
    1800
}

impl TokenResponse {
    /// Convert into a record whose expiry is relative to `issued_at`.
    #[must_use]
    pub fn into_record(self, issued_at: DateTime<Utc>) -> TokenRecord {
        let lifetime = TimeDelta::try_seconds(self.expires_in.max(0)).unwrap_or(TimeDelta::zero());
        TokenRecord {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: issued_at.checked_add_signed(lifetime).unwrap_or(DateTime::<Utc>::MAX_UTC),
            token_type: self.token_type,
            scope: self.scope,
        }
    }
}

/// Token endpoint error body (`{"error": "...", "error_description": "..."}`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenErrorResponse {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl TokenErrorResponse {
    /// Most specific message available, falling back to the raw body.
    #[must_use]
    pub fn describe(body: &str) -> String {
        let parsed: Self = serde_json::from_str(body).unwrap_or_default();
        match (parsed.error, parsed.error_description) {
            (Some(error), Some(description)) => format!("{error}: {description}"),
            (Some(error), None) => error,
            (None, Some(description)) => description,
            (None, None) if body.trim().is_empty() => "empty response body".to_string(),
            (None, None) => body.trim().to_string(),
        }
    }
}
