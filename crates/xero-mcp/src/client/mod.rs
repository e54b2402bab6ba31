//! Xero accounting API client.
//!
//! Provides async HTTP client with:
//! - Token and tenant from the [`Authenticator`] before every request
//! - Retry middleware with exponential backoff on reads; writes are sent once
//! - Rate limiting (Xero allows 60 calls per minute per tenant)
//! - Short-lived GET cache, cleared on writes

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use moka::future::Cache;
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};

use crate::auth::{AccessGrant, Authenticator};
use crate::config::{Config, api};
use crate::error::{ClientError, ClientResult};
use crate::models::{
    Account, AccountsEnvelope, Contact, ContactsEnvelope, Invoice, InvoicesEnvelope,
    ListInvoicesInput, Organisation, OrganisationsEnvelope, XeroErrorBody,
};

const TENANT_HEADER: &str = "xero-tenant-id";

/// Xero accounting API client.
#[derive(Clone)]
pub struct XeroClient {
    /// HTTP client with retry middleware, for GETs.
    client: ClientWithMiddleware,

    /// Same connection pool without retries. PUT creates are not idempotent.
    write_client: ClientWithMiddleware,

    /// Produces the bearer token and tenant for each call.
    auth: Arc<Authenticator>,

    limiter: Arc<DefaultDirectRateLimiter>,

    /// Response cache keyed by tenant, URL and query.
    cache: Cache<String, serde_json::Value>,
    cache_enabled: bool,

    /// Accounting API base URL.
    base_url: String,
}

impl XeroClient {
    /// Create a new client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails.
    pub fn new(config: &Config, auth: Arc<Authenticator>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(api::MAX_KEEPALIVE)
            .pool_idle_timeout(api::KEEPALIVE_EXPIRY)
            .user_agent(concat!("xero-mcp-server-", env!("CARGO_PKG_VERSION")))
            .gzip(true)
            .build()?;

        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(Duration::from_secs(1), Duration::from_secs(30))
            .build_with_max_retries(config.max_retries);

        let write_client = ClientBuilder::new(client.clone()).build();
        let client = ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        let per_minute = NonZeroU32::new(config.rate_limit_per_minute).unwrap_or(NonZeroU32::MIN);
        let limiter = Arc::new(RateLimiter::direct(Quota::per_minute(per_minute)));

        let cache = Cache::builder()
            .max_capacity(config.cache_max_size)
            .time_to_live(config.cache_ttl)
            .build();

        Ok(Self {
            client,
            write_client,
            auth,
            limiter,
            cache,
            cache_enabled: config.cache_max_size > 0 && !config.cache_ttl.is_zero(),
            base_url: config.accounting_api_url.trim_end_matches('/').to_string(),
        })
    }

    #[must_use]
    pub fn authenticator(&self) -> &Arc<Authenticator> {
        &self.auth
    }

    /// List contacts.
    ///
    /// # Errors
    ///
    /// Returns error on authentication or API failure.
    pub async fn get_contacts(
        &self,
        page: Option<u32>,
        search_term: Option<&str>,
    ) -> ClientResult<Vec<Contact>> {
        let mut params = vec![("page".to_string(), page.unwrap_or(1).to_string())];
        if let Some(term) = search_term.filter(|t| !t.trim().is_empty()) {
            params.push(("searchTerm".to_string(), term.trim().to_string()));
        }

        let envelope: ContactsEnvelope = self.get("Contacts", &params).await?;
        Ok(envelope.contacts)
    }

    /// Create a single contact and return it as stored by Xero.
    ///
    /// # Errors
    ///
    /// Returns error on authentication or API failure, or if Xero returns no contact.
    pub async fn create_contact(&self, contact: &Contact) -> ClientResult<Contact> {
        let body = ContactsEnvelope { contacts: vec![contact.clone()] };
        let params = vec![("summarizeErrors".to_string(), "true".to_string())];

        let envelope: ContactsEnvelope = self.put("Contacts", &params, &body).await?;
        envelope.contacts.into_iter().next().ok_or_else(|| ClientError::UnexpectedStatus {
            status: 200,
            message: "Contact creation failed.".to_string(),
        })
    }

    /// List invoices, ten per page.
    ///
    /// # Errors
    ///
    /// Returns error on authentication or API failure.
    pub async fn get_invoices(&self, filter: &ListInvoicesInput) -> ClientResult<Vec<Invoice>> {
        let mut params = vec![
            ("page".to_string(), filter.page.unwrap_or(1).to_string()),
            ("pageSize".to_string(), "10".to_string()),
        ];

        let lists = [
            ("ContactIDs", &filter.contact_ids),
            ("InvoiceNumbers", &filter.invoice_numbers),
            ("Statuses", &filter.statuses),
        ];
        for (key, values) in lists {
            if let Some(values) = values.as_ref().filter(|v| !v.is_empty()) {
                params.push((key.to_string(), values.join(",")));
            }
        }
        if let Some(where_filter) = &filter.where_filter {
            params.push(("where".to_string(), where_filter.clone()));
        }
        params.push((
            "order".to_string(),
            filter.order.clone().unwrap_or_else(|| "UpdatedDateUTC DESC".to_string()),
        ));

        let envelope: InvoicesEnvelope = self.get("Invoices", &params).await?;
        Ok(envelope.invoices)
    }

    /// List the chart of accounts.
    ///
    /// # Errors
    ///
    /// Returns error on authentication or API failure.
    pub async fn get_accounts(&self, where_filter: Option<&str>) -> ClientResult<Vec<Account>> {
        let params: Vec<(String, String)> = where_filter
            .map(|w| vec![("where".to_string(), w.to_string())])
            .unwrap_or_default();

        let envelope: AccountsEnvelope = self.get("Accounts", &params).await?;
        Ok(envelope.accounts)
    }

    /// Fetch the connected organisation.
    ///
    /// # Errors
    ///
    /// Returns error on authentication or API failure.
    pub async fn get_organisation(&self) -> ClientResult<Organisation> {
        let grant = self.auth.ensure_valid_token().await?;
        self.organisation_for(&grant).await
    }

    /// The organisation short code, fetched once per tenant binding.
    ///
    /// # Errors
    ///
    /// Returns error on authentication or API failure, or if the organisation has no
    /// short code.
    pub async fn organisation_short_code(&self) -> ClientResult<String> {
        let grant = self.auth.ensure_valid_token().await?;
        let short_code = grant
            .tenant
            .short_code_or_try_init(|| async {
                let organisation = self.organisation_for(&grant).await?;
                organisation
                    .short_code
                    .filter(|sc| !sc.is_empty())
                    .ok_or_else(|| ClientError::not_found("Failed to retrieve organisation short code"))
            })
            .await?;
        Ok(short_code.to_string())
    }

    async fn organisation_for(&self, grant: &AccessGrant) -> ClientResult<Organisation> {
        let envelope: OrganisationsEnvelope = self.get_with(grant, "Organisation", &[]).await?;
        envelope
            .organisations
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::not_found("Organisation"))
    }

    /// Make a GET request.
    async fn get<T>(&self, path: &str, params: &[(String, String)]) -> ClientResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let grant = self.auth.ensure_valid_token().await?;
        self.get_with(&grant, path, params).await
    }

    async fn get_with<T>(
        &self,
        grant: &AccessGrant,
        path: &str,
        params: &[(String, String)],
    ) -> ClientResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, path);

        let cache_key = cache_key("GET", &grant.tenant.tenant_id, &url, params);
        if self.cache_enabled {
            if let Some(cached) = self.cache.get(&cache_key).await {
                tracing::debug!(%url, "Cache hit");
                return serde_json::from_value(cached).map_err(ClientError::from);
            }
        }

        self.limiter.until_ready().await;

        let response = self
            .client
            .get(&url)
            .bearer_auth(&grant.access_token)
            .header(TENANT_HEADER, &grant.tenant.tenant_id)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(params)
            .send()
            .await?;

        let response = self.handle_response(response).await?;
        let value: serde_json::Value = response.json().await?;

        if self.cache_enabled {
            self.cache.insert(cache_key, value.clone()).await;
        }

        serde_json::from_value(value).map_err(ClientError::from)
    }

    /// Make a PUT request (Xero's create verb).
    async fn put<B, T>(&self, path: &str, params: &[(String, String)], body: &B) -> ClientResult<T>
    where
        B: serde::Serialize,
        T: serde::de::DeserializeOwned,
    {
        let grant = self.auth.ensure_valid_token().await?;
        let url = format!("{}/{}", self.base_url, path);
        let body_str = serde_json::to_string(body)?;

        self.limiter.until_ready().await;

        let response = self
            .write_client
            .put(&url)
            .bearer_auth(&grant.access_token)
            .header(TENANT_HEADER, &grant.tenant.tenant_id)
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .query(params)
            .body(body_str)
            .send()
            .await?;

        let response = self.handle_response(response).await?;
        let value: serde_json::Value = response.json().await?;

        if self.cache_enabled {
            self.cache.invalidate_all();
        }

        serde_json::from_value(value).map_err(ClientError::from)
    }

    /// Handle API response status codes.
    async fn handle_response(
        &self,
        response: reqwest::Response,
    ) -> ClientResult<reqwest::Response> {
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        tracing::warn!(status = status.as_u16(), url = %response.url().path(), "Xero API error");

        match status.as_u16() {
            429 => {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60);

                Err(ClientError::rate_limited(retry_after))
            }
            400 => {
                let body = XeroErrorBody::parse(&response.text().await.unwrap_or_default());
                let message = body
                    .validation_message()
                    .or_else(|| body.detail().map(str::to_string))
                    .unwrap_or_default();
                Err(ClientError::bad_request(message))
            }
            401 => {
                self.auth.invalidate().await;
                let body = XeroErrorBody::parse(&response.text().await.unwrap_or_default());
                Err(ClientError::Unauthorized { message: body.detail().unwrap_or("").to_string() })
            }
            403 => {
                let body = XeroErrorBody::parse(&response.text().await.unwrap_or_default());
                Err(ClientError::Forbidden { message: body.detail().unwrap_or("").to_string() })
            }
            404 => Err(ClientError::not_found(response.url().path().to_string())),
            500..=599 => {
                let body = XeroErrorBody::parse(&response.text().await.unwrap_or_default());
                Err(ClientError::server(status.as_u16(), body.detail().unwrap_or("")))
            }
            _ => {
                let body = XeroErrorBody::parse(&response.text().await.unwrap_or_default());
                Err(ClientError::UnexpectedStatus {
                    status: status.as_u16(),
                    message: body.detail().unwrap_or("").to_string(),
                })
            }
        }
    }
}

/// Generate cache key.
fn cache_key(method: &str, tenant_id: &str, url: &str, params: &[(String, String)]) -> String {
    use md5::{Digest, Md5};

    let mut hasher = Md5::new();
    hasher.update(method.as_bytes());
    hasher.update(b"|");
    hasher.update(tenant_id.as_bytes());
    hasher.update(b"|");
    hasher.update(url.as_bytes());
    hasher.update(b"|");

    for (k, v) in params {
        hasher.update(k.as_bytes());
        hasher.update(b"=");
        hasher.update(v.as_bytes());
        hasher.update(b"&");
    }

    format!("{:x}", hasher.finalize())
}

impl std::fmt::Debug for XeroClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XeroClient")
            .field("base_url", &self.base_url)
            .field("cache_enabled", &self.cache_enabled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_separates_tenants() {
        let params = vec![("page".to_string(), "1".to_string())];
        let a = cache_key("GET", "tenant-a", "https://api/Contacts", &params);
        let b = cache_key("GET", "tenant-b", "https://api/Contacts", &params);
        assert_ne!(a, b);
        assert_eq!(a, cache_key("GET", "tenant-a", "https://api/Contacts", &params));
    }
}
