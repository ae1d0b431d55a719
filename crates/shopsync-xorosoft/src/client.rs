//! HTTP client for the Xorosoft inventory REST API.
//!
//! Wraps `reqwest` with Basic auth, request pacing, retry and a TTL cache for
//! single-item lookups. Every response is checked for the `"Result"` flag of
//! the JSON envelope and API-level failures surface as
//! [`XorosoftError::ApiError`].

use std::time::Duration;

use moka::future::Cache;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use shopsync_core::AppConfig;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::XorosoftError;
use crate::retry::with_retry;
use crate::types::{ApiEnvelope, ProductFilter, ProductPage, XorosoftProduct};

pub const DEFAULT_BASE_URL: &str = "https://res.xorosoft.io/api/xerp";

/// Characters left readable in an item-number path segment.
const ITEM_NUMBER: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_');

const CACHE_CAPACITY: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct XorosoftSettings {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Minimum spacing between two outgoing requests.
    pub min_interval_ms: u64,
    pub cache_ttl_secs: u64,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
}

impl Default for XorosoftSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            timeout_secs: 30,
            min_interval_ms: 500,
            cache_ttl_secs: 300,
            max_attempts: 3,
            backoff_base_ms: 1000,
        }
    }
}

impl XorosoftSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            base_url: config.xorosoft_base_url.clone(),
            timeout_secs: config.request_timeout_secs,
            min_interval_ms: config.xorosoft_min_interval_ms,
            cache_ttl_secs: config.xorosoft_cache_ttl_secs,
            max_attempts: config.max_attempts,
            backoff_base_ms: config.retry_backoff_base_ms,
        }
    }
}

/// Client for the Xorosoft REST API.
///
/// Use [`XorosoftClient::new`] for the configured base URL or
/// [`XorosoftClient::with_base_url`] to point at a mock server in tests.
pub struct XorosoftClient {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
    cache: Cache<String, Option<XorosoftProduct>>,
    max_attempts: u32,
    backoff_base_ms: u64,
}

impl XorosoftClient {
    /// Creates a client for `settings.base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`XorosoftError::InvalidBaseUrl`] if the base URL is not an
    /// absolute http(s) URL, or [`XorosoftError::Http`] if the underlying
    /// `reqwest::Client` cannot be constructed.
    pub fn new(
        api_key: &str,
        api_secret: &str,
        settings: &XorosoftSettings,
    ) -> Result<Self, XorosoftError> {
        Self::with_base_url(&settings.base_url, api_key, api_secret, settings)
    }

    /// Creates a client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Same as [`XorosoftClient::new`].
    pub fn with_base_url(
        base_url: &str,
        api_key: &str,
        api_secret: &str,
        settings: &XorosoftSettings,
    ) -> Result<Self, XorosoftError> {
        let trimmed = base_url.trim().trim_end_matches('/');
        if reqwest::Url::parse(trimmed).is_err()
            || !(trimmed.starts_with("http://") || trimmed.starts_with("https://"))
        {
            return Err(XorosoftError::InvalidBaseUrl(base_url.to_owned()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("shopsync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let cache = Cache::builder()
            .max_capacity(CACHE_CAPACITY)
            .time_to_live(Duration::from_secs(settings.cache_ttl_secs))
            .build();

        Ok(Self {
            client,
            base_url: format!("{trimmed}/"),
            api_key: api_key.to_owned(),
            api_secret: api_secret.to_owned(),
            min_interval: Duration::from_millis(settings.min_interval_ms),
            last_request: Mutex::new(None),
            cache,
            max_attempts: settings.max_attempts.max(1),
            backoff_base_ms: settings.backoff_base_ms,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Looks up one product by item number.
    ///
    /// Both hits and misses are cached for the configured TTL. A 404 or an
    /// empty `Data` list is a miss.
    ///
    /// # Errors
    ///
    /// - [`XorosoftError::ApiError`] if the envelope reports `"Result": false`.
    /// - [`XorosoftError::RateLimited`] / [`XorosoftError::ServerError`] /
    ///   [`XorosoftError::Http`] once retries are exhausted.
    /// - [`XorosoftError::Deserialize`] if the body is not a product envelope.
    pub async fn get_product(
        &self,
        item_number: &str,
    ) -> Result<Option<XorosoftProduct>, XorosoftError> {
        let key = item_number.trim();
        if key.is_empty() {
            return Ok(None);
        }
        if let Some(cached) = self.cache.get(key).await {
            tracing::debug!(item_number = key, hit = cached.is_some(), "xorosoft cache hit");
            return Ok(cached);
        }

        let path = item_path(key);
        let product = match self.request(Method::GET, &path, &[], None).await? {
            None => None,
            Some(body) => {
                let envelope = parse_envelope::<XorosoftProduct>(
                    body,
                    &format!("product/{key}"),
                )?;
                envelope.data.into_iter().next()
            }
        };

        self.cache.insert(key.to_owned(), product.clone()).await;
        Ok(product)
    }

    /// Searches products with `POST product/getfiltered`. Not cached.
    ///
    /// # Errors
    ///
    /// Same as [`XorosoftClient::get_product`]; a 404 yields an empty list.
    pub async fn get_filtered(
        &self,
        filter: &ProductFilter,
    ) -> Result<Vec<XorosoftProduct>, XorosoftError> {
        let body = serde_json::to_value(filter).map_err(|e| XorosoftError::Deserialize {
            context: "product filter".to_owned(),
            source: e,
        })?;
        match self
            .request(Method::POST, "product/getfiltered", &[], Some(&body))
            .await?
        {
            None => Ok(Vec::new()),
            Some(body) => Ok(parse_envelope(body, "product/getfiltered")?.data),
        }
    }

    /// Fetches one page of the full product listing.
    ///
    /// # Errors
    ///
    /// Same as [`XorosoftClient::get_product`]; a 404 yields an empty page.
    pub async fn get_products_page(
        &self,
        page: u32,
        per_page: u32,
    ) -> Result<ProductPage, XorosoftError> {
        let query = [("page", page.to_string()), ("per_page", per_page.to_string())];
        let Some(body) = self
            .request(Method::GET, "product/getproduct", &query, None)
            .await?
        else {
            return Ok(ProductPage {
                page,
                products: Vec::new(),
                total_pages: Some(0),
            });
        };

        let envelope =
            parse_envelope::<XorosoftProduct>(body, &format!("product/getproduct(page={page})"))?;
        Ok(ProductPage {
            page,
            products: envelope.data,
            total_pages: envelope.total_pages,
        })
    }

    /// Sends a request with retry. `Ok(None)` means HTTP 404.
    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<Option<serde_json::Value>, XorosoftError> {
        let url = format!("{}{path}", self.base_url);
        with_retry(self.max_attempts, self.backoff_base_ms, || {
            self.send_once(method.clone(), &url, query, body)
        })
        .await
    }

    async fn send_once(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<Option<serde_json::Value>, XorosoftError> {
        self.pace().await;

        let mut builder = self
            .client
            .request(method, url)
            .basic_auth(&self.api_key, Some(&self.api_secret));
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(XorosoftError::RateLimited);
        }
        if status.is_server_error() {
            return Err(XorosoftError::ServerError {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(XorosoftError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        let value = serde_json::from_str(&text).map_err(|e| XorosoftError::Deserialize {
            context: url.to_owned(),
            source: e,
        })?;
        Ok(Some(value))
    }

    /// Holds the caller until `min_interval` has passed since the previous
    /// request from this client.
    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

fn item_path(item_number: &str) -> String {
    format!("product/{}", utf8_percent_encode(item_number, ITEM_NUMBER))
}

fn parse_envelope<T: DeserializeOwned>(
    body: serde_json::Value,
    context: &str,
) -> Result<ApiEnvelope<T>, XorosoftError> {
    let envelope: ApiEnvelope<T> =
        serde_json::from_value(body).map_err(|e| XorosoftError::Deserialize {
            context: context.to_owned(),
            source: e,
        })?;

    if !envelope.result {
        return Err(XorosoftError::ApiError(
            envelope
                .message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| format!("{context} returned Result=false")),
        ));
    }
    Ok(envelope)
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
