//! HTTP client for the Shopify Admin GraphQL API.

mod endpoint;
mod pagination;
mod push;

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use shopsync_core::{AppConfig, RateLimitMode, ShopifyCredentials};
use tokio::sync::Mutex;

use crate::error::ShopifyError;
use crate::graphql::{join_messages, GraphQLRequest, GraphQLResponse};
use crate::queries::SHOP_NAME_QUERY;
use crate::rate_limit::{RateLimiter, DEFAULT_BUCKET_SIZE, DEFAULT_LEAK_RATE};
use crate::retry::retry_with_backoff;

pub use endpoint::{graphql_endpoint, shop_name};
pub use pagination::{extract_connection, MAX_PAGES};
pub use push::{product_update_input, variant_update_input};

pub const DEFAULT_API_VERSION: &str = "2024-10";
const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";

/// Transport, retry and pacing settings for [`ShopifyClient`].
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub api_version: String,
    pub timeout_secs: u64,
    /// Total attempts per request when retry is enabled.
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub rate_limit_mode: RateLimitMode,
    pub bucket_size: f64,
    pub leak_rate: f64,
    /// `first` argument for paginated queries.
    pub page_size: u32,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_version: DEFAULT_API_VERSION.to_owned(),
            timeout_secs: 30,
            max_attempts: 3,
            backoff_base_ms: 1000,
            rate_limit_mode: RateLimitMode::Safe,
            bucket_size: DEFAULT_BUCKET_SIZE,
            leak_rate: DEFAULT_LEAK_RATE,
            page_size: 50,
        }
    }
}

impl ClientSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            api_version: config.shopify_api_version.clone(),
            timeout_secs: config.request_timeout_secs,
            max_attempts: config.max_attempts,
            backoff_base_ms: config.retry_backoff_base_ms,
            rate_limit_mode: config.rate_limit_mode,
            bucket_size: config.rate_limit_bucket_size,
            leak_rate: config.rate_limit_leak_rate,
            page_size: config.page_size,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ShopData {
    shop: Option<ShopName>,
}

#[derive(Debug, Deserialize)]
struct ShopName {
    name: String,
}

/// Client for one shop's Admin GraphQL endpoint.
///
/// Every attempt first waits on the client's own [`RateLimiter`]. The limiter
/// sits behind an async mutex, so concurrent callers on one client share a
/// single call budget.
pub struct ShopifyClient {
    client: Client,
    endpoint: String,
    access_token: String,
    limiter: Mutex<RateLimiter>,
    max_attempts: u32,
    backoff_base_ms: u64,
    page_size: u32,
}

impl ShopifyClient {
    /// Creates a client for the shop named by `credentials.shop_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ShopifyError::InvalidShopUrl`] if the shop URL cannot be
    /// normalized, or [`ShopifyError::RequestFailed`] if the underlying
    /// `reqwest::Client` cannot be constructed.
    pub fn new(
        credentials: &ShopifyCredentials,
        settings: &ClientSettings,
    ) -> Result<Self, ShopifyError> {
        let endpoint = graphql_endpoint(&credentials.shop_url, &settings.api_version)?;
        Self::with_endpoint(&endpoint, &credentials.access_token, settings)
    }

    /// Creates a client that posts to an arbitrary URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`ShopifyError::RequestFailed`] if the underlying
    /// `reqwest::Client` cannot be constructed.
    pub fn with_endpoint(
        endpoint: &str,
        access_token: &str,
        settings: &ClientSettings,
    ) -> Result<Self, ShopifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("shopsync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.to_owned(),
            access_token: access_token.to_owned(),
            limiter: Mutex::new(RateLimiter::new(
                settings.rate_limit_mode,
                settings.bucket_size,
                settings.leak_rate,
            )),
            max_attempts: settings.max_attempts.max(1),
            backoff_base_ms: settings.backoff_base_ms,
            page_size: settings.page_size,
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[must_use]
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Snapshot of the limiter's `consecutive_rate_limits` counter.
    pub async fn consecutive_rate_limits(&self) -> u32 {
        self.limiter.lock().await.consecutive_rate_limits()
    }

    /// Executes one GraphQL document.
    ///
    /// With `retry` the request is attempted up to the configured number of
    /// times on 429, 5xx and transport failures; without it exactly once.
    /// A 2xx response whose body carries `errors` is not a failure here: the
    /// errors are logged and returned next to `data`.
    ///
    /// # Errors
    ///
    /// - [`ShopifyError::RateLimited`]: 429 on the last attempt.
    /// - [`ShopifyError::ServerError`]: 5xx on the last attempt.
    /// - [`ShopifyError::RequestFailed`]: transport failure on the last attempt.
    /// - [`ShopifyError::AuthenticationFailed`]: 401/403 (not retried).
    /// - [`ShopifyError::UnexpectedStatus`]: any other non-2xx (not retried).
    /// - [`ShopifyError::Deserialize`]: body is not a GraphQL envelope of `T`.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
        retry: bool,
    ) -> Result<GraphQLResponse<T>, ShopifyError> {
        let request = GraphQLRequest {
            query,
            variables: &variables,
        };
        let attempts = if retry { self.max_attempts } else { 1 };

        retry_with_backoff(attempts, self.backoff_base_ms, |attempt| {
            self.send_once::<T>(&request, attempt)
        })
        .await
    }

    async fn send_once<T: DeserializeOwned>(
        &self,
        request: &GraphQLRequest<'_>,
        attempt: u32,
    ) -> Result<GraphQLResponse<T>, ShopifyError> {
        self.limiter.lock().await.wait().await;

        let response = self
            .client
            .post(&self.endpoint)
            .header(ACCESS_TOKEN_HEADER, &self.access_token)
            .json(request)
            .send()
            .await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            self.limiter.lock().await.record_rate_limit();
            return Err(ShopifyError::RateLimited {
                attempts: attempt + 1,
            });
        }

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(ShopifyError::AuthenticationFailed(format!(
                "HTTP {} from {}",
                status.as_u16(),
                self.endpoint
            )));
        }

        if status.is_server_error() {
            return Err(ShopifyError::ServerError {
                status: status.as_u16(),
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ShopifyError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        self.limiter.lock().await.record_success();

        let body = response.text().await?;
        let parsed = serde_json::from_str::<GraphQLResponse<T>>(&body).map_err(|e| {
            ShopifyError::Deserialize {
                context: "GraphQL response".to_owned(),
                source: e,
            }
        })?;

        if parsed.has_errors() {
            tracing::warn!(
                errors = %join_messages(&parsed.errors),
                has_data = parsed.data.is_some(),
                "GraphQL response carried errors"
            );
        }

        Ok(parsed)
    }

    /// Verifies the access token by querying the shop name.
    ///
    /// Runs once, without retry.
    ///
    /// # Errors
    ///
    /// Returns [`ShopifyError::AuthenticationFailed`] if the response carries
    /// GraphQL errors or no shop, and propagates transport errors from
    /// [`Self::execute`].
    pub async fn test_auth(&self) -> Result<String, ShopifyError> {
        let response = self
            .execute::<ShopData>(SHOP_NAME_QUERY, serde_json::json!({}), false)
            .await?;

        if response.has_errors() {
            return Err(ShopifyError::AuthenticationFailed(join_messages(
                &response.errors,
            )));
        }

        response
            .data
            .and_then(|d| d.shop)
            .map(|shop| shop.name)
            .ok_or_else(|| ShopifyError::AuthenticationFailed("response has no shop".to_owned()))
    }
}

#[cfg(test)]
#[path = "../client_test.rs"]
mod tests;
