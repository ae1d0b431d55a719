use std::path::PathBuf;
use std::str::FromStr;

use crate::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Pacing profile for the Shopify rate limiter.
///
/// Each mode sets the base delay applied before every request; the limiter
/// scales it up as the call bucket fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateLimitMode {
    #[default]
    Safe,
    Turbo,
    Hyper,
    /// No base delay. Intended for local mock servers.
    Unthrottled,
}

impl RateLimitMode {
    /// Base delay in milliseconds before any usage or backoff scaling.
    #[must_use]
    pub fn base_delay_ms(self) -> u64 {
        match self {
            RateLimitMode::Safe => 500,
            RateLimitMode::Turbo => 100,
            RateLimitMode::Hyper => 50,
            RateLimitMode::Unthrottled => 0,
        }
    }
}

impl std::fmt::Display for RateLimitMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateLimitMode::Safe => write!(f, "safe"),
            RateLimitMode::Turbo => write!(f, "turbo"),
            RateLimitMode::Hyper => write!(f, "hyper"),
            RateLimitMode::Unthrottled => write!(f, "unthrottled"),
        }
    }
}

impl FromStr for RateLimitMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "safe" => Ok(RateLimitMode::Safe),
            "turbo" => Ok(RateLimitMode::Turbo),
            "hyper" => Ok(RateLimitMode::Hyper),
            "unthrottled" | "off" => Ok(RateLimitMode::Unthrottled),
            other => Err(ConfigError::InvalidEnvVar {
                var: "SHOPSYNC_RATE_LIMIT_MODE".to_string(),
                reason: format!("unknown mode '{other}'; expected safe, turbo, hyper or unthrottled"),
            }),
        }
    }
}

/// Shop URL and Admin API token, both guaranteed present.
#[derive(Clone)]
pub struct ShopifyCredentials {
    pub shop_url: String,
    pub access_token: String,
}

impl std::fmt::Debug for ShopifyCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShopifyCredentials")
            .field("shop_url", &self.shop_url)
            .field("access_token", &"[redacted]")
            .finish()
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub env: Environment,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub shopify_shop_url: Option<String>,
    pub shopify_access_token: Option<String>,
    pub shopify_api_version: String,
    pub rate_limit_mode: RateLimitMode,
    pub rate_limit_bucket_size: f64,
    pub rate_limit_leak_rate: f64,
    pub request_timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_backoff_base_ms: u64,
    pub page_size: u32,
    pub max_workers: usize,
    pub approval_rules_path: PathBuf,
    pub xorosoft_api_key: Option<String>,
    pub xorosoft_api_secret: Option<String>,
    pub xorosoft_base_url: String,
    pub xorosoft_min_interval_ms: u64,
    pub xorosoft_cache_ttl_secs: u64,
}

impl AppConfig {
    /// Returns the Shopify credentials, or the name of the first missing one.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingCredentials`] naming the absent variable.
    pub fn shopify_credentials(&self) -> Result<ShopifyCredentials, ConfigError> {
        let shop_url = self
            .shopify_shop_url
            .clone()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingCredentials("SHOPIFY_SHOP_URL".to_string()))?;
        let access_token = self
            .shopify_access_token
            .clone()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingCredentials("SHOPIFY_ACCESS_TOKEN".to_string()))?;
        Ok(ShopifyCredentials {
            shop_url,
            access_token,
        })
    }

    /// Returns the database URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnvVar`] when `DATABASE_URL` is unset.
    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("database_url", &self.database_url.as_ref().map(|_| "[redacted]"))
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("shopify_shop_url", &self.shopify_shop_url)
            .field(
                "shopify_access_token",
                &self.shopify_access_token.as_ref().map(|_| "[redacted]"),
            )
            .field("shopify_api_version", &self.shopify_api_version)
            .field("rate_limit_mode", &self.rate_limit_mode)
            .field("rate_limit_bucket_size", &self.rate_limit_bucket_size)
            .field("rate_limit_leak_rate", &self.rate_limit_leak_rate)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_attempts", &self.max_attempts)
            .field("retry_backoff_base_ms", &self.retry_backoff_base_ms)
            .field("page_size", &self.page_size)
            .field("max_workers", &self.max_workers)
            .field("approval_rules_path", &self.approval_rules_path)
            .field(
                "xorosoft_api_key",
                &self.xorosoft_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field(
                "xorosoft_api_secret",
                &self.xorosoft_api_secret.as_ref().map(|_| "[redacted]"),
            )
            .field("xorosoft_base_url", &self.xorosoft_base_url)
            .field("xorosoft_min_interval_ms", &self.xorosoft_min_interval_ms)
            .field("xorosoft_cache_ttl_secs", &self.xorosoft_cache_ttl_secs)
            .finish()
    }
}
