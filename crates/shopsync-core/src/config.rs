use std::path::PathBuf;
use std::str::FromStr;

use crate::app_config::{AppConfig, Environment, RateLimitMode};
use crate::ConfigError;

/// Shopify rejects `first` values above this on connection fields.
const MAX_PAGE_SIZE: u32 = 250;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files, which suits tests
/// or when the caller manages env setup.
///
/// # Errors
///
/// Returns `ConfigError` if values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Credentials and `DATABASE_URL` are optional here; commands that need them
/// call [`AppConfig::shopify_credentials`] or [`AppConfig::require_database_url`]
/// so a missing value fails before any network or database work starts.
///
/// # Errors
///
/// Returns `ConfigError` if values are invalid.
pub fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let optional = |var: &str| -> Option<String> {
        lookup(var).ok().filter(|v| !v.trim().is_empty())
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_num = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.trim()
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let value = parse_num(var, default)?;
        u32::try_from(value).map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_positive_f64 = |var: &str, default: &str| -> Result<f64, ConfigError> {
        let raw = or_default(var, default);
        let value = raw
            .trim()
            .parse::<f64>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })?;
        if !value.is_finite() || value <= 0.0 {
            return Err(ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: format!("must be a positive number, got {raw}"),
            });
        }
        Ok(value)
    };

    let env = parse_environment(&or_default("SHOPSYNC_ENV", "development"))?;
    let log_level = or_default("SHOPSYNC_LOG_LEVEL", "info");
    let database_url = optional("DATABASE_URL");

    let db_max_connections = parse_u32("SHOPSYNC_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("SHOPSYNC_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_num("SHOPSYNC_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let shopify_shop_url = optional("SHOPIFY_SHOP_URL");
    let shopify_access_token = optional("SHOPIFY_ACCESS_TOKEN");
    let shopify_api_version = or_default("SHOPIFY_API_VERSION", "2024-10");

    let rate_limit_mode = RateLimitMode::from_str(&or_default("SHOPSYNC_RATE_LIMIT_MODE", "safe"))?;
    let rate_limit_bucket_size = parse_positive_f64("SHOPSYNC_BUCKET_SIZE", "40")?;
    let rate_limit_leak_rate = parse_positive_f64("SHOPSYNC_LEAK_RATE", "2")?;

    let request_timeout_secs = parse_num("SHOPSYNC_REQUEST_TIMEOUT_SECS", "30")?;
    let max_attempts = parse_u32("SHOPSYNC_MAX_ATTEMPTS", "3")?;
    if max_attempts == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "SHOPSYNC_MAX_ATTEMPTS".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    let retry_backoff_base_ms = parse_num("SHOPSYNC_RETRY_BACKOFF_BASE_MS", "1000")?;

    let page_size = parse_u32("SHOPSYNC_PAGE_SIZE", "50")?;
    if page_size == 0 || page_size > MAX_PAGE_SIZE {
        return Err(ConfigError::InvalidEnvVar {
            var: "SHOPSYNC_PAGE_SIZE".to_string(),
            reason: format!("must be between 1 and {MAX_PAGE_SIZE}, got {page_size}"),
        });
    }

    let max_workers = usize::try_from(parse_num("SHOPSYNC_MAX_WORKERS", "1")?)
        .map_err(|e| ConfigError::InvalidEnvVar {
            var: "SHOPSYNC_MAX_WORKERS".to_string(),
            reason: e.to_string(),
        })?
        .max(1);

    let approval_rules_path = PathBuf::from(or_default(
        "SHOPSYNC_APPROVAL_RULES_PATH",
        "./config/approval_rules.yaml",
    ));

    let xorosoft_api_key = optional("XOROSOFT_API_KEY");
    let xorosoft_api_secret = optional("XOROSOFT_API_SECRET");
    let xorosoft_base_url = or_default("XOROSOFT_BASE_URL", "https://res.xorosoft.io/api/xerp");
    let xorosoft_min_interval_ms = parse_num("XOROSOFT_MIN_INTERVAL_MS", "500")?;
    let xorosoft_cache_ttl_secs = parse_num("XOROSOFT_CACHE_TTL_SECS", "300")?;

    Ok(AppConfig {
        database_url,
        env,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        shopify_shop_url,
        shopify_access_token,
        shopify_api_version,
        rate_limit_mode,
        rate_limit_bucket_size,
        rate_limit_leak_rate,
        request_timeout_secs,
        max_attempts,
        retry_backoff_base_ms,
        page_size,
        max_workers,
        approval_rules_path,
        xorosoft_api_key,
        xorosoft_api_secret,
        xorosoft_base_url,
        xorosoft_min_interval_ms,
        xorosoft_cache_ttl_secs,
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "SHOPSYNC_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
