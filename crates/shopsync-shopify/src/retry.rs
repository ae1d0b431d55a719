//! Retry with exponential backoff and jitter for Shopify requests.

use std::future::Future;
use std::time::Duration;

use crate::error::ShopifyError;

/// Delay before retry number `retry` (0-based): `base * 2^retry` plus a
/// uniform jitter in `[0, base)`.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn backoff_delay(backoff_base_ms: u64, retry: u32) -> Duration {
    let exponential = backoff_base_ms.saturating_mul(1u64 << retry.min(20));
    let jitter = (backoff_base_ms as f64 * rand::random::<f64>()) as u64;
    Duration::from_millis(exponential.saturating_add(jitter))
}

/// Runs `operation` up to `max_attempts` times in total, sleeping with
/// [`backoff_delay`] between attempts.
///
/// `operation` receives the 0-based attempt number. Errors for which
/// [`ShopifyError::is_transient`] is false are returned immediately; the last
/// transient error is returned once attempts run out.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_attempts: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, ShopifyError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ShopifyError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_transient() || attempt + 1 >= max_attempts {
                    return Err(err);
                }
                let delay = backoff_delay(backoff_base_ms, attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "transient Shopify error, retrying after backoff"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn backoff_delay_stays_within_jitter_window() {
        for retry in 0..4 {
            let floor = 100 * (1 << retry);
            for _ in 0..50 {
                let ms = u64::try_from(backoff_delay(100, retry).as_millis()).unwrap();
                assert!(
                    (floor..floor + 100).contains(&ms),
                    "retry {retry}: {ms}ms outside [{floor}, {})",
                    floor + 100
                );
            }
        }
    }

    #[test]
    fn zero_base_means_no_delay() {
        assert_eq!(backoff_delay(0, 3), Duration::ZERO);
    }

    #[tokio::test]
    async fn retries_transient_error_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0, |attempt| {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                if attempt < 2 {
                    Err(ShopifyError::ServerError { status: 502 })
                } else {
                    Ok::<_, ShopifyError>(attempt)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result: Result<(), _> = retry_with_backoff(3, 0, |attempt| {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(ShopifyError::RateLimited {
                    attempts: attempt + 1,
                })
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(result, Err(ShopifyError::RateLimited { attempts: 3 })));
    }

    #[tokio::test]
    async fn single_attempt_budget_never_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let _: Result<(), _> = retry_with_backoff(1, 0, |_| {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(ShopifyError::ServerError { status: 503 })
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn authentication_failure_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result: Result<(), _> = retry_with_backoff(3, 0, |_| {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(ShopifyError::AuthenticationFailed("HTTP 401".to_owned()))
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(ShopifyError::AuthenticationFailed(_))));
    }
}
