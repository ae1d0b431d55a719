//! Jittered exponential back-off for Xorosoft requests.

use std::future::Future;
use std::time::Duration;

use crate::error::XorosoftError;

const MAX_BACKOFF_MS: u64 = 30_000;

/// Throttling, server-side failures and transport errors. A `"Result": false`
/// envelope or an undecodable body will not improve on a second try.
pub(crate) fn is_transient(err: &XorosoftError) -> bool {
    match err {
        XorosoftError::RateLimited | XorosoftError::ServerError { .. } => true,
        XorosoftError::Http(e) => {
            e.is_timeout()
                || e.is_connect()
                || e.is_request()
                || e.status().is_some_and(|s| s.is_server_error())
        }
        XorosoftError::UnexpectedStatus { .. }
        | XorosoftError::ApiError(_)
        | XorosoftError::Deserialize { .. }
        | XorosoftError::InvalidBaseUrl(_) => false,
    }
}

/// `base * 2^(retry - 1)`, capped at 30 s, scaled by `factor`.
///
/// `factor` is the jitter multiplier, drawn from `[0.75, 1.25)` in
/// [`with_retry`].
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub(crate) fn backoff_ms(retry: u32, base_ms: u64, factor: f64) -> u64 {
    let exp = retry.saturating_sub(1).min(16);
    let raw = base_ms.saturating_mul(1u64 << exp).min(MAX_BACKOFF_MS);
    (raw as f64 * factor) as u64
}

/// Calls `request` until it succeeds, fails permanently, or `max_attempts`
/// calls have been made (at least one).
pub(crate) async fn with_retry<T, F, Fut>(
    max_attempts: u32,
    base_ms: u64,
    mut request: F,
) -> Result<T, XorosoftError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, XorosoftError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut retry = 0u32;
    loop {
        let err = match request().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        retry += 1;
        if retry >= max_attempts || !is_transient(&err) {
            return Err(err);
        }

        let factor = 0.75 + rand::random::<f64>() * 0.5;
        let delay_ms = backoff_ms(retry, base_ms, factor);
        tracing::warn!(
            retry,
            max_attempts,
            delay_ms,
            error = %err,
            "Xorosoft request failed, backing off"
        );
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }
}
