//! Leaky-bucket pacing for Shopify Admin API calls.
//!
//! Shopify meters GraphQL traffic with a bucket that refills at a fixed rate.
//! [`RateLimiter`] keeps a local estimate of that bucket and spaces requests
//! out before Shopify has to answer 429. It is an estimate only: the caller
//! feeds back real throttling through [`RateLimiter::record_rate_limit`].

use std::time::Duration;

use shopsync_core::RateLimitMode;
use tokio::time::Instant;

/// Default bucket capacity of a standard Shopify plan.
pub const DEFAULT_BUCKET_SIZE: f64 = 40.0;
/// Default refill rate, units per second.
pub const DEFAULT_LEAK_RATE: f64 = 2.0;

#[derive(Debug)]
pub struct RateLimiter {
    mode: RateLimitMode,
    bucket_size: f64,
    leak_rate: f64,
    current_calls: f64,
    consecutive_rate_limits: u32,
    last_leak: Instant,
    last_request_time: Option<Instant>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(mode: RateLimitMode, bucket_size: f64, leak_rate: f64) -> Self {
        Self {
            mode,
            bucket_size,
            leak_rate,
            current_calls: 0.0,
            consecutive_rate_limits: 0,
            last_leak: Instant::now(),
            last_request_time: None,
        }
    }

    #[must_use]
    pub fn mode(&self) -> RateLimitMode {
        self.mode
    }

    #[must_use]
    pub fn current_calls(&self) -> f64 {
        self.current_calls
    }

    #[must_use]
    pub fn consecutive_rate_limits(&self) -> u32 {
        self.consecutive_rate_limits
    }

    #[must_use]
    pub fn last_request_time(&self) -> Option<Instant> {
        self.last_request_time
    }

    /// Drains the bucket for the time elapsed since the previous drain.
    pub fn leak(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_leak).as_secs_f64();
        self.current_calls = (self.current_calls - elapsed * self.leak_rate).max(0.0);
        self.last_leak = now;
    }

    /// Multiplier for the current bucket fill level.
    fn usage_multiplier(&self) -> f64 {
        let usage = self.current_calls / self.bucket_size;
        if usage >= 0.9 {
            3.0
        } else if usage >= 0.8 {
            2.0
        } else if usage >= 0.6 {
            1.5
        } else {
            1.0
        }
    }

    /// Delay the next request would wait given the current state, without
    /// draining the bucket first.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn next_delay(&self) -> Duration {
        let base_ms = self.mode.base_delay_ms() as f64;
        let backoff = 1.0 + f64::from(self.consecutive_rate_limits) * 0.5;
        let delay_ms = base_ms * self.usage_multiplier() * backoff;
        Duration::from_micros((delay_ms * 1000.0).round() as u64)
    }

    /// Waits long enough to keep the estimated bucket below capacity, then
    /// counts one request against it. Returns the delay that was applied.
    pub async fn wait(&mut self) -> Duration {
        self.leak();
        let delay = self.next_delay();

        if !delay.is_zero() {
            tracing::trace!(
                delay_ms = delay.as_millis(),
                current_calls = self.current_calls,
                consecutive_rate_limits = self.consecutive_rate_limits,
                "rate limiter pacing request"
            );
            tokio::time::sleep(delay).await;
        }

        self.current_calls += 1.0;
        self.last_request_time = Some(Instant::now());
        delay
    }

    pub fn record_success(&mut self) {
        self.consecutive_rate_limits = 0;
    }

    pub fn record_rate_limit(&mut self) {
        self.consecutive_rate_limits = self.consecutive_rate_limits.saturating_add(1);
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitMode::Safe, DEFAULT_BUCKET_SIZE, DEFAULT_LEAK_RATE)
    }
}
