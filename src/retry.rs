//! Bounded retry with exponential backoff.
//!
//! Every external call in the pipeline goes through [`retry_with_backoff`],
//! parameterized by an outcome classifier: transient failures (network,
//! rate limit, 5xx) are retried after a growing delay, everything else is
//! returned immediately. The generation backends and the publisher use the
//! same utility rather than carrying their own sleep loops.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry schedule for one category of external call.
///
/// With `backoff_base_ms = 1_000`, retries sleep 1s, 2s, 4s, ... capped at
/// `max_delay_ms`. `max_retries` counts additional attempts after the first
/// try, so `max_retries = 2` means at most three calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Additional attempts after the initial one.
    pub max_retries: u32,
    /// Base delay before the first retry, in milliseconds.
    pub backoff_base_ms: u64,
    /// Upper bound on any single delay, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base_ms: 1_000,
            max_delay_ms: 60_000,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of additional attempts.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the base backoff delay.
    pub fn with_backoff_base_ms(mut self, base_ms: u64) -> Self {
        self.backoff_base_ms = base_ms;
        self
    }

    /// Set the delay cap.
    pub fn with_max_delay_ms(mut self, max_ms: u64) -> Self {
        self.max_delay_ms = max_ms;
        self
    }

    /// Delay before retry number `attempt` (1-based), exponential and capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(10);
        let computed = self.backoff_base_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(computed.min(self.max_delay_ms))
    }
}

/// Run `operation` with up to `policy.max_retries` extra attempts on errors
/// the `is_retryable` classifier accepts.
///
/// Non-retryable errors are returned immediately without sleeping. When all
/// attempts are exhausted the last error is returned.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    is_retryable: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retryable(&err) || attempt >= policy.max_retries {
                    return Err(err);
                }
                attempt += 1;
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, retrying after backoff"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
