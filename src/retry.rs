//! Retry support for transient HTTP failures.
//!
//! Archive services drop connections, return 503 during maintenance windows,
//! and throttle with 429. Every outgoing request goes through [`with_retry`],
//! which replays retryable failures with exponential backoff and jitter.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tracing::{debug, warn};

/// Classifies errors by whether a retry could plausibly succeed.
pub trait RetryableError {
    /// Whether the operation that produced this error is worth retrying
    fn is_retryable(&self) -> bool;

    /// Short human-readable reason used in retry log lines
    fn retry_reason(&self) -> &str;
}

/// Retry policy applied to outgoing requests.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt
    pub max_retries: usize,
    /// Delay before the first retry; doubles on each subsequent retry
    pub initial_delay: Duration,
    /// Upper bound on the backoff delay
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    /// Policy that never retries, useful in tests asserting on single requests
    pub fn no_retries() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    fn delays(&self) -> impl Iterator<Item = Duration> {
        // from_millis(2) doubles per attempt; factor scales the first delay
        // to initial_delay
        let factor = (self.initial_delay.as_millis() as u64 / 2).max(1);
        ExponentialBackoff::from_millis(2)
            .factor(factor)
            .max_delay(self.max_delay)
            .map(jitter)
            .take(self.max_retries)
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// exhausts the configured retries.
///
/// The last error is returned unchanged, so callers see the real failure
/// rather than a wrapper.
pub async fn with_retry<T, E, F, Fut>(
    mut operation: F,
    config: &RetryConfig,
    operation_name: &str,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: RetryableError + Display,
{
    let mut delays = config.delays();
    let mut attempt: usize = 1;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt, "Operation succeeded after retries"
                    );
                }
                return Ok(value);
            }
            Err(err) if err.is_retryable() => match delays.next() {
                Some(delay) => {
                    warn!(
                        operation = operation_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        reason = err.retry_reason(),
                        error = %err,
                        "Retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => {
                    warn!(
                        operation = operation_name,
                        attempts = attempt,
                        error = %err,
                        "Retries exhausted"
                    );
                    return Err(err);
                }
            },
            Err(err) => {
                debug!(
                    operation = operation_name,
                    error = %err,
                    "Non-retryable error, giving up"
                );
                return Err(err);
            }
        }
    }
}
