use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, instrument};

/// Rate limiter using a token bucket algorithm.
///
/// Astronomical archives are shared scientific infrastructure. SIMBAD and the
/// ESA archives throttle or block clients that issue too many requests, so
/// every client in this crate acquires a token before each HTTP request.
#[derive(Clone)]
pub struct RateLimiter {
    bucket: Arc<Mutex<TokenBucket>>,
}

struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_rate: f64, // tokens per second
    last_refill: Instant,
}

impl RateLimiter {
    /// Create a new rate limiter with the specified rate
    ///
    /// # Arguments
    ///
    /// * `rate` - Maximum requests per second
    ///
    /// # Example
    ///
    /// ```
    /// use vo_client::rate_limit::RateLimiter;
    ///
    /// // Conservative limit for bulk queries
    /// let limiter = RateLimiter::new(2.0);
    /// ```
    pub fn new(rate: f64) -> Self {
        let capacity = rate.max(1.0); // Ensure minimum capacity
        Self {
            bucket: Arc::new(Mutex::new(TokenBucket {
                tokens: capacity,
                capacity,
                refill_rate: rate.max(0.001),
                last_refill: Instant::now(),
            })),
        }
    }

    /// Create a rate limiter with the default archive-friendly rate
    /// (5 requests/second)
    pub fn archive_default() -> Self {
        Self::new(5.0)
    }

    /// Acquire a token, waiting if necessary to respect the rate limit
    ///
    /// # Example
    ///
    /// ```no_run
    /// use vo_client::rate_limit::RateLimiter;
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let limiter = RateLimiter::archive_default();
    ///
    ///     limiter.acquire().await;
    ///     // Make API call here
    ///
    ///     limiter.acquire().await;
    ///     // Make another API call here
    /// }
    /// ```
    #[instrument(skip(self))]
    pub async fn acquire(&self) {
        loop {
            let wait_time = {
                let mut bucket = self.bucket.lock().await;
                bucket.refill();

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    debug!(remaining_tokens = %bucket.tokens, "Token acquired");
                    return;
                }

                // Wait until the deficit refills; another task may still win
                // the token, hence the loop
                Duration::from_secs_f64((1.0 - bucket.tokens) / bucket.refill_rate)
            };

            debug!(
                wait_duration_ms = wait_time.as_millis() as u64,
                "Waiting for rate limit token"
            );
            sleep(wait_time).await;
        }
    }

    /// Check if a token is available without blocking
    ///
    /// Returns `true` if a token is available and can be acquired immediately.
    /// This method does not consume a token.
    pub async fn check_available(&self) -> bool {
        let mut bucket = self.bucket.lock().await;
        bucket.refill();
        bucket.tokens >= 1.0
    }

    /// Get current token count (for testing and monitoring)
    pub async fn token_count(&self) -> f64 {
        let mut bucket = self.bucket.lock().await;
        bucket.refill();
        bucket.tokens
    }

    /// Get the configured rate limit (requests per second)
    pub async fn rate(&self) -> f64 {
        let bucket = self.bucket.lock().await;
        bucket.refill_rate
    }
}

impl TokenBucket {
    /// Refill tokens based on elapsed time
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);
        let new_tokens = elapsed.as_secs_f64() * self.refill_rate;

        self.tokens = (self.tokens + new_tokens).min(self.capacity);
        self.last_refill = now;
    }
}
