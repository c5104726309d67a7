//! Client configuration shared by all archive clients.

use std::time::Duration;

use crate::rate_limit::RateLimiter;
use crate::retry::RetryConfig;

/// Default politeness limit applied when no explicit rate is configured
pub const DEFAULT_RATE_LIMIT: f64 = 5.0;

/// Default timeout for metadata and query requests
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for product downloads, which can be multi-gigabyte
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// Configuration for Virtual Observatory clients
///
/// Every field is optional; unset fields fall back to per-service defaults.
/// The builder methods consume and return `self` so configurations can be
/// written as a single chain.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use vo_client::config::ClientConfig;
///
/// let config = ClientConfig::new()
///     .with_timeout(Duration::from_secs(60))
///     .with_rate_limit(2.0)
///     .with_user_agent("my-survey-pipeline/1.2");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Override for the service base URL (primarily for tests)
    pub base_url: Option<String>,
    /// Override for the product download endpoint of services that have one
    pub data_base_url: Option<String>,
    /// Timeout for query and metadata requests
    pub timeout: Option<Duration>,
    /// Timeout for product downloads
    pub download_timeout: Option<Duration>,
    /// Maximum requests per second
    pub rate_limit: Option<f64>,
    /// Retry policy for transient failures
    pub retry_config: RetryConfig,
    /// User-Agent header sent with every request
    pub user_agent: Option<String>,
}

impl ClientConfig {
    /// Create a new configuration with all defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the service base URL
    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Override the product download endpoint
    pub fn with_data_base_url<S: Into<String>>(mut self, data_base_url: S) -> Self {
        self.data_base_url = Some(data_base_url.into());
        self
    }

    /// Set the timeout for query and metadata requests
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the timeout for product downloads
    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = Some(timeout);
        self
    }

    /// Set the maximum request rate in requests per second
    pub fn with_rate_limit(mut self, requests_per_second: f64) -> Self {
        self.rate_limit = Some(requests_per_second);
        self
    }

    /// Set the retry policy
    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    /// Set the User-Agent header
    pub fn with_user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Resolve the base URL, falling back to the given service default.
    /// Trailing slashes are trimmed so callers can join paths uniformly.
    pub fn effective_base_url(&self, default: &str) -> String {
        self.base_url
            .as_deref()
            .unwrap_or(default)
            .trim_end_matches('/')
            .to_string()
    }

    /// Resolve the data endpoint URL, falling back to the given default
    pub fn effective_data_url(&self, default: &str) -> String {
        self.data_base_url
            .as_deref()
            .unwrap_or(default)
            .trim_end_matches('/')
            .to_string()
    }

    /// Resolve the request timeout
    pub fn effective_timeout(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_TIMEOUT)
    }

    /// Resolve the download timeout
    pub fn effective_download_timeout(&self) -> Duration {
        self.download_timeout.unwrap_or(DEFAULT_DOWNLOAD_TIMEOUT)
    }

    /// Resolve the request rate
    pub fn effective_rate_limit(&self) -> f64 {
        self.rate_limit.unwrap_or(DEFAULT_RATE_LIMIT)
    }

    /// Resolve the User-Agent header value
    pub fn effective_user_agent(&self) -> String {
        self.user_agent.clone().unwrap_or_else(|| {
            format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            )
        })
    }

    /// Create a rate limiter honoring the configured rate
    pub fn create_rate_limiter(&self) -> RateLimiter {
        RateLimiter::new(self.effective_rate_limit())
    }

    /// Create the HTTP client used by archive clients.
    ///
    /// Cookies are enabled because TAP+ services track login sessions with a
    /// JSESSIONID cookie.
    pub(crate) fn create_http_client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .user_agent(self.effective_user_agent())
            .timeout(self.effective_timeout())
            .cookie_store(true)
            .build()
            .expect("Failed to create HTTP client")
    }
}
