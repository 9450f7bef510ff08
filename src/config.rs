//! Configuration and credentials for the exchange client.
//!
//! This module provides the [`Config`] struct for managing endpoints,
//! credentials and client settings, and [`ReconnectConfig`] for the stream
//! reconnection policy.

use std::time::Duration;

use rand::Rng;
use url::Url;

use crate::error::Error;

/// Configuration for the exchange client
///
/// # Example
///
/// ```rust
/// use exchange_client::Config;
/// use exchange_client::config::ReconnectConfig;
///
/// let config = Config::new(
///     "https://exchange.example.com",
///     "wss://exchange.example.com/ws",
///     "trader",
///     "api-key",
/// )?
/// .with_timeout(std::time::Duration::from_secs(30))
/// .with_reconnect(ReconnectConfig::new().max_retries(5));
/// # Ok::<(), exchange_client::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// REST endpoint, routes are appended to it
    http_endpoint: Url,

    /// Streaming endpoint
    ws_endpoint: Url,

    /// Account username
    username: String,

    /// Account API key (only sent to the buildup route)
    api_key: String,

    /// HTTP request timeout
    timeout: Duration,

    /// Stream reconnection policy
    reconnect: ReconnectConfig,
}

impl Config {
    /// Create a new configuration with endpoints and credentials
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if an endpoint is not a valid URL or has the
    /// wrong scheme (`http`/`https` for REST, `ws`/`wss` for streaming).
    pub fn new(
        http_endpoint: &str,
        ws_endpoint: &str,
        username: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, Error> {
        let http_endpoint = Url::parse(http_endpoint)?;
        if !matches!(http_endpoint.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "REST endpoint must be http(s), got {}",
                http_endpoint.scheme()
            )));
        }

        let ws_endpoint = Url::parse(ws_endpoint)?;
        if !matches!(ws_endpoint.scheme(), "ws" | "wss") {
            return Err(Error::Config(format!(
                "stream endpoint must be ws(s), got {}",
                ws_endpoint.scheme()
            )));
        }

        Ok(Self {
            http_endpoint,
            ws_endpoint,
            username: username.into(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(10),
            reconnect: ReconnectConfig::default(),
        })
    }

    /// Set the HTTP request timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the stream reconnection policy
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Get the REST endpoint
    pub fn http_endpoint(&self) -> &Url {
        &self.http_endpoint
    }

    /// Get the URL of a REST route, e.g. `route_url("limit_order")`
    pub fn route_url(&self, route: &str) -> String {
        format!(
            "{}/{}",
            self.http_endpoint.as_str().trim_end_matches('/'),
            route.trim_start_matches('/')
        )
    }

    /// Get the streaming endpoint
    pub fn ws_endpoint(&self) -> &Url {
        &self.ws_endpoint
    }

    /// Get the username
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Get the API key
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Get the timeout duration
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Get the reconnection policy
    pub fn reconnect(&self) -> &ReconnectConfig {
        &self.reconnect
    }
}

/// Configuration for reconnection behavior
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of consecutive retries after a failed attempt (0 = infinite)
    pub max_retries: u32,
    /// Initial delay between reconnection attempts
    pub initial_delay_ms: u64,
    /// Maximum delay between reconnection attempts
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Random jitter as a fraction of the delay (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            initial_delay_ms: 100,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }
}

impl ReconnectConfig {
    /// Create a new reconnect config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum retries (0 = infinite)
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set initial delay in milliseconds
    pub fn initial_delay_ms(mut self, ms: u64) -> Self {
        self.initial_delay_ms = ms;
        self
    }

    /// Set maximum delay in milliseconds
    pub fn max_delay_ms(mut self, ms: u64) -> Self {
        self.max_delay_ms = ms;
        self
    }

    /// Set backoff multiplier
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Set jitter factor; clamped to `0.0..=1.0`
    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }

    /// Whether a retry is allowed after `failures` consecutive failed attempts
    pub fn allows_retry(&self, failures: u32) -> bool {
        self.max_retries == 0 || failures <= self.max_retries
    }

    /// Calculate delay for a given retry attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(64) as i32;
        let delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let delay_ms = delay.min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(delay_ms)
    }

    /// [`delay_for_attempt`](Self::delay_for_attempt) plus up to
    /// `±jitter_factor` of random jitter
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        let range = delay.as_secs_f64() * self.jitter_factor;
        if range <= 0.0 {
            return delay;
        }
        let jitter = rand::thread_rng().gen_range(-range..=range);
        Duration::from_secs_f64((delay.as_secs_f64() + jitter).max(0.0))
    }
}
