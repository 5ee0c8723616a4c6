//! Resilient downstream-call layer: bounded retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep, timeout};

use crate::services::ServiceError;

/// Retry and timeout tuning for downstream calls.
///
/// Reads from environment variables via [`RetryConfig::from_env`]:
/// - `SAGA_CLIENT_TIMEOUT_MS` — per-call deadline (default: `10000`)
/// - `SAGA_CLIENT_MAX_RETRIES` — retries after the first attempt (default: `3`)
/// - `SAGA_CLIENT_INITIAL_DELAY_MS` — first backoff delay (default: `1000`)
/// - `SAGA_CLIENT_MAX_DELAY_MS` — backoff cap (default: `10000`)
/// - `SAGA_CLIENT_MULTIPLIER` — backoff growth factor (default: `2`)
/// - `SAGA_CLIENT_API_KEY` — static API key forwarded to downstreams (optional)
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub api_key: Option<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            multiplier: 2.0,
            api_key: None,
        }
    }
}

impl RetryConfig {
    /// Loads configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let millis = |name: &str, default: Duration| {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };
        Self {
            timeout: millis("SAGA_CLIENT_TIMEOUT_MS", defaults.timeout),
            max_retries: std::env::var("SAGA_CLIENT_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_retries),
            initial_delay: millis("SAGA_CLIENT_INITIAL_DELAY_MS", defaults.initial_delay),
            max_delay: millis("SAGA_CLIENT_MAX_DELAY_MS", defaults.max_delay),
            multiplier: std::env::var("SAGA_CLIENT_MULTIPLIER")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.multiplier),
            api_key: std::env::var("SAGA_CLIENT_API_KEY").ok(),
        }
    }

    /// Returns the same configuration with a different per-call deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Outcome of a single bounded-timeout health probe.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthStatus {
    pub healthy: bool,
    pub latency: Duration,
}

/// Wraps downstream calls with classification-driven retry.
///
/// Retryable failures (network errors, timeouts, 408/429/5xx) are retried
/// with exponential backoff up to `max_retries`; terminal failures and
/// exhausted retries surface as the last [`ServiceError`]. Nothing panics
/// across this boundary; callers always receive a tagged result.
#[derive(Debug, Clone)]
pub struct ResilientClient {
    config: RetryConfig,
}

impl ResilientClient {
    /// Creates a client with the given configuration.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Calls `operation`, retrying transient failures.
    ///
    /// The closure is invoked once per attempt; each attempt runs under the
    /// configured deadline, and an elapsed deadline counts as a retryable
    /// timeout. Every attempt is logged with its number and outcome.
    pub async fn call<T, F, Fut>(
        &self,
        operation: &str,
        mut make_call: F,
    ) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let total_attempts = self.config.max_retries + 1;
        let mut delay = self.config.initial_delay;

        for attempt in 1..=total_attempts {
            let result = match timeout(self.config.timeout, make_call()).await {
                Ok(result) => result,
                Err(_) => Err(ServiceError::Timeout),
            };

            match result {
                Ok(value) => {
                    tracing::info!(operation, attempt, "downstream call succeeded");
                    return Ok(value);
                }
                Err(error) if error.is_retryable() && attempt < total_attempts => {
                    let backoff = delay.min(self.config.max_delay);
                    tracing::warn!(
                        operation,
                        attempt,
                        %error,
                        backoff_ms = backoff.as_millis() as u64,
                        "downstream call failed, retrying"
                    );
                    metrics::counter!("downstream_retries_total").increment(1);
                    sleep(backoff).await;
                    delay = delay.mul_f64(self.config.multiplier);
                }
                Err(error) => {
                    tracing::warn!(operation, attempt, %error, "downstream call failed");
                    metrics::counter!("downstream_failures_total").increment(1);
                    return Err(error);
                }
            }
        }

        unreachable!("loop returns on the final attempt")
    }

    /// Performs one bounded-timeout probe and reports health plus latency.
    /// Never retries.
    pub async fn health_check<F, Fut>(&self, operation: &str, probe: F) -> HealthStatus
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), ServiceError>>,
    {
        let start = Instant::now();
        let healthy = matches!(timeout(self.config.timeout, probe()).await, Ok(Ok(())));
        let latency = start.elapsed();

        tracing::info!(
            operation,
            healthy,
            latency_ms = latency.as_millis() as u64,
            "health probe"
        );

        HealthStatus { healthy, latency }
    }
}
