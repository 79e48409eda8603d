use crate::errors::{PropellerAdsError, PropellerAdsResult};
use crate::resilience::outcome::RequestOutcome;
use async_trait::async_trait;
use std::time::Duration;

/// Largest jitter fraction that keeps backoff non-decreasing.
const MAX_JITTER: f64 = 0.5;

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total transport attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound for computed delays
    pub max_delay: Duration,
    /// Fraction of each delay that may be randomly shaved off, in `[0, 0.5]`
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: crate::DEFAULT_MAX_RETRIES + 1,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: 0.1,
        }
    }
}

impl RetryConfig {
    /// Check the settings are usable
    pub fn validate(&self) -> PropellerAdsResult<()> {
        if self.max_attempts == 0 {
            return Err(PropellerAdsError::Configuration {
                message: "max_attempts must be at least 1".to_string(),
            });
        }
        if self.base_delay > self.max_delay {
            return Err(PropellerAdsError::Configuration {
                message: format!(
                    "base_delay ({:?}) must not exceed max_delay ({:?})",
                    self.base_delay, self.max_delay
                ),
            });
        }
        if !(0.0..=MAX_JITTER).contains(&self.jitter) {
            return Err(PropellerAdsError::Configuration {
                message: format!("jitter must be within [0, {}], got {}", MAX_JITTER, self.jitter),
            });
        }
        Ok(())
    }
}

/// Where a request is in its retry sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryContext {
    /// Zero-based attempt index
    pub attempt: u32,
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryContext {
    /// Whether this is the final permitted attempt
    pub fn is_last(&self) -> bool {
        self.attempt + 1 >= self.max_attempts
    }
}

/// Retry decisions and backoff calculation.
///
/// Holds no per-request state; one policy serves every request of a client.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a policy, rejecting invalid settings
    pub fn new(config: RetryConfig) -> PropellerAdsResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Total attempts permitted
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    pub fn context(&self, attempt: u32) -> RetryContext {
        RetryContext {
            attempt,
            max_attempts: self.config.max_attempts,
            base_delay: self.config.base_delay,
            max_delay: self.config.max_delay,
        }
    }

    /// Whether attempt `attempt` (zero-based) should be followed by another.
    pub fn should_retry(&self, attempt: u32, outcome: &RequestOutcome) -> bool {
        let retryable = match outcome {
            RequestOutcome::RetryableError(_)
            | RequestOutcome::ServerRateLimited { .. }
            | RequestOutcome::TransportError(_) => true,
            RequestOutcome::Success(_) | RequestOutcome::FatalError(_) => false,
        };
        retryable && attempt.saturating_add(1) < self.config.max_attempts
    }

    /// Delay before the attempt after `attempt`.
    ///
    /// A server hint is used exactly as given. Otherwise the delay is
    /// `base_delay * 2^attempt` minus up to `jitter` of itself, capped at
    /// `max_delay`.
    pub fn delay_for(&self, attempt: u32, retry_after_hint: Option<Duration>) -> Duration {
        if let Some(hint) = retry_after_hint {
            return hint;
        }

        let factor = if self.config.jitter > 0.0 {
            1.0 - rand::random::<f64>() * self.config.jitter
        } else {
            1.0
        };
        self.backoff(attempt, factor)
    }

    fn backoff(&self, attempt: u32, factor: f64) -> Duration {
        let exponent = attempt.min(64) as i32;
        let raw = self.config.base_delay.as_secs_f64() * 2f64.powi(exponent);
        let capped = (raw * factor).min(self.config.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }
}

/// Hook for observing or overriding retries
#[async_trait]
pub trait RetryHook: Send + Sync {
    async fn on_retry(&self, context: RetryContext, error: &PropellerAdsError, delay: Duration) -> RetryDecision;
}

/// Decision on how to proceed with a retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Use the computed delay
    Default,
    /// Retry after a custom delay
    Retry(Duration),
    /// Stop retrying and return the error
    Abort,
}
