//! Configuration types for the PropellerAds API client.

use crate::errors::{PropellerAdsError, PropellerAdsResult};
use crate::resilience::{
    normalize_base_url, CircuitBreakerConfig, RateLimitConfig, ResilienceConfig, RetryConfig,
};
use crate::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT};
use secrecy::SecretString;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable holding the API key
pub const API_KEY_ENV: &str = "PROPELLERADS_API_KEY";
/// Older variable name still honored when [`API_KEY_ENV`] is unset
pub const LEGACY_API_KEY_ENV: &str = "MainAPI";

/// Configuration for the PropellerAds API client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API key for authentication
    pub api_key: SecretString,
    /// Base URL for the PropellerAds API
    pub base_url: String,
    /// Default per-attempt request timeout
    pub timeout: Duration,
    /// Value of the `User-Agent` header
    pub user_agent: String,
    /// Rate limiting, circuit breaker and retry settings
    pub resilience: ResilienceConfig,
}

impl ClientConfig {
    /// Creates a new configuration builder
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Creates a configuration from environment variables.
    ///
    /// Reads `PROPELLERADS_API_KEY` (falling back to `MainAPI`),
    /// `PROPELLERADS_BASE_URL`, `PROPELLERADS_TIMEOUT` (seconds),
    /// `PROPELLERADS_RATE_LIMIT` (requests per minute) and
    /// `PROPELLERADS_MAX_RETRIES`.
    pub fn from_env() -> PropellerAdsResult<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars<F>(var: F) -> PropellerAdsResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = var(API_KEY_ENV)
            .or_else(|| var(LEGACY_API_KEY_ENV))
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| PropellerAdsError::Configuration {
                message: format!("{} environment variable not set", API_KEY_ENV),
            })?;

        let mut builder = ClientConfig::builder().api_key(SecretString::new(api_key));

        if let Some(base_url) = var("PROPELLERADS_BASE_URL") {
            builder = builder.base_url(base_url);
        }
        if let Some(secs) = parse_var::<u64>(&var, "PROPELLERADS_TIMEOUT")? {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if let Some(rate) = parse_var::<u32>(&var, "PROPELLERADS_RATE_LIMIT")? {
            builder = builder.rate_limit(rate);
        }
        if let Some(retries) = parse_var::<u32>(&var, "PROPELLERADS_MAX_RETRIES")? {
            builder = builder.max_retries(retries);
        }

        builder.build()
    }
}

fn parse_var<T: FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> PropellerAdsResult<Option<T>> {
    match var(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| PropellerAdsError::Configuration {
                message: format!("{} has an invalid value: {:?}", name, raw),
            }),
    }
}

/// Builder for [`ClientConfig`]
#[derive(Default)]
pub struct ClientConfigBuilder {
    api_key: Option<SecretString>,
    base_url: Option<String>,
    timeout: Option<Duration>,
    user_agent: Option<String>,
    resilience: Option<ResilienceConfig>,
    rate_limit: Option<u32>,
    max_retries: Option<u32>,
    adaptive: Option<bool>,
}

impl ClientConfigBuilder {
    /// Sets the API key
    pub fn api_key(mut self, api_key: SecretString) -> Self {
        self.api_key = Some(api_key);
        self
    }

    /// Sets the base URL
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Replaces the whole resilience configuration.
    ///
    /// [`rate_limit`](Self::rate_limit), [`max_retries`](Self::max_retries)
    /// and [`adaptive_rate_limiting`](Self::adaptive_rate_limiting) still
    /// apply on top of it.
    pub fn resilience(mut self, resilience: ResilienceConfig) -> Self {
        self.resilience = Some(resilience);
        self
    }

    /// Sets the number of requests allowed per rate-limit window
    pub fn rate_limit(mut self, max_requests: u32) -> Self {
        self.rate_limit = Some(max_requests);
        self
    }

    /// Sets the maximum number of retries after the first attempt
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn adaptive_rate_limiting(mut self, enabled: bool) -> Self {
        self.adaptive = Some(enabled);
        self
    }

    pub fn rate_limit_config(mut self, config: RateLimitConfig) -> Self {
        self.resilience.get_or_insert_with(Default::default).rate_limit = config;
        self
    }

    pub fn circuit_breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.resilience
            .get_or_insert_with(Default::default)
            .circuit_breaker = config;
        self
    }

    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.resilience.get_or_insert_with(Default::default).retry = config;
        self
    }

    /// Builds and validates the configuration
    pub fn build(self) -> PropellerAdsResult<ClientConfig> {
        let api_key = self.api_key.ok_or_else(|| PropellerAdsError::Configuration {
            message: "API key is required".to_string(),
        })?;

        let base_url = self.base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        normalize_base_url(&base_url)?;

        let timeout = self
            .timeout
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        if timeout.is_zero() {
            return Err(PropellerAdsError::Configuration {
                message: "timeout must be greater than zero".to_string(),
            });
        }

        let mut resilience = self.resilience.unwrap_or_default();
        if let Some(rate) = self.rate_limit {
            resilience.rate_limit.max_requests = rate;
        }
        if let Some(retries) = self.max_retries {
            resilience.retry.max_attempts = retries.saturating_add(1);
        }
        if let Some(adaptive) = self.adaptive {
            resilience.rate_limit.adaptive = adaptive;
        }
        resilience.validate()?;

        Ok(ClientConfig {
            api_key,
            base_url,
            timeout,
            user_agent: self
                .user_agent
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            resilience,
        })
    }
}
