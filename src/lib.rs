//! # PropellerAds API Client
//!
//! Resilient Rust client core for the PropellerAds SSP API.
//!
//! ## Features
//!
//! - Token bucket rate limiting with burst allowance and optional adaptive
//!   rate control driven by server feedback
//! - Circuit breaker with a single half-open probe
//! - Bounded exponential backoff with jitter that honors `Retry-After`
//! - A single [`RequestExecutor`] every API call goes through
//! - Structured logging and metrics
//! - Secure credential handling with `SecretString`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use integrations_propellerads::{create_client, ApiRequest, ClientConfig, PropellerAdsClient};
//! use secrecy::SecretString;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder()
//!         .api_key(SecretString::new("your-api-key-here".to_string()))
//!         .rate_limit(30)
//!         .build()?;
//!
//!     let client = create_client(config)?;
//!     // Or from PROPELLERADS_API_KEY and friends:
//!     // let client = create_client_from_env()?;
//!
//!     let response = client.execute(ApiRequest::get("/adv/balance")).await?;
//!     println!("{}", String::from_utf8_lossy(response.body()));
//!     println!("{:?}", client.get_circuit_breaker_status());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - `client` - Main client interface and factory functions
//! - `config` - Configuration types, builder and environment loading
//! - `auth` - Authentication and header management
//! - `transport` - HTTP transport layer and request description
//! - `resilience` - Rate limiter, circuit breaker, retry policy and executor
//! - `errors` - Error types and taxonomy
//! - `observability` - Logging and metrics

#![warn(clippy::all)]

pub mod auth;
pub mod client;
pub mod config;
pub mod errors;
pub mod observability;
pub mod resilience;
pub mod transport;

#[cfg(test)]
pub mod mocks;

pub use auth::{AuthManager, BearerAuthManager};
pub use client::{
    create_client, create_client_from_env, HealthReport, HealthStatus, PropellerAdsClient,
    PropellerAdsClientImpl,
};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use errors::{ErrorCategory, PropellerAdsError, PropellerAdsResult};
pub use observability::{
    InMemoryMetricsCollector, LogFormat, LogLevel, LoggingConfig, MetricsCollector,
    MetricsSummary, NoopMetricsCollector,
};
pub use resilience::{
    AdaptiveRateLimiter, CircuitBreaker, CircuitBreakerConfig, CircuitState, Clock,
    RateLimitConfig, RequestExecutor, RequestOutcome, ResilienceConfig, RetryConfig,
    RetryPolicy, SystemClock, TokenBucketLimiter,
};
pub use transport::{ApiRequest, HttpTransport, ReqwestTransport};

/// The default PropellerAds SSP API base URL
pub const DEFAULT_BASE_URL: &str = "https://ssp-api.propellerads.com/v5";

/// The default per-attempt request timeout
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// The default maximum number of retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// The default number of requests per minute
pub const DEFAULT_RATE_LIMIT: u32 = 60;

/// The default `User-Agent` header value
pub const DEFAULT_USER_AGENT: &str =
    concat!("integrations-propellerads/", env!("CARGO_PKG_VERSION"));
