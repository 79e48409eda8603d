//! Rate limiting, circuit breaking and retries around every API call.

mod adaptive;
mod circuit_breaker;
mod clock;
mod executor;
mod outcome;
mod rate_limiter;
mod retry;

#[cfg(test)]
mod tests;

pub use adaptive::{AdaptiveRateLimiter, AdaptiveStatus};
pub use circuit_breaker::{
    Admission, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerHook, CircuitBreakerStatus,
    CircuitState,
};
pub use clock::{Clock, MockClock, SystemClock};
pub use executor::{RequestExecutor, RequestExecutorBuilder, ResilienceConfig};
pub(crate) use executor::normalize_base_url;
pub use outcome::RequestOutcome;
pub use rate_limiter::{
    RateLimitConfig, RateLimiterSettings, RateLimiterStatistics, RateLimiterStatus,
    TokenBucketLimiter,
};
pub use retry::{RetryConfig, RetryContext, RetryDecision, RetryHook, RetryPolicy};
