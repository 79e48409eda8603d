use crate::errors::{PropellerAdsError, PropellerAdsResult};
use crate::resilience::clock::{Clock, SystemClock};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Longest single sleep while waiting for tokens; the bucket is re-checked after each one.
const MAX_SLEEP_INCREMENT: Duration = Duration::from_millis(100);

/// Absorbs float drift from many small refills
const TOKEN_EPSILON: f64 = 1e-9;

/// Configuration for rate limiting
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests admitted per window at the steady-state rate
    pub max_requests: u32,
    /// Length of the rate window
    pub window: Duration,
    /// Bucket capacity as a multiple of `max_requests`
    pub burst_multiplier: f64,
    /// How long `execute` waits for a token; `None` waits indefinitely
    pub acquire_timeout: Option<Duration>,
    /// Adjust the rate from observed responses
    pub adaptive: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: crate::DEFAULT_RATE_LIMIT,
            window: Duration::from_secs(60),
            burst_multiplier: 1.5,
            acquire_timeout: Some(Duration::from_secs(30)),
            adaptive: false,
        }
    }
}

impl RateLimitConfig {
    /// Check the parameters describe a usable bucket
    pub fn validate(&self) -> PropellerAdsResult<()> {
        validate_rate(self.max_requests, self.window, self.burst_multiplier)
    }
}

fn validate_rate(max_requests: u32, window: Duration, burst_multiplier: f64) -> PropellerAdsResult<()> {
    if max_requests == 0 {
        return Err(PropellerAdsError::Configuration {
            message: "max_requests must be greater than zero".to_string(),
        });
    }
    if window.is_zero() {
        return Err(PropellerAdsError::Configuration {
            message: "rate window must be greater than zero".to_string(),
        });
    }
    if !burst_multiplier.is_finite() || burst_multiplier < 1.0 {
        return Err(PropellerAdsError::Configuration {
            message: format!("burst_multiplier must be >= 1.0, got {}", burst_multiplier),
        });
    }
    Ok(())
}

/// Token bucket with burst allowance.
///
/// Admits at most `max_requests` per `window` at steady state and up to
/// `floor(max_requests * burst_multiplier)` back to back from a full bucket.
/// Every refill, check and deduction happens inside one critical section; the
/// lock is never held while waiting.
pub struct TokenBucketLimiter {
    state: Mutex<BucketState>,
    clock: Arc<dyn Clock>,
}

struct BucketState {
    max_requests: u32,
    window: Duration,
    burst_multiplier: f64,
    bucket_size: u32,
    tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
    total_requests: u64,
    blocked_requests: u64,
    total_wait: Duration,
}

impl BucketState {
    fn new(max_requests: u32, window: Duration, burst_multiplier: f64, now: Instant) -> Self {
        let bucket_size = bucket_size(max_requests, burst_multiplier);
        Self {
            max_requests,
            window,
            burst_multiplier,
            bucket_size,
            tokens: bucket_size as f64,
            refill_rate: max_requests as f64 / window.as_secs_f64(),
            last_refill: now,
            total_requests: 0,
            blocked_requests: 0,
            total_wait: Duration::ZERO,
        }
    }

    /// Tokens the bucket would hold at `now`, without updating it.
    ///
    /// A clock that moved backwards yields zero elapsed time.
    fn projected_tokens(&self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        (self.tokens + elapsed * self.refill_rate).min(self.bucket_size as f64)
    }

    fn refill(&mut self, now: Instant) {
        self.tokens = self.projected_tokens(now);
        if now > self.last_refill {
            self.last_refill = now;
        }
    }

    fn has(&self, tokens: f64) -> bool {
        self.tokens + TOKEN_EPSILON >= tokens
    }

    fn take(&mut self, tokens: f64) {
        self.tokens = (self.tokens - tokens).max(0.0);
    }

    fn time_until_available(&self, tokens: f64) -> Duration {
        if self.has(tokens) {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((tokens - self.tokens) / self.refill_rate)
        }
    }
}

fn bucket_size(max_requests: u32, burst_multiplier: f64) -> u32 {
    (max_requests as f64 * burst_multiplier).floor().min(u32::MAX as f64) as u32
}

impl TokenBucketLimiter {
    /// Create a limiter on the system clock
    pub fn new(max_requests: u32, window: Duration, burst_multiplier: f64) -> PropellerAdsResult<Self> {
        Self::with_clock(max_requests, window, burst_multiplier, Arc::new(SystemClock))
    }

    /// Create a limiter on the given clock
    pub fn with_clock(
        max_requests: u32,
        window: Duration,
        burst_multiplier: f64,
        clock: Arc<dyn Clock>,
    ) -> PropellerAdsResult<Self> {
        validate_rate(max_requests, window, burst_multiplier)?;
        let state = BucketState::new(max_requests, window, burst_multiplier, clock.now());

        Ok(Self {
            state: Mutex::new(state),
            clock,
        })
    }

    /// Create a limiter from configuration
    pub fn from_config(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> PropellerAdsResult<Self> {
        Self::with_clock(
            config.max_requests,
            config.window,
            config.burst_multiplier,
            clock,
        )
    }

    fn check_request(&self, tokens: u32, bucket_size: u32) -> PropellerAdsResult<()> {
        if tokens == 0 {
            return Err(PropellerAdsError::InvalidArgument {
                message: "tokens must be positive".to_string(),
            });
        }
        if tokens > bucket_size {
            return Err(PropellerAdsError::InvalidArgument {
                message: format!(
                    "cannot acquire {} tokens (bucket size: {})",
                    tokens, bucket_size
                ),
            });
        }
        Ok(())
    }

    /// Take `tokens` if they are available right now.
    ///
    /// Never blocks. Requests larger than the bucket can never succeed and
    /// are rejected with [`PropellerAdsError::InvalidArgument`].
    pub fn try_acquire(&self, tokens: u32) -> PropellerAdsResult<bool> {
        let mut state = self.state.lock();
        self.check_request(tokens, state.bucket_size)?;

        state.refill(self.clock.now());
        state.total_requests += 1;

        if state.has(tokens as f64) {
            state.take(tokens as f64);
            Ok(true)
        } else {
            state.blocked_requests += 1;
            trace!(
                tokens_available = state.tokens,
                requested = tokens,
                "Token bucket empty"
            );
            Ok(false)
        }
    }

    /// Take `tokens`, waiting for the bucket to refill if needed.
    ///
    /// Returns `Ok(false)` when the tokens cannot be obtained before
    /// `timeout` elapses; in that case nothing is deducted. `None` waits
    /// indefinitely.
    pub async fn acquire(&self, tokens: u32, timeout: Option<Duration>) -> PropellerAdsResult<bool> {
        let start = self.clock.now();
        let deadline = timeout.and_then(|t| start.checked_add(t));
        let mut counted = false;

        loop {
            let wait = {
                let mut state = self.state.lock();
                self.check_request(tokens, state.bucket_size)?;

                let now = self.clock.now();
                state.refill(now);
                if !counted {
                    state.total_requests += 1;
                    counted = true;
                }

                if state.has(tokens as f64) {
                    state.take(tokens as f64);
                    state.total_wait += now.saturating_duration_since(start);
                    return Ok(true);
                }

                let wait = state.time_until_available(tokens as f64);
                if let Some(deadline) = deadline {
                    if wait > deadline.saturating_duration_since(now) {
                        state.blocked_requests += 1;
                        debug!(
                            requested = tokens,
                            wait_ms = wait.as_millis() as u64,
                            "Rate limiter wait would exceed timeout"
                        );
                        return Ok(false);
                    }
                }
                wait
            };

            self.clock.sleep(wait.min(MAX_SLEEP_INCREMENT)).await;
        }
    }

    /// How long until `tokens` would be available
    pub fn wait_for_capacity(&self, tokens: u32) -> Duration {
        let state = self.state.lock();
        let available = state.projected_tokens(self.clock.now());
        if available >= tokens as f64 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((tokens as f64 - available) / state.refill_rate)
        }
    }

    /// Change the steady-state rate.
    ///
    /// Tokens accrued so far are credited at the old rate, then clamped to the
    /// new bucket size.
    pub fn set_rate(&self, max_requests: u32, window: Duration) -> PropellerAdsResult<()> {
        let mut state = self.state.lock();
        validate_rate(max_requests, window, state.burst_multiplier)?;

        state.refill(self.clock.now());
        state.max_requests = max_requests;
        state.window = window;
        state.bucket_size = bucket_size(max_requests, state.burst_multiplier);
        state.refill_rate = max_requests as f64 / window.as_secs_f64();
        state.tokens = state.tokens.min(state.bucket_size as f64);

        debug!(
            max_requests,
            window_secs = window.as_secs_f64(),
            bucket_size = state.bucket_size,
            "Rate limit updated"
        );
        Ok(())
    }

    /// Refill the bucket and clear statistics
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.tokens = state.bucket_size as f64;
        state.last_refill = self.clock.now();
        state.total_requests = 0;
        state.blocked_requests = 0;
        state.total_wait = Duration::ZERO;
    }

    /// Current steady-state requests per window
    pub fn max_requests(&self) -> u32 {
        self.state.lock().max_requests
    }

    /// Current rate window
    pub fn window(&self) -> Duration {
        self.state.lock().window
    }

    /// Bucket capacity including burst
    pub fn bucket_size(&self) -> u32 {
        self.state.lock().bucket_size
    }

    /// Refill rate in tokens per second
    pub fn refill_rate(&self) -> f64 {
        self.state.lock().refill_rate
    }

    /// Snapshot of the limiter. Does not modify the bucket.
    pub fn get_status(&self) -> RateLimiterStatus {
        let state = self.state.lock();
        let tokens = state.projected_tokens(self.clock.now());
        let bucket = state.bucket_size as f64;
        let admitted = state.total_requests - state.blocked_requests;

        RateLimiterStatus {
            tokens_available: tokens,
            bucket_size: state.bucket_size,
            utilization_pct: (bucket - tokens) / bucket * 100.0,
            refill_rate: state.refill_rate,
            statistics: RateLimiterStatistics {
                total_requests: state.total_requests,
                blocked_requests: state.blocked_requests,
                success_rate_pct: admitted as f64 / state.total_requests.max(1) as f64 * 100.0,
                average_wait_secs: state.total_wait.as_secs_f64()
                    / state.total_requests.max(1) as f64,
            },
            configuration: RateLimiterSettings {
                max_requests: state.max_requests,
                window_secs: state.window.as_secs_f64(),
                burst_multiplier: state.burst_multiplier,
            },
        }
    }
}

/// Point-in-time view of a [`TokenBucketLimiter`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimiterStatus {
    /// Tokens currently available
    pub tokens_available: f64,
    /// Capacity including burst
    pub bucket_size: u32,
    /// Share of the bucket currently consumed
    pub utilization_pct: f64,
    /// Tokens added per second
    pub refill_rate: f64,
    /// Cumulative counters
    pub statistics: RateLimiterStatistics,
    /// Active settings
    pub configuration: RateLimiterSettings,
}

/// Cumulative limiter counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimiterStatistics {
    /// Admission attempts
    pub total_requests: u64,
    /// Attempts refused or timed out
    pub blocked_requests: u64,
    /// Share of attempts admitted
    pub success_rate_pct: f64,
    /// Mean time spent waiting for a token
    pub average_wait_secs: f64,
}

/// Settings the limiter is running with
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimiterSettings {
    /// Requests per window
    pub max_requests: u32,
    /// Window length in seconds
    pub window_secs: f64,
    /// Burst multiplier
    pub burst_multiplier: f64,
}
