//! Self-tuning wrapper around [`TokenBucketLimiter`].
//!
//! Watches response status codes and latency. Server rate limits and
//! sustained errors slow the bucket down; a quiet, fast service lets it
//! climb back toward the configured rate.

use crate::errors::PropellerAdsResult;
use crate::resilience::rate_limiter::{RateLimiterStatus, TokenBucketLimiter};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Number of recent responses the error rate is computed over.
const RESPONSE_WINDOW: usize = 10;
/// Multiplier applied on a server 429 without a hint.
const ADAPTATION_FACTOR: f64 = 0.8;
/// Multiplier applied when the recent error rate is high.
const ERROR_BACKOFF_FACTOR: f64 = 0.9;
/// Multiplier applied while recovering toward the base rate.
const RECOVERY_FACTOR: f64 = 1.05;
const HIGH_ERROR_RATE: f64 = 0.2;
const LOW_ERROR_RATE: f64 = 0.05;
const SLOW_RESPONSE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
struct ResponseSample {
    is_error: bool,
    response_time: Duration,
}

/// Adjusts the rate of a shared [`TokenBucketLimiter`] from observed responses.
pub struct AdaptiveRateLimiter {
    limiter: Arc<TokenBucketLimiter>,
    base_rate: u32,
    min_rate: u32,
    recent: Mutex<VecDeque<ResponseSample>>,
}

impl AdaptiveRateLimiter {
    /// Wrap `limiter`; its current rate becomes the ceiling for recovery.
    pub fn new(limiter: Arc<TokenBucketLimiter>) -> Self {
        let base_rate = limiter.max_requests();
        Self {
            limiter,
            base_rate,
            min_rate: (base_rate / 10).max(1),
            recent: Mutex::new(VecDeque::with_capacity(RESPONSE_WINDOW)),
        }
    }

    /// The wrapped limiter
    pub fn limiter(&self) -> &Arc<TokenBucketLimiter> {
        &self.limiter
    }

    /// Feed one response back.
    ///
    /// Returns the new requests-per-window value when the rate changed.
    pub fn record_response(
        &self,
        status: u16,
        response_time: Duration,
        retry_after: Option<Duration>,
    ) -> PropellerAdsResult<Option<u32>> {
        // Held until the new rate is written.
        let mut recent = self.recent.lock();
        let current = self.limiter.max_requests();

        let target = {
            if recent.len() == RESPONSE_WINDOW {
                recent.pop_front();
            }
            recent.push_back(ResponseSample {
                is_error: status >= 400,
                response_time,
            });

            let error_rate = error_rate(&recent);

            if status == 429 {
                let reduced = match retry_after.filter(|d| !d.is_zero()) {
                    Some(hint) => {
                        let window = self.limiter.window().as_secs_f64();
                        (window / hint.as_secs_f64()).floor().min(u32::MAX as f64) as u32
                    }
                    None => (current as f64 * ADAPTATION_FACTOR) as u32,
                };
                Some(reduced.clamp(self.min_rate, current.max(self.min_rate)))
            } else if status >= 400 {
                if error_rate > HIGH_ERROR_RATE {
                    Some(((current as f64 * ERROR_BACKOFF_FACTOR) as u32).max(self.min_rate))
                } else {
                    None
                }
            } else if recent.len() == RESPONSE_WINDOW
                && current < self.base_rate
                && error_rate < LOW_ERROR_RATE
                && average_response_time(&recent) < SLOW_RESPONSE
            {
                let grown = ((current as f64 * RECOVERY_FACTOR) as u32).max(current + 1);
                Some(grown.min(self.base_rate))
            } else {
                None
            }
        };

        match target {
            Some(rate) if rate != current => {
                self.limiter.set_rate(rate, self.limiter.window())?;
                drop(recent);
                if rate < current {
                    warn!(from = current, to = rate, status, "Reducing request rate");
                } else {
                    info!(from = current, to = rate, "Recovering request rate");
                }
                Ok(Some(rate))
            }
            _ => Ok(None),
        }
    }

    /// Limiter status plus adaptation state
    pub fn get_adaptive_status(&self) -> AdaptiveStatus {
        let recent = self.recent.lock();
        let current_rate = self.limiter.max_requests();

        AdaptiveStatus {
            limiter: self.limiter.get_status(),
            base_rate: self.base_rate,
            current_rate,
            min_rate: self.min_rate,
            recent_error_rate_pct: error_rate(&recent) * 100.0,
            average_response_secs: average_response_time(&recent).as_secs_f64(),
            adaptation_active: current_rate != self.base_rate,
        }
    }
}

fn error_rate(samples: &VecDeque<ResponseSample>) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().filter(|s| s.is_error).count() as f64 / samples.len() as f64
}

fn average_response_time(samples: &VecDeque<ResponseSample>) -> Duration {
    if samples.is_empty() {
        return Duration::ZERO;
    }
    samples.iter().map(|s| s.response_time).sum::<Duration>() / samples.len() as u32
}

/// Snapshot of an [`AdaptiveRateLimiter`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdaptiveStatus {
    /// Status of the wrapped bucket
    pub limiter: RateLimiterStatus,
    /// Configured requests per window
    pub base_rate: u32,
    /// Requests per window currently in force
    pub current_rate: u32,
    /// Floor the rate never drops below
    pub min_rate: u32,
    /// Error share across the recent response window
    pub recent_error_rate_pct: f64,
    /// Mean response time across the recent response window
    pub average_response_secs: f64,
    /// Whether the rate currently differs from the base rate
    pub adaptation_active: bool,
}
