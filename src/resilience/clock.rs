//! Time source used by the limiter, breaker and executor.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::time::{Duration, Instant};

/// Source of the current time and of delays.
///
/// Everything time dependent in the resilience layer goes through this trait
/// so tests can drive it deterministically with [`MockClock`].
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> Instant;

    /// Suspend the caller for `duration`
    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `std::time::Instant` and `tokio::time::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Manually driven clock.
///
/// `sleep` advances the clock by the requested duration instead of waiting,
/// and records the duration so tests can assert on backoff behaviour.
pub struct MockClock {
    current: Mutex<Instant>,
    sleeps: Mutex<Vec<Duration>>,
}

impl MockClock {
    /// Create a clock frozen at the current instant
    pub fn new() -> Self {
        Self {
            current: Mutex::new(Instant::now()),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, duration: Duration) {
        let mut current = self.current.lock();
        *current += duration;
    }

    /// Move the clock backwards, simulating a non-monotonic time source
    pub fn rewind(&self, duration: Duration) {
        let mut current = self.current.lock();
        if let Some(earlier) = current.checked_sub(duration) {
            *current = earlier;
        }
    }

    /// Every duration passed to [`Clock::sleep`] so far, in call order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }

    /// Sum of all recorded sleeps
    pub fn total_slept(&self) -> Duration {
        self.sleeps.lock().iter().sum()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MockClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockClock")
            .field("sleeps", &self.sleeps.lock().len())
            .finish()
    }
}

#[async_trait]
impl Clock for MockClock {
    fn now(&self) -> Instant {
        *self.current.lock()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}
