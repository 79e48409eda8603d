use crate::resilience::clock::{Clock, SystemClock};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failures that open the circuit
    pub failure_threshold: u32,
    /// Time spent open before a probe request is admitted
    pub recovery_timeout: Duration,
    /// In the closed state, a success clears the failure count once this
    /// long has passed since the last failure. `None` never clears it.
    pub failure_window: Option<Duration>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            failure_window: Some(Duration::from_secs(60)),
        }
    }
}

/// Circuit breaker state
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed, requests flow normally
    Closed,
    /// Circuit is open, requests are blocked
    Open,
    /// Circuit is half-open, a single probe tests whether the service recovered
    HalfOpen,
}

/// Result of asking the breaker for admission
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Admission {
    /// Circuit closed
    Allowed,
    /// Caller holds the single half-open probe slot
    Probe,
    /// Circuit open, or a probe is already in flight
    Rejected,
}

impl Admission {
    /// Whether the request may proceed
    pub fn is_allowed(self) -> bool {
        !matches!(self, Admission::Rejected)
    }
}

struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
    opened_at: Option<Instant>,
    probe_started_at: Option<Instant>,
    total_trips: u64,
}

impl BreakerState {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure_time: None,
            opened_at: None,
            probe_started_at: None,
            total_trips: 0,
        }
    }
}

/// Circuit breaker implementation.
///
/// All state lives behind one mutex, so each transition is a single
/// compare-and-set and at most one half-open probe is ever in flight.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
    clock: Arc<dyn Clock>,
    hook: Option<Arc<dyn CircuitBreakerHook>>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a circuit breaker on the given clock
    pub fn with_clock(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config: CircuitBreakerConfig {
                failure_threshold: config.failure_threshold.max(1),
                ..config
            },
            inner: Mutex::new(BreakerState::closed()),
            clock,
            hook: None,
        }
    }

    /// Add a hook for circuit breaker state changes
    pub fn with_hook(mut self, hook: Arc<dyn CircuitBreakerHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Configuration in force
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Whether a request may proceed.
    ///
    /// Performs the open to half-open transition when the recovery timeout
    /// has elapsed; only the caller that performs it gets `true`.
    pub fn allow_request(&self) -> bool {
        self.admit().is_allowed()
    }

    /// Like [`allow_request`](Self::allow_request), but tells a probe apart
    /// from normal admission.
    pub fn admit(&self) -> Admission {
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        let state = inner.state;
        match state {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::Open => {
                let opened_at = inner.opened_at.unwrap_or(now);
                if now.saturating_duration_since(opened_at) >= self.config.recovery_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_started_at = Some(now);
                    drop(inner);
                    self.on_transition(CircuitState::Open, CircuitState::HalfOpen);
                    Admission::Probe
                } else {
                    Admission::Rejected
                }
            }
            CircuitState::HalfOpen => {
                // A probe that never reported back is released after another
                // recovery timeout.
                let expired = match inner.probe_started_at {
                    None => true,
                    Some(started) => {
                        now.saturating_duration_since(started) >= self.config.recovery_timeout
                    }
                };
                if expired {
                    inner.probe_started_at = Some(now);
                    Admission::Probe
                } else {
                    Admission::Rejected
                }
            }
        }
    }

    /// Release a probe slot without reporting an outcome.
    ///
    /// Used when a probe was granted but the request never reached the
    /// service, or ended in a way that says nothing about its health.
    pub fn abandon_probe(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.probe_started_at = None;
        }
    }

    /// Record a successful request
    pub fn record_success(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        let state = inner.state;
        match state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Closed;
                inner.failure_count = 0;
                inner.opened_at = None;
                inner.probe_started_at = None;
                drop(inner);
                self.on_transition(CircuitState::HalfOpen, CircuitState::Closed);
            }
            CircuitState::Closed => {
                if let (Some(window), Some(last)) = (self.config.failure_window, inner.last_failure_time) {
                    if now.saturating_duration_since(last) >= window {
                        inner.failure_count = 0;
                    }
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed request
    pub fn record_failure(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure_time = Some(now);

        let from = inner.state;
        let trips = match from {
            CircuitState::Closed => inner.failure_count >= self.config.failure_threshold,
            CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        };

        if trips {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(now);
            inner.probe_started_at = None;
            inner.total_trips += 1;
            let failures = inner.failure_count;
            drop(inner);

            warn!(
                failures,
                threshold = self.config.failure_threshold,
                recovery_timeout_secs = self.config.recovery_timeout.as_secs_f64(),
                "Circuit breaker opened"
            );
            self.on_transition(from, CircuitState::Open);
        }
    }

    /// Get the current state of the circuit breaker
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Failures recorded since the circuit last closed
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    /// Get the time until the circuit admits a probe, if it is open
    pub fn time_until_half_open(&self) -> Option<Duration> {
        let inner = self.inner.lock();
        self.remaining_open(&inner, self.clock.now())
    }

    fn remaining_open(&self, inner: &BreakerState, now: Instant) -> Option<Duration> {
        if inner.state != CircuitState::Open {
            return None;
        }
        let elapsed = inner
            .opened_at
            .map(|opened| now.saturating_duration_since(opened))
            .unwrap_or(self.config.recovery_timeout);
        Some(self.config.recovery_timeout.saturating_sub(elapsed))
    }

    /// Force the circuit closed and clear all counters except `total_trips`
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        let from = inner.state;
        let total_trips = inner.total_trips;
        *inner = BreakerState {
            total_trips,
            ..BreakerState::closed()
        };
        drop(inner);

        if from != CircuitState::Closed {
            self.on_transition(from, CircuitState::Closed);
        }
    }

    /// Snapshot of the breaker. Does not modify its state.
    pub fn get_status(&self) -> CircuitBreakerStatus {
        let now = self.clock.now();
        let inner = self.inner.lock();

        CircuitBreakerStatus {
            state: inner.state,
            failure_count: inner.failure_count,
            failure_threshold: self.config.failure_threshold,
            recovery_timeout_secs: self.config.recovery_timeout.as_secs_f64(),
            seconds_since_last_failure: inner
                .last_failure_time
                .map(|last| now.saturating_duration_since(last).as_secs_f64()),
            seconds_until_half_open: self
                .remaining_open(&inner, now)
                .map(|remaining| remaining.as_secs_f64()),
            probe_in_flight: inner.state == CircuitState::HalfOpen
                && inner.probe_started_at.is_some(),
            total_trips: inner.total_trips,
        }
    }

    fn on_transition(&self, old: CircuitState, new: CircuitState) {
        match new {
            CircuitState::HalfOpen => info!("Circuit breaker half-open, admitting probe request"),
            CircuitState::Closed => info!(from = ?old, "Circuit breaker closed"),
            CircuitState::Open => {}
        }
        if let Some(hook) = &self.hook {
            hook.on_state_change(old, new);
        }
    }
}

/// Hook for circuit breaker state changes.
///
/// Called after the breaker lock has been released.
pub trait CircuitBreakerHook: Send + Sync {
    fn on_state_change(&self, old_state: CircuitState, new_state: CircuitState);
}

/// Point-in-time view of a [`CircuitBreaker`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitBreakerStatus {
    pub state: CircuitState,
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub recovery_timeout_secs: f64,
    pub seconds_since_last_failure: Option<f64>,
    pub seconds_until_half_open: Option<f64>,
    pub probe_in_flight: bool,
    pub total_trips: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::clock::MockClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn breaker(threshold: u32, recovery_secs: u64) -> (CircuitBreaker, Arc<MockClock>) {
        let clock = Arc::new(MockClock::new());
        let config = CircuitBreakerConfig {
            failure_threshold: threshold,
            recovery_timeout: Duration::from_secs(recovery_secs),
            failure_window: None,
        };
        (CircuitBreaker::with_clock(config, clock.clone()), clock)
    }

    #[test]
    fn test_circuit_breaker_starts_closed() {
        let (cb, _) = breaker(5, 60);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.allow_request());
        assert_eq!(cb.admit(), Admission::Allowed);
    }

    #[test]
    fn test_full_recovery_cycle() {
        let (cb, clock) = breaker(3, 60);

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow_request());

        clock.advance(Duration::from_secs(61));
        assert!(cb.allow_request());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[test]
    fn test_only_one_probe_admitted() {
        let (cb, clock) = breaker(1, 10);
        cb.record_failure();
        clock.advance(Duration::from_secs(10));

        assert_eq!(cb.admit(), Admission::Probe);
        assert_eq!(cb.admit(), Admission::Rejected);
        assert!(!cb.allow_request());
        assert!(cb.get_status().probe_in_flight);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let (cb, clock) = breaker(2, 10);
        cb.record_failure();
        cb.record_failure();
        clock.advance(Duration::from_secs(10));
        assert!(cb.allow_request());

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow_request());
        assert_eq!(cb.time_until_half_open(), Some(Duration::from_secs(10)));

        clock.advance(Duration::from_secs(10));
        assert!(cb.allow_request());
        assert_eq!(cb.get_status().total_trips, 2);
    }

    #[test]
    fn test_abandoned_probe_is_released() {
        let (cb, clock) = breaker(1, 10);
        cb.record_failure();
        clock.advance(Duration::from_secs(10));
        assert_eq!(cb.admit(), Admission::Probe);

        cb.abandon_probe();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert_eq!(cb.admit(), Admission::Probe);
        assert_eq!(cb.admit(), Admission::Rejected);
    }

    #[test]
    fn test_lost_probe_expires_after_recovery_timeout() {
        let (cb, clock) = breaker(1, 10);
        cb.record_failure();
        clock.advance(Duration::from_secs(10));
        assert_eq!(cb.admit(), Admission::Probe);

        clock.advance(Duration::from_secs(9));
        assert_eq!(cb.admit(), Admission::Rejected);
        clock.advance(Duration::from_secs(1));
        assert_eq!(cb.admit(), Admission::Probe);
    }

    #[test]
    fn test_success_does_not_decay_without_window() {
        let (cb, clock) = breaker(3, 60);
        cb.record_failure();
        cb.record_failure();
        clock.advance(Duration::from_secs(3600));
        cb.record_success();
        assert_eq!(cb.failure_count(), 2);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_success_clears_failures_after_window() {
        let clock = Arc::new(MockClock::new());
        let cb = CircuitBreaker::with_clock(
            CircuitBreakerConfig {
                failure_threshold: 3,
                recovery_timeout: Duration::from_secs(60),
                failure_window: Some(Duration::from_secs(30)),
            },
            clock.clone(),
        );

        cb.record_failure();
        cb.record_failure();
        clock.advance(Duration::from_secs(10));
        cb.record_success();
        assert_eq!(cb.failure_count(), 2);

        clock.advance(Duration::from_secs(20));
        cb.record_success();
        assert_eq!(cb.failure_count(), 0);
    }

    #[test]
    fn test_get_status_is_read_only() {
        let (cb, clock) = breaker(1, 60);
        cb.record_failure();
        clock.advance(Duration::from_secs(90));

        let first = cb.get_status();
        let second = cb.get_status();
        assert_eq!(first, second);
        assert_eq!(first.state, CircuitState::Open);
        assert_eq!(first.seconds_until_half_open, Some(0.0));
        assert_eq!(first.seconds_since_last_failure, Some(90.0));
        // Reading the status did not start the probe
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_reset() {
        let (cb, _) = breaker(1, 60);
        cb.record_failure();
        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
        assert_eq!(cb.get_status().total_trips, 1);
    }

    #[test]
    fn test_concurrent_probe_admission() {
        let (cb, clock) = breaker(1, 5);
        cb.record_failure();
        clock.advance(Duration::from_secs(5));
        let cb = Arc::new(cb);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cb = cb.clone();
                std::thread::spawn(move || cb.allow_request())
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|allowed| *allowed)
            .count();
        assert_eq!(admitted, 1);
    }

    struct CountingHook {
        opened: AtomicUsize,
        closed: AtomicUsize,
    }

    impl CircuitBreakerHook for CountingHook {
        fn on_state_change(&self, old_state: CircuitState, new_state: CircuitState) {
            if old_state == CircuitState::Closed && new_state == CircuitState::Open {
                self.opened.fetch_add(1, Ordering::SeqCst);
            }
            if new_state == CircuitState::Closed {
                self.closed.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn test_circuit_breaker_hook() {
        let hook = Arc::new(CountingHook {
            opened: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
        });
        let (cb, clock) = breaker(2, 10);
        let cb = cb.with_hook(hook.clone());

        cb.record_failure();
        cb.record_failure();
        assert_eq!(hook.opened.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(10));
        assert!(cb.allow_request());
        cb.record_success();
        assert_eq!(hook.closed.load(Ordering::SeqCst), 1);
    }
}
