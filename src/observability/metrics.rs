//! Metrics collection for API usage tracking.
//!
//! [`ClientMetrics`] keeps the cumulative counters every client exposes
//! through [`MetricsSummary`]. A [`MetricsCollector`] receives the same
//! events with labels, for export to an external metrics system.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Sink for labelled metrics.
pub trait MetricsCollector: Send + Sync {
    /// Increments a counter by the given value.
    ///
    /// # Arguments
    ///
    /// * `name` - The name of the counter
    /// * `value` - The value to add to the counter
    /// * `labels` - Optional key-value labels for the metric
    fn increment_counter(&self, name: &str, value: u64, labels: &[(&str, &str)]);

    /// Records a value in a histogram.
    fn record_histogram(&self, name: &str, value: f64, labels: &[(&str, &str)]);

    /// Sets a gauge to the given value.
    fn set_gauge(&self, name: &str, value: f64, labels: &[(&str, &str)]);
}

/// In-memory metrics collector for testing and simple use cases.
#[derive(Default)]
pub struct InMemoryMetricsCollector {
    counters: RwLock<HashMap<String, AtomicU64>>,
    histograms: RwLock<HashMap<String, Vec<f64>>>,
    gauges: RwLock<HashMap<String, f64>>,
}

impl InMemoryMetricsCollector {
    /// Creates a new in-memory metrics collector.
    ///
    /// # Examples
    ///
    /// ```
    /// use integrations_propellerads::observability::{
    ///     metric_names, InMemoryMetricsCollector, MetricsCollector,
    /// };
    ///
    /// let collector = InMemoryMetricsCollector::new();
    /// collector.increment_counter(metric_names::REQUEST_COUNT, 1, &[]);
    /// assert_eq!(collector.get_counter(metric_names::REQUEST_COUNT), 1);
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the current value of a counter, 0 if it was never incremented.
    ///
    /// Labelled counters are addressed as `name:key=value,...`.
    pub fn get_counter(&self, name: &str) -> u64 {
        self.counters
            .read()
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Gets all recorded values for a histogram.
    pub fn get_histogram(&self, name: &str) -> Vec<f64> {
        self.histograms
            .read()
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    /// Gets the current value of a gauge.
    pub fn get_gauge(&self, name: &str) -> Option<f64> {
        self.gauges.read().get(name).copied()
    }

    /// Resets all metrics.
    pub fn reset(&self) {
        self.counters.write().clear();
        self.histograms.write().clear();
        self.gauges.write().clear();
    }

    fn make_key(name: &str, labels: &[(&str, &str)]) -> String {
        if labels.is_empty() {
            name.to_string()
        } else {
            let label_str: Vec<String> = labels
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            format!("{}:{}", name, label_str.join(","))
        }
    }
}

impl MetricsCollector for InMemoryMetricsCollector {
    fn increment_counter(&self, name: &str, value: u64, labels: &[(&str, &str)]) {
        let key = Self::make_key(name, labels);
        if let Some(counter) = self.counters.read().get(&key) {
            counter.fetch_add(value, Ordering::Relaxed);
            return;
        }
        self.counters
            .write()
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(value, Ordering::Relaxed);
    }

    fn record_histogram(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        let key = Self::make_key(name, labels);
        self.histograms.write().entry(key).or_default().push(value);
    }

    fn set_gauge(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        let key = Self::make_key(name, labels);
        self.gauges.write().insert(key, value);
    }
}

/// Metrics collector that discards everything.
pub struct NoopMetricsCollector;

impl MetricsCollector for NoopMetricsCollector {
    fn increment_counter(&self, _name: &str, _value: u64, _labels: &[(&str, &str)]) {}
    fn record_histogram(&self, _name: &str, _value: f64, _labels: &[(&str, &str)]) {}
    fn set_gauge(&self, _name: &str, _value: f64, _labels: &[(&str, &str)]) {}
}

/// Metric names emitted by the request executor.
pub mod metric_names {
    /// Logical requests submitted to `execute`
    pub const REQUEST_COUNT: &str = "propellerads.requests.total";

    /// Duration of each transport attempt in milliseconds
    pub const REQUEST_DURATION_MS: &str = "propellerads.requests.duration_ms";

    /// Requests that ended in an error, labelled by category
    pub const REQUEST_ERRORS: &str = "propellerads.requests.errors";

    /// Requests refused by the local token bucket
    pub const RATE_LIMIT_REJECTIONS: &str = "propellerads.rate_limit.rejections";

    /// HTTP 429 responses received
    pub const SERVER_RATE_LIMITED: &str = "propellerads.rate_limit.server_429";

    /// Requests refused by the open circuit breaker
    pub const CIRCUIT_REJECTIONS: &str = "propellerads.circuit_breaker.rejections";

    /// Current state of the circuit breaker (0=closed, 1=open, 2=half-open)
    pub const CIRCUIT_BREAKER_STATE: &str = "propellerads.circuit_breaker.state";

    /// Retry attempts made
    pub const RETRY_ATTEMPTS: &str = "propellerads.retry.attempts";

    /// Requests-per-window currently enforced by the limiter
    pub const RATE_LIMIT_CURRENT: &str = "propellerads.rate_limit.current";
}

/// Cumulative request counters kept by every executor.
#[derive(Debug, Default)]
pub struct ClientMetrics {
    total_requests: AtomicU64,
    successes: AtomicU64,
    errors: AtomicU64,
    retries: AtomicU64,
    circuit_rejections: AtomicU64,
    local_rate_limit_rejections: AtomicU64,
    server_rate_limited: AtomicU64,
    attempts: AtomicU64,
    response_time_micros: AtomicU64,
}

impl ClientMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_circuit_rejection(&self) {
        self.circuit_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_local_rate_limit(&self) {
        self.local_rate_limit_rejections
            .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_server_rate_limited(&self) {
        self.server_rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_attempt(&self, elapsed: Duration) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        self.response_time_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    /// Snapshot of all counters
    pub fn summary(&self) -> MetricsSummary {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let successes = self.successes.load(Ordering::Relaxed);
        let attempts = self.attempts.load(Ordering::Relaxed);
        let response_micros = self.response_time_micros.load(Ordering::Relaxed);

        MetricsSummary {
            total_requests,
            successes,
            total_errors: self.errors.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            circuit_rejections: self.circuit_rejections.load(Ordering::Relaxed),
            local_rate_limit_rejections: self.local_rate_limit_rejections.load(Ordering::Relaxed),
            server_rate_limited: self.server_rate_limited.load(Ordering::Relaxed),
            success_rate_pct: if total_requests == 0 {
                0.0
            } else {
                successes as f64 / total_requests as f64 * 100.0
            },
            average_response_secs: if attempts == 0 {
                0.0
            } else {
                response_micros as f64 / attempts as f64 / 1_000_000.0
            },
        }
    }
}

/// Cumulative request counters of one client
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    /// Logical requests submitted
    pub total_requests: u64,
    /// Requests that returned a response below 400
    pub successes: u64,
    /// Requests that ended in any error
    pub total_errors: u64,
    /// Extra transport attempts made by the retry loop
    pub retries: u64,
    /// Requests refused by the circuit breaker
    pub circuit_rejections: u64,
    /// Requests refused by the local rate limiter
    pub local_rate_limit_rejections: u64,
    /// 429 responses received
    pub server_rate_limited: u64,
    pub success_rate_pct: f64,
    /// Mean duration of a transport attempt
    pub average_response_secs: f64,
}
