use crate::auth::AuthManager;
use crate::errors::{PropellerAdsError, PropellerAdsResult};
use crate::observability::{
    log_error, log_request, log_response, metric_names, ClientMetrics, MetricsCollector,
    MetricsSummary, NoopMetricsCollector,
};
use crate::resilience::adaptive::AdaptiveRateLimiter;
use crate::resilience::circuit_breaker::{
    Admission, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerHook, CircuitBreakerStatus,
    CircuitState,
};
use crate::resilience::clock::{Clock, SystemClock};
use crate::resilience::outcome::{RequestOutcome, REQUEST_ID_HEADER};
use crate::resilience::rate_limiter::{RateLimitConfig, RateLimiterStatus, TokenBucketLimiter};
use crate::resilience::retry::{RetryConfig, RetryDecision, RetryHook, RetryPolicy};
use crate::transport::{ApiRequest, HttpTransport};
use bytes::Bytes;
use chrono::Utc;
use http::header::HeaderValue;
use http::{HeaderMap, Response};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Configuration for resilience behavior
#[derive(Debug, Clone, Default)]
pub struct ResilienceConfig {
    pub rate_limit: RateLimitConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry: RetryConfig,
}

impl ResilienceConfig {
    /// Settings that disable every resilience feature: no effective rate
    /// limit, a breaker that never opens, and a single attempt.
    pub fn passthrough() -> Self {
        Self {
            rate_limit: RateLimitConfig {
                max_requests: u32::MAX / 2,
                window: Duration::from_secs(1),
                burst_multiplier: 1.0,
                acquire_timeout: None,
                adaptive: false,
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: u32::MAX,
                ..Default::default()
            },
            retry: RetryConfig {
                max_attempts: 1,
                ..Default::default()
            },
        }
    }

    /// Check every component's settings
    pub fn validate(&self) -> PropellerAdsResult<()> {
        self.rate_limit.validate()?;
        self.retry.validate()?;
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(PropellerAdsError::Configuration {
                message: "failure_threshold must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Single entry point for every API call.
///
/// Each call passes the circuit breaker, then the token bucket, then up to
/// `max_attempts` transport attempts. Outcomes are fed back into the
/// breaker and, when enabled, the adaptive rate limiter.
pub struct RequestExecutor {
    transport: Arc<dyn HttpTransport>,
    auth: Option<Arc<dyn AuthManager>>,
    base_url: Url,
    default_timeout: Duration,
    acquire_timeout: Option<Duration>,
    rate_limiter: Arc<TokenBucketLimiter>,
    adaptive: Option<AdaptiveRateLimiter>,
    circuit_breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    retry_hook: Option<Arc<dyn RetryHook>>,
    clock: Arc<dyn Clock>,
    metrics: ClientMetrics,
    collector: Arc<dyn MetricsCollector>,
    request_seq: AtomicU64,
}

impl RequestExecutor {
    /// Create a builder for configuring the executor
    pub fn builder() -> RequestExecutorBuilder {
        RequestExecutorBuilder::new()
    }

    /// Send `request` through the breaker, the limiter and the retry loop.
    ///
    /// # Errors
    ///
    /// - [`PropellerAdsError::CircuitOpen`] when the breaker refuses the call
    /// - [`PropellerAdsError::RateLimitExceeded`] when no token was available
    ///   within the acquire timeout
    /// - the classified error itself for non-retryable failures
    /// - [`PropellerAdsError::RetriesExhausted`] once retryable failures use
    ///   up every attempt
    pub async fn execute(&self, request: ApiRequest) -> PropellerAdsResult<Response<Bytes>> {
        self.metrics.record_request();
        self.collector.increment_counter(
            metric_names::REQUEST_COUNT,
            1,
            &[("method", request.method.as_str())],
        );

        let result = self.run(request).await;

        match &result {
            Ok(_) => self.metrics.record_success(),
            Err(error) => {
                self.metrics.record_error();
                self.collector.increment_counter(
                    metric_names::REQUEST_ERRORS,
                    1,
                    &[("category", error.category().as_str())],
                );
                log_error(error, "execute");
            }
        }
        self.publish_gauges();

        result
    }

    async fn run(&self, request: ApiRequest) -> PropellerAdsResult<Response<Bytes>> {
        let url = self.build_url(&request)?;
        let base_headers = match &self.auth {
            Some(auth) => auth.get_headers()?,
            None => HeaderMap::new(),
        };
        let timeout = request.timeout.unwrap_or(self.default_timeout);

        let admission = self.circuit_breaker.admit();
        if admission == Admission::Rejected {
            self.metrics.record_circuit_rejection();
            self.collector
                .increment_counter(metric_names::CIRCUIT_REJECTIONS, 1, &[]);
            let retry_in = self.circuit_breaker.time_until_half_open();
            debug!(path = %request.path, ?retry_in, "Circuit breaker rejected request");
            return Err(PropellerAdsError::CircuitOpen {
                message: format!("{} {} not sent", request.method, request.path),
                failure_count: self.circuit_breaker.failure_count(),
                retry_in,
            });
        }
        let mut probe = ProbeGuard {
            breaker: &self.circuit_breaker,
            armed: admission == Admission::Probe,
        };

        if !self.rate_limiter.acquire(1, self.acquire_timeout).await? {
            self.metrics.record_local_rate_limit();
            self.collector
                .increment_counter(metric_names::RATE_LIMIT_REJECTIONS, 1, &[]);
            return Err(PropellerAdsError::RateLimitExceeded {
                message: format!(
                    "no request capacity for {} {} within the acquire timeout",
                    request.method, request.path
                ),
                waited: self.acquire_timeout,
            });
        }

        let request_id = self.next_request_id();
        let mut headers = base_headers;
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            headers.insert(REQUEST_ID_HEADER, value);
        }

        let mut attempt: u32 = 0;
        let last_error = loop {
            log_request(request.method.as_str(), url.as_str(), attempt, &request_id);

            let started = self.clock.now();
            let result = self
                .transport
                .send(
                    request.method.clone(),
                    url.clone(),
                    headers.clone(),
                    request.body.clone(),
                    timeout,
                )
                .await;
            let elapsed = self.clock.now().saturating_duration_since(started);

            self.metrics.record_attempt(elapsed);
            self.collector.record_histogram(
                metric_names::REQUEST_DURATION_MS,
                elapsed.as_secs_f64() * 1000.0,
                &[("method", request.method.as_str())],
            );

            let outcome = RequestOutcome::classify(result, Some(&request_id));
            self.feed_adaptive(&outcome, elapsed);

            let retry = self.retry.should_retry(attempt, &outcome);
            let retry_after = outcome.retry_after();

            let error = match outcome {
                RequestOutcome::Success(response) => {
                    self.circuit_breaker.record_success();
                    probe.disarm();
                    log_response(
                        response.status().as_u16(),
                        elapsed,
                        &request_id,
                        Some(&response.body()[..]),
                    );
                    return Ok(response);
                }
                RequestOutcome::FatalError(error) => return Err(error),
                RequestOutcome::ServerRateLimited { error, .. } => {
                    self.metrics.record_server_rate_limited();
                    self.collector
                        .increment_counter(metric_names::SERVER_RATE_LIMITED, 1, &[]);
                    error
                }
                RequestOutcome::RetryableError(error) | RequestOutcome::TransportError(error) => {
                    self.circuit_breaker.record_failure();
                    probe.disarm();
                    error
                }
            };

            if !retry {
                break error;
            }

            let mut delay = self.retry.delay_for(attempt, retry_after);
            if let Some(hook) = &self.retry_hook {
                match hook.on_retry(self.retry.context(attempt), &error, delay).await {
                    RetryDecision::Abort => break error,
                    RetryDecision::Retry(custom) => delay = custom,
                    RetryDecision::Default => {}
                }
            }

            warn!(
                request_id = %request_id,
                attempt,
                max_attempts = self.retry.max_attempts(),
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying request"
            );
            self.metrics.record_retry();
            self.collector
                .increment_counter(metric_names::RETRY_ATTEMPTS, 1, &[]);

            self.clock.sleep(delay).await;
            attempt += 1;
        };

        Err(PropellerAdsError::RetriesExhausted {
            attempts: attempt + 1,
            last: Box::new(last_error),
        })
    }

    fn feed_adaptive(&self, outcome: &RequestOutcome, elapsed: Duration) {
        let (Some(adaptive), Some(status)) = (&self.adaptive, outcome.status()) else {
            return;
        };
        if let Err(error) = adaptive.record_response(status, elapsed, outcome.retry_after()) {
            warn!(error = %error, "Failed to adjust request rate");
        }
    }

    fn build_url(&self, request: &ApiRequest) -> PropellerAdsResult<Url> {
        if request.path.contains("://") {
            return Err(PropellerAdsError::InvalidArgument {
                message: format!("path must be relative to the base URL: {}", request.path),
            });
        }

        let mut url = self.base_url.join(request.path.trim_start_matches('/'))?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(
                request
                    .query
                    .iter()
                    .map(|(key, value)| (key.as_str(), value.as_str())),
            );
        }
        Ok(url)
    }

    fn next_request_id(&self) -> String {
        let seq = self.request_seq.fetch_add(1, Ordering::Relaxed) + 1;
        format!("req_{}_{}", Utc::now().timestamp_millis(), seq)
    }

    fn publish_gauges(&self) {
        let state = match self.circuit_breaker.state() {
            CircuitState::Closed => 0.0,
            CircuitState::Open => 1.0,
            CircuitState::HalfOpen => 2.0,
        };
        self.collector
            .set_gauge(metric_names::CIRCUIT_BREAKER_STATE, state, &[]);
        self.collector.set_gauge(
            metric_names::RATE_LIMIT_CURRENT,
            self.rate_limiter.max_requests() as f64,
            &[],
        );
    }

    /// Get a reference to the rate limiter
    pub fn rate_limiter(&self) -> &Arc<TokenBucketLimiter> {
        &self.rate_limiter
    }

    /// The adaptive wrapper, when adaptive limiting is enabled
    pub fn adaptive(&self) -> Option<&AdaptiveRateLimiter> {
        self.adaptive.as_ref()
    }

    /// Get a reference to the circuit breaker
    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.circuit_breaker
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Time source shared by the limiter, breaker and backoff sleeps
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn get_rate_limiter_status(&self) -> RateLimiterStatus {
        self.rate_limiter.get_status()
    }

    pub fn get_circuit_breaker_status(&self) -> CircuitBreakerStatus {
        self.circuit_breaker.get_status()
    }

    /// Cumulative request counters
    pub fn metrics_summary(&self) -> MetricsSummary {
        self.metrics.summary()
    }
}

/// Releases a half-open probe slot if the request ends, or is dropped,
/// before the breaker hears about its outcome.
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl ProbeGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.abandon_probe();
        }
    }
}

/// Builder for [`RequestExecutor`]
pub struct RequestExecutorBuilder {
    transport: Option<Arc<dyn HttpTransport>>,
    auth: Option<Arc<dyn AuthManager>>,
    base_url: String,
    timeout: Duration,
    resilience: ResilienceConfig,
    clock: Option<Arc<dyn Clock>>,
    collector: Option<Arc<dyn MetricsCollector>>,
    retry_hook: Option<Arc<dyn RetryHook>>,
    circuit_breaker_hook: Option<Arc<dyn CircuitBreakerHook>>,
}

impl RequestExecutorBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self {
            transport: None,
            auth: None,
            base_url: crate::DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(crate::DEFAULT_TIMEOUT_SECS),
            resilience: ResilienceConfig::default(),
            clock: None,
            collector: None,
            retry_hook: None,
            circuit_breaker_hook: None,
        }
    }

    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn auth(mut self, auth: Arc<dyn AuthManager>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Default per-attempt timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn resilience(mut self, resilience: ResilienceConfig) -> Self {
        self.resilience = resilience;
        self
    }

    /// Set the retry configuration
    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.resilience.retry = config;
        self
    }

    /// Set the circuit breaker configuration
    pub fn circuit_breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.resilience.circuit_breaker = config;
        self
    }

    /// Set the rate limit configuration
    pub fn rate_limit_config(mut self, config: RateLimitConfig) -> Self {
        self.resilience.rate_limit = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn metrics_collector(mut self, collector: Arc<dyn MetricsCollector>) -> Self {
        self.collector = Some(collector);
        self
    }

    pub fn retry_hook(mut self, hook: Arc<dyn RetryHook>) -> Self {
        self.retry_hook = Some(hook);
        self
    }

    pub fn circuit_breaker_hook(mut self, hook: Arc<dyn CircuitBreakerHook>) -> Self {
        self.circuit_breaker_hook = Some(hook);
        self
    }

    /// Build the executor
    pub fn build(self) -> PropellerAdsResult<RequestExecutor> {
        let transport = self.transport.ok_or_else(|| PropellerAdsError::Configuration {
            message: "transport is required".to_string(),
        })?;
        self.resilience.validate()?;
        if self.timeout.is_zero() {
            return Err(PropellerAdsError::Configuration {
                message: "timeout must be greater than zero".to_string(),
            });
        }

        let base_url = normalize_base_url(&self.base_url)?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let rate_limiter = Arc::new(TokenBucketLimiter::from_config(
            &self.resilience.rate_limit,
            clock.clone(),
        )?);
        let adaptive = self
            .resilience
            .rate_limit
            .adaptive
            .then(|| AdaptiveRateLimiter::new(rate_limiter.clone()));

        let mut circuit_breaker =
            CircuitBreaker::with_clock(self.resilience.circuit_breaker.clone(), clock.clone());
        if let Some(hook) = self.circuit_breaker_hook {
            circuit_breaker = circuit_breaker.with_hook(hook);
        }

        Ok(RequestExecutor {
            transport,
            auth: self.auth,
            base_url,
            default_timeout: self.timeout,
            acquire_timeout: self.resilience.rate_limit.acquire_timeout,
            rate_limiter,
            adaptive,
            circuit_breaker: Arc::new(circuit_breaker),
            retry: RetryPolicy::new(self.resilience.retry)?,
            retry_hook: self.retry_hook,
            clock,
            metrics: ClientMetrics::new(),
            collector: self
                .collector
                .unwrap_or_else(|| Arc::new(NoopMetricsCollector)),
            request_seq: AtomicU64::new(0),
        })
    }
}

impl Default for RequestExecutorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse the base URL and make sure relative paths join below it.
pub(crate) fn normalize_base_url(base_url: &str) -> PropellerAdsResult<Url> {
    let mut url = Url::parse(base_url)?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(PropellerAdsError::Configuration {
            message: format!("base URL must be an http(s) URL: {}", base_url),
        });
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    Ok(url)
}
