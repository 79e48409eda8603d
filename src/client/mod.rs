//! Client interface and implementation for the PropellerAds API.

use crate::auth::{AuthManager, BearerAuthManager};
use crate::config::ClientConfig;
use crate::errors::{PropellerAdsError, PropellerAdsResult};
use crate::observability::{MetricsCollector, MetricsSummary};
use crate::resilience::{
    AdaptiveStatus, CircuitBreakerStatus, CircuitState, Clock, RateLimiterStatus,
    RequestExecutor, SystemClock,
};
use crate::transport::{ApiRequest, HttpTransport, ReqwestTransport};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::Response;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const HEALTH_CHECK_PATH: &str = "adv/balance";

/// Trait defining the main PropellerAds client interface
#[async_trait]
pub trait PropellerAdsClient: Send + Sync {
    /// Send a request through rate limiting, the circuit breaker and retries
    async fn execute(&self, request: ApiRequest) -> PropellerAdsResult<Response<Bytes>>;

    fn get_rate_limiter_status(&self) -> RateLimiterStatus;

    fn get_circuit_breaker_status(&self) -> CircuitBreakerStatus;

    fn metrics_summary(&self) -> MetricsSummary;

    /// Local view of client health; sends no request
    fn health_report(&self) -> HealthReport;
}

/// Overall client health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    /// Requests go through but capacity is reduced
    Degraded,
    /// The circuit breaker is rejecting requests or the API is unreachable
    Unhealthy,
}

/// Snapshot of breaker, limiter and counters
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    /// Round trip of the live check, when one was made
    pub response_time_secs: Option<f64>,
    /// Failure of the live check, when one was made
    pub error: Option<String>,
    pub circuit_breaker: CircuitBreakerStatus,
    pub rate_limiter: RateLimiterStatus,
    pub adaptive: Option<AdaptiveStatus>,
    pub metrics: MetricsSummary,
}

/// Implementation of the PropellerAds client
pub struct PropellerAdsClientImpl {
    config: Arc<ClientConfig>,
    executor: Arc<RequestExecutor>,
}

impl PropellerAdsClientImpl {
    /// Create a new client from configuration
    pub fn new(config: ClientConfig) -> PropellerAdsResult<Self> {
        let transport = Arc::new(ReqwestTransport::new(CONNECT_TIMEOUT.min(config.timeout))?)
            as Arc<dyn HttpTransport>;
        Self::with_dependencies(config, transport, Arc::new(SystemClock))
    }

    /// Create a client with a custom transport and clock
    pub fn with_dependencies(
        config: ClientConfig,
        transport: Arc<dyn HttpTransport>,
        clock: Arc<dyn Clock>,
    ) -> PropellerAdsResult<Self> {
        Self::build(config, transport, clock, None)
    }

    /// Create a client that also reports to `collector`
    pub fn with_metrics_collector(
        config: ClientConfig,
        collector: Arc<dyn MetricsCollector>,
    ) -> PropellerAdsResult<Self> {
        let transport = Arc::new(ReqwestTransport::new(CONNECT_TIMEOUT.min(config.timeout))?)
            as Arc<dyn HttpTransport>;
        Self::build(config, transport, Arc::new(SystemClock), Some(collector))
    }

    fn build(
        config: ClientConfig,
        transport: Arc<dyn HttpTransport>,
        clock: Arc<dyn Clock>,
        collector: Option<Arc<dyn MetricsCollector>>,
    ) -> PropellerAdsResult<Self> {
        let auth_manager = Arc::new(BearerAuthManager::new(
            config.api_key.clone(),
            config.user_agent.clone(),
        )) as Arc<dyn AuthManager>;

        auth_manager
            .validate_api_key()
            .map_err(|e| PropellerAdsError::Configuration {
                message: format!("Invalid API key: {}", e),
            })?;

        let mut builder = RequestExecutor::builder()
            .transport(transport)
            .auth(auth_manager)
            .base_url(config.base_url.clone())
            .timeout(config.timeout)
            .resilience(config.resilience.clone())
            .clock(clock);
        if let Some(collector) = collector {
            builder = builder.metrics_collector(collector);
        }
        let executor = builder.build()?;

        info!(
            base_url = %executor.base_url(),
            rate_limit = config.resilience.rate_limit.max_requests,
            max_attempts = config.resilience.retry.max_attempts,
            adaptive = config.resilience.rate_limit.adaptive,
            "PropellerAds client initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            executor: Arc::new(executor),
        })
    }

    /// Execute a request and decode the JSON response body
    pub async fn execute_json<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
    ) -> PropellerAdsResult<T> {
        let response = self.executor.execute(request).await?;
        Ok(serde_json::from_slice(response.body())?)
    }

    /// Adaptive limiter state, when adaptive limiting is enabled
    pub fn adaptive_status(&self) -> Option<AdaptiveStatus> {
        self.executor.adaptive().map(|a| a.get_adaptive_status())
    }

    /// Call the balance endpoint and report health including the round trip
    pub async fn health_check(&self) -> HealthReport {
        let clock = self.executor.clock().clone();
        let started = clock.now();
        let result = self.executor.execute(ApiRequest::get(HEALTH_CHECK_PATH)).await;
        let elapsed = clock.now().saturating_duration_since(started).as_secs_f64();

        let mut report = self.health_report();
        report.response_time_secs = Some(elapsed);
        if let Err(error) = result {
            report.status = HealthStatus::Unhealthy;
            report.error = Some(error.to_string());
        }
        report
    }

    /// Get the configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Get the request executor
    pub fn executor(&self) -> Arc<RequestExecutor> {
        self.executor.clone()
    }
}

#[async_trait]
impl PropellerAdsClient for PropellerAdsClientImpl {
    async fn execute(&self, request: ApiRequest) -> PropellerAdsResult<Response<Bytes>> {
        self.executor.execute(request).await
    }

    fn get_rate_limiter_status(&self) -> RateLimiterStatus {
        self.executor.get_rate_limiter_status()
    }

    fn get_circuit_breaker_status(&self) -> CircuitBreakerStatus {
        self.executor.get_circuit_breaker_status()
    }

    fn metrics_summary(&self) -> MetricsSummary {
        self.executor.metrics_summary()
    }

    fn health_report(&self) -> HealthReport {
        let circuit_breaker = self.executor.get_circuit_breaker_status();
        let adaptive = self.adaptive_status();

        let status = match circuit_breaker.state {
            CircuitState::Open => HealthStatus::Unhealthy,
            CircuitState::HalfOpen => HealthStatus::Degraded,
            CircuitState::Closed if adaptive.as_ref().is_some_and(|a| a.adaptation_active) => {
                HealthStatus::Degraded
            }
            CircuitState::Closed => HealthStatus::Healthy,
        };

        HealthReport {
            status,
            timestamp: Utc::now(),
            response_time_secs: None,
            error: None,
            circuit_breaker,
            rate_limiter: self.executor.get_rate_limiter_status(),
            adaptive,
            metrics: self.executor.metrics_summary(),
        }
    }
}

/// Create a new PropellerAds client from configuration
pub fn create_client(config: ClientConfig) -> PropellerAdsResult<PropellerAdsClientImpl> {
    PropellerAdsClientImpl::new(config)
}

/// Create a new PropellerAds client from environment variables
pub fn create_client_from_env() -> PropellerAdsResult<PropellerAdsClientImpl> {
    let config = ClientConfig::from_env()?;
    create_client(config)
}
