//! End-to-end tests for the request executor with a scripted transport and
//! a manually driven clock.

use super::*;
use crate::errors::{ErrorCategory, PropellerAdsError};
use crate::mocks::{MockAuthManager, MockHttpTransport, ScriptedTransport};
use crate::observability::{metric_names, InMemoryMetricsCollector};
use crate::transport::{ApiRequest, HttpTransport};
use async_trait::async_trait;
use http::HeaderMap;
use std::error::Error as _;
use std::sync::Arc;
use std::time::Duration;

fn config(max_attempts: u32) -> ResilienceConfig {
    ResilienceConfig {
        rate_limit: RateLimitConfig {
            max_requests: 100,
            window: Duration::from_secs(60),
            burst_multiplier: 1.0,
            acquire_timeout: Some(Duration::from_secs(1)),
            adaptive: false,
        },
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            failure_window: None,
        },
        retry: RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            jitter: 0.0,
        },
    }
}

fn executor(
    transport: Arc<dyn HttpTransport>,
    clock: Arc<MockClock>,
    config: ResilienceConfig,
) -> RequestExecutor {
    RequestExecutor::builder()
        .transport(transport)
        .base_url("https://api.test/v5")
        .clock(clock)
        .resilience(config)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_retries_server_errors_until_success() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .respond(500, "")
            .respond(500, "")
            .respond(200, r#"{"id": 1}"#),
    );
    let clock = Arc::new(MockClock::new());
    let executor = executor(transport.clone(), clock.clone(), config(3));

    let response = executor
        .execute(ApiRequest::get("/adv/campaigns"))
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(transport.call_count(), 3);
    assert_eq!(executor.circuit_breaker().failure_count(), 2);
    assert_eq!(executor.circuit_breaker().state(), CircuitState::Closed);
    assert_eq!(
        clock.sleeps(),
        vec![Duration::from_millis(100), Duration::from_millis(200)]
    );

    let summary = executor.metrics_summary();
    assert_eq!(summary.total_requests, 1);
    assert_eq!(summary.successes, 1);
    assert_eq!(summary.retries, 2);
}

#[tokio::test]
async fn test_fatal_error_is_not_retried() {
    let transport = Arc::new(
        ScriptedTransport::new().respond(422, r#"{"errors": {"rate": ["must be positive"]}}"#),
    );
    let clock = Arc::new(MockClock::new());
    let executor = executor(transport.clone(), clock.clone(), config(3));

    let error = executor
        .execute(ApiRequest::post("/adv/campaigns").body("{}"))
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        PropellerAdsError::Validation { status_code: 422, ref message, .. } if message == "rate: must be positive"
    ));
    assert_eq!(error.category(), ErrorCategory::Fatal);
    assert_eq!(transport.call_count(), 1);
    assert!(clock.sleeps().is_empty());
    assert_eq!(executor.circuit_breaker().failure_count(), 0);
}

#[tokio::test]
async fn test_server_rate_limit_uses_retry_after() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .respond_with_header(429, "", "retry-after", "2")
            .respond(200, "{}"),
    );
    let clock = Arc::new(MockClock::new());
    let executor = executor(transport.clone(), clock.clone(), config(3));

    executor
        .execute(ApiRequest::get("/adv/statistics"))
        .await
        .unwrap();

    assert_eq!(clock.sleeps(), vec![Duration::from_secs(2)]);
    assert_eq!(transport.call_count(), 2);
    assert_eq!(executor.circuit_breaker().failure_count(), 0);
    assert_eq!(executor.circuit_breaker().get_status().seconds_since_last_failure, None);
    assert_eq!(executor.metrics_summary().server_rate_limited, 1);
}

#[tokio::test]
async fn test_oversized_retry_after_falls_back_to_backoff() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .respond_with_header(429, "", "retry-after", "99999999999999999999")
            .respond(200, "{}"),
    );
    let clock = Arc::new(MockClock::new());
    let executor = executor(transport.clone(), clock.clone(), config(3));

    let response = executor.execute(ApiRequest::get("/x")).await.unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(clock.sleeps(), vec![Duration::from_millis(100)]);
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test]
async fn test_exhausted_retries_preserve_last_error() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .respond(503, "")
            .respond(502, "")
            .respond(503, "maintenance"),
    );
    let clock = Arc::new(MockClock::new());
    let executor = executor(transport.clone(), clock.clone(), config(3));

    let error = executor
        .execute(ApiRequest::get("/adv/balance"))
        .await
        .unwrap_err();

    match &error {
        PropellerAdsError::RetriesExhausted { attempts, last } => {
            assert_eq!(*attempts, 3);
            assert!(matches!(
                **last,
                PropellerAdsError::Server { status_code: 503, ref message, .. } if message == "maintenance"
            ));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(error.source().is_some());
    assert_eq!(error.category(), ErrorCategory::Retryable);
    assert!(error.request_id().unwrap().starts_with("req_"));
    assert_eq!(transport.call_count(), 3);
    assert_eq!(clock.sleeps().len(), 2);
}

#[tokio::test]
async fn test_open_circuit_fails_fast_without_consuming_tokens() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .fail(PropellerAdsError::Network {
                message: "connection refused".to_string(),
            })
            .fail(PropellerAdsError::Network {
                message: "connection refused".to_string(),
            }),
    );
    let clock = Arc::new(MockClock::new());
    let mut config = config(1);
    config.circuit_breaker.failure_threshold = 2;
    let executor = executor(transport.clone(), clock.clone(), config);

    for _ in 0..2 {
        let error = executor
            .execute(ApiRequest::get("/adv/campaigns"))
            .await
            .unwrap_err();
        assert_eq!(error.category(), ErrorCategory::Transport);
    }
    assert_eq!(executor.circuit_breaker().state(), CircuitState::Open);

    let tokens_before = executor.get_rate_limiter_status().tokens_available;
    let error = executor
        .execute(ApiRequest::get("/adv/campaigns"))
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        PropellerAdsError::CircuitOpen { failure_count: 2, retry_in: Some(_), .. }
    ));
    assert_eq!(transport.call_count(), 2);
    assert_eq!(executor.get_rate_limiter_status().tokens_available, tokens_before);
    assert_eq!(executor.metrics_summary().circuit_rejections, 1);
}

#[tokio::test]
async fn test_local_rate_limit_blocks_before_network() {
    let transport = Arc::new(ScriptedTransport::new().respond(200, "{}"));
    let clock = Arc::new(MockClock::new());
    let mut config = config(1);
    config.rate_limit = RateLimitConfig {
        max_requests: 1,
        window: Duration::from_secs(60),
        burst_multiplier: 1.0,
        acquire_timeout: Some(Duration::from_secs(1)),
        adaptive: false,
    };
    let executor = executor(transport.clone(), clock.clone(), config);

    executor.execute(ApiRequest::get("/a")).await.unwrap();
    let error = executor.execute(ApiRequest::get("/b")).await.unwrap_err();

    assert!(matches!(
        error,
        PropellerAdsError::RateLimitExceeded { waited: Some(_), .. }
    ));
    assert_eq!(error.category(), ErrorCategory::LocalRateLimit);
    assert_eq!(transport.call_count(), 1);
    assert_eq!(executor.metrics_summary().local_rate_limit_rejections, 1);
}

#[tokio::test]
async fn test_acquire_waits_for_token_when_timeout_allows() {
    let transport = Arc::new(ScriptedTransport::new().respond(200, "{}").respond(200, "{}"));
    let clock = Arc::new(MockClock::new());
    let mut config = config(1);
    config.rate_limit.max_requests = 1;
    config.rate_limit.window = Duration::from_secs(1);
    config.rate_limit.acquire_timeout = Some(Duration::from_secs(5));
    let executor = executor(transport.clone(), clock.clone(), config);

    executor.execute(ApiRequest::get("/a")).await.unwrap();
    executor.execute(ApiRequest::get("/b")).await.unwrap();

    assert_eq!(transport.call_count(), 2);
    let slept = clock.total_slept();
    assert!(slept > Duration::from_millis(999) && slept < Duration::from_millis(1001));
}

#[tokio::test]
async fn test_abandoned_probe_lets_next_caller_probe() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .respond(500, "")
            .respond(404, "")
            .respond(200, "{}"),
    );
    let clock = Arc::new(MockClock::new());
    let mut config = config(1);
    config.circuit_breaker.failure_threshold = 1;
    let executor = executor(transport.clone(), clock.clone(), config);

    assert!(executor.execute(ApiRequest::get("/x")).await.is_err());
    assert_eq!(executor.circuit_breaker().state(), CircuitState::Open);

    clock.advance(Duration::from_secs(60));
    let error = executor.execute(ApiRequest::get("/x")).await.unwrap_err();
    assert!(matches!(error, PropellerAdsError::NotFound { .. }));

    let status = executor.get_circuit_breaker_status();
    assert_eq!(status.state, CircuitState::HalfOpen);
    assert!(!status.probe_in_flight);

    executor.execute(ApiRequest::get("/x")).await.unwrap();
    assert_eq!(executor.circuit_breaker().state(), CircuitState::Closed);
    assert_eq!(transport.call_count(), 3);
}

#[tokio::test]
async fn test_request_id_and_url_are_stable_across_retries() {
    let transport = Arc::new(ScriptedTransport::new().respond(500, "").respond(200, "{}"));
    let clock = Arc::new(MockClock::new());
    let executor = executor(transport.clone(), clock, config(2));

    executor
        .execute(
            ApiRequest::get("adv/campaigns")
                .query("page", 2)
                .timeout(Duration::from_secs(7)),
        )
        .await
        .unwrap();

    let calls = transport.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(
        calls[0].url.as_str(),
        "https://api.test/v5/adv/campaigns?page=2"
    );
    assert_eq!(calls[0].timeout, Duration::from_secs(7));

    let first_id = calls[0].headers.get("x-request-id").unwrap();
    assert_eq!(Some(first_id), calls[1].headers.get("x-request-id"));
    assert!(first_id.to_str().unwrap().starts_with("req_"));
}

#[tokio::test]
async fn test_absolute_path_is_rejected_before_admission() {
    let transport = Arc::new(ScriptedTransport::new());
    let clock = Arc::new(MockClock::new());
    let executor = executor(transport.clone(), clock, config(1));

    let error = executor
        .execute(ApiRequest::get("https://evil.test/steal"))
        .await
        .unwrap_err();

    assert!(matches!(error, PropellerAdsError::InvalidArgument { .. }));
    assert_eq!(transport.call_count(), 0);
    assert_eq!(executor.get_rate_limiter_status().statistics.total_requests, 0);
}

#[tokio::test]
async fn test_auth_headers_are_attached() {
    let transport = Arc::new(ScriptedTransport::new().respond(200, "{}"));
    let mut auth = MockAuthManager::new();
    auth.expect_get_headers().times(1).returning(|| {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer test-key".parse().unwrap());
        Ok(headers)
    });

    let executor = RequestExecutor::builder()
        .transport(transport.clone())
        .auth(Arc::new(auth))
        .clock(Arc::new(MockClock::new()))
        .build()
        .unwrap();

    executor.execute(ApiRequest::get("/adv/balance")).await.unwrap();

    let calls = transport.calls();
    assert_eq!(
        calls[0].headers.get("authorization").unwrap(),
        "Bearer test-key"
    );
    assert!(calls[0]
        .url
        .as_str()
        .starts_with("https://ssp-api.propellerads.com/v5/adv/balance"));
}

#[tokio::test]
async fn test_timeout_with_mock_transport() {
    let mut transport = MockHttpTransport::new();
    transport.expect_send().times(2).returning(|_, _, _, _, _| {
        Err(PropellerAdsError::Timeout {
            message: "deadline elapsed".to_string(),
        })
    });

    let executor = executor(Arc::new(transport), Arc::new(MockClock::new()), config(2));
    let error = executor.execute(ApiRequest::get("/slow")).await.unwrap_err();

    assert!(matches!(
        error,
        PropellerAdsError::RetriesExhausted { attempts: 2, .. }
    ));
    assert!(matches!(
        error.root_cause(),
        PropellerAdsError::Timeout { .. }
    ));
    assert_eq!(executor.circuit_breaker().failure_count(), 2);
}

struct AbortingHook;

#[async_trait]
impl RetryHook for AbortingHook {
    async fn on_retry(
        &self,
        context: RetryContext,
        _error: &PropellerAdsError,
        _delay: Duration,
    ) -> RetryDecision {
        if context.attempt == 0 {
            RetryDecision::Retry(Duration::from_millis(5))
        } else {
            RetryDecision::Abort
        }
    }
}

#[tokio::test]
async fn test_retry_hook_can_override_and_abort() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .respond(500, "")
            .respond(500, "")
            .respond(200, "{}"),
    );
    let clock = Arc::new(MockClock::new());
    let executor = RequestExecutor::builder()
        .transport(transport.clone())
        .clock(clock.clone())
        .resilience(config(5))
        .retry_hook(Arc::new(AbortingHook))
        .build()
        .unwrap();

    let error = executor.execute(ApiRequest::get("/x")).await.unwrap_err();

    assert!(matches!(
        error,
        PropellerAdsError::RetriesExhausted { attempts: 2, .. }
    ));
    assert_eq!(clock.sleeps(), vec![Duration::from_millis(5)]);
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test]
async fn test_adaptive_limiter_follows_server_hint() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .respond_with_header(429, "", "retry-after", "4")
            .respond(200, "{}"),
    );
    let clock = Arc::new(MockClock::new());
    let mut config = config(2);
    config.rate_limit.max_requests = 60;
    config.rate_limit.adaptive = true;
    let executor = executor(transport, clock, config);

    executor.execute(ApiRequest::get("/x")).await.unwrap();

    let adaptive = executor.adaptive().unwrap().get_adaptive_status();
    assert_eq!(adaptive.current_rate, 15);
    assert_eq!(adaptive.base_rate, 60);
    assert!(adaptive.adaptation_active);
    assert_eq!(executor.rate_limiter().max_requests(), 15);
}

#[tokio::test]
async fn test_metrics_collector_receives_events() {
    let transport = Arc::new(ScriptedTransport::new().respond(503, "").respond(200, "{}"));
    let collector = Arc::new(InMemoryMetricsCollector::new());
    let executor = RequestExecutor::builder()
        .transport(transport)
        .clock(Arc::new(MockClock::new()))
        .resilience(config(2))
        .metrics_collector(collector.clone())
        .build()
        .unwrap();

    executor.execute(ApiRequest::get("/x")).await.unwrap();

    assert_eq!(
        collector.get_counter(&format!("{}:method=GET", metric_names::REQUEST_COUNT)),
        1
    );
    assert_eq!(collector.get_counter(metric_names::RETRY_ATTEMPTS), 1);
    assert_eq!(
        collector
            .get_histogram(&format!("{}:method=GET", metric_names::REQUEST_DURATION_MS))
            .len(),
        2
    );
    assert_eq!(
        collector.get_gauge(metric_names::CIRCUIT_BREAKER_STATE),
        Some(0.0)
    );
}

#[tokio::test]
async fn test_concurrent_callers_share_one_bucket() {
    let mut transport = ScriptedTransport::new();
    for _ in 0..5 {
        transport = transport.respond(200, "{}");
    }
    let transport = Arc::new(transport);
    let mut config = config(1);
    config.rate_limit.max_requests = 5;
    config.rate_limit.window = Duration::from_secs(3600);
    config.rate_limit.acquire_timeout = Some(Duration::ZERO);
    let executor = Arc::new(executor(
        transport.clone(),
        Arc::new(MockClock::new()),
        config,
    ));

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let executor = executor.clone();
            tokio::spawn(async move {
                executor
                    .execute(ApiRequest::get(format!("/item/{}", i)))
                    .await
            })
        })
        .collect();

    let mut succeeded = 0;
    let mut limited = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(PropellerAdsError::RateLimitExceeded { .. }) => limited += 1,
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!(succeeded, 5);
    assert_eq!(limited, 15);
    assert_eq!(transport.call_count(), 5);
}

#[tokio::test]
async fn test_passthrough_makes_single_attempt() {
    let transport = Arc::new(ScriptedTransport::new().respond(500, ""));
    let executor = executor(
        transport.clone(),
        Arc::new(MockClock::new()),
        ResilienceConfig::passthrough(),
    );

    let error = executor.execute(ApiRequest::get("/x")).await.unwrap_err();
    assert!(matches!(
        error,
        PropellerAdsError::RetriesExhausted { attempts: 1, .. }
    ));
    assert_eq!(transport.call_count(), 1);
}
