//! Classification of a single transport attempt.

use crate::errors::{map_http_error, parse_retry_after, ErrorCategory, PropellerAdsError, PropellerAdsResult};
use bytes::Bytes;
use chrono::Utc;
use http::Response;
use std::time::Duration;

/// Response header the service echoes the request id in.
pub(crate) const REQUEST_ID_HEADER: &str = "x-request-id";

/// What one attempt produced.
///
/// Built only by [`RequestOutcome::classify`]; everything downstream matches
/// on it exhaustively.
#[derive(Debug)]
pub enum RequestOutcome {
    /// Any status below 400
    Success(Response<Bytes>),
    /// HTTP 429, with the server's `Retry-After` if it sent one
    ServerRateLimited {
        retry_after: Option<Duration>,
        error: PropellerAdsError,
    },
    /// 5xx or timeout
    RetryableError(PropellerAdsError),
    /// The request itself is wrong; sending it again cannot help
    FatalError(PropellerAdsError),
    /// Connection, DNS or TLS failure
    TransportError(PropellerAdsError),
}

impl RequestOutcome {
    /// Classify the result of one transport call.
    ///
    /// `request_id` is the id sent with the request; the one echoed by the
    /// server wins when present.
    pub fn classify(result: PropellerAdsResult<Response<Bytes>>, request_id: Option<&str>) -> Self {
        let response = match result {
            Ok(response) => response,
            Err(error) => return Self::from_error(error),
        };

        let status = response.status().as_u16();
        if status < 400 {
            return RequestOutcome::Success(response);
        }

        let retry_after = if status == 429 {
            parse_retry_after(response.headers(), Utc::now())
        } else {
            None
        };
        let request_id = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .or(request_id)
            .map(str::to_string);

        Self::from_error(map_http_error(
            status,
            response.body(),
            retry_after,
            request_id,
        ))
    }

    /// Classify an error by its category
    pub fn from_error(error: PropellerAdsError) -> Self {
        match error.category() {
            ErrorCategory::ServerRateLimited => RequestOutcome::ServerRateLimited {
                retry_after: error.retry_after(),
                error,
            },
            ErrorCategory::Retryable => RequestOutcome::RetryableError(error),
            ErrorCategory::Transport => RequestOutcome::TransportError(error),
            ErrorCategory::Fatal
            | ErrorCategory::Configuration
            | ErrorCategory::LocalRateLimit
            | ErrorCategory::CircuitOpen => RequestOutcome::FatalError(error),
        }
    }

    /// Whether the attempt may be repeated
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RequestOutcome::ServerRateLimited { .. }
                | RequestOutcome::RetryableError(_)
                | RequestOutcome::TransportError(_)
        )
    }

    /// Whether the attempt is a failure the circuit breaker should count
    pub fn counts_toward_circuit(&self) -> bool {
        matches!(
            self,
            RequestOutcome::RetryableError(_) | RequestOutcome::TransportError(_)
        )
    }

    /// Server supplied delay before the next attempt
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            RequestOutcome::ServerRateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// HTTP status of the attempt, if a response was received
    pub fn status(&self) -> Option<u16> {
        match self {
            RequestOutcome::Success(response) => Some(response.status().as_u16()),
            RequestOutcome::ServerRateLimited { error, .. }
            | RequestOutcome::RetryableError(error)
            | RequestOutcome::FatalError(error)
            | RequestOutcome::TransportError(error) => error.status_code(),
        }
    }

    /// The error, unless the attempt succeeded
    pub fn error(&self) -> Option<&PropellerAdsError> {
        match self {
            RequestOutcome::Success(_) => None,
            RequestOutcome::ServerRateLimited { error, .. }
            | RequestOutcome::RetryableError(error)
            | RequestOutcome::FatalError(error)
            | RequestOutcome::TransportError(error) => Some(error),
        }
    }

    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match self {
            RequestOutcome::Success(_) => "success",
            RequestOutcome::ServerRateLimited { .. } => "server_rate_limited",
            RequestOutcome::RetryableError(_) => "retryable_error",
            RequestOutcome::FatalError(_) => "fatal_error",
            RequestOutcome::TransportError(_) => "transport_error",
        }
    }
}
