//! Error categories used for retry and circuit breaker decisions.

use serde::Serialize;
use std::fmt;

/// Coarse classification of a [`PropellerAdsError`](super::PropellerAdsError).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Invalid configuration or caller arguments
    Configuration,
    /// Local token bucket refused admission
    LocalRateLimit,
    /// Circuit breaker is open
    CircuitOpen,
    /// Server answered 429
    ServerRateLimited,
    /// 5xx or timeout
    Retryable,
    /// Connection, DNS or TLS failure
    Transport,
    /// Request is invalid; retrying cannot help
    Fatal,
}

impl ErrorCategory {
    /// Whether a request that failed this way may be sent again.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorCategory::ServerRateLimited | ErrorCategory::Retryable | ErrorCategory::Transport
        )
    }

    /// Whether a failure of this category is evidence of service degradation.
    ///
    /// Server rate limits and client errors are not.
    pub fn counts_toward_circuit(self) -> bool {
        matches!(self, ErrorCategory::Retryable | ErrorCategory::Transport)
    }

    /// Short label used in logs and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::LocalRateLimit => "local_rate_limit",
            ErrorCategory::CircuitOpen => "circuit_open",
            ErrorCategory::ServerRateLimited => "server_rate_limited",
            ErrorCategory::Retryable => "retryable",
            ErrorCategory::Transport => "transport",
            ErrorCategory::Fatal => "fatal",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
