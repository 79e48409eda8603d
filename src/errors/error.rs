//! Error types for the PropellerAds API client.

use crate::errors::categories::ErrorCategory;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for PropellerAds operations
pub type PropellerAdsResult<T> = Result<T, PropellerAdsError>;

/// Main error type for the PropellerAds API client.
///
/// Every failure the request executor can produce maps to exactly one
/// variant, and every variant maps to one [`ErrorCategory`] so callers can
/// decide whether to back off, alert, or abort.
#[derive(Error, Debug, Clone)]
pub enum PropellerAdsError {
    /// Configuration error (invalid settings, missing required fields)
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message describing the configuration issue
        message: String,
    },

    /// The caller passed an argument that can never succeed
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Error message describing the invalid argument
        message: String,
    },

    /// Local admission control refused the request before it reached the network
    #[error("Rate limit exceeded: {message}")]
    RateLimitExceeded {
        /// Error message
        message: String,
        /// How long the caller was willing to wait for a token
        waited: Option<Duration>,
    },

    /// Circuit breaker is open; the request was not sent
    #[error("Circuit breaker is open: {message} (failures: {failure_count})")]
    CircuitOpen {
        /// Error message
        message: String,
        /// Failures recorded by the breaker when the request was rejected
        failure_count: u32,
        /// Time left until the breaker admits a probe request
        retry_in: Option<Duration>,
    },

    /// The server answered 429 Too Many Requests
    #[error("Rate limited by server: {message}")]
    RateLimited {
        /// Error message
        message: String,
        /// Value of the `Retry-After` header, if any
        retry_after: Option<Duration>,
        /// Request ID for tracking
        request_id: Option<String>,
    },

    /// Server error (5xx responses)
    #[error("Server error ({status_code}): {message}")]
    Server {
        /// Error message from the server
        message: String,
        /// HTTP status code
        status_code: u16,
        /// Request ID for tracking
        request_id: Option<String>,
    },

    /// The request timed out
    #[error("Request timed out: {message}")]
    Timeout {
        /// Error message describing the timeout
        message: String,
    },

    /// Network error (connection refused, DNS, TLS)
    #[error("Network error: {message}")]
    Network {
        /// Error message describing the network issue
        message: String,
    },

    /// Authentication error (401/403)
    #[error("Authentication error: {message}")]
    Authentication {
        /// Error message describing the authentication issue
        message: String,
        /// HTTP status code
        status_code: u16,
        /// Request ID for tracking
        request_id: Option<String>,
    },

    /// Validation error (400/422)
    #[error("Validation error: {message}")]
    Validation {
        /// Error message describing the validation issue
        message: String,
        /// HTTP status code
        status_code: u16,
        /// Request ID for tracking
        request_id: Option<String>,
    },

    /// Resource not found (404)
    #[error("Not found: {message}")]
    NotFound {
        /// Error message
        message: String,
        /// Request ID for tracking
        request_id: Option<String>,
    },

    /// Conflicting state (409)
    #[error("Conflict: {message}")]
    Conflict {
        /// Error message
        message: String,
        /// Request ID for tracking
        request_id: Option<String>,
    },

    /// Any other 4xx response
    #[error("Client error ({status_code}): {message}")]
    Client {
        /// Error message
        message: String,
        /// HTTP status code
        status_code: u16,
        /// Request ID for tracking
        request_id: Option<String>,
    },

    /// The response could not be interpreted
    #[error("Invalid response: {message}")]
    InvalidResponse {
        /// Error message describing the malformed response
        message: String,
    },

    /// All attempts failed with retryable errors
    #[error("Request failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Number of transport attempts made
        attempts: u32,
        /// The last classified error
        #[source]
        last: Box<PropellerAdsError>,
    },
}

impl PropellerAdsError {
    /// Returns the category this error belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            PropellerAdsError::Configuration { .. } | PropellerAdsError::InvalidArgument { .. } => {
                ErrorCategory::Configuration
            }
            PropellerAdsError::RateLimitExceeded { .. } => ErrorCategory::LocalRateLimit,
            PropellerAdsError::CircuitOpen { .. } => ErrorCategory::CircuitOpen,
            PropellerAdsError::RateLimited { .. } => ErrorCategory::ServerRateLimited,
            PropellerAdsError::Server { .. } | PropellerAdsError::Timeout { .. } => {
                ErrorCategory::Retryable
            }
            PropellerAdsError::Network { .. } => ErrorCategory::Transport,
            PropellerAdsError::Authentication { .. }
            | PropellerAdsError::Validation { .. }
            | PropellerAdsError::NotFound { .. }
            | PropellerAdsError::Conflict { .. }
            | PropellerAdsError::Client { .. }
            | PropellerAdsError::InvalidResponse { .. } => ErrorCategory::Fatal,
            PropellerAdsError::RetriesExhausted { last, .. } => last.category(),
        }
    }

    /// Returns true if sending the same request again may succeed.
    ///
    /// Retryable errors include server rate limits (429), server errors
    /// (5xx), timeouts and transport failures.
    pub fn is_retryable(&self) -> bool {
        match self {
            PropellerAdsError::RetriesExhausted { .. } => false,
            other => other.category().is_retryable(),
        }
    }

    /// Returns the retry-after duration if the server provided one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            PropellerAdsError::RateLimited { retry_after, .. } => *retry_after,
            PropellerAdsError::CircuitOpen { retry_in, .. } => *retry_in,
            PropellerAdsError::RetriesExhausted { last, .. } => last.retry_after(),
            _ => None,
        }
    }

    /// Returns the HTTP status code associated with this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            PropellerAdsError::RateLimited { .. } => Some(429),
            PropellerAdsError::NotFound { .. } => Some(404),
            PropellerAdsError::Conflict { .. } => Some(409),
            PropellerAdsError::Server { status_code, .. }
            | PropellerAdsError::Authentication { status_code, .. }
            | PropellerAdsError::Validation { status_code, .. }
            | PropellerAdsError::Client { status_code, .. } => Some(*status_code),
            PropellerAdsError::RetriesExhausted { last, .. } => last.status_code(),
            _ => None,
        }
    }

    /// Returns the request ID the error was observed on, if known.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            PropellerAdsError::RateLimited { request_id, .. }
            | PropellerAdsError::Server { request_id, .. }
            | PropellerAdsError::Authentication { request_id, .. }
            | PropellerAdsError::Validation { request_id, .. }
            | PropellerAdsError::NotFound { request_id, .. }
            | PropellerAdsError::Conflict { request_id, .. }
            | PropellerAdsError::Client { request_id, .. } => request_id.as_deref(),
            PropellerAdsError::RetriesExhausted { last, .. } => last.request_id(),
            _ => None,
        }
    }

    /// Returns the innermost error, unwrapping [`PropellerAdsError::RetriesExhausted`].
    pub fn root_cause(&self) -> &PropellerAdsError {
        match self {
            PropellerAdsError::RetriesExhausted { last, .. } => last.root_cause(),
            other => other,
        }
    }
}

impl From<reqwest::Error> for PropellerAdsError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PropellerAdsError::Timeout {
                message: err.to_string(),
            }
        } else if err.is_connect() {
            PropellerAdsError::Network {
                message: format!("Connection failed: {}", err),
            }
        } else if err.is_builder() {
            PropellerAdsError::Configuration {
                message: format!("Invalid request: {}", err),
            }
        } else {
            PropellerAdsError::Network {
                message: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for PropellerAdsError {
    fn from(err: serde_json::Error) -> Self {
        PropellerAdsError::InvalidResponse {
            message: format!("JSON serialization/deserialization error: {}", err),
        }
    }
}

impl From<url::ParseError> for PropellerAdsError {
    fn from(err: url::ParseError) -> Self {
        PropellerAdsError::Configuration {
            message: format!("Invalid URL: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_is_retryable() {
        let rate_limited = PropellerAdsError::RateLimited {
            message: "Too many requests".to_string(),
            retry_after: Some(Duration::from_secs(30)),
            request_id: None,
        };
        assert!(rate_limited.is_retryable());

        let auth_error = PropellerAdsError::Authentication {
            message: "Invalid API key".to_string(),
            status_code: 401,
            request_id: None,
        };
        assert!(!auth_error.is_retryable());

        let server_error = PropellerAdsError::Server {
            message: "Service unavailable".to_string(),
            status_code: 503,
            request_id: None,
        };
        assert!(server_error.is_retryable());

        let local = PropellerAdsError::RateLimitExceeded {
            message: "no tokens".to_string(),
            waited: None,
        };
        assert!(!local.is_retryable());
    }

    #[test]
    fn test_retry_after() {
        let rate_limited = PropellerAdsError::RateLimited {
            message: "Too many requests".to_string(),
            retry_after: Some(Duration::from_secs(30)),
            request_id: None,
        };
        assert_eq!(rate_limited.retry_after(), Some(Duration::from_secs(30)));

        let network_error = PropellerAdsError::Network {
            message: "Connection failed".to_string(),
        };
        assert_eq!(network_error.retry_after(), None);
    }

    #[test]
    fn test_retries_exhausted_preserves_cause() {
        let last = PropellerAdsError::Server {
            message: "boom".to_string(),
            status_code: 502,
            request_id: Some("req_1".to_string()),
        };
        let err = PropellerAdsError::RetriesExhausted {
            attempts: 3,
            last: Box::new(last),
        };

        assert_eq!(err.category(), ErrorCategory::Retryable);
        assert!(!err.is_retryable());
        assert_eq!(err.status_code(), Some(502));
        assert_eq!(err.request_id(), Some("req_1"));
        assert!(err.source().is_some());
        assert!(matches!(
            err.root_cause(),
            PropellerAdsError::Server { status_code: 502, .. }
        ));
        assert!(err.to_string().contains("after 3 attempts"));
    }

    #[test]
    fn test_categories() {
        let fatal = PropellerAdsError::Validation {
            message: "bad".to_string(),
            status_code: 422,
            request_id: None,
        };
        assert_eq!(fatal.category(), ErrorCategory::Fatal);

        let open = PropellerAdsError::CircuitOpen {
            message: "open".to_string(),
            failure_count: 5,
            retry_in: Some(Duration::from_secs(10)),
        };
        assert_eq!(open.category(), ErrorCategory::CircuitOpen);
        assert_eq!(open.retry_after(), Some(Duration::from_secs(10)));

        let network = PropellerAdsError::Network {
            message: "dns".to_string(),
        };
        assert_eq!(network.category(), ErrorCategory::Transport);
    }
}
