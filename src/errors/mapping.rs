//! HTTP error response mapping.
//!
//! Turns a non-success HTTP response into the matching
//! [`PropellerAdsError`] variant. The API reports failures as JSON:
//!
//! ```json
//! { "message": "Campaign not found" }
//! { "errors": ["rate is too low", "name is required"] }
//! { "errors": { "name": ["is required"], "rate": "must be positive" } }
//! ```
//!
//! Bodies that are not JSON fall back to the raw text, then to a generic
//! `HTTP <status> error` message.

use super::PropellerAdsError;
use chrono::{DateTime, Utc};
use http::HeaderMap;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Longest raw body kept in an error message.
const MAX_RAW_MESSAGE_LEN: usize = 512;

/// Error body returned by the API.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
pub struct ApiErrorResponse {
    /// Top-level message
    #[serde(default)]
    pub message: Option<String>,
    /// Detailed errors, either a flat list or per-field
    #[serde(default)]
    pub errors: Option<ApiErrorDetails>,
}

/// Shape of the `errors` field.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ApiErrorDetails {
    /// `["a", "b"]`
    List(Vec<String>),
    /// `{"field": ["a"], "other": "b"}`
    Fields(BTreeMap<String, FieldErrors>),
}

/// Errors reported for a single field.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum FieldErrors {
    /// Several messages
    Many(Vec<String>),
    /// A single message
    One(String),
}

impl ApiErrorResponse {
    /// Collapse the body into one human readable message.
    pub fn summary(&self) -> Option<String> {
        let details = match &self.errors {
            Some(ApiErrorDetails::List(items)) if !items.is_empty() => Some(items.join("; ")),
            Some(ApiErrorDetails::Fields(fields)) if !fields.is_empty() => Some(
                fields
                    .iter()
                    .map(|(field, errors)| match errors {
                        FieldErrors::Many(items) => format!("{}: {}", field, items.join("; ")),
                        FieldErrors::One(item) => format!("{}: {}", field, item),
                    })
                    .collect::<Vec<_>>()
                    .join("; "),
            ),
            _ => None,
        };

        details.or_else(|| self.message.clone())
    }
}

/// Extract an error message from a response body.
pub fn extract_error_message(status: u16, body: &[u8]) -> String {
    if let Ok(parsed) = serde_json::from_slice::<ApiErrorResponse>(body) {
        if let Some(summary) = parsed.summary() {
            return summary;
        }
    }

    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        return format!("HTTP {} error", status);
    }

    let mut end = text.len().min(MAX_RAW_MESSAGE_LEN);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

/// Parse a `Retry-After` header, given either as delta seconds or as an HTTP date.
pub fn parse_retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let value = headers.get(http::header::RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(seconds) = value.parse::<f64>() {
        // Values too large for a Duration carry no usable hint.
        return Duration::try_from_secs_f64(seconds).ok();
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

/// Map a non-success HTTP response to an error.
///
/// `retry_after` is only attached to 429 responses.
pub fn map_http_error(
    status: u16,
    body: &[u8],
    retry_after: Option<Duration>,
    request_id: Option<String>,
) -> PropellerAdsError {
    let message = extract_error_message(status, body);

    match status {
        401 | 403 => PropellerAdsError::Authentication {
            message,
            status_code: status,
            request_id,
        },
        400 | 422 => PropellerAdsError::Validation {
            message,
            status_code: status,
            request_id,
        },
        404 => PropellerAdsError::NotFound {
            message,
            request_id,
        },
        409 => PropellerAdsError::Conflict {
            message,
            request_id,
        },
        429 => PropellerAdsError::RateLimited {
            message,
            retry_after,
            request_id,
        },
        500..=599 => PropellerAdsError::Server {
            message,
            status_code: status,
            request_id,
        },
        _ => PropellerAdsError::Client {
            message,
            status_code: status,
            request_id,
        },
    }
}
