//! Error types for the PropellerAds API client.
//!
//! Every failure is a [`PropellerAdsError`]; [`ErrorCategory`] groups the
//! variants by how a caller should react to them.

mod categories;
mod error;
mod mapping;

pub use categories::ErrorCategory;
pub use error::{PropellerAdsError, PropellerAdsResult};
pub use mapping::{
    extract_error_message, map_http_error, parse_retry_after, ApiErrorDetails, ApiErrorResponse,
    FieldErrors,
};
