//! Authentication for the PropellerAds API.

use crate::errors::{PropellerAdsError, PropellerAdsResult};
use http::header::{HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use http::HeaderMap;
use secrecy::{ExposeSecret, SecretString};

/// Shortest key the API has been seen to issue.
const MIN_API_KEY_LEN: usize = 16;

/// Trait for managing authentication headers
pub trait AuthManager: Send + Sync {
    /// Headers to attach to every request
    fn get_headers(&self) -> PropellerAdsResult<HeaderMap>;

    /// Validate the API key format
    fn validate_api_key(&self) -> PropellerAdsResult<()>;
}

/// Bearer token authentication manager
pub struct BearerAuthManager {
    api_key: SecretString,
    user_agent: String,
}

impl BearerAuthManager {
    /// Create a new bearer authentication manager
    pub fn new(api_key: SecretString, user_agent: impl Into<String>) -> Self {
        Self {
            api_key,
            user_agent: user_agent.into(),
        }
    }
}

impl AuthManager for BearerAuthManager {
    fn get_headers(&self) -> PropellerAdsResult<HeaderMap> {
        let mut headers = HeaderMap::new();

        let mut authorization =
            HeaderValue::from_str(&format!("Bearer {}", self.api_key.expose_secret())).map_err(
                |_| PropellerAdsError::Configuration {
                    message: "API key contains characters not allowed in a header".to_string(),
                },
            )?;
        authorization.set_sensitive(true);
        headers.insert(AUTHORIZATION, authorization);

        let user_agent =
            HeaderValue::from_str(&self.user_agent).map_err(|_| PropellerAdsError::Configuration {
                message: format!("Invalid user agent: {}", self.user_agent),
            })?;
        headers.insert(USER_AGENT, user_agent);

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        Ok(headers)
    }

    fn validate_api_key(&self) -> PropellerAdsResult<()> {
        validate_api_key(self.api_key.expose_secret())
    }
}

/// Check an API key looks usable before any request is made
pub fn validate_api_key(key: &str) -> PropellerAdsResult<()> {
    let invalid = |message: &str| {
        Err(PropellerAdsError::Configuration {
            message: message.to_string(),
        })
    };

    if key.trim().is_empty() {
        return invalid("API key cannot be empty");
    }
    if key.len() < MIN_API_KEY_LEN {
        return invalid("API key is too short");
    }
    if key.chars().any(char::is_whitespace) {
        return invalid("API key must not contain whitespace");
    }
    Ok(())
}
