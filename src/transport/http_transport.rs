//! HTTP transport implementations.

use crate::errors::{PropellerAdsError, PropellerAdsResult};
use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, Response, StatusCode};
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// HTTP transport trait for sending requests to the PropellerAds API.
///
/// Implementations return the raw response for every HTTP status; an error
/// means no response was received at all (timeout, connection, DNS, TLS).
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send a single HTTP request
    async fn send(
        &self,
        method: Method,
        url: Url,
        headers: HeaderMap,
        body: Option<Bytes>,
        timeout: Duration,
    ) -> PropellerAdsResult<Response<Bytes>>;
}

/// Reqwest-based HTTP transport implementation
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a new reqwest transport.
    ///
    /// `connect_timeout` bounds connection setup; the per-request timeout is
    /// passed to [`HttpTransport::send`].
    pub fn new(connect_timeout: Duration) -> PropellerAdsResult<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| PropellerAdsError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client })
    }

    /// Wrap an existing reqwest client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn to_reqwest_method(method: &Method) -> PropellerAdsResult<reqwest::Method> {
        reqwest::Method::from_bytes(method.as_str().as_bytes()).map_err(|e| {
            PropellerAdsError::InvalidArgument {
                message: format!("Unsupported HTTP method {}: {}", method, e),
            }
        })
    }

    fn to_reqwest_headers(headers: &HeaderMap) -> reqwest::header::HeaderMap {
        let mut reqwest_headers = reqwest::header::HeaderMap::new();
        for (name, value) in headers.iter() {
            if let (Ok(name), Ok(value)) = (
                reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes()),
                reqwest::header::HeaderValue::from_bytes(value.as_bytes()),
            ) {
                reqwest_headers.append(name, value);
            }
        }
        reqwest_headers
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(
        &self,
        method: Method,
        url: Url,
        headers: HeaderMap,
        body: Option<Bytes>,
        timeout: Duration,
    ) -> PropellerAdsResult<Response<Bytes>> {
        let mut request = self
            .client
            .request(Self::to_reqwest_method(&method)?, url.as_str())
            .headers(Self::to_reqwest_headers(&headers))
            .timeout(timeout);

        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let response_headers = response.headers().clone();
        let body = response.bytes().await?;

        let mut http_response = Response::new(body);
        *http_response.status_mut() =
            StatusCode::from_u16(status).map_err(|e| PropellerAdsError::InvalidResponse {
                message: format!("Invalid status code {}: {}", status, e),
            })?;

        let out = http_response.headers_mut();
        for (name, value) in response_headers.iter() {
            if let (Ok(name), Ok(value)) = (
                http::header::HeaderName::from_bytes(name.as_str().as_bytes()),
                http::header::HeaderValue::from_bytes(value.as_bytes()),
            ) {
                out.append(name, value);
            }
        }

        Ok(http_response)
    }
}
