//! Test doubles for the transport and auth seams.
//!
//! [`ScriptedTransport`] replays a fixed sequence of results and records
//! every call; the `mockall` generated [`MockHttpTransport`] and
//! [`MockAuthManager`] cover expectation-style tests.

use crate::auth::AuthManager;
use crate::errors::{PropellerAdsError, PropellerAdsResult};
use crate::transport::HttpTransport;
use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, Response, StatusCode};
use mockall::mock;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use url::Url;

/// One call seen by [`ScriptedTransport`]
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub timeout: Duration,
}

/// Transport that answers from a queue of scripted results.
///
/// Once the queue is empty every call fails with a configuration error, so
/// an unexpected extra attempt shows up as a test failure.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<PropellerAdsResult<Response<Bytes>>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response with `status` and `body`
    pub fn respond(self, status: u16, body: &str) -> Self {
        self.script.lock().push_back(Ok(response(status, body)));
        self
    }

    /// Queue a response with one extra header
    pub fn respond_with_header(self, status: u16, body: &str, name: &'static str, value: &str) -> Self {
        let mut resp = response(status, body);
        if let Ok(value) = HeaderValue::from_str(value) {
            resp.headers_mut().insert(name, value);
        }
        self.script.lock().push_back(Ok(resp));
        self
    }

    /// Queue a transport failure
    pub fn fail(self, error: PropellerAdsError) -> Self {
        self.script.lock().push_back(Err(error));
        self
    }

    /// Every call made so far
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(
        &self,
        method: Method,
        url: Url,
        headers: HeaderMap,
        body: Option<Bytes>,
        timeout: Duration,
    ) -> PropellerAdsResult<Response<Bytes>> {
        self.calls.lock().push(RecordedCall {
            method,
            url: url.clone(),
            headers,
            body,
            timeout,
        });

        self.script.lock().pop_front().unwrap_or_else(|| {
            Err(PropellerAdsError::Configuration {
                message: format!("No scripted response left for {}", url),
            })
        })
    }
}

/// Build a response with the given status and body
pub fn response(status: u16, body: &str) -> Response<Bytes> {
    let mut response = Response::new(Bytes::from(body.to_string()));
    *response.status_mut() = StatusCode::from_u16(status).expect("valid status code");
    response
}

mock! {
    pub HttpTransport {}

    #[async_trait]
    impl HttpTransport for HttpTransport {
        async fn send(
            &self,
            method: Method,
            url: Url,
            headers: HeaderMap,
            body: Option<Bytes>,
            timeout: Duration,
        ) -> PropellerAdsResult<Response<Bytes>>;
    }
}

mock! {
    pub AuthManager {}

    impl AuthManager for AuthManager {
        fn get_headers(&self) -> PropellerAdsResult<HeaderMap>;
        fn validate_api_key(&self) -> PropellerAdsResult<()>;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_transport_replays_in_order() {
        let transport = ScriptedTransport::new()
            .respond(500, "boom")
            .respond(200, "{}");
        let url = Url::parse("https://example.test/ping").unwrap();

        let first = transport
            .send(Method::GET, url.clone(), HeaderMap::new(), None, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let second = transport
            .send(Method::GET, url.clone(), HeaderMap::new(), None, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::OK);

        assert!(transport
            .send(Method::GET, url, HeaderMap::new(), None, Duration::from_secs(1))
            .await
            .is_err());
        assert_eq!(transport.call_count(), 3);
    }
}
