//! HTTP transport for the TestRail API.
//!
//! The client talks to TestRail through the [`Transport`] trait so that the
//! request/retry logic can be exercised without a network. [`HttpTransport`]
//! is the production implementation on top of `reqwest`.
//!
//! A transport only moves bytes: it reports the HTTP status and the decoded
//! JSON body and leaves the interpretation of TestRail's `error` field to
//! the client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use tracing::debug;

use super::ApiResult;
use crate::config::Credentials;

/// HTTP method of an API call. TestRail only uses GET and POST.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A fully-built API request.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    /// The API action of this request, e.g. `add_run` for
    /// `.../index.php?/api/v2/add_run/3`.
    pub fn action(&self) -> &str {
        self.url
            .split_once("/api/v2/")
            .map(|(_, rest)| rest.split(['/', '&']).next().unwrap_or(rest))
            .unwrap_or("")
    }
}

/// Status and decoded body of an API response.
///
/// An empty body decodes to `Value::Null`; a body that is not JSON is kept
/// as a `Value::String`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// A 200 response with the given body.
    pub fn ok(body: Value) -> Self {
        Self::new(200, body)
    }

    /// TestRail's application-level error text, if the body carries one.
    pub fn error_message(&self) -> Option<String> {
        match self.body.get("error")? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends API requests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request` and returns the response.
    ///
    /// Only transport-level failures (connection refused, timeout, ...) are
    /// errors. Any HTTP status is a successful send.
    async fn send(&self, request: &ApiRequest) -> ApiResult<ApiResponse>;
}

/// Transport using `reqwest` with HTTP basic authentication.
pub struct HttpTransport {
    client: Client,
    credentials: Credentials,
}

impl HttpTransport {
    /// Creates a transport authenticating every call with `credentials`.
    pub fn new(credentials: Credentials, timeout: Duration) -> ApiResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            credentials,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> ApiResult<ApiResponse> {
        debug!("{:?} {}", request.method, request.url);

        let builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };

        let mut builder = builder
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json");

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        Ok(ApiResponse { status, body })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted transport for tests.

    use std::sync::Mutex;

    use super::*;

    type Handler = Box<dyn Fn(&ApiRequest) -> ApiResponse + Send + Sync>;

    /// Records every request and answers with a handler.
    pub struct FakeTransport {
        handler: Handler,
        requests: Mutex<Vec<ApiRequest>>,
    }

    impl FakeTransport {
        pub fn new(handler: impl Fn(&ApiRequest) -> ApiResponse + Send + Sync + 'static) -> Self {
            Self {
                handler: Box::new(handler),
                requests: Mutex::new(Vec::new()),
            }
        }

        /// All requests sent so far.
        pub fn requests(&self) -> Vec<ApiRequest> {
            self.requests.lock().unwrap().clone()
        }

        /// Requests sent so far for `action`.
        pub fn requests_for(&self, action: &str) -> Vec<ApiRequest> {
            self.requests()
                .into_iter()
                .filter(|r| r.action() == action)
                .collect()
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn send(&self, request: &ApiRequest) -> ApiResult<ApiResponse> {
            self.requests.lock().unwrap().push(request.clone());
            Ok((self.handler)(request))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_action() {
        let request = ApiRequest {
            method: Method::Post,
            url: "https://x.testrail.io/index.php?/api/v2/add_run/3".to_string(),
            body: None,
        };
        assert_eq!(request.action(), "add_run");

        let paged = ApiRequest {
            method: Method::Get,
            url: "https://x.testrail.io/index.php?/api/v2/get_tests/5&limit=250&offset=250"
                .to_string(),
            body: None,
        };
        assert_eq!(paged.action(), "get_tests");
    }

    #[test]
    fn test_error_message() {
        let response = ApiResponse::ok(json!({"error": "API Rate Limit Exceeded"}));
        assert_eq!(
            response.error_message().as_deref(),
            Some("API Rate Limit Exceeded")
        );

        assert_eq!(ApiResponse::ok(json!({"id": 1})).error_message(), None);
        assert_eq!(ApiResponse::ok(json!({"error": null})).error_message(), None);
        assert_eq!(ApiResponse::ok(json!([1, 2])).error_message(), None);
        assert_eq!(ApiResponse::ok(Value::Null).error_message(), None);
    }
}
