//! HTTP transport seam for the marketplace API.
//!
//! Requests are described as plain `ApiRequest` values and sent through the
//! `HttpTransport` trait, so the request pipeline can be exercised against a
//! scripted transport in tests.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// An outgoing request, relative to the API base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub bearer: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            bearer: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Put, path).with_body(body)
    }

    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Patch, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }
}

/// Status and raw body of a completed exchange.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: u16,
    body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_str(&self.body)
            .map_err(|e| ApiError::InvalidResponse(format!("{} (status {})", e, self.status)))
    }
}

/// Sends a single request and returns whatever the server answered.
///
/// Implementations do not interpret status codes; non-2xx responses are
/// returned as `Ok` and classified by the pipeline.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError>;
}

/// `HttpTransport` over a pooled reqwest client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let url = self.url_for(&request.path);
        debug!(method = ?request.method, url = %url, "Sending request");

        let mut builder = self.client.request(request.method.into(), &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(ref token) = request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(url = %url, status, "Received response");

        Ok(ApiResponse::new(status, body))
    }
}

/// Scripted transport for tests
#[cfg(test)]
pub mod mock {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use super::*;

    /// A scripted reply: a response, or a failure before any status arrives
    type Reply = Result<ApiResponse, String>;

    /// Replays queued responses per route and records every request sent.
    #[derive(Default)]
    pub struct MockTransport {
        responses: Mutex<HashMap<(Method, String), VecDeque<Reply>>>,
        requests: Mutex<Vec<ApiRequest>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a response for the next request to `method path`.
        pub fn respond(&self, method: Method, path: &str, status: u16, body: Value) {
            self.queue(method, path, Ok(ApiResponse::new(status, body.to_string())));
        }

        /// Queue a transport failure (no status) for the next request to `method path`.
        pub fn fail(&self, method: Method, path: &str, message: &str) {
            self.queue(method, path, Err(message.to_string()));
        }

        fn queue(&self, method: Method, path: &str, reply: Reply) {
            self.responses
                .lock()
                .unwrap()
                .entry((method, path.to_string()))
                .or_default()
                .push_back(reply);
        }

        pub fn requests(&self) -> Vec<ApiRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub fn count(&self, method: Method, path: &str) -> usize {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.method == method && r.path == path)
                .count()
        }

        pub fn total_requests(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl HttpTransport for MockTransport {
        async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
            self.requests.lock().unwrap().push(request.clone());
            // Suspend like a real network call so concurrent requests interleave
            tokio::task::yield_now().await;

            let next = self
                .responses
                .lock()
                .unwrap()
                .get_mut(&(request.method, request.path.clone()))
                .and_then(|queue| queue.pop_front());

            match next {
                Some(Ok(response)) => Ok(response),
                Some(Err(message)) => Err(ApiError::InvalidResponse(message)),
                None => Ok(ApiResponse::new(
                    404,
                    format!(r#"{{"detail": "no mock for {}"}}"#, request.path),
                )),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_url_for_joins_slashes() {
        let transport =
            ReqwestTransport::with_client(Client::new(), "http://127.0.0.1:8000/api/");
        assert_eq!(
            transport.url_for("auth/login/"),
            "http://127.0.0.1:8000/api/auth/login/"
        );
        assert_eq!(
            transport.url_for("/products/7/"),
            "http://127.0.0.1:8000/api/products/7/"
        );
    }

    #[test]
    fn test_request_builders() {
        let request = ApiRequest::patch("products/3/", json!({"available": false}))
            .with_query("page", "2")
            .with_bearer("A1");
        assert_eq!(request.method, Method::Patch);
        assert_eq!(request.body, Some(json!({"available": false})));
        assert_eq!(request.query, vec![("page".to_string(), "2".to_string())]);
        assert_eq!(request.bearer.as_deref(), Some("A1"));
    }

    #[test]
    fn test_response_json_reports_invalid_body() {
        let response = ApiResponse::new(200, "not json");
        let parsed: Result<Value, _> = response.json();
        assert!(matches!(parsed, Err(ApiError::InvalidResponse(_))));
        assert!(ApiResponse::new(204, "").is_success());
        assert!(!ApiResponse::new(401, "").is_success());
    }
}
