//! Mock transport for testing code built on [`GitHubClient`](crate::GitHubClient).
//!
//! Responses are registered per `"METHOD /path?query"` key. A query-less key
//! also matches requests that carry a query string. Queued responses are
//! served in order and the last one keeps repeating.

use crate::errors::{GitHubError, GitHubErrorKind, GitHubResult};
use crate::transport::{HttpRequest, HttpTransport, RawResponse};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use url::Url;

/// A canned response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: String,
    /// Headers.
    pub headers: Vec<(String, String)>,
    /// Delay before responding.
    pub delay: Option<std::time::Duration>,
}

impl MockResponse {
    /// Creates a response with the given status and raw body.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            headers: Vec::new(),
            delay: None,
        }
    }

    /// Creates a 200 OK response with a JSON body.
    pub fn ok<T: Serialize + ?Sized>(body: &T) -> Self {
        Self::new(200, serde_json::to_string(body).unwrap_or_default())
    }

    /// Creates a 204 No Content response.
    pub fn no_content() -> Self {
        Self::new(204, "")
    }

    /// Creates a 404 Not Found response.
    pub fn not_found(message: &str) -> Self {
        Self::error(404, message)
    }

    /// Creates a 403 Forbidden response without rate limit evidence.
    pub fn forbidden(message: &str) -> Self {
        Self::error(403, message)
    }

    /// Creates a primary rate limit response: 403 with an exhausted quota.
    pub fn rate_limited() -> Self {
        let reset_at = Utc::now() + Duration::minutes(1);
        Self::new(
            403,
            serde_json::json!({
                "message": "API rate limit exceeded",
                "documentation_url": "https://docs.github.com/rest/overview/resources-in-the-rest-api#rate-limiting"
            })
            .to_string(),
        )
        .with_rate_limit(5000, 0, reset_at.timestamp())
    }

    /// Creates a secondary rate limit response: 429 with `Retry-After`.
    pub fn secondary_rate_limited() -> Self {
        Self::new(
            429,
            serde_json::json!({
                "message": "You have exceeded a secondary rate limit. Please wait a few minutes before you try again."
            })
            .to_string(),
        )
        .with_header("retry-after", "60")
    }

    /// Creates a 500 Internal Server Error response.
    pub fn server_error(message: &str) -> Self {
        Self::new(500, serde_json::json!({ "message": message }).to_string())
    }

    fn error(status: u16, message: &str) -> Self {
        Self::new(
            status,
            serde_json::json!({
                "message": message,
                "documentation_url": "https://docs.github.com/rest"
            })
            .to_string(),
        )
    }

    /// Adds a delay to the response.
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Adds a header to the response.
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.push((key.to_string(), value.to_string()));
        self
    }

    /// Adds a `Link` header with the given relations.
    pub fn with_links(self, links: &[(&str, &str)]) -> Self {
        let value = links
            .iter()
            .map(|(rel, url)| format!("<{}>; rel=\"{}\"", url, rel))
            .collect::<Vec<_>>()
            .join(", ");
        self.with_header("link", &value)
    }

    /// Adds a `Link` header pointing at the next page.
    pub fn with_next_link(self, url: &str) -> Self {
        self.with_links(&[("next", url)])
    }

    /// Adds rate limit headers.
    pub fn with_rate_limit(self, limit: u32, remaining: u32, reset_timestamp: i64) -> Self {
        self.with_header("x-ratelimit-limit", &limit.to_string())
            .with_header("x-ratelimit-remaining", &remaining.to_string())
            .with_header("x-ratelimit-reset", &reset_timestamp.to_string())
    }

    fn into_raw(self) -> GitHubResult<RawResponse> {
        let status = StatusCode::from_u16(self.status).map_err(|e| {
            GitHubError::new(GitHubErrorKind::InternalError, format!("Invalid mock status: {}", e))
        })?;

        let mut headers = HeaderMap::new();
        for (key, value) in &self.headers {
            let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
                GitHubError::new(GitHubErrorKind::InternalError, format!("Invalid mock header: {}", e))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                GitHubError::new(GitHubErrorKind::InternalError, format!("Invalid mock header: {}", e))
            })?;
            headers.append(name, value);
        }

        Ok(RawResponse::new(status, headers, Bytes::from(self.body)))
    }
}

/// A recorded request.
#[derive(Debug, Clone)]
pub struct MockRequest {
    /// HTTP method.
    pub method: String,
    /// Full request URL.
    pub url: String,
    /// Path and query, as used for matching.
    pub path: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// JSON request body.
    pub body: Option<Value>,
    /// Timestamp.
    pub timestamp: DateTime<Utc>,
}

impl MockRequest {
    /// Value of a request header as text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Default behavior for unmatched requests.
#[derive(Debug, Clone, Copy, Default)]
pub enum DefaultBehavior {
    /// Return a 404 response for unmatched requests.
    #[default]
    NotFound,
    /// Return a connection error for unmatched requests.
    Error,
    /// Panic on unmatched requests.
    Panic,
}

/// In-memory [`HttpTransport`].
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    responses: Arc<RwLock<HashMap<String, Vec<MockResponse>>>>,
    requests: Arc<RwLock<Vec<MockRequest>>>,
    default_behavior: DefaultBehavior,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default behavior for unmatched requests.
    pub fn with_default_behavior(mut self, behavior: DefaultBehavior) -> Self {
        self.default_behavior = behavior;
        self
    }

    /// Queues a response for a method and path.
    pub fn register(&self, method: &str, path: &str, response: MockResponse) {
        let key = format!("{} {}", method.to_uppercase(), path);
        let mut store = self.responses.write().unwrap_or_else(|e| e.into_inner());
        store.entry(key).or_default().push(response);
    }

    /// Queues a GET response.
    pub fn on_get(&self, path: &str, response: MockResponse) {
        self.register("GET", path, response);
    }

    /// Queues a POST response.
    pub fn on_post(&self, path: &str, response: MockResponse) {
        self.register("POST", path, response);
    }

    /// Queues a PUT response.
    pub fn on_put(&self, path: &str, response: MockResponse) {
        self.register("PUT", path, response);
    }

    /// Queues a PATCH response.
    pub fn on_patch(&self, path: &str, response: MockResponse) {
        self.register("PATCH", path, response);
    }

    /// Queues a DELETE response.
    pub fn on_delete(&self, path: &str, response: MockResponse) {
        self.register("DELETE", path, response);
    }

    /// Gets all recorded requests.
    pub fn requests(&self) -> Vec<MockRequest> {
        self.requests.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Gets the count of requests made.
    pub fn request_count(&self) -> usize {
        self.requests.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Verifies that a request was made to `path`, with or without a query.
    pub fn verify_request(&self, method: &str, path: &str) -> bool {
        self.requests
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|r| {
                r.method.eq_ignore_ascii_case(method)
                    && (r.path == path || strip_query(&r.path) == path)
            })
    }

    /// Clears recorded requests and registered responses.
    pub fn reset(&self) {
        self.requests.write().unwrap_or_else(|e| e.into_inner()).clear();
        self.responses.write().unwrap_or_else(|e| e.into_inner()).clear();
    }

    fn next_response(&self, method: &str, path: &str) -> Option<MockResponse> {
        let mut store = self.responses.write().unwrap_or_else(|e| e.into_inner());
        let exact = format!("{} {}", method, path);
        let key = if store.contains_key(&exact) {
            exact
        } else {
            format!("{} {}", method, strip_query(path))
        };

        let queue = store.get_mut(&key)?;
        match queue.len() {
            0 => None,
            1 => queue.first().cloned(),
            _ => Some(queue.remove(0)),
        }
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> GitHubResult<RawResponse> {
        let method = request.method.to_string();
        let path = path_and_query(&request.url);
        let body = request
            .body
            .as_ref()
            .and_then(|b| serde_json::from_slice::<Value>(b).ok());

        self.requests
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(MockRequest {
                method: method.clone(),
                url: request.url.clone(),
                path: path.clone(),
                headers: request.headers.clone(),
                body,
                timestamp: Utc::now(),
            });

        match self.next_response(&method, &path) {
            Some(response) => {
                if let Some(delay) = response.delay {
                    tokio::time::sleep(delay).await;
                }
                response.into_raw()
            }
            None => match self.default_behavior {
                DefaultBehavior::NotFound => MockResponse::not_found("Not Found").into_raw(),
                DefaultBehavior::Error => Err(GitHubError::new(
                    GitHubErrorKind::ConnectionFailed,
                    format!("No mock response for {} {}", method, path),
                )),
                DefaultBehavior::Panic => {
                    panic!("No mock response for {} {}", method, path);
                }
            },
        }
    }
}

fn path_and_query(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => match parsed.query() {
            Some(query) => format!("{}?{}", parsed.path(), query),
            None => parsed.path().to_string(),
        },
        Err(_) => url.to_string(),
    }
}

fn strip_query(path: &str) -> &str {
    path.split('?').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Method;

    fn get(url: &str) -> HttpRequest {
        HttpRequest {
            method: Method::GET,
            url: url.to_string(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    #[tokio::test]
    async fn test_last_response_repeats() {
        let mock = MockTransport::new();
        mock.on_get("/user", MockResponse::server_error("boom"));
        mock.on_get("/user", MockResponse::ok(&serde_json::json!({"login": "octocat"})));

        let first = mock.send(get("https://api.github.com/user")).await.unwrap();
        let second = mock.send(get("https://api.github.com/user")).await.unwrap();
        let third = mock.send(get("https://api.github.com/user")).await.unwrap();

        assert_eq!(first.status().as_u16(), 500);
        assert_eq!(second.status().as_u16(), 200);
        assert_eq!(third.status().as_u16(), 200);
        assert_eq!(mock.request_count(), 3);
    }

    #[tokio::test]
    async fn test_query_specific_key_wins() {
        let mock = MockTransport::new();
        mock.on_get("/repos/o/r/issues", MockResponse::ok(&serde_json::json!([1])));
        mock.on_get("/repos/o/r/issues?page=2", MockResponse::ok(&serde_json::json!([2])));

        let page_two = mock
            .send(get("https://api.github.com/repos/o/r/issues?page=2"))
            .await
            .unwrap();
        let any = mock
            .send(get("https://api.github.com/repos/o/r/issues?per_page=100"))
            .await
            .unwrap();

        assert_eq!(page_two.json_value().unwrap(), serde_json::json!([2]));
        assert_eq!(any.json_value().unwrap(), serde_json::json!([1]));
        assert!(mock.verify_request("GET", "/repos/o/r/issues"));
    }

    #[tokio::test]
    async fn test_unmatched_defaults_to_not_found() {
        let mock = MockTransport::new();
        let response = mock.send(get("https://api.github.com/nothing")).await.unwrap();
        assert_eq!(response.status().as_u16(), 404);

        let mock = MockTransport::new().with_default_behavior(DefaultBehavior::Error);
        let err = mock.send(get("https://api.github.com/nothing")).await.unwrap_err();
        assert_eq!(*err.kind(), GitHubErrorKind::ConnectionFailed);
    }

    #[test]
    fn test_rate_limited_headers() {
        let raw = MockResponse::rate_limited().into_raw().unwrap();
        let info = raw.rate_limit().unwrap();
        assert_eq!(info.remaining, 0);
        assert!(info.is_exhausted());
    }

    #[test]
    fn test_with_links() {
        let raw = MockResponse::ok(&serde_json::json!([]))
            .with_links(&[("next", "https://api.github.com/x?page=2"), ("last", "https://api.github.com/x?page=5")])
            .into_raw()
            .unwrap();
        let links = raw.links();
        assert_eq!(links.next.as_deref(), Some("https://api.github.com/x?page=2"));
        assert_eq!(links.last.as_deref(), Some("https://api.github.com/x?page=5"));
    }
}
