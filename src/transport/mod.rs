//! HTTP transport seam.
//!
//! Everything above this module talks to GitHub through [`HttpTransport`].
//! The default implementation sends requests with `reqwest`; tests swap in
//! [`crate::mocks::MockTransport`].

use crate::config::GitHubConfig;
use crate::errors::{GitHubError, GitHubErrorKind, GitHubResult, RateLimitInfo};
use crate::pagination::PaginationLinks;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A fully prepared request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL, including any query string.
    pub url: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Serialized JSON body.
    pub body: Option<Bytes>,
}

impl HttpRequest {
    /// Parses the body back into JSON.
    pub fn json_body(&self) -> Option<Value> {
        self.body
            .as_ref()
            .and_then(|b| serde_json::from_slice(b).ok())
    }
}

/// An unprocessed response: status, headers and body bytes.
#[derive(Debug, Clone)]
pub struct RawResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl RawResponse {
    /// Creates a raw response.
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Gets the status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Gets the response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Gets the body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Gets the body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Deserializes the body.
    pub fn json<T: DeserializeOwned>(&self) -> GitHubResult<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            GitHubError::deserialization(format!("Failed to deserialize response: {}", e))
                .with_status(self.status.as_u16())
        })
    }

    /// Parses the body as JSON; an empty body is `null`.
    pub fn json_value(&self) -> GitHubResult<Value> {
        if self.body.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Value::Null);
        }
        self.json()
    }

    /// Pagination relations from the `Link` header.
    pub fn links(&self) -> PaginationLinks {
        PaginationLinks::from_headers(&self.headers)
    }

    /// Rate limit headers, if present.
    pub fn rate_limit(&self) -> Option<RateLimitInfo> {
        RateLimitInfo::from_headers(&self.headers)
    }

    /// The `x-github-request-id` header.
    pub fn request_id(&self) -> Option<&str> {
        self.headers
            .get("x-github-request-id")
            .and_then(|v| v.to_str().ok())
    }
}

/// Sends one request and returns the response, whatever its status.
///
/// Only transport failures (DNS, TLS, connect, timeout) are errors here;
/// status handling belongs to the client.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends a request.
    async fn send(&self, request: HttpRequest) -> GitHubResult<RawResponse>;
}

/// Transport backed by a `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: Client,
}

impl ReqwestTransport {
    /// Creates a transport using the configured timeouts.
    pub fn new(config: &GitHubConfig) -> GitHubResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| {
                GitHubError::new(
                    GitHubErrorKind::InvalidConfiguration,
                    format!("Failed to create HTTP client: {}", e),
                )
            })?;

        Ok(Self { http })
    }

    /// Wraps an existing client.
    pub fn with_client(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> GitHubResult<RawResponse> {
        let mut builder = self
            .http
            .request(request.method, &request.url)
            .headers(request.headers);

        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(map_reqwest_error)?;

        Ok(RawResponse::new(status, headers, body))
    }
}

fn map_reqwest_error(e: reqwest::Error) -> GitHubError {
    if e.is_timeout() {
        GitHubError::timeout(format!("Request timed out: {}", e)).with_cause(e)
    } else if e.is_connect() {
        GitHubError::new(
            GitHubErrorKind::ConnectionFailed,
            format!("Connection failed: {}", e),
        )
        .with_cause(e)
    } else {
        GitHubError::new(GitHubErrorKind::Unknown, format!("Request failed: {}", e)).with_cause(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_empty_body_is_null() {
        let response = RawResponse::new(StatusCode::NO_CONTENT, HeaderMap::new(), Bytes::new());
        assert_eq!(response.json_value().unwrap(), Value::Null);
    }

    #[test]
    fn test_invalid_json_is_deserialization_error() {
        let response = RawResponse::new(StatusCode::OK, HeaderMap::new(), "not json");
        let err = response.json_value().unwrap_err();
        assert_eq!(*err.kind(), GitHubErrorKind::DeserializationError);
        assert_eq!(err.status_code(), Some(200));
    }

    #[test]
    fn test_links_and_request_id() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "link",
            HeaderValue::from_static(r#"<https://api.github.com/user/repos?page=2>; rel="next""#),
        );
        headers.insert("x-github-request-id", HeaderValue::from_static("ABCD:1234"));
        let response = RawResponse::new(StatusCode::OK, headers, "[]");

        assert_eq!(
            response.links().next.as_deref(),
            Some("https://api.github.com/user/repos?page=2")
        );
        assert_eq!(response.request_id(), Some("ABCD:1234"));
    }
}
