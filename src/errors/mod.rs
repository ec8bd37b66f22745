//! Error types for the GitHub client.

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use std::fmt;
use thiserror::Error;

/// Result type alias for GitHub operations.
pub type GitHubResult<T> = Result<T, GitHubError>;

/// Error kinds for categorizing GitHub errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitHubErrorKind {
    // Configuration errors
    /// Invalid base URL.
    InvalidBaseUrl,
    /// Invalid configuration.
    InvalidConfiguration,

    // Authentication errors
    /// Invalid token format or value.
    InvalidToken,
    /// Bad credentials (401).
    BadCredentials,

    // Authorization errors
    /// Access forbidden (403 that is not a rate limit).
    Forbidden,

    // Request errors
    /// Request validation failed (400).
    ValidationError,
    /// Invalid parameter supplied by the caller.
    InvalidParameter,
    /// Unprocessable entity (422).
    UnprocessableEntity,

    // Resource errors
    /// Resource not found (404).
    NotFound,
    /// Resource is gone (410).
    Gone,
    /// Resource conflict (409).
    Conflict,

    // Rate limit errors
    /// Primary rate limit exceeded.
    PrimaryRateLimitExceeded,
    /// Secondary rate limit exceeded.
    SecondaryRateLimitExceeded,
    /// GraphQL rate limit exceeded.
    GraphQlRateLimitExceeded,
    /// Rate limit persisted past the retry ceiling.
    RateLimitRetryExhausted,

    // Network errors
    /// Connection failed.
    ConnectionFailed,
    /// Request timeout.
    Timeout,

    // Server errors
    /// Internal server error (500).
    InternalError,
    /// Bad gateway (502).
    BadGateway,
    /// Service unavailable (503).
    ServiceUnavailable,

    // Response errors
    /// Failed to deserialize response.
    DeserializationError,
    /// Pagination or cursor metadata is missing or malformed.
    UnexpectedFormat,

    // GraphQL errors
    /// GraphQL query error.
    QueryError,
    /// GraphQL node limit exceeded.
    NodeLimitExceeded,

    // Generic
    /// Unknown error.
    Unknown,
}

impl fmt::Display for GitHubErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBaseUrl => write!(f, "invalid_base_url"),
            Self::InvalidConfiguration => write!(f, "invalid_configuration"),
            Self::InvalidToken => write!(f, "invalid_token"),
            Self::BadCredentials => write!(f, "bad_credentials"),
            Self::Forbidden => write!(f, "forbidden"),
            Self::ValidationError => write!(f, "validation_error"),
            Self::InvalidParameter => write!(f, "invalid_parameter"),
            Self::UnprocessableEntity => write!(f, "unprocessable_entity"),
            Self::NotFound => write!(f, "not_found"),
            Self::Gone => write!(f, "gone"),
            Self::Conflict => write!(f, "conflict"),
            Self::PrimaryRateLimitExceeded => write!(f, "primary_rate_limit_exceeded"),
            Self::SecondaryRateLimitExceeded => write!(f, "secondary_rate_limit_exceeded"),
            Self::GraphQlRateLimitExceeded => write!(f, "graphql_rate_limit_exceeded"),
            Self::RateLimitRetryExhausted => write!(f, "rate_limit_retry_exhausted"),
            Self::ConnectionFailed => write!(f, "connection_failed"),
            Self::Timeout => write!(f, "timeout"),
            Self::InternalError => write!(f, "internal_error"),
            Self::BadGateway => write!(f, "bad_gateway"),
            Self::ServiceUnavailable => write!(f, "service_unavailable"),
            Self::DeserializationError => write!(f, "deserialization_error"),
            Self::UnexpectedFormat => write!(f, "unexpected_format"),
            Self::QueryError => write!(f, "query_error"),
            Self::NodeLimitExceeded => write!(f, "node_limit_exceeded"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Rate limit information parsed from response headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// Maximum requests allowed.
    pub limit: u32,
    /// Remaining requests in current window.
    pub remaining: u32,
    /// Time when the rate limit resets.
    pub reset_at: DateTime<Utc>,
    /// Retry-After header value in seconds (if present).
    pub retry_after: Option<u64>,
    /// Resource category.
    pub resource: Option<String>,
}

impl RateLimitInfo {
    /// Parses the `x-ratelimit-*` headers. Returns `None` unless limit,
    /// remaining and reset are all present and numeric.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let limit = header_number(headers, "x-ratelimit-limit")?;
        let remaining = header_number(headers, "x-ratelimit-remaining")?;
        let reset_timestamp: i64 = header_number(headers, "x-ratelimit-reset")?;
        let reset_at = DateTime::from_timestamp(reset_timestamp, 0)?;

        let resource = headers
            .get("x-ratelimit-resource")
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        Some(Self {
            limit,
            remaining,
            reset_at,
            retry_after: header_number(headers, "retry-after"),
            resource,
        })
    }

    /// Whole minutes until the window resets, truncated toward zero.
    pub fn minutes_until_reset(&self, now: DateTime<Utc>) -> i64 {
        (self.reset_at - now).num_minutes()
    }

    /// Returns true when no requests remain in the current window.
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

fn header_number<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// GitHub API error with detailed information.
#[derive(Error, Debug)]
pub struct GitHubError {
    /// Error kind.
    kind: GitHubErrorKind,
    /// Error message.
    message: String,
    /// HTTP status code.
    status_code: Option<u16>,
    /// GitHub request ID.
    request_id: Option<String>,
    /// Documentation URL.
    documentation_url: Option<String>,
    /// Raw response body text.
    body: Option<String>,
    /// Rate limit info (if applicable).
    rate_limit: Option<RateLimitInfo>,
    /// Underlying cause.
    #[source]
    cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for GitHubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)?;
        if let Some(code) = self.status_code {
            write!(f, " (HTTP {})", code)?;
        }
        if let Some(ref id) = self.request_id {
            write!(f, " [request_id: {}]", id)?;
        }
        Ok(())
    }
}

impl GitHubError {
    /// Creates a new GitHub error.
    pub fn new(kind: GitHubErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: None,
            request_id: None,
            documentation_url: None,
            body: None,
            rate_limit: None,
            cause: None,
        }
    }

    /// Sets the HTTP status code.
    pub fn with_status(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }

    /// Sets the GitHub request ID.
    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    /// Sets the documentation URL.
    pub fn with_documentation_url(mut self, url: impl Into<String>) -> Self {
        self.documentation_url = Some(url.into());
        self
    }

    /// Sets the raw response body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets the rate limit info.
    pub fn with_rate_limit(mut self, info: RateLimitInfo) -> Self {
        self.rate_limit = Some(info);
        self
    }

    /// Reclassifies the error.
    pub(crate) fn with_kind(mut self, kind: GitHubErrorKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the underlying cause.
    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Gets the error kind.
    pub fn kind(&self) -> &GitHubErrorKind {
        &self.kind
    }

    /// Gets the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Gets the HTTP status code.
    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    /// Gets the request ID.
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Gets the documentation URL.
    pub fn documentation_url(&self) -> Option<&str> {
        self.documentation_url.as_deref()
    }

    /// Gets the raw response body.
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// Gets the rate limit info.
    pub fn rate_limit(&self) -> Option<&RateLimitInfo> {
        self.rate_limit.as_ref()
    }

    /// Returns true if this error is a rate limit signal that may be retried.
    pub fn is_rate_limit(&self) -> bool {
        matches!(
            self.kind,
            GitHubErrorKind::PrimaryRateLimitExceeded
                | GitHubErrorKind::SecondaryRateLimitExceeded
                | GitHubErrorKind::GraphQlRateLimitExceeded
        )
    }

    /// Creates an error from an HTTP status code and GitHub error response.
    pub fn from_response(
        status: u16,
        message: String,
        documentation_url: Option<String>,
        request_id: Option<String>,
    ) -> Self {
        let kind = Self::kind_from_status(status);
        let mut error = Self::new(kind, message).with_status(status);

        if let Some(url) = documentation_url {
            error = error.with_documentation_url(url);
        }
        if let Some(id) = request_id {
            error = error.with_request_id(id);
        }

        error
    }

    /// Maps HTTP status code to error kind.
    fn kind_from_status(status: u16) -> GitHubErrorKind {
        match status {
            400 => GitHubErrorKind::ValidationError,
            401 => GitHubErrorKind::BadCredentials,
            403 => GitHubErrorKind::Forbidden,
            404 => GitHubErrorKind::NotFound,
            409 => GitHubErrorKind::Conflict,
            410 => GitHubErrorKind::Gone,
            422 => GitHubErrorKind::UnprocessableEntity,
            429 => GitHubErrorKind::SecondaryRateLimitExceeded,
            500 => GitHubErrorKind::InternalError,
            502 => GitHubErrorKind::BadGateway,
            503 => GitHubErrorKind::ServiceUnavailable,
            _ => GitHubErrorKind::Unknown,
        }
    }

    // Convenience constructors

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(GitHubErrorKind::InvalidConfiguration, message)
    }

    /// Creates an invalid parameter error.
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::new(GitHubErrorKind::InvalidParameter, message)
    }

    /// Creates a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(GitHubErrorKind::Timeout, message)
    }

    /// Creates a deserialization error.
    pub fn deserialization(message: impl Into<String>) -> Self {
        Self::new(GitHubErrorKind::DeserializationError, message)
    }

    /// Creates an error for missing or malformed pagination metadata.
    pub fn unexpected_format(message: impl Into<String>) -> Self {
        Self::new(GitHubErrorKind::UnexpectedFormat, message)
    }

    /// Wraps the last rate limit error once the retry ceiling has elapsed.
    pub fn retry_exhausted(last: GitHubError, attempts: u32, elapsed: std::time::Duration) -> Self {
        let mut error = Self::new(
            GitHubErrorKind::RateLimitRetryExhausted,
            format!(
                "Rate limit persisted after {} attempts over {}s",
                attempts,
                elapsed.as_secs()
            ),
        );
        error.status_code = last.status_code;
        error.request_id = last.request_id.clone();
        error.rate_limit = last.rate_limit.clone();
        error.with_cause(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_error_display() {
        let error = GitHubError::new(GitHubErrorKind::NotFound, "Repository not found")
            .with_status(404)
            .with_request_id("abc123");

        let display = format!("{}", error);
        assert!(display.contains("not_found"));
        assert!(display.contains("Repository not found"));
        assert!(display.contains("404"));
        assert!(display.contains("abc123"));
    }

    #[test]
    fn test_from_response() {
        let error = GitHubError::from_response(
            404,
            "Not Found".to_string(),
            Some("https://docs.github.com".to_string()),
            Some("req-123".to_string()),
        )
        .with_body(r#"{"message":"Not Found"}"#);

        assert_eq!(*error.kind(), GitHubErrorKind::NotFound);
        assert_eq!(error.status_code(), Some(404));
        assert_eq!(error.documentation_url(), Some("https://docs.github.com"));
        assert_eq!(error.request_id(), Some("req-123"));
        assert_eq!(error.body(), Some(r#"{"message":"Not Found"}"#));
        assert!(!error.is_rate_limit());
    }

    #[test]
    fn test_rate_limit_info_from_headers() {
        let info = RateLimitInfo::from_headers(&headers(&[
            ("x-ratelimit-limit", "5000"),
            ("x-ratelimit-remaining", "4999"),
            ("x-ratelimit-reset", "1588792851"),
            ("x-ratelimit-resource", "core"),
        ]))
        .unwrap();

        assert_eq!(info.limit, 5000);
        assert_eq!(info.remaining, 4999);
        assert_eq!(info.reset_at.timestamp(), 1588792851);
        assert_eq!(info.resource.as_deref(), Some("core"));
        assert!(info.retry_after.is_none());
        assert!(!info.is_exhausted());
    }

    #[test]
    fn test_rate_limit_info_missing_headers() {
        assert!(RateLimitInfo::from_headers(&HeaderMap::new()).is_none());
        assert!(RateLimitInfo::from_headers(&headers(&[("x-ratelimit-reset", "1588792851")])).is_none());
    }

    #[test]
    fn test_minutes_until_reset_truncates() {
        let now = DateTime::parse_from_rfc3339("2020-05-06T18:22:45Z").unwrap().with_timezone(&Utc);
        let info = RateLimitInfo {
            limit: 5000,
            remaining: 4999,
            reset_at: DateTime::parse_from_rfc3339("2020-05-06T19:20:51Z").unwrap().with_timezone(&Utc),
            retry_after: None,
            resource: None,
        };

        assert_eq!(info.minutes_until_reset(now), 58);
    }

    #[test]
    fn test_retry_exhausted_keeps_last_error_details() {
        let last = GitHubError::from_response(403, "API rate limit exceeded".to_string(), None, Some("req-9".to_string()));
        let error = GitHubError::retry_exhausted(last, 3, std::time::Duration::from_secs(120));

        assert_eq!(*error.kind(), GitHubErrorKind::RateLimitRetryExhausted);
        assert_eq!(error.status_code(), Some(403));
        assert_eq!(error.request_id(), Some("req-9"));
        assert!(std::error::Error::source(&error).is_some());
        assert!(error.to_string().contains("3 attempts"));
    }
}
