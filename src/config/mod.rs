//! Configuration types for the GitHub client.

use crate::auth::BearerToken;
use crate::errors::{GitHubError, GitHubErrorKind};
use std::time::Duration;

/// Default GitHub API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.github.com";

/// Default media type version used in the Accept header.
pub const DEFAULT_API_VERSION: &str = "v3";

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default User-Agent header.
pub const DEFAULT_USER_AGENT: &str = "integrations-github3api/0.1.0";

/// Page size GitHub uses when `per_page` is not given.
pub const DEFAULT_PAGE_SIZE: u32 = 30;

/// Fixed wait between rate-limit retries.
pub const DEFAULT_RETRY_WAIT: Duration = Duration::from_secs(60);

/// Maximum time spent retrying a rate-limited request.
pub const DEFAULT_RETRY_CEILING: Duration = Duration::from_secs(60 * 60);

/// Maximum number of attempts for a rate-limited request.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 60;

/// Environment variable holding the base URL for [`GitHubConfig::from_env`].
pub const ENV_BASE_URL: &str = "GH_BASE_URL";

/// Environment variable holding the token for [`GitHubConfig::from_env`].
pub const ENV_TOKEN: &str = "GH_TOKEN_PSW";

/// Rate-limit retry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRetryConfig {
    /// Fixed wait between attempts.
    pub wait_fixed: Duration,
    /// Total elapsed time after which retrying stops.
    pub ceiling: Duration,
    /// Maximum attempts, including the first one.
    pub max_attempts: u32,
    /// Enable retries.
    pub enabled: bool,
}

impl Default for RateLimitRetryConfig {
    fn default() -> Self {
        Self {
            wait_fixed: DEFAULT_RETRY_WAIT,
            ceiling: DEFAULT_RETRY_CEILING,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            enabled: true,
        }
    }
}

impl RateLimitRetryConfig {
    /// A configuration that never retries.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }
}

/// What counts as a rate-limit signal on an error response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDetection {
    /// Status codes that may carry a rate-limit signal.
    pub statuses: Vec<u16>,
    /// Case-insensitive markers searched for in the response message.
    pub body_markers: Vec<String>,
    /// Listed statuses that only count with evidence: an exhausted quota,
    /// a `Retry-After` header or a body marker. Other listed statuses are
    /// a signal on their own.
    pub evidence_statuses: Vec<u16>,
}

impl Default for RateLimitDetection {
    fn default() -> Self {
        Self {
            statuses: vec![403, 429],
            body_markers: vec!["rate limit".to_string()],
            evidence_statuses: vec![403],
        }
    }
}

/// GitHub client configuration.
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    /// API base URL.
    pub base_url: String,
    /// Media type version for the Accept header.
    pub api_version: String,
    /// Optional bearer token.
    pub token: Option<BearerToken>,
    /// Request timeout.
    pub timeout: Duration,
    /// Connect timeout.
    pub connect_timeout: Duration,
    /// User-Agent header.
    pub user_agent: String,
    /// Retry policy for REST requests.
    pub retry: RateLimitRetryConfig,
    /// Retry policy for GraphQL requests.
    pub graphql_retry: RateLimitRetryConfig,
    /// Rate-limit signal detection.
    pub rate_limit_detection: RateLimitDetection,
    /// Page size assumed when a URL carries no `per_page`.
    pub default_page_size: u32,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            token: None,
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            retry: RateLimitRetryConfig::default(),
            graphql_retry: RateLimitRetryConfig::default(),
            rate_limit_detection: RateLimitDetection::default(),
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl GitHubConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> GitHubConfigBuilder {
        GitHubConfigBuilder::new()
    }

    /// Builds a configuration from `GH_BASE_URL` and `GH_TOKEN_PSW`.
    ///
    /// Both are optional; an unset base URL falls back to the public API.
    pub fn from_env() -> Result<Self, GitHubError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, GitHubError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.is_empty()) {
            builder = builder.base_url(url);
        }
        if let Some(token) = lookup(ENV_TOKEN).filter(|v| !v.is_empty()) {
            builder = builder.token(token);
        }
        builder.build()
    }

    /// The Accept header value for the configured version.
    pub fn accept_header(&self) -> String {
        format!("application/vnd.github.{}+json", self.api_version)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), GitHubError> {
        if self.base_url.is_empty() {
            return Err(GitHubError::new(
                GitHubErrorKind::InvalidBaseUrl,
                "Base URL cannot be empty",
            ));
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(GitHubError::new(
                GitHubErrorKind::InvalidBaseUrl,
                "Base URL must start with http:// or https://",
            ));
        }

        if url::Url::parse(&self.base_url).is_err() {
            return Err(GitHubError::new(
                GitHubErrorKind::InvalidBaseUrl,
                format!("Base URL is not a valid URL: {}", self.base_url),
            ));
        }

        if self.user_agent.is_empty() {
            return Err(GitHubError::configuration("User-Agent is required by GitHub API"));
        }

        for retry in [&self.retry, &self.graphql_retry] {
            if retry.enabled && retry.wait_fixed.is_zero() {
                return Err(GitHubError::configuration("Retry wait must be greater than zero"));
            }
            if retry.enabled && retry.max_attempts == 0 {
                return Err(GitHubError::configuration("Retry max_attempts must be at least 1"));
            }
        }

        if self.default_page_size == 0 {
            return Err(GitHubError::configuration("Default page size must be greater than zero"));
        }

        Ok(())
    }
}

/// Accepts a bare hostname such as `api.github.com` and returns a full URL.
pub fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() || trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

/// Builder for GitHubConfig.
#[derive(Debug, Default)]
pub struct GitHubConfigBuilder {
    base_url: Option<String>,
    api_version: Option<String>,
    token: Option<BearerToken>,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    user_agent: Option<String>,
    retry: Option<RateLimitRetryConfig>,
    graphql_retry: Option<RateLimitRetryConfig>,
    rate_limit_detection: Option<RateLimitDetection>,
    default_page_size: Option<u32>,
}

impl GitHubConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base URL. A bare hostname gets an `https://` scheme.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(normalize_base_url(&url.into()));
        self
    }

    /// Sets the media type version (`v3` gives `application/vnd.github.v3+json`).
    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    /// Sets the bearer token.
    pub fn token(mut self, token: impl Into<BearerToken>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets the User-Agent header.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Sets the REST retry configuration.
    pub fn retry(mut self, config: RateLimitRetryConfig) -> Self {
        self.retry = Some(config);
        self
    }

    /// Sets the GraphQL retry configuration.
    pub fn graphql_retry(mut self, config: RateLimitRetryConfig) -> Self {
        self.graphql_retry = Some(config);
        self
    }

    /// Disables rate-limit retries for REST and GraphQL.
    pub fn no_retry(mut self) -> Self {
        self.retry = Some(RateLimitRetryConfig::disabled());
        self.graphql_retry = Some(RateLimitRetryConfig::disabled());
        self
    }

    /// Sets the rate-limit detection rules.
    pub fn rate_limit_detection(mut self, detection: RateLimitDetection) -> Self {
        self.rate_limit_detection = Some(detection);
        self
    }

    /// Sets the page size assumed when a URL carries no `per_page`.
    pub fn default_page_size(mut self, size: u32) -> Self {
        self.default_page_size = Some(size);
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> Result<GitHubConfig, GitHubError> {
        let config = GitHubConfig {
            base_url: self.base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_version: self.api_version.unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            token: self.token,
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            connect_timeout: self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            user_agent: self.user_agent.unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            retry: self.retry.unwrap_or_default(),
            graphql_retry: self.graphql_retry.unwrap_or_default(),
            rate_limit_detection: self.rate_limit_detection.unwrap_or_default(),
            default_page_size: self.default_page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = GitHubConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.api_version, DEFAULT_API_VERSION);
        assert!(config.token.is_none());
        assert_eq!(config.retry.wait_fixed, Duration::from_secs(60));
        assert_eq!(config.graphql_retry.ceiling, Duration::from_secs(3600));
        assert_eq!(config.accept_header(), "application/vnd.github.v3+json");
    }

    #[test]
    fn test_config_builder() {
        let config = GitHubConfig::builder()
            .base_url("https://github.example.com/api/v3/")
            .user_agent("test-client/1.0")
            .api_version("v2")
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap();

        assert_eq!(config.base_url, "https://github.example.com/api/v3");
        assert_eq!(config.user_agent, "test-client/1.0");
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.accept_header(), "application/vnd.github.v2+json");
    }

    #[test]
    fn test_bare_hostname_is_normalized() {
        let config = GitHubConfig::builder().base_url("api.github.com").build().unwrap();
        assert_eq!(config.base_url, "https://api.github.com");
    }

    #[test]
    fn test_invalid_base_url() {
        let result = GitHubConfig::builder().base_url("ftp://example.com").build();
        assert_eq!(*result.unwrap_err().kind(), GitHubErrorKind::InvalidBaseUrl);
    }

    #[test]
    fn test_zero_retry_wait_rejected() {
        let result = GitHubConfig::builder()
            .retry(RateLimitRetryConfig {
                wait_fixed: Duration::ZERO,
                ..Default::default()
            })
            .build();
        assert!(result.is_err());

        let disabled = GitHubConfig::builder()
            .retry(RateLimitRetryConfig {
                wait_fixed: Duration::ZERO,
                ..RateLimitRetryConfig::disabled()
            })
            .build();
        assert!(disabled.is_ok());
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [("GH_BASE_URL", "github.example.com/api/v3"), ("GH_TOKEN_PSW", "ghp_token")]
            .into_iter()
            .collect();
        let config = GitHubConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string())).unwrap();

        assert_eq!(config.base_url, "https://github.example.com/api/v3");
        assert_eq!(
            config.token.unwrap().header_value().unwrap(),
            "Bearer ghp_token"
        );
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config = GitHubConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert!(config.token.is_none());
    }
}
