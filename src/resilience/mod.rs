//! Rate-limit detection and retry for GitHub API calls.

use crate::config::{RateLimitDetection, RateLimitRetryConfig};
use crate::errors::{GitHubError, GitHubResult};
use crate::observability::TracingHooks;
use crate::transport::RawResponse;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Decides whether an error response is GitHub signalling a rate limit.
///
/// The status must be one of the configured ones. Statuses that need
/// evidence (403 by default) must also show an exhausted quota, carry a
/// `Retry-After` header, or mention one of the body markers.
pub fn is_rate_limit_response(
    detection: &RateLimitDetection,
    response: &RawResponse,
    message: Option<&str>,
) -> bool {
    let status = response.status().as_u16();
    if !detection.statuses.contains(&status) {
        return false;
    }
    if !detection.evidence_statuses.contains(&status) {
        return true;
    }

    let exhausted = response
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim() == "0")
        .unwrap_or(false);
    if exhausted || response.headers().contains_key("retry-after") {
        return true;
    }

    let message = message.map(str::to_lowercase).unwrap_or_default();
    detection
        .body_markers
        .iter()
        .any(|marker| !marker.is_empty() && message.contains(&marker.to_lowercase()))
}

/// Fixed-interval retry bounded by an elapsed-time ceiling.
///
/// Only rate-limit errors are retried. Every other error, and the success
/// value, is returned from the first attempt that produces it.
#[derive(Debug, Clone)]
pub struct RateLimitRetry {
    wait_fixed: Duration,
    ceiling: Duration,
    max_attempts: u32,
    enabled: bool,
}

impl RateLimitRetry {
    /// Creates a retry policy from configuration.
    pub fn new(config: &RateLimitRetryConfig) -> Self {
        Self {
            wait_fixed: config.wait_fixed,
            ceiling: config.ceiling,
            max_attempts: config.max_attempts.max(1),
            enabled: config.enabled,
        }
    }

    /// Gets the wait between attempts.
    pub fn wait_fixed(&self) -> Duration {
        self.wait_fixed
    }

    /// Gets the elapsed-time ceiling.
    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }

    /// Executes an operation, retrying while it reports a rate limit.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> GitHubResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = GitHubResult<T>>,
    {
        let start = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let error = match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => e,
            };

            if !error.is_rate_limit() || !self.enabled {
                return Err(error);
            }

            let elapsed = start.elapsed();
            if attempt >= self.max_attempts || elapsed + self.wait_fixed > self.ceiling {
                TracingHooks::on_retry_exhausted(attempt, elapsed, &error);
                return Err(GitHubError::retry_exhausted(error, attempt, elapsed));
            }

            TracingHooks::on_rate_limit_retry(attempt, self.wait_fixed, elapsed, &error);
            sleep(self.wait_fixed).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::GitHubErrorKind;
    use reqwest::header::{HeaderMap, HeaderValue};
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use test_case::test_case;

    fn rate_limited() -> GitHubError {
        GitHubError::new(GitHubErrorKind::PrimaryRateLimitExceeded, "API rate limit exceeded").with_status(403)
    }

    fn policy(wait_secs: u64, ceiling_secs: u64, max_attempts: u32) -> RateLimitRetry {
        RateLimitRetry::new(&RateLimitRetryConfig {
            wait_fixed: Duration::from_secs(wait_secs),
            ceiling: Duration::from_secs(ceiling_secs),
            max_attempts,
            enabled: true,
        })
    }

    fn response(status: u16, headers: &[(&'static str, &'static str)]) -> RawResponse {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.insert(*name, HeaderValue::from_static(value));
        }
        RawResponse::new(StatusCode::from_u16(status).unwrap(), map, "")
    }

    #[test_case(403, &[("x-ratelimit-remaining", "0")], None, true ; "exhausted quota")]
    #[test_case(403, &[("retry-after", "60")], None, true ; "retry after header")]
    #[test_case(403, &[], Some("API rate limit exceeded for user"), true ; "body marker")]
    #[test_case(403, &[], Some("You have exceeded a secondary Rate Limit"), true ; "marker is case insensitive")]
    #[test_case(403, &[("x-ratelimit-remaining", "12")], Some("Resource not accessible"), false ; "plain forbidden")]
    #[test_case(429, &[("retry-after", "1")], None, true ; "too many requests")]
    #[test_case(429, &[], Some("Too Many Requests"), true ; "bare too many requests")]
    #[test_case(404, &[("x-ratelimit-remaining", "0")], None, false ; "status not listed")]
    fn test_rate_limit_detection(
        status: u16,
        headers: &[(&'static str, &'static str)],
        message: Option<&str>,
        expected: bool,
    ) {
        let detection = RateLimitDetection::default();
        assert_eq!(is_rate_limit_response(&detection, &response(status, headers), message), expected);
    }

    #[test]
    fn test_detection_without_evidence() {
        let detection = RateLimitDetection {
            evidence_statuses: vec![],
            ..Default::default()
        };
        assert!(is_rate_limit_response(&detection, &response(403, &[]), None));
        assert!(!is_rate_limit_response(&detection, &response(401, &[]), None));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_rate_limit_is_transparent() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = policy(60, 3600, 60)
            .execute(|| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(rate_limited())
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ceiling_stops_retrying() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let start = Instant::now();

        let result: GitHubResult<()> = policy(60, 3600, 1000)
            .execute(|| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(rate_limited())
                }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(*err.kind(), GitHubErrorKind::RateLimitRetryExhausted);
        assert_eq!(err.status_code(), Some(403));
        assert_eq!(calls.load(Ordering::SeqCst), 61);
        assert_eq!(start.elapsed(), Duration::from_secs(3600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_attempts_stops_retrying() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: GitHubResult<()> = policy(1, 3600, 3)
            .execute(|| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(rate_limited())
                }
            })
            .await;

        assert_eq!(*result.unwrap_err().kind(), GitHubErrorKind::RateLimitRetryExhausted);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: GitHubResult<()> = policy(60, 3600, 60)
            .execute(|| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(GitHubError::new(GitHubErrorKind::NotFound, "Not Found").with_status(404))
                }
            })
            .await;

        assert_eq!(*result.unwrap_err().kind(), GitHubErrorKind::NotFound);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disabled_policy_returns_rate_limit_error() {
        let result: GitHubResult<()> = RateLimitRetry::new(&RateLimitRetryConfig::disabled())
            .execute(|| async { Err(rate_limited()) })
            .await;

        assert_eq!(*result.unwrap_err().kind(), GitHubErrorKind::PrimaryRateLimitExceeded);
    }
}
