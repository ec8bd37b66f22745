//! Tracing hooks for GitHub API operations.
//!
//! The crate only emits `tracing` events; installing a subscriber is left to
//! the application.

use crate::errors::{GitHubError, RateLimitInfo};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Formats rate limit state as `"<remaining>/<limit> resets in <n> min"`.
pub fn rate_limit_summary(info: &RateLimitInfo, now: DateTime<Utc>) -> String {
    format!(
        "{}/{} resets in {} min",
        info.remaining,
        info.limit,
        info.minutes_until_reset(now)
    )
}

/// Tracing hooks for GitHub API operations.
pub struct TracingHooks;

impl TracingHooks {
    /// Logs the start of an API request.
    pub fn on_request_start(method: &str, url: &str) {
        debug!(
            method = %method,
            url = %url,
            "GitHub API request started"
        );
    }

    /// Logs the completion of an API request.
    pub fn on_request_complete(method: &str, url: &str, status: u16, duration: Duration) {
        debug!(
            method = %method,
            url = %url,
            status = status,
            duration_ms = duration.as_millis() as u64,
            "GitHub API request completed"
        );
    }

    /// Logs a request error.
    pub fn on_request_error(method: &str, url: &str, error: &GitHubError) {
        debug!(
            method = %method,
            url = %url,
            error = %error,
            "GitHub API request failed"
        );
    }

    /// Logs rate limit state carried by a response.
    pub fn on_rate_limit_update(info: &RateLimitInfo) {
        debug!(
            resource = info.resource.as_deref().unwrap_or("core"),
            "{}",
            rate_limit_summary(info, Utc::now())
        );
    }

    /// Logs a rate-limit retry.
    pub fn on_rate_limit_retry(attempt: u32, delay: Duration, elapsed: Duration, error: &GitHubError) {
        warn!(
            attempt = attempt,
            delay_secs = delay.as_secs(),
            elapsed_secs = elapsed.as_secs(),
            error = %error,
            "rate limit error - retrying request"
        );
    }

    /// Logs that the retry ceiling was reached.
    pub fn on_retry_exhausted(attempts: u32, elapsed: Duration, error: &GitHubError) {
        error!(
            attempts = attempts,
            elapsed_secs = elapsed.as_secs(),
            error = %error,
            "rate limit persisted past retry ceiling"
        );
    }
}
