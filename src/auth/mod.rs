//! Bearer token authentication for the GitHub API.

use crate::errors::{GitHubError, GitHubErrorKind, GitHubResult};
use secrecy::{ExposeSecret, SecretString};

/// A GitHub token sent as `Authorization: Bearer <token>`.
///
/// Classic PATs, fine-grained PATs, OAuth tokens and the Actions
/// `GITHUB_TOKEN` are all accepted the same way. The secret is never
/// printed by `Debug`.
#[derive(Debug, Clone)]
pub struct BearerToken(SecretString);

impl BearerToken {
    /// Wraps a raw token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::new(token.into()))
    }

    /// Generates the Authorization header value.
    pub fn header_value(&self) -> GitHubResult<String> {
        let token = self.0.expose_secret().trim();
        if token.is_empty() {
            return Err(GitHubError::new(
                GitHubErrorKind::InvalidToken,
                "Bearer token is empty",
            ));
        }
        if token.chars().any(|c| c.is_control() || c.is_whitespace()) {
            return Err(GitHubError::new(
                GitHubErrorKind::InvalidToken,
                "Bearer token contains whitespace or control characters",
            ));
        }
        Ok(format!("Bearer {}", token))
    }

    /// Gets the token prefix for logging.
    pub fn token_prefix(&self) -> &'static str {
        let exposed = self.0.expose_secret();
        if exposed.starts_with("ghp_") {
            "ghp_***"
        } else if exposed.starts_with("github_pat_") {
            "github_pat_***"
        } else if exposed.starts_with("gho_") {
            "gho_***"
        } else if exposed.starts_with("ghs_") {
            "ghs_***"
        } else {
            "***"
        }
    }
}

impl From<String> for BearerToken {
    fn from(token: String) -> Self {
        Self::new(token)
    }
}

impl From<&str> for BearerToken {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}
