//! # GitHub API Client
//!
//! A thin GitHub client for REST API v3 and GraphQL API v4 with:
//! - Bearer token authentication
//! - Pagination directives for `GET` (single, raw, all pages, lazy pages)
//! - Attribute projection over paged results
//! - Fixed-interval retry on rate limit errors, bounded by a time ceiling
//! - Cursor-based GraphQL paging
//! - `total` counting via the `Link` header
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use integrations_github3api::{GetDirective, GetOptions, GetOutcome, GitHubClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = GitHubClient::builder()
//!         .base_url("api.github.com")
//!         .token("ghp_xxxxxxxxxxxx")
//!         .build()?;
//!
//!     let login = client.get("/user").await?["login"].clone();
//!     println!("authenticated as {}", login);
//!
//!     let options = GetOptions::new(GetDirective::All).attributes(["name", "full_name"]);
//!     if let GetOutcome::All(repos) = client.get_with("/user/repos", options).await? {
//!         println!("{} repositories", repos.len());
//!     }
//!
//!     println!("{} open issues", client.total("/repos/octocat/hello-world/issues").await?);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod config;
pub mod errors;

// Authentication
pub mod auth;

// HTTP client and transport
pub mod client;
pub mod transport;

// Pagination handling
pub mod pagination;

// GraphQL
pub mod services;

// Rate limit retry
pub mod resilience;

// Observability
pub mod observability;

// Mocks for testing
pub mod mocks;

// Re-exports for convenience
pub use auth::BearerToken;
pub use client::{
    GetDirective, GetOptions, GetOutcome, GitHubClient, GitHubClientBuilder, RequestOptions,
};
pub use config::{GitHubConfig, GitHubConfigBuilder, RateLimitDetection, RateLimitRetryConfig};
pub use errors::{GitHubError, GitHubErrorKind, GitHubResult, RateLimitInfo};
pub use pagination::{Page, PageIterator, PaginationLinks};
pub use resilience::RateLimitRetry;
pub use services::{GraphQLMode, GraphQLOutcome, GraphQLPageIterator, GraphQLResponse, GraphQLService};
pub use transport::{HttpRequest, HttpTransport, RawResponse, ReqwestTransport};
