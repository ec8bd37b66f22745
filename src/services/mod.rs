//! GitHub API service implementations.

mod graphql;

pub use graphql::*;
