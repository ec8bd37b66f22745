//! GraphQL client for GitHub's GraphQL API v4.

use crate::client::{GitHubClient, RequestOptions};
use crate::errors::{GitHubError, GitHubErrorKind, GitHubResult};
use futures::stream::{self, Stream};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

/// Variable that receives the `endCursor` of the previous page.
pub const DEFAULT_CURSOR_VARIABLE: &str = "cursor";

/// GraphQL client for GitHub's GraphQL API.
#[derive(Clone, Copy)]
pub struct GraphQLService<'a> {
    client: &'a GitHubClient,
}

impl<'a> GraphQLService<'a> {
    /// Creates a new GraphQL service.
    pub fn new(client: &'a GitHubClient) -> Self {
        Self { client }
    }

    /// Executes a GraphQL query with variables.
    pub async fn query<T: serde::de::DeserializeOwned>(
        &self,
        query: &str,
        variables: Option<Value>,
    ) -> GitHubResult<GraphQLResponse<T>> {
        let response = self.execute_raw(query, variables.as_ref()).await?;
        let data = response
            .data
            .map(|raw| {
                serde_json::from_value(raw).map_err(|e| {
                    GitHubError::deserialization(format!("Failed to deserialize GraphQL data: {}", e))
                })
            })
            .transpose()?;

        Ok(GraphQLResponse {
            data,
            errors: response.errors,
        })
    }

    /// Executes a query and returns the untyped response.
    ///
    /// `RATE_LIMITED` errors are retried under the GraphQL retry policy.
    pub async fn execute_raw(
        &self,
        query: &str,
        variables: Option<&Value>,
    ) -> GitHubResult<GraphQLResponse<Value>> {
        let request = GraphQLRequest { query, variables };
        let options = RequestOptions::new().json(&request)?;
        let url = self.client.graphql_url();

        self.client
            .graphql_retry()
            .execute(|| async {
                let response = self.client.send_once(Method::POST, &url, &options).await?;
                let raw: GraphQLRawResponse = response.json()?;
                parse_graphql_response(raw)
            })
            .await
    }

    /// Returns a lazy iterator over the edges of a paged connection.
    ///
    /// `keys` is the dotted path from `data` to the connection, for example
    /// `"repository.pullRequests"`. The connection must expose `edges` and
    /// `pageInfo { hasNextPage endCursor }`, and the query must declare a
    /// `$cursor` variable.
    pub fn paged(
        &self,
        query: &str,
        variables: Option<Value>,
        keys: &str,
    ) -> GitHubResult<GraphQLPageIterator<'a>> {
        let variables = match variables {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(GitHubError::invalid_parameter(format!(
                    "GraphQL variables must be an object, got {}",
                    other
                )))
            }
        };

        let keys: Vec<String> = keys
            .split('.')
            .filter(|k| !k.is_empty())
            .map(String::from)
            .collect();
        if keys.is_empty() {
            return Err(GitHubError::invalid_parameter("GraphQL paging requires a key path"));
        }

        Ok(GraphQLPageIterator {
            service: *self,
            query: query.to_string(),
            variables,
            keys,
            cursor_variable: DEFAULT_CURSOR_VARIABLE.to_string(),
            seen_cursors: HashSet::new(),
            exhausted: false,
        })
    }
}

/// Selects single or paged execution for [`GitHubClient::graphql_with`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphQLMode {
    /// Execute once and return the response.
    Single,
    /// Page through the connection at this dotted key path.
    Paged(String),
}

/// Result of [`GitHubClient::graphql_with`].
pub enum GraphQLOutcome<'a> {
    /// Response of a single execution.
    Single(GraphQLResponse<Value>),
    /// Lazy iterator over edge pages.
    Pages(GraphQLPageIterator<'a>),
}

impl GitHubClient {
    /// Executes a GraphQL query once.
    pub async fn graphql_query(
        &self,
        query: &str,
        variables: Option<Value>,
    ) -> GitHubResult<GraphQLResponse<Value>> {
        self.graphql().execute_raw(query, variables.as_ref()).await
    }

    /// Pages through the connection at the dotted key path `keys`.
    pub fn graphql_paged(
        &self,
        query: &str,
        variables: Option<Value>,
        keys: &str,
    ) -> GitHubResult<GraphQLPageIterator<'_>> {
        self.graphql().paged(query, variables, keys)
    }

    /// Runs a GraphQL query either once or paged.
    pub async fn graphql_with(
        &self,
        query: &str,
        variables: Option<Value>,
        mode: GraphQLMode,
    ) -> GitHubResult<GraphQLOutcome<'_>> {
        match mode {
            GraphQLMode::Single => Ok(GraphQLOutcome::Single(
                self.graphql_query(query, variables).await?,
            )),
            GraphQLMode::Paged(keys) => Ok(GraphQLOutcome::Pages(
                self.graphql_paged(query, variables, &keys)?,
            )),
        }
    }
}

/// Lazy iterator over the pages of a GraphQL connection.
pub struct GraphQLPageIterator<'a> {
    service: GraphQLService<'a>,
    query: String,
    variables: Map<String, Value>,
    keys: Vec<String>,
    cursor_variable: String,
    seen_cursors: HashSet<String>,
    exhausted: bool,
}

impl<'a> GraphQLPageIterator<'a> {
    /// Uses another variable name for the cursor.
    pub fn with_cursor_variable(mut self, name: impl Into<String>) -> Self {
        self.cursor_variable = name.into();
        self
    }

    /// Variables that the next request will send.
    pub fn variables(&self) -> &Map<String, Value> {
        &self.variables
    }

    /// Returns true if there are more pages.
    pub fn has_more(&self) -> bool {
        !self.exhausted
    }

    /// Executes the query for the next page and returns its edges.
    pub async fn next_page(&mut self) -> GitHubResult<Option<Vec<Value>>> {
        if self.exhausted {
            return Ok(None);
        }

        let variables = Value::Object(self.variables.clone());
        let response = match self.service.execute_raw(&self.query, Some(&variables)).await {
            Ok(response) => response,
            Err(e) => {
                self.exhausted = true;
                return Err(e);
            }
        };

        let page = match response.data.as_ref() {
            Some(data) => extract_page(data, &self.keys),
            None => Err(GitHubError::unexpected_format("GraphQL response contains no data")),
        };
        let page = match page {
            Ok(page) => page,
            Err(e) => {
                self.exhausted = true;
                return Err(e);
            }
        };

        match page.next_cursor {
            Some(cursor) => {
                if !self.seen_cursors.insert(cursor.clone()) {
                    self.exhausted = true;
                    return Err(GitHubError::unexpected_format(format!(
                        "GraphQL endCursor '{}' was already used",
                        cursor
                    )));
                }
                tracing::debug!(cursor = %cursor, "GraphQL connection has another page");
                self.variables
                    .insert(self.cursor_variable.clone(), Value::String(cursor));
            }
            None => {
                tracing::debug!("GraphQL connection has no more pages");
                self.exhausted = true;
            }
        }

        Ok(Some(page.edges))
    }

    /// Collects the edges of every remaining page.
    pub async fn collect_all(mut self) -> GitHubResult<Vec<Value>> {
        let mut edges = Vec::new();
        while let Some(page) = self.next_page().await? {
            edges.extend(page);
        }
        Ok(edges)
    }

    /// Turns the iterator into a stream of edge pages.
    pub fn into_stream(self) -> impl Stream<Item = GitHubResult<Vec<Value>>> + 'a {
        stream::try_unfold(self, |mut pages| async move {
            Ok(pages.next_page().await?.map(|page| (page, pages)))
        })
    }
}

/// Edges of one page and the cursor for the next, if any.
#[derive(Debug, Clone, PartialEq)]
struct ConnectionPage {
    edges: Vec<Value>,
    next_cursor: Option<String>,
}

/// Walks `keys` from `data` and reads the connection found there.
fn extract_page(data: &Value, keys: &[String]) -> GitHubResult<ConnectionPage> {
    let mut node = data;
    for (depth, key) in keys.iter().enumerate() {
        let next = match node {
            Value::Object(map) => map.get(key),
            Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        node = next.ok_or_else(|| {
            GitHubError::unexpected_format(format!(
                "GraphQL response has no value at '{}'",
                keys[..=depth].join(".")
            ))
        })?;
    }

    let path = keys.join(".");
    let edges = node
        .get("edges")
        .and_then(Value::as_array)
        .ok_or_else(|| GitHubError::unexpected_format(format!("'{}' has no edges array", path)))?
        .clone();

    let page_info = node
        .get("pageInfo")
        .ok_or_else(|| GitHubError::unexpected_format(format!("'{}' has no pageInfo", path)))?;
    let has_next_page = page_info
        .get("hasNextPage")
        .and_then(Value::as_bool)
        .ok_or_else(|| {
            GitHubError::unexpected_format(format!("'{}.pageInfo' has no hasNextPage flag", path))
        })?;

    let next_cursor = if has_next_page {
        let cursor = page_info
            .get("endCursor")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                GitHubError::unexpected_format(format!(
                    "'{}.pageInfo' has a next page but no endCursor",
                    path
                ))
            })?;
        Some(cursor.to_string())
    } else {
        None
    };

    Ok(ConnectionPage { edges, next_cursor })
}

/// Splits GraphQL errors into failures and data-bearing responses.
fn parse_graphql_response(raw: GraphQLRawResponse) -> GitHubResult<GraphQLResponse<Value>> {
    let errors = raw.errors.map(|errs| {
        errs.into_iter()
            .map(GraphQLError::from)
            .collect::<Vec<_>>()
    });

    if let Some(ref err_list) = errors {
        for err in err_list {
            match err.error_type.as_deref() {
                Some("RATE_LIMITED") => {
                    return Err(GitHubError::new(
                        GitHubErrorKind::GraphQlRateLimitExceeded,
                        format!("GraphQL rate limit exceeded: {}", err.message),
                    ));
                }
                Some("MAX_NODE_LIMIT_EXCEEDED") => {
                    return Err(GitHubError::new(
                        GitHubErrorKind::NodeLimitExceeded,
                        format!("GraphQL node limit exceeded: {}", err.message),
                    ));
                }
                Some("FORBIDDEN") => {
                    return Err(GitHubError::new(
                        GitHubErrorKind::Forbidden,
                        format!("GraphQL forbidden: {}", err.message),
                    ));
                }
                Some("NOT_FOUND") => {
                    return Err(GitHubError::new(
                        GitHubErrorKind::NotFound,
                        format!("GraphQL not found: {}", err.message),
                    ));
                }
                _ => {}
            }
        }
    }

    let data = raw.data.filter(|d| !d.is_null());
    if data.is_none() {
        if let Some(ref err_list) = errors {
            let messages: Vec<&str> = err_list.iter().map(|e| e.message.as_str()).collect();
            return Err(GitHubError::new(
                GitHubErrorKind::QueryError,
                format!("GraphQL query failed: {}", messages.join("; ")),
            ));
        }
    }

    Ok(GraphQLResponse { data, errors })
}

/// GraphQL request payload.
#[derive(Debug, Serialize)]
struct GraphQLRequest<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    variables: Option<&'a Value>,
}

/// Raw GraphQL response from GitHub.
#[derive(Debug, Clone, Deserialize)]
struct GraphQLRawResponse {
    data: Option<Value>,
    errors: Option<Vec<GraphQLRawError>>,
}

/// Raw GraphQL error item from GitHub.
#[derive(Debug, Clone, Deserialize)]
struct GraphQLRawError {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
    path: Option<Vec<Value>>,
    locations: Option<Vec<GraphQLLocation>>,
    extensions: Option<HashMap<String, Value>>,
}

/// Typed GraphQL response.
///
/// GitHub reports GraphQL quota only through the `rateLimit` query field, so
/// callers that need it select that field in their query.
#[derive(Debug, Clone)]
pub struct GraphQLResponse<T> {
    /// Response data (if successful).
    pub data: Option<T>,
    /// GraphQL errors returned alongside the data.
    pub errors: Option<Vec<GraphQLError>>,
}

impl<T> GraphQLResponse<T> {
    /// Returns true if the response contains errors.
    pub fn has_errors(&self) -> bool {
        self.errors.as_ref().map(|e| !e.is_empty()).unwrap_or(false)
    }

    /// Consumes the response and returns the data or an error.
    pub fn into_data(self) -> GitHubResult<T> {
        self.data.ok_or_else(|| {
            GitHubError::new(
                GitHubErrorKind::QueryError,
                "GraphQL response contains no data",
            )
        })
    }
}

/// GraphQL error with detailed information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphQLError {
    /// Error message.
    pub message: String,
    /// Error type (e.g., "RATE_LIMITED", "NOT_FOUND").
    #[serde(rename = "type")]
    pub error_type: Option<String>,
    /// Path to the field that caused the error.
    pub path: Option<Vec<String>>,
    /// Source locations in the query.
    pub locations: Option<Vec<GraphQLLocation>>,
    /// Additional error extensions.
    pub extensions: Option<HashMap<String, Value>>,
}

impl From<GraphQLRawError> for GraphQLError {
    fn from(raw: GraphQLRawError) -> Self {
        Self {
            message: raw.message,
            error_type: raw.error_type,
            path: raw.path.map(|p| {
                p.into_iter()
                    .filter_map(|v| match v {
                        Value::String(s) => Some(s),
                        Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    })
                    .collect()
            }),
            locations: raw.locations,
            extensions: raw.extensions,
        }
    }
}

/// Location in GraphQL query source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphQLLocation {
    /// Line number (1-indexed).
    pub line: u32,
    /// Column number (1-indexed).
    pub column: u32,
}
