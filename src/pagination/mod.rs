//! Pagination handling for the GitHub REST API.

use crate::client::{GitHubClient, RequestOptions};
use crate::errors::{GitHubError, GitHubResult};
use futures::stream::{self, Stream};
use reqwest::header::HeaderMap;
use reqwest::Method;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Pagination links parsed from Link header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationLinks {
    /// URL for the next page.
    pub next: Option<String>,
    /// URL for the previous page.
    pub prev: Option<String>,
    /// URL for the first page.
    pub first: Option<String>,
    /// URL for the last page.
    pub last: Option<String>,
}

impl PaginationLinks {
    /// Parses pagination links from the Link header (RFC 8288).
    pub fn from_header(header_value: &str) -> Self {
        let mut links = Self::default();

        for part in header_value.split(',') {
            let mut url = None;
            let mut rel = None;

            for segment in part.split(';') {
                let segment = segment.trim();
                if segment.starts_with('<') && segment.ends_with('>') {
                    url = Some(segment[1..segment.len() - 1].to_string());
                } else if let Some(value) = segment.strip_prefix("rel=") {
                    rel = Some(value.trim_matches('"').to_string());
                }
            }

            if let (Some(url), Some(rel)) = (url, rel) {
                // rel may hold several space separated relation types
                for rel in rel.split_whitespace() {
                    match rel {
                        "next" => links.next = Some(url.clone()),
                        "prev" => links.prev = Some(url.clone()),
                        "first" => links.first = Some(url.clone()),
                        "last" => links.last = Some(url.clone()),
                        _ => {}
                    }
                }
            }
        }

        links
    }

    /// Parses pagination links from response headers.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get("link")
            .and_then(|v| v.to_str().ok())
            .map(Self::from_header)
            .unwrap_or_default()
    }

    /// Returns true if there is a next page.
    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }

    /// Gets the last page number from the last link.
    pub fn last_page(&self) -> Option<u32> {
        self.last.as_deref().and_then(page_from_url)
    }
}

/// Extracts the `page` query parameter from a URL.
pub fn page_from_url(url: &str) -> Option<u32> {
    query_param(url, "page")
}

/// Extracts the `per_page` query parameter, falling back to `default`.
pub fn per_page_from_url(url: &str, default: u32) -> u32 {
    query_param(url, "per_page").unwrap_or(default)
}

fn query_param(url: &str, name: &str) -> Option<u32> {
    url::Url::parse(url).ok().and_then(|u| {
        u.query_pairs()
            .find(|(k, _)| k == name)
            .and_then(|(_, v)| v.parse().ok())
    })
}

/// Strips the base URL from an absolute URL, leaving the endpoint path.
///
/// URLs on another host are returned unchanged.
pub fn endpoint_from_url(url: &str, base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    match url.strip_prefix(base) {
        Some(rest) if rest.is_empty() => "/".to_string(),
        Some(rest) if rest.starts_with('/') || rest.starts_with('?') => rest.to_string(),
        _ => url.to_string(),
    }
}

/// Projects every item down to the requested keys.
///
/// Keys an item lacks are skipped; items that are not objects pass through
/// unchanged. With no attributes the items are returned as they are.
pub fn project_attributes<S: AsRef<str>>(items: Vec<Value>, attributes: Option<&[S]>) -> Vec<Value> {
    match attributes {
        Some(attributes) if !attributes.is_empty() => items
            .into_iter()
            .map(|item| project_item(item, attributes))
            .collect(),
        _ => items,
    }
}

fn project_item<S: AsRef<str>>(item: Value, attributes: &[S]) -> Value {
    match item {
        Value::Object(mut object) => {
            let mut projected = Map::new();
            for key in attributes {
                let key = key.as_ref();
                if let Some(value) = object.remove(key) {
                    projected.insert(key.to_string(), value);
                }
            }
            Value::Object(projected)
        }
        other => other,
    }
}

/// One fetched page of a REST collection.
#[derive(Debug, Clone)]
pub struct Page {
    /// Parsed body, unmodified.
    pub body: Value,
    /// Pagination links of this response.
    pub links: PaginationLinks,
}

impl Page {
    /// Returns true if there is a next page.
    pub fn has_next(&self) -> bool {
        self.links.has_next()
    }

    /// Returns the URL for the next page.
    pub fn next_url(&self) -> Option<&str> {
        self.links.next.as_deref()
    }

    /// Number of items this page contributes.
    pub fn len(&self) -> usize {
        match &self.body {
            Value::Array(items) => items.len(),
            Value::Null => 0,
            _ => 1,
        }
    }

    /// Returns true if the page contributes no items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consumes the page and returns its items. An array body yields its
    /// elements, `null` yields nothing, anything else is a single item.
    pub fn into_items(self) -> Vec<Value> {
        match self.body {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => vec![other],
        }
    }

    /// Consumes the page and returns the raw body.
    pub fn into_body(self) -> Value {
        self.body
    }
}

/// Lazy iterator over the pages of a REST collection.
///
/// Each call to [`GitHubClient::get_pages`] creates a fresh iterator; the
/// cursor lives here and nowhere else.
pub struct PageIterator<'a> {
    client: &'a GitHubClient,
    options: RequestOptions,
    next_endpoint: Option<String>,
    visited: HashSet<String>,
    pages_fetched: usize,
}

impl<'a> PageIterator<'a> {
    /// Creates a page iterator starting at `endpoint`. Query parameters in
    /// `options` apply to the first request only; later pages use the
    /// `next` link as given.
    pub fn new(client: &'a GitHubClient, endpoint: impl Into<String>, options: RequestOptions) -> Self {
        Self {
            client,
            options,
            next_endpoint: Some(endpoint.into()),
            visited: HashSet::new(),
            pages_fetched: 0,
        }
    }

    /// Fetches the next page, or `None` once the `next` relation is gone.
    pub async fn next_page(&mut self) -> GitHubResult<Option<Page>> {
        let endpoint = match self.next_endpoint.take() {
            Some(endpoint) => endpoint,
            None => return Ok(None),
        };

        let response = self
            .client
            .execute(Method::GET, &endpoint, &self.options)
            .await?;
        self.options.query.clear();
        self.visited.insert(self.client.build_url(&endpoint));
        let page = Page {
            body: response.json_value()?,
            links: response.links(),
        };
        self.pages_fetched += 1;

        match page.next_url() {
            Some(next) => {
                // A repeated URL means the links form a cycle.
                if self.visited.contains(&self.client.build_url(next)) {
                    return Err(GitHubError::unexpected_format(format!(
                        "next link points back at a page already fetched: {}",
                        next
                    )));
                }
                let next = endpoint_from_url(next, self.client.base_url());
                tracing::debug!(endpoint = %next, "found next endpoint in link header");
                self.next_endpoint = Some(next);
            }
            None => {
                tracing::debug!(pages = self.pages_fetched, "no more pages to retrieve");
            }
        }

        Ok(Some(page))
    }

    /// Collects every item from every remaining page.
    pub async fn collect_all(mut self) -> GitHubResult<Vec<Value>> {
        let mut all_items = Vec::new();

        while let Some(page) = self.next_page().await? {
            all_items.extend(page.into_items());
        }

        Ok(all_items)
    }

    /// Returns true if there are more pages.
    pub fn has_more(&self) -> bool {
        self.next_endpoint.is_some()
    }

    /// Number of pages fetched so far.
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Turns the iterator into a stream of pages. The stream ends after the
    /// first error.
    pub fn into_stream(self) -> impl Stream<Item = GitHubResult<Page>> + 'a {
        stream::try_unfold(self, |mut pages| async move {
            Ok(pages.next_page().await?.map(|page| (page, pages)))
        })
    }
}
