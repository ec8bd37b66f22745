//! GitHub API client implementation.

use crate::config::{
    GitHubConfig, GitHubConfigBuilder, RateLimitDetection, RateLimitRetryConfig,
};
use crate::errors::{GitHubError, GitHubErrorKind, GitHubResult};
use crate::observability::TracingHooks;
use crate::pagination::{page_from_url, per_page_from_url, project_attributes, Page, PageIterator};
use crate::resilience::{is_rate_limit_response, RateLimitRetry};
use crate::services::GraphQLService;
use crate::transport::{HttpRequest, HttpTransport, RawResponse, ReqwestTransport};
use bytes::Bytes;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT,
};
use reqwest::Method;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

/// GitHub error response format.
#[derive(Debug, serde::Deserialize)]
struct GitHubErrorResponse {
    message: Option<String>,
    documentation_url: Option<String>,
}

/// Extra per-request settings: query parameters, headers and a JSON body.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Query parameters appended to the URL.
    pub query: Vec<(String, String)>,
    /// Headers added on top of the client defaults.
    pub headers: HeaderMap,
    /// Serialized JSON body.
    pub body: Option<Bytes>,
}

impl RequestOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Adds a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Serializes `body` as the JSON request body.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> GitHubResult<Self> {
        let bytes = serde_json::to_vec(body).map_err(|e| {
            GitHubError::invalid_parameter(format!("Failed to serialize request body: {}", e))
        })?;
        self.body = Some(Bytes::from(bytes));
        Ok(self)
    }
}

/// How a GET should treat pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GetDirective {
    /// One request, parsed body.
    #[default]
    Single,
    /// One request, unprocessed response.
    Raw,
    /// Follow every `next` link and concatenate the items.
    All,
    /// Lazily yield one raw page at a time.
    Page,
}

/// Options for [`GitHubClient::get_with`].
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    /// Pagination directive.
    pub directive: GetDirective,
    /// Keys to keep on every item; only used with [`GetDirective::All`].
    pub attributes: Option<Vec<String>>,
    /// Query parameters and headers.
    pub request: RequestOptions,
}

impl GetOptions {
    /// Options for a given directive.
    pub fn new(directive: GetDirective) -> Self {
        Self {
            directive,
            ..Default::default()
        }
    }

    /// Keeps only these keys on every item.
    pub fn attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = Some(attributes.into_iter().map(Into::into).collect());
        self
    }

    /// Sets query parameters and headers.
    pub fn request(mut self, request: RequestOptions) -> Self {
        self.request = request;
        self
    }
}

/// Result of [`GitHubClient::get_with`].
pub enum GetOutcome<'a> {
    /// Parsed body of a single response.
    Single(Value),
    /// Unprocessed response.
    Raw(RawResponse),
    /// Items of every page, in order.
    All(Vec<Value>),
    /// Lazy page iterator.
    Pages(PageIterator<'a>),
}

impl std::fmt::Debug for GetOutcome<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(v) => f.debug_tuple("Single").field(v).finish(),
            Self::Raw(r) => f.debug_tuple("Raw").field(r).finish(),
            Self::All(items) => f.debug_tuple("All").field(items).finish(),
            Self::Pages(_) => f.write_str("Pages(..)"),
        }
    }
}

/// GitHub API client.
pub struct GitHubClient {
    /// Configuration.
    config: GitHubConfig,
    /// Request primitive.
    transport: Arc<dyn HttpTransport>,
    /// Precomputed Authorization header.
    auth_header: Option<HeaderValue>,
    /// Retry policy for REST calls.
    retry: RateLimitRetry,
    /// Retry policy for GraphQL calls.
    graphql_retry: RateLimitRetry,
}

impl GitHubClient {
    /// Creates a new GitHub client backed by `reqwest`.
    pub fn new(config: GitHubConfig) -> GitHubResult<Self> {
        config.validate()?;
        let transport = Arc::new(ReqwestTransport::new(&config)?);
        Self::with_transport(config, transport)
    }

    /// Creates a client that sends requests through `transport`.
    pub fn with_transport(config: GitHubConfig, transport: Arc<dyn HttpTransport>) -> GitHubResult<Self> {
        config.validate()?;

        let auth_header = match &config.token {
            Some(token) => {
                tracing::debug!(token = token.token_prefix(), "using bearer token authentication");
                let mut value = HeaderValue::from_str(&token.header_value()?).map_err(|e| {
                    GitHubError::new(
                        GitHubErrorKind::InvalidToken,
                        format!("Token is not a valid header value: {}", e),
                    )
                })?;
                value.set_sensitive(true);
                Some(value)
            }
            None => None,
        };

        Ok(Self {
            retry: RateLimitRetry::new(&config.retry),
            graphql_retry: RateLimitRetry::new(&config.graphql_retry),
            config,
            transport,
            auth_header,
        })
    }

    /// Creates a client from `GH_BASE_URL` and `GH_TOKEN_PSW`.
    pub fn from_env() -> GitHubResult<Self> {
        Self::new(GitHubConfig::from_env()?)
    }

    /// Creates a new client builder.
    pub fn builder() -> GitHubClientBuilder {
        GitHubClientBuilder::new()
    }

    /// Gets the base URL.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Gets the configuration.
    pub fn config(&self) -> &GitHubConfig {
        &self.config
    }

    /// Returns true if requests carry a bearer token.
    pub fn is_authenticated(&self) -> bool {
        self.auth_header.is_some()
    }

    /// Gets the GraphQL service.
    pub fn graphql(&self) -> GraphQLService<'_> {
        GraphQLService::new(self)
    }

    // GET directives

    /// Makes a GET request and returns the parsed body.
    pub async fn get(&self, endpoint: &str) -> GitHubResult<Value> {
        self.get_raw(endpoint).await?.json_value()
    }

    /// Makes a GET request and deserializes the body.
    pub async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> GitHubResult<T> {
        self.get_raw(endpoint).await?.json()
    }

    /// Makes a GET request and returns the unprocessed response.
    pub async fn get_raw(&self, endpoint: &str) -> GitHubResult<RawResponse> {
        self.execute(Method::GET, endpoint, &RequestOptions::default()).await
    }

    /// Fetches every page and returns the concatenated items, optionally
    /// projected down to `attributes`.
    pub async fn get_all<S: AsRef<str>>(
        &self,
        endpoint: &str,
        attributes: Option<&[S]>,
    ) -> GitHubResult<Vec<Value>> {
        tracing::debug!(endpoint = %endpoint, "get items from all pages");
        let items = PageIterator::new(self, endpoint, RequestOptions::default())
            .collect_all()
            .await?;
        Ok(project_attributes(items, attributes))
    }

    /// Returns a lazy iterator over the raw pages of `endpoint`.
    pub fn get_pages(&self, endpoint: &str) -> PageIterator<'_> {
        PageIterator::new(self, endpoint, RequestOptions::default())
    }

    /// Makes a GET request following `options.directive`.
    pub async fn get_with(&self, endpoint: &str, options: GetOptions) -> GitHubResult<GetOutcome<'_>> {
        let GetOptions {
            directive,
            attributes,
            request,
        } = options;

        match directive {
            GetDirective::Single => {
                let response = self.execute(Method::GET, endpoint, &request).await?;
                Ok(GetOutcome::Single(response.json_value()?))
            }
            GetDirective::Raw => Ok(GetOutcome::Raw(
                self.execute(Method::GET, endpoint, &request).await?,
            )),
            GetDirective::All => {
                let items = PageIterator::new(self, endpoint, request).collect_all().await?;
                Ok(GetOutcome::All(project_attributes(items, attributes.as_deref())))
            }
            GetDirective::Page => Ok(GetOutcome::Pages(PageIterator::new(self, endpoint, request))),
        }
    }

    // Other verbs

    /// Makes a POST request.
    pub async fn post<B: Serialize + ?Sized>(&self, endpoint: &str, body: Option<&B>) -> GitHubResult<Value> {
        self.request(Method::POST, endpoint, Self::body_options(body)?).await
    }

    /// Makes a PATCH request.
    pub async fn patch<B: Serialize + ?Sized>(&self, endpoint: &str, body: Option<&B>) -> GitHubResult<Value> {
        self.request(Method::PATCH, endpoint, Self::body_options(body)?).await
    }

    /// Makes a PUT request.
    pub async fn put<B: Serialize + ?Sized>(&self, endpoint: &str, body: Option<&B>) -> GitHubResult<Value> {
        self.request(Method::PUT, endpoint, Self::body_options(body)?).await
    }

    /// Makes a DELETE request. A `204 No Content` gives `Value::Null`.
    pub async fn delete(&self, endpoint: &str) -> GitHubResult<Value> {
        self.request(Method::DELETE, endpoint, RequestOptions::default()).await
    }

    /// Makes a request with explicit options and returns the parsed body.
    pub async fn request(&self, method: Method, endpoint: &str, options: RequestOptions) -> GitHubResult<Value> {
        self.execute(method, endpoint, &options).await?.json_value()
    }

    /// Makes a request with explicit options and returns the raw response.
    pub async fn raw_request(
        &self,
        method: Method,
        endpoint: &str,
        options: RequestOptions,
    ) -> GitHubResult<RawResponse> {
        self.execute(method, endpoint, &options).await
    }

    // Counting

    /// Counts the resources behind a collection endpoint without listing
    /// them, using the `last` pagination relation.
    pub async fn total(&self, endpoint: &str) -> GitHubResult<u64> {
        if endpoint.contains('?') {
            return Err(GitHubError::invalid_parameter(format!(
                "total does not accept endpoints with query parameters: {}",
                endpoint
            )));
        }

        let options = RequestOptions::new().query("per_page", 1);
        let first = self.execute(Method::GET, endpoint, &options).await?;
        let links = first.links();

        let last_url = match links.last.clone() {
            Some(url) => url,
            None => {
                let page = Page {
                    body: first.json_value()?,
                    links,
                };
                return Ok(page.len() as u64);
            }
        };

        let last_page = page_from_url(&last_url).ok_or_else(|| {
            GitHubError::unexpected_format(format!("last link has no page number: {}", last_url))
        })?;
        let per_page = per_page_from_url(&last_url, self.config.default_page_size);
        if per_page == 1 {
            return Ok(u64::from(last_page));
        }

        let last = self.get_raw(&last_url).await?;
        let page = Page {
            body: last.json_value()?,
            links: last.links(),
        };
        Ok(u64::from(per_page) * u64::from(last_page.saturating_sub(1)) + page.len() as u64)
    }

    // Internal methods

    fn body_options<B: Serialize + ?Sized>(body: Option<&B>) -> GitHubResult<RequestOptions> {
        match body {
            Some(body) => RequestOptions::new().json(body),
            None => Ok(RequestOptions::new()),
        }
    }

    /// Sends a request under the REST retry policy.
    pub(crate) async fn execute(
        &self,
        method: Method,
        endpoint: &str,
        options: &RequestOptions,
    ) -> GitHubResult<RawResponse> {
        self.retry
            .execute(|| self.send_once(method.clone(), endpoint, options))
            .await
    }

    /// Gets the GraphQL retry policy.
    pub(crate) fn graphql_retry(&self) -> &RateLimitRetry {
        &self.graphql_retry
    }

    /// Sends one attempt and turns non-2xx responses into errors.
    pub(crate) async fn send_once(
        &self,
        method: Method,
        endpoint: &str,
        options: &RequestOptions,
    ) -> GitHubResult<RawResponse> {
        let url = self.build_url_with_query(endpoint, &options.query)?;
        let request = self.prepare(method, url, options)?;
        let method_name = request.method.to_string();
        let url = request.url.clone();

        TracingHooks::on_request_start(&method_name, &url);
        let started = Instant::now();

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(e) => {
                TracingHooks::on_request_error(&method_name, &url, &e);
                return Err(e);
            }
        };

        TracingHooks::on_request_complete(
            &method_name,
            &url,
            response.status().as_u16(),
            started.elapsed(),
        );
        if let Some(info) = response.rate_limit() {
            TracingHooks::on_rate_limit_update(&info);
        }

        if !response.is_success() {
            let error = Self::handle_error_response(&response, &self.config.rate_limit_detection);
            TracingHooks::on_request_error(&method_name, &url, &error);
            return Err(error);
        }

        Ok(response)
    }

    fn prepare(&self, method: Method, url: String, options: &RequestOptions) -> GitHubResult<HttpRequest> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_str(&self.config.accept_header()).map_err(|e| {
                GitHubError::configuration(format!("Invalid Accept header: {}", e))
            })?,
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&self.config.user_agent).map_err(|e| {
                GitHubError::configuration(format!("Invalid User-Agent header: {}", e))
            })?,
        );
        if let Some(auth) = &self.auth_header {
            headers.insert(AUTHORIZATION, auth.clone());
        }
        if options.body.is_some() {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        for (name, value) in &options.headers {
            headers.insert(name.clone(), value.clone());
        }

        Ok(HttpRequest {
            method,
            url,
            headers,
            body: options.body.clone(),
        })
    }

    /// Resolves an endpoint against the base URL. Absolute URLs pass through.
    pub(crate) fn build_url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return endpoint.to_string();
        }
        let base = self.config.base_url.trim_end_matches('/');
        let path = endpoint.trim_start_matches('/');
        format!("{}/{}", base, path)
    }

    fn build_url_with_query(&self, endpoint: &str, query: &[(String, String)]) -> GitHubResult<String> {
        let url = self.build_url(endpoint);
        if query.is_empty() {
            return Ok(url);
        }

        let query_string = serde_urlencoded::to_string(query).map_err(|e| {
            GitHubError::invalid_parameter(format!("Failed to serialize parameters: {}", e))
        })?;
        let separator = if url.contains('?') { '&' } else { '?' };
        Ok(format!("{}{}{}", url, separator, query_string))
    }

    /// URL of the GraphQL endpoint. Enterprise `/api/v3` bases map to `/api/graphql`.
    pub(crate) fn graphql_url(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        match base.strip_suffix("/v3") {
            Some(api) if api.ends_with("/api") => format!("{}/graphql", api),
            _ => format!("{}/graphql", base),
        }
    }

    fn handle_error_response(response: &RawResponse, detection: &RateLimitDetection) -> GitHubError {
        let status = response.status();
        let rate_limit = response.rate_limit();
        let error_body = response.json::<GitHubErrorResponse>().ok();

        let message = error_body
            .as_ref()
            .and_then(|e| e.message.clone())
            .unwrap_or_else(|| format!("HTTP {} error", status.as_u16()));
        let documentation_url = error_body.and_then(|e| e.documentation_url);

        let rate_limited = is_rate_limit_response(detection, response, Some(&message));

        let mut error = GitHubError::from_response(
            status.as_u16(),
            message,
            documentation_url,
            response.request_id().map(String::from),
        )
        .with_body(response.text());

        if rate_limited {
            let primary = rate_limit.as_ref().map(|info| info.is_exhausted()).unwrap_or(false);
            error = error.with_kind(if primary {
                GitHubErrorKind::PrimaryRateLimitExceeded
            } else {
                GitHubErrorKind::SecondaryRateLimitExceeded
            });
        } else if error.is_rate_limit() {
            error = error.with_kind(GitHubErrorKind::Unknown);
        }

        if let Some(info) = rate_limit {
            error = error.with_rate_limit(info);
        }

        error
    }
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("base_url", &self.config.base_url)
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

/// Builder for GitHubClient.
pub struct GitHubClientBuilder {
    config_builder: GitHubConfigBuilder,
    transport: Option<Arc<dyn HttpTransport>>,
}

impl GitHubClientBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self {
            config_builder: GitHubConfig::builder(),
            transport: None,
        }
    }

    /// Sets the base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.base_url(url);
        self
    }

    /// Sets the bearer token.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.token(token.into());
        self
    }

    /// Sets the media type version for the Accept header.
    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.api_version(version);
        self
    }

    /// Sets the timeout.
    pub fn timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config_builder = self.config_builder.timeout(timeout);
        self
    }

    /// Sets the User-Agent.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.user_agent(ua);
        self
    }

    /// Sets the REST retry policy.
    pub fn retry(mut self, config: RateLimitRetryConfig) -> Self {
        self.config_builder = self.config_builder.retry(config);
        self
    }

    /// Sets the GraphQL retry policy.
    pub fn graphql_retry(mut self, config: RateLimitRetryConfig) -> Self {
        self.config_builder = self.config_builder.graphql_retry(config);
        self
    }

    /// Disables retries.
    pub fn no_retry(mut self) -> Self {
        self.config_builder = self.config_builder.no_retry();
        self
    }

    /// Sets the rate-limit detection rules.
    pub fn rate_limit_detection(mut self, detection: RateLimitDetection) -> Self {
        self.config_builder = self.config_builder.rate_limit_detection(detection);
        self
    }

    /// Sends requests through a custom transport.
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Builds the client.
    pub fn build(self) -> GitHubResult<GitHubClient> {
        let config = self.config_builder.build()?;
        match self.transport {
            Some(transport) => GitHubClient::with_transport(config, transport),
            None => GitHubClient::new(config),
        }
    }
}

impl Default for GitHubClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
