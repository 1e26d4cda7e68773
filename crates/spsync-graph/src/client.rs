//! Microsoft Graph API client
//!
//! Provides a typed HTTP client for the Microsoft Graph API: bearer
//! authentication, endpoint construction, and a single retry loop that every
//! Graph call goes through.
//!
//! ## Retry policy
//!
//! | Condition | Action |
//! |-----------|--------|
//! | 429 | sleep `Retry-After` (default 60 s), retry; error when exhausted |
//! | 5xx | backoff 1, 3, 7 … units; error when exhausted |
//! | 409 | backoff 2, 4, 8 … units; return the 409 when exhausted |
//! | timeout / connection failure | backoff 1, 3, 7 … units |
//! | TLS, proxy, redirect, request build errors | fail immediately |
//!
//! When the [`RateLimitMonitor`] reports usage at or above 90%, each retry
//! waits an additional `2^attempt` units first.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use reqwest::Method;
//! use spsync_graph::client::GraphClient;
//!
//! # async fn example() -> Result<(), spsync_graph::GraphError> {
//! let client = GraphClient::new("access-token-here");
//! let response = client.send(Method::GET, "/sites/root", |rb| rb).await?;
//! println!("{}", response.status());
//! # Ok(())
//! # }
//! ```

use std::{error::Error as _, sync::Arc, time::Duration};

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, trace, warn};

use crate::{
    auth::ClientCredentialsAuth,
    rate_limit::{parse_retry_after, RateLimitMonitor},
    GraphError,
};

/// Base URL for Microsoft Graph API v1.0
const GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Per-request timeout; applies to each chunk of a resumable upload.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

// ============================================================================
// RetryPolicy
// ============================================================================

/// Retry limits and backoff units for [`GraphClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Unit for exponential backoff (one second in production).
    pub backoff_unit: Duration,
    /// Wait used when a 429 carries no usable `Retry-After`.
    pub default_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_unit: Duration::from_secs(1),
            default_retry_after: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Backoff after a 5xx or transport failure: `2^(n+1) - 1` units.
    pub fn server_backoff(&self, attempt: u32) -> Duration {
        self.backoff_unit * ((1u32 << (attempt + 1).min(16)) - 1)
    }

    /// Backoff after a 409: `2^(n+1)` units.
    pub fn conflict_backoff(&self, attempt: u32) -> Duration {
        self.backoff_unit * (1u32 << (attempt + 1).min(16))
    }

    /// Extra pause before a retry while near the throttling limit: `2^n` units.
    pub fn slow_down_delay(&self, attempt: u32) -> Duration {
        self.backoff_unit * (1u32 << attempt.min(16))
    }
}

// ============================================================================
// GraphClient
// ============================================================================

enum Credential {
    Static(String),
    ClientCredentials(Arc<ClientCredentialsAuth>),
}

/// HTTP client for Microsoft Graph API calls
///
/// Wraps `reqwest::Client` with authentication headers, base URL
/// construction, response monitoring, and the retry policy.
pub struct GraphClient {
    /// The underlying HTTP client
    client: Client,
    /// Base URL for API requests
    base_url: String,
    credential: Credential,
    retry: RetryPolicy,
    monitor: Arc<RateLimitMonitor>,
}

impl GraphClient {
    /// Creates a new GraphClient with a fixed access token
    pub fn new(access_token: impl Into<String>) -> Self {
        Self::with_base_url(access_token, GRAPH_BASE_URL)
    }

    /// Creates a new GraphClient with a custom base URL (useful for testing)
    pub fn with_base_url(access_token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            credential: Credential::Static(access_token.into()),
            retry: RetryPolicy::default(),
            monitor: Arc::new(RateLimitMonitor::new()),
        }
    }

    /// Creates a client for `https://{graph_endpoint}/v1.0` that fetches
    /// tokens from `auth` as needed.
    pub fn with_auth(
        auth: Arc<ClientCredentialsAuth>,
        graph_endpoint: &str,
        timeout: Duration,
    ) -> Result<Self, GraphError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GraphError::Transport {
                message: e.to_string(),
                retryable: false,
            })?;
        Ok(Self {
            client,
            base_url: format!("https://{graph_endpoint}/v1.0"),
            credential: Credential::ClientCredentials(auth),
            retry: RetryPolicy::default(),
            monitor: Arc::new(RateLimitMonitor::new()),
        })
    }

    /// Use token-refreshing credentials against a custom base URL.
    pub fn with_auth_and_base_url(
        auth: Arc<ClientCredentialsAuth>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            credential: Credential::ClientCredentials(auth),
            retry: RetryPolicy::default(),
            monitor: Arc::new(RateLimitMonitor::new()),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn monitor(&self) -> &Arc<RateLimitMonitor> {
        &self.monitor
    }

    /// Returns the base URL for API requests
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for `path`; absolute inputs (pagination links, upload
    /// session URLs) pass through unchanged.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    async fn bearer(&self) -> Result<String, GraphError> {
        match &self.credential {
            Credential::Static(token) => Ok(token.clone()),
            Credential::ClientCredentials(auth) => Ok(auth.access_token().await?),
        }
    }

    /// Send an authenticated request through the retry policy.
    ///
    /// `customize` is applied to a fresh builder on every attempt to add a
    /// body or headers. The returned response may still carry a client error
    /// status (4xx, or 409 after retries); see [`check_status`].
    pub async fn send<F>(&self, method: Method, path: &str, customize: F) -> Result<Response, GraphError>
    where
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        self.execute_with_retry(method, path, true, true, customize).await
    }

    /// Like [`send`](Self::send) but a 409 is returned at once. For
    /// requests whose conflicts are name collisions that waiting cannot
    /// resolve, such as creating a folder with `conflictBehavior: fail`.
    pub async fn send_without_conflict_retry<F>(
        &self,
        method: Method,
        path: &str,
        customize: F,
    ) -> Result<Response, GraphError>
    where
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        self.execute_with_retry(method, path, true, false, customize).await
    }

    /// Like [`send`](Self::send) but without an `Authorization` header, for
    /// pre-authenticated upload session URLs.
    pub async fn send_unauthenticated<F>(
        &self,
        method: Method,
        url: &str,
        customize: F,
    ) -> Result<Response, GraphError>
    where
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        self.execute_with_retry(method, url, false, true, customize).await
    }

    /// GET `path` and decode a successful JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, GraphError> {
        let response = check_status(self.send(Method::GET, path, |rb| rb).await?).await?;
        decode_json(response).await
    }

    // ========================================================================
    // execute_with_retry
    // ========================================================================

    async fn execute_with_retry<F>(
        &self,
        method: Method,
        path: &str,
        authenticated: bool,
        retry_conflicts: bool,
        customize: F,
    ) -> Result<Response, GraphError>
    where
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        let url = self.url(path);
        let max_retries = self.retry.max_retries;

        for attempt in 0..=max_retries {
            if attempt > 0 && self.monitor.should_slow_down() {
                let delay = self.retry.slow_down_delay(attempt);
                debug!(url = %url, delay_ms = delay.as_millis() as u64, "Near throttling limit, pausing before retry");
                tokio::time::sleep(delay).await;
            }

            let mut builder = self.client.request(method.clone(), &url);
            if authenticated {
                builder = builder.bearer_auth(self.bearer().await?);
            }
            let builder = customize(builder);

            trace!(method = %method, url = %url, attempt, "Sending Graph request");
            let response = match builder.send().await {
                Ok(response) => response,
                Err(err) => {
                    let (message, retryable) = classify_transport(&err);
                    if retryable && attempt < max_retries {
                        let wait = self.retry.server_backoff(attempt);
                        warn!(
                            url = %url,
                            error = %message,
                            attempt = attempt + 1,
                            max_retries,
                            wait_ms = wait.as_millis() as u64,
                            "Transport error, retrying"
                        );
                        tokio::time::sleep(wait).await;
                        continue;
                    }
                    return Err(GraphError::Transport { message, retryable });
                }
            };

            let status = response.status();
            self.monitor.record(
                &method,
                &url,
                response.headers(),
                status == StatusCode::TOO_MANY_REQUESTS,
            );
            trace!(method = %method, url = %url, status = status.as_u16(), "Graph response");

            if status == StatusCode::TOO_MANY_REQUESTS {
                if attempt >= max_retries {
                    warn!(url = %url, attempts = attempt + 1, "429 retry limit exhausted");
                    return Err(GraphError::Throttled {
                        attempts: attempt + 1,
                        url,
                    });
                }
                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .map(|v| parse_retry_after(v, self.retry.default_retry_after))
                    .unwrap_or(self.retry.default_retry_after);
                warn!(
                    url = %url,
                    attempt = attempt + 1,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "Received 429, backing off"
                );
                tokio::time::sleep(retry_after).await;
                continue;
            }

            if status.is_server_error() {
                if attempt >= max_retries {
                    warn!(url = %url, status = status.as_u16(), "Server error retries exhausted");
                    return Err(GraphError::ServerError {
                        status: status.as_u16(),
                        attempts: attempt + 1,
                        url,
                    });
                }
                let wait = self.retry.server_backoff(attempt);
                warn!(
                    url = %url,
                    status = status.as_u16(),
                    attempt = attempt + 1,
                    wait_ms = wait.as_millis() as u64,
                    "Server error, retrying"
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            if status == StatusCode::CONFLICT && retry_conflicts && attempt < max_retries {
                let wait = self.retry.conflict_backoff(attempt);
                debug!(
                    url = %url,
                    attempt = attempt + 1,
                    wait_ms = wait.as_millis() as u64,
                    "Conflict (locked or processing), retrying"
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            if attempt > 0 {
                debug!(url = %url, attempt, "Request completed after retry");
            }
            return Ok(response);
        }

        Err(GraphError::InvalidResponse(format!(
            "retry loop exited unexpectedly for {url}"
        )))
    }
}

/// Pass through a success response; map anything else to [`GraphError`].
pub async fn check_status(response: Response) -> Result<Response, GraphError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(GraphError::from_response(response).await)
    }
}

/// Decode a JSON body.
pub async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T, GraphError> {
    let text = response.text().await.map_err(|e| GraphError::Transport {
        message: e.to_string(),
        retryable: false,
    })?;
    serde_json::from_str(&text).map_err(|e| GraphError::InvalidResponse(e.to_string()))
}

/// Whether a transport failure is worth retrying, with a description.
///
/// TLS and proxy failures surface as connection errors in reqwest, so the
/// source chain is inspected to tell them apart from plain network errors.
fn classify_transport(err: &reqwest::Error) -> (String, bool) {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        chain.push_str(": ");
        chain.push_str(&inner.to_string());
        source = inner.source();
    }

    let lower = chain.to_ascii_lowercase();
    let tls_or_proxy = ["certificate", "tls", "ssl", "handshake", "proxy"]
        .iter()
        .any(|needle| lower.contains(needle));

    let retryable = if err.is_redirect() || err.is_builder() || tls_or_proxy {
        false
    } else {
        err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
    };
    (chain, retryable)
}
