//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the mirror, including:
//! - Building the one connection-pooling client used for the whole run
//! - GET requests for pages and assets
//! - Retry with exponential back-off for transient failures
//! - Error classification into transient and permanent causes

use crate::config::{Config, FetchConfig};
use crate::crawler::Shutdown;
use crate::output::ErrorKind;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{redirect::Policy, Client, StatusCode};
use std::time::{Duration, Instant};
use thiserror::Error;
use url::Url;

/// Maximum redirect hops followed for one request
const MAX_REDIRECTS: usize = 10;

/// Upper bound on the back-off growth factor
const MAX_BACKOFF_FACTOR: f64 = 2.0;

/// Why a fetch did not produce a body
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchCause {
    /// 5xx or 429; retried
    #[error("HTTP {0}")]
    TransientStatus(u16),

    /// Any other non-success status; never retried
    #[error("HTTP {0}")]
    PermanentStatus(u16),

    /// Connection refused or reset, body read failure
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    /// Redirect loop or too many hops
    #[error("redirect error: {0}")]
    Redirect(String),

    /// The request could not be built
    #[error("invalid request: {0}")]
    Request(String),

    /// Shutdown was requested before the fetch could finish
    #[error("cancelled")]
    Cancelled,
}

impl FetchCause {
    /// Returns true if another attempt might succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::TransientStatus(_) | Self::Network(_) | Self::Timeout
        )
    }

    /// HTTP status of the last response, if one arrived
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::TransientStatus(code) | Self::PermanentStatus(code) => Some(*code),
            _ => None,
        }
    }

    /// Failure class reported in the crawl summary
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TransientStatus(_) | Self::Network(_) | Self::Timeout => {
                ErrorKind::TransientNetwork
            }
            Self::PermanentStatus(_) | Self::Redirect(_) | Self::Request(_) => {
                ErrorKind::PermanentFetch
            }
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    fn from_reqwest(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_redirect() {
            Self::Redirect(error.to_string())
        } else if error.is_builder() {
            Self::Request(error.to_string())
        } else {
            Self::Network(error.to_string())
        }
    }

    fn from_status(status: StatusCode) -> Self {
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Self::TransientStatus(status.as_u16())
        } else {
            Self::PermanentStatus(status.as_u16())
        }
    }
}

/// A fetch that failed for good
#[derive(Debug, Clone, Error)]
#[error("{url}: {cause} (after {attempts} attempt(s))")]
pub struct FetchError {
    pub url: String,
    pub cause: FetchCause,
    /// Network attempts made, including the first
    pub attempts: u32,
}

/// Body and metadata of a successful fetch
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// URL after redirects
    pub final_url: Url,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    /// Network attempts made, including the first
    pub attempts: u32,
    /// Time from the first attempt to the end of the body
    pub latency: Duration,
}

impl FetchResponse {
    /// Returns true if the response should be parsed as HTML
    ///
    /// A missing Content-Type is treated as HTML.
    pub fn is_html(&self) -> bool {
        match &self.content_type {
            Some(content_type) => content_type.to_ascii_lowercase().contains("html"),
            None => true,
        }
    }
}

/// Exponential back-off schedule for one URL
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub factor: f64,
    pub max_delay: Duration,
    /// Total time one URL may spend in attempts and back-off
    pub budget: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&FetchConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            factor: config.backoff_factor.clamp(1.0, MAX_BACKOFF_FACTOR),
            max_delay: Duration::from_millis(config.max_delay_ms),
            budget: Duration::from_millis(config.attempt_budget_ms),
        }
    }

    /// Delay before retry number `retry` (zero-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let delay = self.base_delay.as_secs_f64() * self.factor.powi(exponent);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// True if waiting `delay` after `elapsed` still ends inside the budget
    ///
    /// Server retry hints can be arbitrarily large, so an overflowing sum
    /// counts as over budget.
    pub fn allows(&self, elapsed: Duration, delay: Duration) -> bool {
        elapsed
            .checked_add(delay)
            .map_or(false, |end| end <= self.budget)
    }
}

/// Builds the HTTP client shared by page and asset fetches
///
/// # Example
///
/// ```no_run
/// use sumi_mirror::config::Config;
/// use sumi_mirror::crawler::build_http_client;
///
/// let config = Config::for_seed("https://example.com/");
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &Config) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.header_value())
        .timeout(Duration::from_secs(config.fetch.timeout_secs))
        .connect_timeout(Duration::from_secs(config.fetch.connect_timeout_secs))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches URLs with retry and back-off
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct FetchClient {
    client: Client,
    policy: RetryPolicy,
    shutdown: Shutdown,
}

/// One failed attempt plus the server's retry hint, if any
struct AttemptFailure {
    cause: FetchCause,
    retry_after: Option<Duration>,
}

impl FetchClient {
    pub fn new(client: Client, policy: RetryPolicy, shutdown: Shutdown) -> Self {
        Self {
            client,
            policy,
            shutdown,
        }
    }

    /// Builds the client from configuration
    pub fn from_config(config: &Config, shutdown: Shutdown) -> Result<Self, reqwest::Error> {
        let client = build_http_client(config)?;
        Ok(Self::new(
            client,
            RetryPolicy::from_config(&config.fetch),
            shutdown,
        ))
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetches a URL, retrying transient failures
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | HTTP 2xx | Return the body |
    /// | HTTP 429 | Retry, honoring Retry-After when present |
    /// | HTTP 5xx | Retry with back-off |
    /// | Timeout, connection error | Retry with back-off |
    /// | Other HTTP status | Fail immediately |
    /// | Redirect loop or > 10 hops | Fail immediately |
    ///
    /// Retries stop when `max_retries` is reached, when the next delay would
    /// overrun the attempt budget, or when shutdown is requested.
    pub async fn fetch(&self, url: &Url) -> Result<FetchResponse, FetchError> {
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            if self.shutdown.is_triggered() {
                return Err(self.error(url, FetchCause::Cancelled, attempts));
            }

            attempts += 1;
            let failure = match self.attempt(url).await {
                Ok(mut response) => {
                    response.attempts = attempts;
                    response.latency = started.elapsed();
                    return Ok(response);
                }
                Err(failure) => failure,
            };

            tracing::debug!("Attempt {} for {} failed: {}", attempts, url, failure.cause);

            if !failure.cause.is_transient() || attempts > self.policy.max_retries {
                return Err(self.error(url, failure.cause, attempts));
            }

            let delay = failure
                .retry_after
                .unwrap_or_else(|| self.policy.delay_for(attempts - 1));

            if !self.policy.allows(started.elapsed(), delay) {
                tracing::debug!(
                    "Retry budget of {:?} exhausted for {}",
                    self.policy.budget,
                    url
                );
                return Err(self.error(url, failure.cause, attempts));
            }

            tracing::debug!("Retrying {} in {:?}", url, delay);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.triggered() => {
                    return Err(self.error(url, FetchCause::Cancelled, attempts));
                }
            }
        }
    }

    async fn attempt(&self, url: &Url) -> Result<FetchResponse, AttemptFailure> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| AttemptFailure {
                cause: FetchCause::from_reqwest(&e),
                retry_after: None,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttemptFailure {
                cause: FetchCause::from_status(status),
                retry_after: retry_after(response.headers()),
            });
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response.bytes().await.map_err(|e| AttemptFailure {
            cause: FetchCause::from_reqwest(&e),
            retry_after: None,
        })?;

        Ok(FetchResponse {
            final_url,
            status: status.as_u16(),
            content_type,
            body: body.to_vec(),
            attempts: 0,
            latency: Duration::ZERO,
        })
    }

    fn error(&self, url: &Url, cause: FetchCause, attempts: u32) -> FetchError {
        FetchError {
            url: url.to_string(),
            cause,
            attempts,
        }
    }
}

/// Reads a Retry-After header given either as seconds or as an HTTP date
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    parse_retry_after(value, Utc::now())
}

fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let when = DateTime::parse_from_rfc2822(value).ok()?;
    let wait = when.with_timezone(&Utc) - now;
    Some(wait.to_std().unwrap_or(Duration::ZERO))
}
