//! # cairn-probe
//!
//! Concurrent URL accessibility checks used to validate that a source (or
//! anything a hub configuration points at) is reachable before it is added.
//!
//! Each URL is checked with a `HEAD` request. Redirects are followed by hand
//! so every hop is subject to the same scheme validation, and results are
//! classified into three severities:
//!
//! - [`Severity::Success`] for 2xx responses
//! - [`Severity::Warning`] for 401/403 (the URL exists but needs credentials)
//! - [`Severity::Error`] for everything else, including transport failures

use futures::future::join_all;
use reqwest::redirect::Policy;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Timeout applied when the caller does not supply one
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum number of redirect hops followed before giving up
pub const MAX_REDIRECTS: usize = 10;

/// Errors raised while constructing a prober
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Outcome class of a single URL check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Warning,
    Error,
}

/// Result of checking one URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlCheckResult {
    /// The URL as supplied by the caller
    pub url: String,
    pub accessible: bool,
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Last URL visited when redirects were followed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
}

impl UrlCheckResult {
    fn error(url: &str, message: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            accessible: false,
            severity: Severity::Error,
            message: message.into(),
            status_code: None,
            final_url: None,
        }
    }

    fn from_status(url: &str, status: StatusCode, final_url: Option<String>) -> Self {
        let code = status.as_u16();
        let (severity, message) = classify(status);
        Self {
            url: url.to_string(),
            accessible: severity == Severity::Success,
            severity,
            message,
            status_code: Some(code),
            final_url,
        }
    }
}

fn classify(status: StatusCode) -> (Severity, String) {
    let code = status.as_u16();
    if status.is_success() {
        return (Severity::Success, format!("Accessible ({})", code));
    }
    match status {
        StatusCode::UNAUTHORIZED => (
            Severity::Warning,
            "Authentication required (401)".to_string(),
        ),
        StatusCode::FORBIDDEN => (Severity::Warning, "Access forbidden (403)".to_string()),
        StatusCode::NOT_FOUND => (Severity::Error, "Not found (404)".to_string()),
        _ => (
            Severity::Error,
            format!(
                "HTTP {} {}",
                code,
                status.canonical_reason().unwrap_or("Unknown")
            ),
        ),
    }
}

/// Parse and check the scheme of a URL without touching the network
pub fn validate_url(raw: &str) -> Result<Url, String> {
    let parsed = Url::parse(raw.trim()).map_err(|e| format!("Invalid URL: {}", e))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(format!(
            "Unsupported URL scheme '{}'. Only http and https are supported",
            other
        )),
    }
}

/// Reusable URL prober holding one HTTP client
pub struct UrlProber {
    client: Client,
    default_timeout: Duration,
}

impl UrlProber {
    /// Create a prober with the default 10 second timeout
    pub fn new() -> Result<Self, ProbeError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Create a prober with a custom default timeout
    pub fn with_timeout(default_timeout: Duration) -> Result<Self, ProbeError> {
        let client = Client::builder()
            .redirect(Policy::none())
            .user_agent(concat!("cairn-probe/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            default_timeout,
        })
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Check a single URL
    ///
    /// Never fails: invalid input and transport problems are reported as
    /// [`Severity::Error`] results.
    pub async fn check_url(&self, url: &str, timeout: Option<Duration>) -> UrlCheckResult {
        let timeout = timeout.unwrap_or(self.default_timeout);

        let mut current = match validate_url(url) {
            Ok(parsed) => parsed,
            Err(message) => return UrlCheckResult::error(url, message),
        };

        for hop in 0..=MAX_REDIRECTS {
            debug!("HEAD {} (hop {})", current, hop);

            let response = match tokio::time::timeout(
                timeout,
                self.client.head(current.clone()).timeout(timeout).send(),
            )
            .await
            {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => return UrlCheckResult::error(url, describe_transport_error(&e, timeout)),
                Err(_) => {
                    return UrlCheckResult::error(
                        url,
                        format!("Request timed out after {}s", timeout.as_secs_f32()),
                    )
                }
            };

            let status = response.status();
            if !is_followed_redirect(status) {
                let final_url = (hop > 0).then(|| current.to_string());
                return UrlCheckResult::from_status(url, status, final_url);
            }

            let location = match response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
            {
                Some(location) => location.to_string(),
                None => {
                    return UrlCheckResult {
                        status_code: Some(status.as_u16()),
                        ..UrlCheckResult::error(
                            url,
                            format!("Redirect ({}) without a Location header", status.as_u16()),
                        )
                    }
                }
            };

            let next = match current.join(&location) {
                Ok(next) => next,
                Err(e) => {
                    return UrlCheckResult::error(
                        url,
                        format!("Invalid redirect location '{}': {}", location, e),
                    )
                }
            };

            current = match validate_url(next.as_str()) {
                Ok(next) => next,
                Err(message) => return UrlCheckResult::error(url, message),
            };
        }

        UrlCheckResult::error(
            url,
            format!("Too many redirects (more than {})", MAX_REDIRECTS),
        )
    }

    /// Check many URLs concurrently; results are in input order
    pub async fn check_urls<S: AsRef<str>>(
        &self,
        urls: &[S],
        timeout: Option<Duration>,
    ) -> Vec<UrlCheckResult> {
        let futures: Vec<_> = urls
            .iter()
            .map(|url| self.check_url(url.as_ref(), timeout))
            .collect();

        join_all(futures).await
    }
}

fn is_followed_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

fn describe_transport_error(err: &reqwest::Error, timeout: Duration) -> String {
    if err.is_timeout() {
        format!("Request timed out after {}s", timeout.as_secs_f32())
    } else if err.is_connect() {
        format!("Connection failed: {}", err)
    } else {
        format!("Request failed: {}", err)
    }
}

/// Check a single URL with a throwaway prober
pub async fn check_url(url: &str, timeout: Option<Duration>) -> UrlCheckResult {
    match UrlProber::new() {
        Ok(prober) => prober.check_url(url, timeout).await,
        Err(e) => UrlCheckResult::error(url, e.to_string()),
    }
}

/// Check many URLs concurrently with a throwaway prober
pub async fn check_urls<S: AsRef<str>>(urls: &[S], timeout: Option<Duration>) -> Vec<UrlCheckResult> {
    match UrlProber::new() {
        Ok(prober) => prober.check_urls(urls, timeout).await,
        Err(e) => urls
            .iter()
            .map(|url| UrlCheckResult::error(url.as_ref(), e.to_string()))
            .collect(),
    }
}
