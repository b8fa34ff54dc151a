//! Shared HTTP plumbing for adapters
//!
//! Every response goes through [`HttpClient::checked`], which maps status
//! codes onto [`SourceError`] variants and refuses HTML bodies before any
//! parser sees them. Hosting platforms answer expired or missing credentials
//! with a login page and a 200, so the `Content-Type` check is the only
//! reliable signal.

use crate::error::{Result, SourceError};
use cairn_core::config::NetworkSettings;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Maximum characters of an HTML body quoted in errors
const SNIPPET_LEN: usize = 200;

/// `Accept` value for release asset downloads
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Thin wrapper over a shared `reqwest::Client`
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: Client,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(settings: &NetworkSettings) -> Result<Self> {
        let timeout = Duration::from_secs(settings.timeout_secs);
        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::network("client", e.to_string()))?;
        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn get(&self, url: &str, token: Option<&str>) -> RequestBuilder {
        let request = self.client.get(url);
        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send a request and map transport failures and non-success statuses
    pub async fn checked(&self, url: &str, request: RequestBuilder) -> Result<Response> {
        debug!("GET {}", url);
        let response = request.send().await.map_err(|e| map_transport_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::from_status(url, status.as_u16()));
        }
        Ok(response)
    }

    /// GET and decode a JSON document
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str, token: Option<&str>) -> Result<T> {
        let request = self.get(url, token).header(ACCEPT, "application/json");
        let response = self.checked(url, request).await?;
        let body = read_text(url, response).await?;
        parse_json(url, &body)
    }

    /// GET a textual document (YAML manifests, raw files)
    pub async fn get_text(&self, url: &str, token: Option<&str>) -> Result<String> {
        let response = self.checked(url, self.get(url, token)).await?;
        read_text(url, response).await
    }

    /// GET a binary payload
    pub async fn get_bytes(
        &self,
        url: &str,
        token: Option<&str>,
        accept: Option<&str>,
    ) -> Result<Vec<u8>> {
        let mut request = self.get(url, token);
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }
        let response = self.checked(url, request).await?;

        if is_html(&response) {
            let body = response.text().await.unwrap_or_default();
            return Err(html_error(url, &body));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| map_transport_error(url, e))?;
        Ok(bytes.to_vec())
    }
}

fn is_html(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("text/html"))
}

async fn read_text(url: &str, response: Response) -> Result<String> {
    let html = is_html(&response);
    let body = response
        .text()
        .await
        .map_err(|e| map_transport_error(url, e))?;
    if html {
        return Err(html_error(url, &body));
    }
    Ok(body)
}

/// Decode JSON, turning serde failures into a descriptive error
pub fn parse_json<T: DeserializeOwned>(url: &str, body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| {
        SourceError::invalid_response(
            url,
            format!("could not parse JSON ({}) near line {}", e, e.line()),
        )
    })
}

fn html_error(url: &str, body: &str) -> SourceError {
    SourceError::HtmlResponse {
        url: url.to_string(),
        snippet: html_snippet(body),
    }
}

/// Best-effort visible text of an HTML page
pub fn html_snippet(body: &str) -> String {
    let mut text = String::new();
    let mut in_tag = false;
    for c in body.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                text.push(' ');
            }
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }

    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() > SNIPPET_LEN {
        let cut: String = collapsed.chars().take(SNIPPET_LEN).collect();
        format!("{}...", cut)
    } else {
        collapsed
    }
}

fn map_transport_error(url: &str, err: reqwest::Error) -> SourceError {
    if err.is_timeout() {
        SourceError::Timeout {
            url: url.to_string(),
        }
    } else {
        SourceError::network(url, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_snippet_strips_tags() {
        let body = "<html><head><title>Sign in</title></head><body><p>Please   log in</p></body></html>";
        assert_eq!(html_snippet(body), "Sign in Please log in");
    }

    #[test]
    fn test_html_snippet_truncates() {
        let body = format!("<p>{}</p>", "a ".repeat(400));
        let snippet = html_snippet(&body);
        assert!(snippet.ends_with("..."));
        assert_eq!(snippet.chars().count(), SNIPPET_LEN + 3);
    }

    #[test]
    fn test_parse_json_error_is_descriptive() {
        let err = parse_json::<serde_json::Value>("https://x/index.json", "{ not json").unwrap_err();
        match err {
            SourceError::InvalidResponse { url, message } => {
                assert_eq!(url, "https://x/index.json");
                assert!(message.contains("could not parse JSON"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
