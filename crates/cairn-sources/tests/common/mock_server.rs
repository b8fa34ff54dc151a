//! Wiremock setup helpers

use serde_json::Value;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// `GET /api/v3/repos/{repo}/releases` returning `releases`
pub async fn mock_github_releases(server: &MockServer, repo: &str, releases: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/api/v3/repos/{}/releases", repo)))
        .respond_with(ResponseTemplate::new(200).set_body_json(releases))
        .mount(server)
        .await;
}

/// Releases endpoint that only answers when the given bearer token is sent
pub async fn mock_github_releases_for_token(
    server: &MockServer,
    repo: &str,
    token: &str,
    releases: Value,
) {
    Mock::given(method("GET"))
        .and(path(format!("/api/v3/repos/{}/releases", repo)))
        .and(header("authorization", format!("Bearer {}", token).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(releases))
        .with_priority(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/api/v3/repos/{}/releases", repo)))
        .respond_with(ResponseTemplate::new(401))
        .with_priority(10)
        .mount(server)
        .await;
}

/// Release asset download (requires the octet-stream accept header)
pub async fn mock_asset(server: &MockServer, asset_path: &str, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path(asset_path))
        .and(header("accept", "application/octet-stream"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .mount(server)
        .await;
}

/// Any path answering with an HTML login page and status 200
pub async fn mock_html_page(server: &MockServer, page_path: &str) {
    Mock::given(method("GET"))
        .and(path(page_path))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(
                "<html><body><h1>Sign in to continue</h1></body></html>",
                "text/html; charset=utf-8",
            ),
        )
        .mount(server)
        .await;
}

/// Plain text file (YAML manifests, raw collection items)
pub async fn mock_text(server: &MockServer, file_path: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(file_path))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/plain; charset=utf-8")
                .set_body_string(body),
        )
        .mount(server)
        .await;
}

pub async fn mock_status(server: &MockServer, file_path: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(file_path))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}
