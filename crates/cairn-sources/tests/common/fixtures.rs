//! Payload fixtures

use flate2::read::GzDecoder;
use serde_json::{json, Value};
use std::io::Read;
use tar::Archive;

pub const MANIFEST_YAML: &str = "id: acme-prompts\nversion: 1.0.0\nname: Acme Prompts\n";

/// GitHub release JSON with one tarball asset served from `server_uri`
pub fn github_release(server_uri: &str, tag: &str, asset_id: u64) -> Value {
    json!({
        "tag_name": tag,
        "name": format!("Prompts {}", tag),
        "body": "Release notes",
        "draft": false,
        "prerelease": false,
        "published_at": "2024-01-01T00:00:00Z",
        "tarball_url": format!("{}/tarball/{}", server_uri, tag),
        "assets": [{
            "name": format!("acme-prompts-{}.tar.gz", tag),
            "url": format!("{}/api/v3/repos/acme/prompts/releases/assets/{}", server_uri, asset_id),
            "browser_download_url": format!("{}/download/{}.tar.gz", server_uri, tag),
            "size": 128
        }]
    })
}

pub fn draft_release(tag: &str) -> Value {
    json!({
        "tag_name": tag,
        "name": "draft",
        "draft": true,
        "prerelease": false,
        "assets": []
    })
}

/// File names and contents of a `tar.gz` payload, sorted by name
pub fn archive_files(bytes: &[u8]) -> Vec<(String, String)> {
    let mut archive = Archive::new(GzDecoder::new(bytes));
    let mut files = Vec::new();
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = entry
            .path()
            .unwrap()
            .to_string_lossy()
            .trim_start_matches("./")
            .to_string();
        let mut body = String::new();
        entry.read_to_string(&mut body).unwrap();
        files.push((name, body));
    }
    files.sort();
    files
}
