//! Bundle and archive fixtures

use cairn_core::types::{Bundle, Source, SourceType};
use cairn_sources::archive::pack_files;

pub fn github_source() -> Source {
    Source::new("Acme", SourceType::Github, "https://github.com/acme/prompts")
}

pub fn curated_source() -> Source {
    Source::new("Curated", SourceType::CuratedIndex, "https://hub.example.com/index.yml")
}

pub fn http_source() -> Source {
    Source::new("Web", SourceType::Http, "https://bundles.example.com")
}

/// A catalog entry whose download URL encodes its id and version
pub fn bundle(id: &str, version: &str, source: &Source) -> Bundle {
    Bundle {
        id: id.to_string(),
        name: id.to_string(),
        version: version.to_string(),
        description: format!("{} bundle", id),
        source_id: source.id.clone(),
        download_url: format!("https://downloads.example.com/{}/{}.tar.gz", id, version),
        manifest_url: format!("https://downloads.example.com/{}/{}.yml", id, version),
        last_updated: "2026-01-01T00:00:00Z".to_string(),
        ..Default::default()
    }
}

/// Per-tag release records as a git-hosted adapter lists them
pub fn releases(repo_id: &str, versions: &[&str], source: &Source) -> Vec<Bundle> {
    versions
        .iter()
        .map(|v| bundle(&format!("{}-v{}", repo_id, v), v, source))
        .collect()
}

/// Payload for `bundle`: a manifest plus `payload.txt` holding the download URL
pub fn bundle_archive(bundle: &Bundle) -> Vec<u8> {
    let manifest = format!(
        "id: {}\nversion: {}\nname: {}\n",
        bundle.id, bundle.version, bundle.name
    );
    pack_files(&[
        ("deployment-manifest.yml".to_string(), manifest.into_bytes()),
        ("payload.txt".to_string(), bundle.download_url.clone().into_bytes()),
    ])
    .unwrap()
}
