//! Deterministic source identity
//!
//! A source id is `{type}-{hash}` where `hash` is the first 12 hex characters
//! of the SHA-256 digest of `type:normalizedUrl:branch:collectionsPath`.
//! The same inputs produce the same id on every machine, so ids can be shared
//! through hub configuration and install records.
//!
//! An earlier normalization lowercased only the URL host. Sources created
//! under that rule are rewritten once by the source-id migration;
//! [`generate_legacy_id`] reproduces the old id so the migration can verify
//! what it is replacing.

pub mod dual_read;

use crate::types::{SourceConfig, SourceType};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::LazyLock;

pub use dual_read::{resolve_source, SourceIdCandidates};

/// Branch used when none is configured (and in place of `master`)
pub const DEFAULT_BRANCH: &str = "main";

/// Collections directory used when none is configured
pub const DEFAULT_COLLECTIONS_PATH: &str = "collections";

const HASH_LEN: usize = 12;

static GENERATED_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-z][a-z-]*)-([0-9a-f]{12})$").expect("id regex is valid"));

/// Compute the current id for a source
pub fn generate_id(source_type: SourceType, url: &str, config: &SourceConfig) -> String {
    hash_id(source_type, &normalize_url(url), config)
}

/// Compute the id the source had under the legacy normalization rule
///
/// Returns `None` when legacy and current normalization agree (for example
/// when the URL path is already lowercase), meaning there is nothing to
/// migrate.
pub fn generate_legacy_id(
    source_type: SourceType,
    url: &str,
    config: &SourceConfig,
) -> Option<String> {
    let legacy = legacy_normalize_url(url);
    if legacy == normalize_url(url) {
        return None;
    }
    Some(hash_id(source_type, &legacy, config))
}

/// Whether `id` has the `{type}-{12 hex}` shape produced for `source_type`
pub fn is_generated_id(id: &str, source_type: SourceType) -> bool {
    GENERATED_ID_RE
        .captures(id)
        .and_then(|caps| caps.get(1))
        .is_some_and(|prefix| prefix.as_str() == source_type.as_str())
}

/// Current URL normalization: no protocol, lowercase host and path, no
/// trailing slash
pub fn normalize_url(url: &str) -> String {
    strip_protocol(url.trim())
        .trim_end_matches('/')
        .to_lowercase()
}

/// Legacy URL normalization: no protocol, lowercase host only
pub fn legacy_normalize_url(url: &str) -> String {
    let stripped = strip_protocol(url.trim()).trim_end_matches('/');
    match stripped.split_once('/') {
        Some((host, path)) => format!("{}/{}", host.to_lowercase(), path),
        None => stripped.to_lowercase(),
    }
}

/// Absent, empty and `master` all mean `main`
pub fn normalize_branch(branch: Option<&str>) -> &str {
    match branch.map(str::trim) {
        None | Some("") | Some("master") => DEFAULT_BRANCH,
        Some(b) => b,
    }
}

fn normalize_collections_path(path: Option<&str>) -> &str {
    match path.map(str::trim) {
        None | Some("") => DEFAULT_COLLECTIONS_PATH,
        Some(p) => p,
    }
}

fn strip_protocol(url: &str) -> &str {
    match url.find("://") {
        Some(idx) => &url[idx + 3..],
        None => url,
    }
}

fn hash_id(source_type: SourceType, normalized_url: &str, config: &SourceConfig) -> String {
    let key = format!(
        "{}:{}:{}:{}",
        source_type.as_str(),
        normalized_url,
        normalize_branch(config.branch.as_deref()),
        normalize_collections_path(config.collections_path.as_deref())
    );

    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let digest = format!("{:x}", hasher.finalize());

    format!("{}-{}", source_type.as_str(), &digest[..HASH_LEN])
}
