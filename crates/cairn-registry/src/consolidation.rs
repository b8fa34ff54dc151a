//! Version consolidation
//!
//! Git-hosted sources publish one release record per tag, so the same
//! logical bundle shows up as `acme-prompts-v1.0.0`, `acme-prompts-v1.1.0`
//! and so on. Consolidation groups those records by logical identity and
//! keeps a single representative carrying the newest version plus an index
//! of every published version.

use crate::error::{RegistryError, Result};
use cairn_core::types::{Bundle, BundleVersion, SourceType};
use regex::Regex;
use semver::Version;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::LazyLock;

static VERSION_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"-?v?(\d+\.\d+\.\d+(?:-[0-9A-Za-z.-]+)?)$").expect("valid version suffix pattern")
});

/// Version-independent key for a bundle
///
/// Only git-hosted ids embed the release tag; every other source already
/// uses a stable id.
pub fn logical_id(bundle_id: &str, source_type: SourceType) -> String {
    if !source_type.is_git_hosted() {
        return bundle_id.to_string();
    }
    let stripped = VERSION_SUFFIX.replace(bundle_id, "");
    if stripped.is_empty() {
        bundle_id.to_string()
    } else {
        stripped.into_owned()
    }
}

/// Version embedded in a git-hosted release id, if any
///
/// `acme-prompts-v1.0.0` yields `1.0.0`. Ids that are nothing but a version
/// carry no logical part and yield `None`, matching [`logical_id`].
pub fn release_version(bundle_id: &str, source_type: SourceType) -> Option<String> {
    if !source_type.is_git_hosted() {
        return None;
    }
    let captures = VERSION_SUFFIX.captures(bundle_id)?;
    let whole = captures.get(0)?;
    if whole.start() == 0 {
        return None;
    }
    captures.get(1).map(|m| m.as_str().to_string())
}

/// Parse a version leniently: a leading `v` is ignored and missing minor or
/// patch components default to zero
pub fn parse_version(raw: &str) -> Result<Version> {
    let trimmed = raw.trim();
    let unprefixed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);

    if let Ok(version) = Version::parse(unprefixed) {
        return Ok(version);
    }

    let split = unprefixed.find(['-', '+']).unwrap_or(unprefixed.len());
    let (core, rest) = unprefixed.split_at(split);
    let mut parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty() || parts.len() > 3 || parts.iter().any(|p| p.is_empty()) {
        return Err(invalid(raw));
    }
    while parts.len() < 3 {
        parts.push("0");
    }

    Version::parse(&format!("{}{}", parts.join("."), rest)).map_err(|_| invalid(raw))
}

fn invalid(raw: &str) -> RegistryError {
    RegistryError::Consolidation {
        message: format!("unparseable version '{}'", raw),
    }
}

/// True when `candidate` is strictly newer than `current`
///
/// Unparseable versions fall back to string inequality so an update is
/// still offered when a source switches versioning schemes.
pub fn is_newer(candidate: &str, current: &str) -> bool {
    match (parse_version(candidate), parse_version(current)) {
        (Ok(a), Ok(b)) => a > b,
        _ => candidate.trim_start_matches('v') != current.trim_start_matches('v'),
    }
}

/// Merge release records into one bundle per logical identity
///
/// Groups keep first-seen order. Each representative is the newest member
/// with its id replaced by the logical id and `available_versions` listing
/// every member newest first. Any unparseable version fails the whole call.
pub fn consolidate(bundles: Vec<Bundle>, source_type: SourceType) -> Result<Vec<Bundle>> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<(Version, Bundle)>> = HashMap::new();

    for bundle in bundles {
        let version = parse_version(&bundle.version)?;
        let key = logical_id(&bundle.id, source_type);
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push((version, bundle));
    }

    let mut consolidated = Vec::with_capacity(order.len());
    for key in order {
        let Some(mut members) = groups.remove(&key) else {
            continue;
        };
        members.sort_by(|(a, _), (b, _)| newest_first(a, b));

        let available_versions: Vec<BundleVersion> =
            members.iter().map(|(_, b)| BundleVersion::from(b)).collect();

        let (_, mut representative) = members.swap_remove(0);
        representative.id = key;
        representative.available_versions = available_versions;
        consolidated.push(representative);
    }

    Ok(consolidated)
}

fn newest_first(a: &Version, b: &Version) -> Ordering {
    b.cmp(a)
}
