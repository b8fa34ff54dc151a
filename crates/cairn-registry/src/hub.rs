//! Checks for hub profiles
//!
//! A hub profile is a shared list of bundles, each naming the source it
//! comes from. Profiles are authored elsewhere and may predate the current
//! source id rule, so references are resolved through the dual-read lookup.

use crate::error::Result;
use cairn_core::identity::dual_read::resolve_source;
use cairn_core::types::{Source, SourceType};
use cairn_probe::{UrlCheckResult, UrlProber};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A bundle entry in a hub profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileBundleRef {
    pub id: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Named set of bundles shared through a hub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubProfile {
    pub name: String,
    #[serde(default)]
    pub bundles: Vec<ProfileBundleRef>,
}

impl HubProfile {
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml_ng::from_str(content)?)
    }
}

/// Problem found with one profile entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ReferenceIssue {
    /// No configured source answers to the referenced id
    #[serde(rename_all = "camelCase")]
    UnknownSource { bundle_id: String, source_id: String },
    /// The reference uses a legacy id; it still resolves
    #[serde(rename_all = "camelCase")]
    LegacySourceId {
        bundle_id: String,
        source_id: String,
        current_id: String,
    },
}

impl ReferenceIssue {
    /// Legacy references still work and are only reported
    pub fn is_error(&self) -> bool {
        matches!(self, ReferenceIssue::UnknownSource { .. })
    }
}

/// Flag profile entries whose source id is unknown or outdated
pub fn check_profile_references(profile: &HubProfile, sources: &[Source]) -> Vec<ReferenceIssue> {
    profile
        .bundles
        .iter()
        .filter_map(|entry| match resolve_source(sources, &entry.source) {
            None => Some(ReferenceIssue::UnknownSource {
                bundle_id: entry.id.clone(),
                source_id: entry.source.clone(),
            }),
            Some(source) if source.id != entry.source => Some(ReferenceIssue::LegacySourceId {
                bundle_id: entry.id.clone(),
                source_id: entry.source.clone(),
                current_id: source.id.clone(),
            }),
            Some(_) => None,
        })
        .collect()
}

/// Check that every network-backed source URL answers
///
/// Local sources are skipped. Results keep the order of `sources`.
pub async fn probe_source_urls(
    prober: &UrlProber,
    sources: &[Source],
    timeout: Option<Duration>,
) -> Vec<(String, UrlCheckResult)> {
    let remote: Vec<&Source> = sources
        .iter()
        .filter(|s| s.source_type != SourceType::Local)
        .filter(|s| !s.url.starts_with("file://"))
        .collect();
    let urls: Vec<&str> = remote.iter().map(|s| s.url.as_str()).collect();

    let results = prober.check_urls(&urls, timeout).await;
    remote
        .into_iter()
        .map(|s| s.id.clone())
        .zip(results)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources() -> Vec<Source> {
        vec![
            Source::new("Repo", SourceType::Github, "https://GitHub.com/Owner/Repo"),
            Source::new("Disk", SourceType::Local, "/srv/bundles"),
        ]
    }

    #[test]
    fn test_profile_from_yaml() {
        let profile = HubProfile::from_yaml(
            "name: backend\nbundles:\n  - id: acme-prompts\n    source: github-0123456789ab\n    version: 1.0.0\n",
        )
        .unwrap();
        assert_eq!(profile.name, "backend");
        assert_eq!(profile.bundles[0].version.as_deref(), Some("1.0.0"));
    }

    #[test]
    fn test_reference_checks() {
        let sources = sources();
        let repo = &sources[0];
        let legacy = repo.legacy_id().unwrap();

        let profile = HubProfile {
            name: "team".into(),
            bundles: vec![
                ProfileBundleRef {
                    id: "current".into(),
                    source: repo.id.clone(),
                    version: None,
                },
                ProfileBundleRef {
                    id: "old".into(),
                    source: legacy.clone(),
                    version: None,
                },
                ProfileBundleRef {
                    id: "lost".into(),
                    source: "http-ffffffffffff".into(),
                    version: None,
                },
            ],
        };

        let issues = check_profile_references(&profile, &sources);
        assert_eq!(issues.len(), 2);
        assert_eq!(
            issues[0],
            ReferenceIssue::LegacySourceId {
                bundle_id: "old".into(),
                source_id: legacy,
                current_id: repo.id.clone(),
            }
        );
        assert!(!issues[0].is_error());
        assert!(issues[1].is_error());
    }

    #[tokio::test]
    async fn test_probe_skips_local_sources() {
        let prober = UrlProber::new().unwrap();
        let mut sources = sources();
        sources[0].url = "not a url".into();

        let results = probe_source_urls(&prober, &sources, None).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, sources[0].id);
        assert!(!results[0].1.accessible);
    }
}
