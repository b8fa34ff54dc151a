//! Bundle, install record and adapter result types

use crate::types::SourceType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// File name of the manifest shipped inside every bundle payload
pub const MANIFEST_FILE_NAME: &str = "deployment-manifest.yml";

/// A logical, versioned content package as seen by one source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    pub source_id: String,
    #[serde(default)]
    pub environments: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloads: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
    #[serde(default)]
    pub last_updated: String,
    /// Payload size in bytes, 0 when unknown
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub license: String,
    #[serde(default)]
    pub manifest_url: String,
    #[serde(default)]
    pub download_url: String,
    /// Every published version of this logical bundle, newest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub available_versions: Vec<BundleVersion>,
}

impl Bundle {
    /// Look up a version in the consolidated version index
    pub fn find_version(&self, version: &str) -> Option<&BundleVersion> {
        let wanted = version.trim_start_matches('v');
        self.available_versions
            .iter()
            .find(|v| v.version.trim_start_matches('v') == wanted)
    }

    /// Rewrite the download coordinates to a specific indexed version
    pub fn pin_to(&mut self, version: &BundleVersion) {
        self.version = version.version.clone();
        self.download_url = version.download_url.clone();
        self.manifest_url = version.manifest_url.clone();
        self.last_updated = version.published_at.clone();
    }

    /// Case-insensitive match against id, name, description and tags
    pub fn matches_text(&self, query: &str) -> bool {
        let q = query.to_lowercase();
        self.id.to_lowercase().contains(&q)
            || self.name.to_lowercase().contains(&q)
            || self.description.to_lowercase().contains(&q)
            || self.tags.iter().any(|t| t.to_lowercase().contains(&q))
    }
}

/// One published version of a logical bundle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleVersion {
    pub version: String,
    pub download_url: String,
    pub manifest_url: String,
    #[serde(default)]
    pub published_at: String,
}

impl From<&Bundle> for BundleVersion {
    fn from(bundle: &Bundle) -> Self {
        Self {
            version: bundle.version.clone(),
            download_url: bundle.download_url.clone(),
            manifest_url: bundle.manifest_url.clone(),
            published_at: bundle.last_updated.clone(),
        }
    }
}

/// Installation scope
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallScope {
    #[default]
    User,
    Workspace,
}

impl InstallScope {
    pub const ALL: [InstallScope; 2] = [InstallScope::User, InstallScope::Workspace];

    pub fn as_str(&self) -> &'static str {
        match self {
            InstallScope::User => "user",
            InstallScope::Workspace => "workspace",
        }
    }
}

impl fmt::Display for InstallScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single file contributed by a bundle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestItem {
    pub path: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Contents of `deployment-manifest.yml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleManifest {
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub environments: Vec<String>,
    #[serde(default)]
    pub license: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub items: Vec<ManifestItem>,
}

impl BundleManifest {
    /// Parse a manifest from YAML text
    pub fn from_yaml(content: &str) -> crate::Result<Self> {
        Ok(serde_yaml_ng::from_str(content)?)
    }

    pub fn to_yaml(&self) -> crate::Result<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }
}

/// Persisted proof that a bundle version is installed at a scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledBundle {
    pub bundle_id: String,
    pub version: String,
    pub install_path: PathBuf,
    pub installed_at: DateTime<Utc>,
    pub scope: InstallScope,
    pub source_id: String,
    pub source_type: SourceType,
    #[serde(default)]
    pub manifest: BundleManifest,
}

/// Options accepted by install and update
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallOptions {
    /// Specific version to install, latest when absent
    pub version: Option<String>,
    pub scope: InstallScope,
    /// Reinstall even when the same version is already present
    pub force: bool,
}

impl InstallOptions {
    pub fn new(scope: InstallScope) -> Self {
        Self {
            version: None,
            scope,
            force: false,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

/// Descriptive information about a source catalog
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMetadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub bundle_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Result of validating a source; never an error in itself
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub bundles_found: usize,
}

impl ValidationResult {
    pub fn ok(bundles_found: usize) -> Self {
        Self {
            valid: true,
            bundles_found,
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            errors: vec![error.into()],
            ..Default::default()
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// An installed bundle with a newer version available
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleUpdate {
    pub bundle_id: String,
    pub scope: InstallScope,
    pub source_id: String,
    pub current_version: String,
    pub latest_version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle_with_versions() -> Bundle {
        Bundle {
            id: "acme-prompts".into(),
            name: "Acme Prompts".into(),
            version: "1.1.0".into(),
            source_id: "github-a1b2c3d4e5f6".into(),
            download_url: "https://example.com/1.1.0.tar.gz".into(),
            available_versions: vec![
                BundleVersion {
                    version: "1.1.0".into(),
                    download_url: "https://example.com/1.1.0.tar.gz".into(),
                    manifest_url: "https://example.com/1.1.0.yml".into(),
                    published_at: "2026-02-01T00:00:00Z".into(),
                },
                BundleVersion {
                    version: "1.0.0".into(),
                    download_url: "https://example.com/1.0.0.tar.gz".into(),
                    manifest_url: "https://example.com/1.0.0.yml".into(),
                    published_at: "2026-01-01T00:00:00Z".into(),
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_find_version_ignores_v_prefix() {
        let bundle = bundle_with_versions();
        assert!(bundle.find_version("v1.0.0").is_some());
        assert!(bundle.find_version("1.0.0").is_some());
        assert!(bundle.find_version("2.0.0").is_none());
    }

    #[test]
    fn test_pin_to_rewrites_download_coordinates() {
        let mut bundle = bundle_with_versions();
        let target = bundle.find_version("1.0.0").cloned().unwrap();
        bundle.pin_to(&target);

        assert_eq!(bundle.version, "1.0.0");
        assert_eq!(bundle.download_url, "https://example.com/1.0.0.tar.gz");
        assert_eq!(bundle.manifest_url, "https://example.com/1.0.0.yml");
        assert_eq!(bundle.last_updated, "2026-01-01T00:00:00Z");
    }

    #[test]
    fn test_bundle_omits_empty_version_index() {
        let bundle = Bundle {
            id: "x".into(),
            ..Default::default()
        };
        let json = serde_json::to_string(&bundle).unwrap();
        assert!(!json.contains("availableVersions"));
        assert!(json.contains("\"sourceId\""));
    }

    #[test]
    fn test_matches_text_checks_tags() {
        let mut bundle = bundle_with_versions();
        bundle.tags = vec!["Testing".into()];
        assert!(bundle.matches_text("test"));
        assert!(bundle.matches_text("ACME"));
        assert!(!bundle.matches_text("kubernetes"));
    }

    #[test]
    fn test_installed_bundle_json_keys() {
        let record = InstalledBundle {
            bundle_id: "acme-prompts".into(),
            version: "1.0.0".into(),
            install_path: PathBuf::from("/tmp/acme"),
            installed_at: Utc::now(),
            scope: InstallScope::Workspace,
            source_id: "github-a1b2c3d4e5f6".into(),
            source_type: SourceType::Github,
            manifest: BundleManifest::default(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["bundleId"], "acme-prompts");
        assert_eq!(json["scope"], "workspace");
        assert_eq!(json["sourceType"], "github");
        assert!(json.get("installPath").is_some());
    }

    #[test]
    fn test_manifest_from_yaml() {
        let yaml = r#"
id: acme-prompts
version: 1.0.0
name: Acme Prompts
tags: [review]
items:
  - path: prompts/review.prompt.md
    kind: prompt
"#;
        let manifest = BundleManifest::from_yaml(yaml).unwrap();
        assert_eq!(manifest.id, "acme-prompts");
        assert_eq!(manifest.items.len(), 1);
        assert_eq!(manifest.items[0].kind, "prompt");
    }
}
