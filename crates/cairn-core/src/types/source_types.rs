//! Source configuration types

use crate::error::Error;
use crate::identity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Catalog origin kinds understood by the adapter factory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceType {
    /// GitHub repository releases
    Github,
    /// GitLab project releases
    Gitlab,
    /// Plain HTTP endpoint serving an `index.json` catalog
    Http,
    /// Directory of bundle directories on the local filesystem
    Local,
    /// YAML manifest tree listing one bundle per item
    CuratedIndex,
    /// Collection manifests discovered from a GitHub repository tree
    GitTreeIndex,
}

impl SourceType {
    pub const ALL: [SourceType; 6] = [
        SourceType::Github,
        SourceType::Gitlab,
        SourceType::Http,
        SourceType::Local,
        SourceType::CuratedIndex,
        SourceType::GitTreeIndex,
    ];

    /// Stable tag used in ids, configuration and install records
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Github => "github",
            SourceType::Gitlab => "gitlab",
            SourceType::Http => "http",
            SourceType::Local => "local",
            SourceType::CuratedIndex => "curated-index",
            SourceType::GitTreeIndex => "git-tree-index",
        }
    }

    /// Git-hosting platforms publishing independent tagged releases
    pub fn is_git_hosted(&self) -> bool {
        matches!(self, SourceType::Github | SourceType::Gitlab)
    }

    /// Adapters for this type resolve credentials through the auth chain
    pub fn uses_auth_chain(&self) -> bool {
        matches!(
            self,
            SourceType::Github | SourceType::Gitlab | SourceType::GitTreeIndex
        )
    }

    /// Curated sources auto-apply updates for installed bundles when synced
    pub fn auto_updates_on_sync(&self) -> bool {
        matches!(self, SourceType::CuratedIndex | SourceType::GitTreeIndex)
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidSourceType {
                value: s.to_string(),
            })
    }
}

/// Per-source adapter options that also feed into the source id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    /// Branch to read from (defaults to `main`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    /// Directory holding collection manifests (defaults to `collections`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collections_path: Option<String>,
}

/// A configured catalog origin
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub id: String,

    pub name: String,

    #[serde(rename = "type")]
    pub source_type: SourceType,

    pub url: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// 0-100, higher wins when the same bundle appears in several sources
    #[serde(default = "default_priority")]
    pub priority: u8,

    #[serde(default)]
    pub private: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(default)]
    pub config: SourceConfig,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

fn default_enabled() -> bool {
    true
}

fn default_priority() -> u8 {
    50
}

impl Source {
    /// Create an enabled source whose id is derived from its identity inputs
    pub fn new(name: impl Into<String>, source_type: SourceType, url: impl Into<String>) -> Self {
        let url = url.into();
        let config = SourceConfig::default();
        Self {
            id: identity::generate_id(source_type, &url, &config),
            name: name.into(),
            source_type,
            url,
            enabled: true,
            priority: default_priority(),
            private: false,
            token: None,
            config,
            metadata: BTreeMap::new(),
        }
    }

    /// Set the branch and recompute the id
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.config.branch = Some(branch.into());
        self.id = self.computed_id();
        self
    }

    /// Set the collections path and recompute the id
    pub fn with_collections_path(mut self, path: impl Into<String>) -> Self {
        self.config.collections_path = Some(path.into());
        self.id = self.computed_id();
        self
    }

    /// Attach an explicit access token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Id this source would get under the current normalization rule
    pub fn computed_id(&self) -> String {
        identity::generate_id(self.source_type, &self.url, &self.config)
    }

    /// Id this source had under the legacy normalization rule, if different
    pub fn legacy_id(&self) -> Option<String> {
        identity::generate_legacy_id(self.source_type, &self.url, &self.config)
    }

    /// Explicit token with surrounding whitespace removed; blank counts as absent
    pub fn explicit_token(&self) -> Option<&str> {
        self.token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("source_type", &self.source_type)
            .field("url", &self.url)
            .field("enabled", &self.enabled)
            .field("priority", &self.priority)
            .field("private", &self.private)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("config", &self.config)
            .finish()
    }
}

/// Top-level registry configuration file (`config.yaml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryConfig {
    #[serde(default)]
    pub sources: Vec<Source>,
}

impl RegistryConfig {
    pub fn source(&self, id: &str) -> Option<&Source> {
        self.sources.iter().find(|s| s.id == id)
    }

    pub fn source_mut(&mut self, id: &str) -> Option<&mut Source> {
        self.sources.iter_mut().find(|s| s.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_type_round_trips_through_tag() {
        for t in SourceType::ALL {
            assert_eq!(t.as_str().parse::<SourceType>().unwrap(), t);
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
        }
    }

    #[test]
    fn test_source_type_rejects_unknown() {
        assert!("svn".parse::<SourceType>().is_err());
    }

    #[test]
    fn test_source_type_families() {
        assert!(SourceType::Github.is_git_hosted());
        assert!(!SourceType::GitTreeIndex.is_git_hosted());
        assert!(SourceType::GitTreeIndex.uses_auth_chain());
        assert!(!SourceType::Http.uses_auth_chain());
        assert!(SourceType::CuratedIndex.auto_updates_on_sync());
        assert!(!SourceType::Github.auto_updates_on_sync());
    }

    #[test]
    fn test_explicit_token_trimmed() {
        let source = Source::new("a", SourceType::Github, "https://github.com/a/b")
            .with_token("  ghp_abc  ");
        assert_eq!(source.explicit_token(), Some("ghp_abc"));

        let blank = Source::new("a", SourceType::Github, "https://github.com/a/b").with_token("   ");
        assert_eq!(blank.explicit_token(), None);
    }

    #[test]
    fn test_debug_redacts_token() {
        let source = Source::new("a", SourceType::Github, "https://github.com/a/b")
            .with_token("ghp_secretsecret");
        let debug = format!("{:?}", source);
        assert!(!debug.contains("ghp_secretsecret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_source_json_shape() {
        let source = Source::new("Acme", SourceType::Github, "https://github.com/acme/prompts")
            .with_branch("develop");
        let json = serde_json::to_value(&source).unwrap();
        assert_eq!(json["type"], "github");
        assert_eq!(json["config"]["branch"], "develop");
        assert!(json.get("token").is_none());

        let back: Source = serde_json::from_value(json).unwrap();
        assert_eq!(back, source);
    }

    #[test]
    fn test_with_branch_changes_id() {
        let base = Source::new("a", SourceType::Github, "https://github.com/a/b");
        let branched = base.clone().with_branch("develop");
        assert_ne!(base.id, branched.id);
        assert_eq!(branched.id, branched.computed_id());
    }
}
