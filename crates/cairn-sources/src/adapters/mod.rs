//! Source adapter trait and implementations
//!
//! An adapter turns one source configuration into the common [`Bundle`]
//! model and can hand back the raw payload of any bundle it lists. Adapters
//! never install anything; the registry feeds downloaded bytes to the
//! installer so every source type shares one install path.

pub mod curated_index;
pub mod git_tree_index;
pub mod github;
pub mod gitlab;
pub mod http;
pub mod local;

use crate::auth::{AuthChain, EnvSession, Platform, SessionProvider};
use crate::cache::FetchCache;
use crate::error::Result;
use crate::http::HttpClient;
use async_trait::async_trait;
use cairn_core::types::{Bundle, Source, SourceMetadata, SourceType, ValidationResult};
use cairn_core::RuntimeSettings;
use std::sync::Arc;

pub use curated_index::CuratedIndexAdapter;
pub use git_tree_index::GitTreeIndexAdapter;
pub use github::GitHubAdapter;
pub use gitlab::GitLabAdapter;
pub use http::HttpAdapter;
pub use local::LocalAdapter;

/// Uniform interface over every catalog origin
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// The source this adapter reads from
    fn source(&self) -> &Source;

    /// List bundles, memoized for the cache TTL
    async fn fetch_bundles(&self) -> Result<Vec<Bundle>>;

    /// Raw payload bytes of a bundle
    async fn download_bundle(&self, bundle: &Bundle) -> Result<Vec<u8>>;

    async fn fetch_metadata(&self) -> Result<SourceMetadata>;

    /// Check the source is usable; failures are reported, never raised
    async fn validate(&self) -> ValidationResult {
        match self.fetch_bundles().await {
            Ok(bundles) if bundles.is_empty() => {
                ValidationResult::ok(0).with_warning("Source is reachable but lists no bundles")
            }
            Ok(bundles) => ValidationResult::ok(bundles.len()),
            Err(e) => ValidationResult::failed(e.to_string()),
        }
    }

    /// Where the manifest of a bundle version lives
    fn manifest_url(&self, bundle_id: &str, version: Option<&str>) -> String;

    /// Where the payload of a bundle version lives
    fn download_url(&self, bundle_id: &str, version: Option<&str>) -> String;

    /// Forget memoized results so the next fetch hits the source
    fn invalidate_cache(&self);
}

/// Shared collaborators handed to every adapter
#[derive(Clone)]
pub struct AdapterContext {
    pub http: HttpClient,
    pub settings: RuntimeSettings,
    pub session: Arc<dyn SessionProvider>,
}

impl AdapterContext {
    pub fn new(settings: RuntimeSettings) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(&settings.network)?,
            settings,
            session: Arc::new(EnvSession),
        })
    }

    /// Replace the ambient session provider
    pub fn with_session(mut self, session: Arc<dyn SessionProvider>) -> Self {
        self.session = session;
        self
    }

    pub(crate) fn auth_chain(&self, platform: Platform, source: &Source) -> AuthChain {
        let cli_timeout = self
            .settings
            .auth
            .use_cli
            .then(|| self.settings.cli_timeout());
        AuthChain::standard(
            platform,
            source.explicit_token(),
            self.session.clone(),
            cli_timeout,
        )
    }

    pub(crate) fn bundle_cache(&self) -> FetchCache<Vec<Bundle>> {
        FetchCache::new(self.settings.cache_ttl())
    }
}

/// Creates adapters for sources
pub trait AdapterFactory: Send + Sync {
    fn create(&self, source: &Source) -> Result<Arc<dyn SourceAdapter>>;
}

/// Factory dispatching on the source type tag
pub struct DefaultAdapterFactory {
    context: AdapterContext,
}

impl DefaultAdapterFactory {
    pub fn new(context: AdapterContext) -> Self {
        Self { context }
    }

    pub fn from_settings(settings: RuntimeSettings) -> Result<Self> {
        Ok(Self::new(AdapterContext::new(settings)?))
    }
}

impl AdapterFactory for DefaultAdapterFactory {
    fn create(&self, source: &Source) -> Result<Arc<dyn SourceAdapter>> {
        let ctx = &self.context;
        let adapter: Arc<dyn SourceAdapter> = match source.source_type {
            SourceType::Github => Arc::new(GitHubAdapter::new(source.clone(), ctx)?),
            SourceType::Gitlab => Arc::new(GitLabAdapter::new(source.clone(), ctx)?),
            SourceType::Http => Arc::new(HttpAdapter::new(source.clone(), ctx)?),
            SourceType::Local => Arc::new(LocalAdapter::new(source.clone(), ctx)?),
            SourceType::CuratedIndex => Arc::new(CuratedIndexAdapter::new(source.clone(), ctx)?),
            SourceType::GitTreeIndex => Arc::new(GitTreeIndexAdapter::new(source.clone(), ctx)?),
        };
        Ok(adapter)
    }
}

/// Version string without a leading `v`
pub(crate) fn strip_v(tag: &str) -> &str {
    tag.strip_prefix('v')
        .or_else(|| tag.strip_prefix('V'))
        .unwrap_or(tag)
}

/// First non-empty line of a release body
pub(crate) fn summary_line(body: Option<&str>) -> String {
    body.and_then(|b| b.lines().map(str::trim).find(|l| !l.is_empty()))
        .unwrap_or_default()
        .to_string()
}

pub(crate) fn is_tarball_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.ends_with(".tar.gz") || lower.ends_with(".tgz")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_v() {
        assert_eq!(strip_v("v1.2.3"), "1.2.3");
        assert_eq!(strip_v("V2"), "2");
        assert_eq!(strip_v("1.0.0"), "1.0.0");
        assert_eq!(strip_v("vnext"), "next");
    }

    #[test]
    fn test_summary_line() {
        assert_eq!(summary_line(Some("\n\n  First line\nsecond")), "First line");
        assert_eq!(summary_line(None), "");
    }

    #[test]
    fn test_is_tarball_name() {
        assert!(is_tarball_name("bundle-1.0.0.tar.gz"));
        assert!(is_tarball_name("bundle.TGZ"));
        assert!(!is_tarball_name("bundle.zip"));
    }

    #[test]
    fn test_factory_dispatches_on_type() {
        let factory = DefaultAdapterFactory::from_settings(RuntimeSettings::default()).unwrap();
        let temp = tempfile::TempDir::new().unwrap();

        let sources = [
            Source::new("gh", SourceType::Github, "https://github.com/acme/prompts"),
            Source::new("gl", SourceType::Gitlab, "https://gitlab.com/acme/prompts"),
            Source::new("web", SourceType::Http, "https://bundles.example.com"),
            Source::new("disk", SourceType::Local, temp.path().to_string_lossy()),
            Source::new("idx", SourceType::CuratedIndex, "https://example.com/index.yml"),
            Source::new("tree", SourceType::GitTreeIndex, "https://github.com/acme/collections"),
        ];

        for source in sources {
            let adapter = factory.create(&source).unwrap();
            assert_eq!(adapter.source().id, source.id);
        }
    }
}
