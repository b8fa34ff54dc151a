//! GitLab releases adapter

use super::{is_tarball_name, strip_v, summary_line, AdapterContext, SourceAdapter};
use crate::auth::{AuthChain, Platform};
use crate::cache::FetchCache;
use crate::error::{Result, SourceError};
use crate::http::HttpClient;
use crate::repo::RepoLocation;
use async_trait::async_trait;
use cairn_core::identity::normalize_branch;
use cairn_core::types::{Bundle, Source, SourceMetadata, MANIFEST_FILE_NAME};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};

#[derive(Debug, Clone, Deserialize)]
pub struct GitLabRelease {
    pub tag_name: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub released_at: Option<String>,
    #[serde(default)]
    pub upcoming_release: bool,
    #[serde(default)]
    pub assets: GitLabAssets,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitLabAssets {
    #[serde(default)]
    pub links: Vec<GitLabLink>,
    #[serde(default)]
    pub sources: Vec<GitLabSourceArchive>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitLabLink {
    pub name: String,
    pub url: String,
    pub direct_asset_url: Option<String>,
}

impl GitLabLink {
    fn location(&self) -> String {
        self.direct_asset_url
            .clone()
            .unwrap_or_else(|| self.url.clone())
    }
}

/// Source archive generated by GitLab for every release
#[derive(Debug, Clone, Deserialize)]
pub struct GitLabSourceArchive {
    pub format: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct Project {
    path_with_namespace: String,
    description: Option<String>,
    last_activity_at: Option<String>,
}

pub struct GitLabAdapter {
    source: Source,
    location: RepoLocation,
    http: HttpClient,
    chain: AuthChain,
    cache: FetchCache<Vec<Bundle>>,
}

impl GitLabAdapter {
    pub fn new(source: Source, ctx: &AdapterContext) -> Result<Self> {
        let location = RepoLocation::parse(&source.url)?;
        Ok(Self {
            chain: ctx.auth_chain(Platform::GitLab, &source),
            http: ctx.http.clone(),
            cache: ctx.bundle_cache(),
            location,
            source,
        })
    }

    fn project_url(&self, path: &str) -> String {
        format!(
            "{}/projects/{}{}",
            self.location.gitlab_api_base(),
            self.location.encoded_project_path(),
            path
        )
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.chain
            .execute(|token| {
                let http = self.http.clone();
                let url = url.to_string();
                async move { http.get_json(&url, token.as_deref()).await }
            })
            .await
    }

    fn release_to_bundle(&self, release: &GitLabRelease) -> Bundle {
        let tag = release.tag_name.trim();
        let links = &release.assets.links;

        let download_url = links
            .iter()
            .find(|l| is_tarball_name(&l.name) || is_tarball_name(&l.url))
            .map(GitLabLink::location)
            .or_else(|| {
                release
                    .assets
                    .sources
                    .iter()
                    .find(|s| s.format == "tar.gz")
                    .map(|s| s.url.clone())
            })
            .unwrap_or_default();

        let manifest_url = links
            .iter()
            .find(|l| l.name == MANIFEST_FILE_NAME)
            .map(GitLabLink::location)
            .unwrap_or_default();

        // Nested namespaces flatten into the id the same way as the owner
        let owner = self.location.owner.replace('/', "-");

        Bundle {
            id: format!("{}-{}-{}", owner, self.location.repo, tag),
            name: release
                .name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| self.location.repo.clone()),
            version: strip_v(tag).to_string(),
            description: summary_line(release.description.as_deref()),
            author: owner,
            source_id: self.source.id.clone(),
            last_updated: release.released_at.clone().unwrap_or_default(),
            manifest_url,
            download_url,
            ..Default::default()
        }
    }
}

#[async_trait]
impl SourceAdapter for GitLabAdapter {
    fn source(&self) -> &Source {
        &self.source
    }

    async fn fetch_bundles(&self) -> Result<Vec<Bundle>> {
        if let Some(bundles) = self.cache.get() {
            debug!("Using cached releases for {}", self.source.id);
            return Ok(bundles);
        }

        let releases: Vec<GitLabRelease> =
            self.get_json(&self.project_url("/releases?per_page=100")).await?;

        let bundles: Vec<Bundle> = releases
            .iter()
            .filter(|r| !r.upcoming_release)
            .map(|r| self.release_to_bundle(r))
            .collect();

        info!(
            "Fetched {} releases from {}",
            bundles.len(),
            self.location.full_name()
        );
        self.cache.put(bundles.clone());
        Ok(bundles)
    }

    async fn download_bundle(&self, bundle: &Bundle) -> Result<Vec<u8>> {
        if bundle.download_url.is_empty() {
            return Err(SourceError::BundleNotFound {
                bundle_id: bundle.id.clone(),
            });
        }

        let url = bundle.download_url.clone();
        self.chain
            .execute(|token| {
                let http = self.http.clone();
                let url = url.clone();
                async move { http.get_bytes(&url, token.as_deref(), None).await }
            })
            .await
    }

    async fn fetch_metadata(&self) -> Result<SourceMetadata> {
        let project: Project = self.get_json(&self.project_url("")).await?;
        let bundles = self.fetch_bundles().await?;

        Ok(SourceMetadata {
            name: project.path_with_namespace,
            description: project.description.unwrap_or_default(),
            bundle_count: bundles.len(),
            last_updated: project.last_activity_at,
            version: bundles.first().map(|b| b.version.clone()),
        })
    }

    fn manifest_url(&self, _bundle_id: &str, version: Option<&str>) -> String {
        let reference = match version {
            Some(v) => format!("v{}", strip_v(v)),
            None => normalize_branch(self.source.config.branch.as_deref()).to_string(),
        };
        format!(
            "{}/-/raw/{}/{}",
            self.location.web_url(),
            reference,
            MANIFEST_FILE_NAME
        )
    }

    fn download_url(&self, _bundle_id: &str, version: Option<&str>) -> String {
        let reference = match version {
            Some(v) => format!("v{}", strip_v(v)),
            None => normalize_branch(self.source.config.branch.as_deref()).to_string(),
        };
        format!(
            "{}/-/archive/{}/{}-{}.tar.gz",
            self.location.web_url(),
            reference,
            self.location.repo,
            reference
        )
    }

    fn invalidate_cache(&self) {
        self.cache.clear();
    }
}
