//! GitHub releases adapter
//!
//! Every non-draft release of the repository becomes one bundle record with
//! id `{owner}-{repo}-{tag}`. Those records are later consolidated into one
//! logical bundle per repository.

use super::{is_tarball_name, strip_v, summary_line, AdapterContext, SourceAdapter};
use crate::auth::{AuthChain, Platform};
use crate::cache::FetchCache;
use crate::error::{Result, SourceError};
use crate::http::{HttpClient, OCTET_STREAM};
use crate::repo::RepoLocation;
use async_trait::async_trait;
use cairn_core::identity::normalize_branch;
use cairn_core::types::{Bundle, Source, SourceMetadata, MANIFEST_FILE_NAME};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Largest page the releases endpoint serves
const RELEASES_PER_PAGE: usize = 100;

/// Pages fetched before the listing is cut short
const MAX_RELEASE_PAGES: usize = 10;

/// Release information
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub tag_name: String,
    pub name: Option<String>,
    pub body: Option<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
    pub published_at: Option<String>,
    pub tarball_url: Option<String>,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

/// Release asset
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    /// API URL; returns the binary when requested as `application/octet-stream`
    pub url: Option<String>,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: u64,
}

impl ReleaseAsset {
    fn download_location(&self) -> String {
        self.url
            .clone()
            .unwrap_or_else(|| self.browser_download_url.clone())
    }
}

#[derive(Debug, Deserialize)]
struct Repository {
    full_name: String,
    description: Option<String>,
    updated_at: Option<String>,
}

pub struct GitHubAdapter {
    source: Source,
    location: RepoLocation,
    http: HttpClient,
    chain: AuthChain,
    cache: FetchCache<Vec<Bundle>>,
}

impl GitHubAdapter {
    pub fn new(source: Source, ctx: &AdapterContext) -> Result<Self> {
        let location = RepoLocation::parse(&source.url)?;
        Ok(Self {
            chain: ctx.auth_chain(Platform::GitHub, &source),
            http: ctx.http.clone(),
            cache: ctx.bundle_cache(),
            location,
            source,
        })
    }

    pub fn auth_chain(&self) -> &AuthChain {
        &self.chain
    }

    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}{}",
            self.location.github_api_base(),
            self.location.full_name(),
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

    /// Every release of the repository, following pages until a short one
    async fn list_releases(&self) -> Result<Vec<Release>> {
        let mut releases = Vec::new();
        for page in 1..=MAX_RELEASE_PAGES {
            let url = self.api_url(&format!(
                "/releases?per_page={}&page={}",
                RELEASES_PER_PAGE, page
            ));
            let batch: Vec<Release> = self.get_json(&url).await?;
            let full = batch.len() >= RELEASES_PER_PAGE;
            releases.extend(batch);
            if !full {
                return Ok(releases);
            }
        }

        warn!(
            "Stopped listing releases of {} after {} pages; older versions are omitted",
            self.location.full_name(),
            MAX_RELEASE_PAGES
        );
        Ok(releases)
    }

    fn release_to_bundle(&self, release: &Release) -> Bundle {
        let tag = release.tag_name.trim();
        let tarball = release.assets.iter().find(|a| is_tarball_name(&a.name));
        let manifest = release.assets.iter().find(|a| a.name == MANIFEST_FILE_NAME);

        let download_url = tarball
            .map(ReleaseAsset::download_location)
            .or_else(|| release.tarball_url.clone())
            .unwrap_or_default();

        Bundle {
            id: format!("{}-{}-{}", self.location.owner, self.location.repo, tag),
            name: release
                .name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| self.location.repo.clone()),
            version: strip_v(tag).to_string(),
            description: summary_line(release.body.as_deref()),
            author: self.location.owner.clone(),
            source_id: self.source.id.clone(),
            last_updated: release.published_at.clone().unwrap_or_default(),
            size: tarball.map(|a| a.size).unwrap_or(0),
            manifest_url: manifest
                .map(ReleaseAsset::download_location)
                .unwrap_or_default(),
            download_url,
            ..Default::default()
        }
    }
}

#[async_trait]
impl SourceAdapter for GitHubAdapter {
    fn source(&self) -> &Source {
        &self.source
    }

    async fn fetch_bundles(&self) -> Result<Vec<Bundle>> {
        if let Some(bundles) = self.cache.get() {
            debug!("Using cached releases for {}", self.source.id);
            return Ok(bundles);
        }

        let releases = self.list_releases().await?;

        let bundles: Vec<Bundle> = releases
            .iter()
            .filter(|r| !r.draft)
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
        let accept = url.contains("/releases/assets/").then_some(OCTET_STREAM);
        debug!("Downloading {} {} from {}", bundle.id, bundle.version, url);

        self.chain
            .execute(|token| {
                let http = self.http.clone();
                let url = url.clone();
                async move { http.get_bytes(&url, token.as_deref(), accept).await }
            })
            .await
    }

    async fn fetch_metadata(&self) -> Result<SourceMetadata> {
        let repo: Repository = self.get_json(&self.api_url("")).await?;
        let bundles = self.fetch_bundles().await?;

        Ok(SourceMetadata {
            name: repo.full_name,
            description: repo.description.unwrap_or_default(),
            bundle_count: bundles.len(),
            last_updated: repo.updated_at,
            version: bundles.first().map(|b| b.version.clone()),
        })
    }

    fn manifest_url(&self, _bundle_id: &str, version: Option<&str>) -> String {
        match version {
            Some(v) => format!(
                "{}/releases/download/v{}/{}",
                self.location.web_url(),
                strip_v(v),
                MANIFEST_FILE_NAME
            ),
            None => format!(
                "{}/releases/latest/download/{}",
                self.location.web_url(),
                MANIFEST_FILE_NAME
            ),
        }
    }

    fn download_url(&self, _bundle_id: &str, version: Option<&str>) -> String {
        match version {
            Some(v) => format!(
                "{}/archive/refs/tags/v{}.tar.gz",
                self.location.web_url(),
                strip_v(v)
            ),
            None => format!(
                "{}/archive/refs/heads/{}.tar.gz",
                self.location.web_url(),
                normalize_branch(self.source.config.branch.as_deref())
            ),
        }
    }

    fn invalidate_cache(&self) {
        self.cache.clear();
    }
}
