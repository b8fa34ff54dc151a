//! Collection manifests discovered from a GitHub repository tree
//!
//! The adapter lists the repository tree once, picks every
//! `*.collection.yml` / `*.collection.yaml` blob under the collections path
//! and turns each into a bundle. A download assembles the files a collection
//! lists, plus a generated deployment manifest, into a `tar.gz`.

use super::{AdapterContext, SourceAdapter};
use crate::archive::pack_files;
use crate::auth::{AuthChain, Platform};
use crate::cache::FetchCache;
use crate::error::{Result, SourceError};
use crate::http::HttpClient;
use crate::repo::RepoLocation;
use async_trait::async_trait;
use cairn_core::identity::{normalize_branch, DEFAULT_COLLECTIONS_PATH};
use cairn_core::types::{
    Bundle, BundleManifest, ManifestItem, Source, SourceMetadata, MANIFEST_FILE_NAME,
};
use futures::future::join_all;
use serde::Deserialize;
use tracing::{debug, info, warn};

const COLLECTION_SUFFIXES: [&str; 2] = [".collection.yml", ".collection.yaml"];

/// Version assumed for collections that do not declare one
const DEFAULT_COLLECTION_VERSION: &str = "1.0.0";

#[derive(Debug, Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

/// A `*.collection.yml` document
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionManifest {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    pub version: Option<String>,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub environments: Vec<String>,
    #[serde(default)]
    pub license: String,
    #[serde(default)]
    pub items: Vec<ManifestItem>,
}

impl CollectionManifest {
    pub fn parse(content: &str) -> std::result::Result<Self, serde_yaml_ng::Error> {
        serde_yaml_ng::from_str(content)
    }
}

pub struct GitTreeIndexAdapter {
    source: Source,
    location: RepoLocation,
    http: HttpClient,
    chain: AuthChain,
    cache: FetchCache<Vec<Bundle>>,
}

impl GitTreeIndexAdapter {
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

    fn branch(&self) -> &str {
        normalize_branch(self.source.config.branch.as_deref())
    }

    fn collections_path(&self) -> &str {
        self.source
            .config
            .collections_path
            .as_deref()
            .map(|p| p.trim_matches('/'))
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_COLLECTIONS_PATH)
    }

    fn raw_url(&self, path: &str) -> String {
        self.location.github_raw_url(self.branch(), path)
    }

    fn is_collection_path(&self, path: &str) -> bool {
        let prefix = format!("{}/", self.collections_path());
        path.starts_with(&prefix) && COLLECTION_SUFFIXES.iter().any(|s| path.ends_with(s))
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        self.chain
            .execute(|token| {
                let http = self.http.clone();
                let url = url.to_string();
                async move { http.get_text(&url, token.as_deref()).await }
            })
            .await
    }

    async fn list_collection_paths(&self) -> Result<Vec<String>> {
        let url = format!(
            "{}/repos/{}/git/trees/{}?recursive=1",
            self.location.github_api_base(),
            self.location.full_name(),
            self.branch()
        );

        let tree: TreeResponse = self
            .chain
            .execute(|token| {
                let http = self.http.clone();
                let url = url.clone();
                async move { http.get_json(&url, token.as_deref()).await }
            })
            .await?;

        if tree.truncated {
            warn!(
                "Tree listing for {} was truncated; some collections may be missing",
                self.location.full_name()
            );
        }

        Ok(tree
            .tree
            .into_iter()
            .filter(|e| e.kind == "blob" && self.is_collection_path(&e.path))
            .map(|e| e.path)
            .collect())
    }

    fn collection_to_bundle(&self, path: &str, manifest: CollectionManifest) -> Bundle {
        let id = manifest
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| collection_stem(path));
        let raw = self.raw_url(path);

        Bundle {
            name: manifest.name.unwrap_or_else(|| id.clone()),
            version: manifest
                .version
                .unwrap_or_else(|| DEFAULT_COLLECTION_VERSION.to_string()),
            description: manifest.description,
            author: if manifest.author.is_empty() {
                self.location.owner.clone()
            } else {
                manifest.author
            },
            source_id: self.source.id.clone(),
            environments: manifest.environments,
            tags: manifest.tags,
            license: manifest.license,
            manifest_url: raw.clone(),
            download_url: raw,
            id,
            ..Default::default()
        }
    }
}

/// `collections/team/review.collection.yml` -> `review`
fn collection_stem(path: &str) -> String {
    let file = path.rsplit('/').next().unwrap_or(path);
    COLLECTION_SUFFIXES
        .iter()
        .find_map(|s| file.strip_suffix(s))
        .unwrap_or(file)
        .to_string()
}

#[async_trait]
impl SourceAdapter for GitTreeIndexAdapter {
    fn source(&self) -> &Source {
        &self.source
    }

    async fn fetch_bundles(&self) -> Result<Vec<Bundle>> {
        if let Some(bundles) = self.cache.get() {
            debug!("Using cached collections for {}", self.source.id);
            return Ok(bundles);
        }

        let paths = self.list_collection_paths().await?;
        let fetches: Vec<_> = paths
            .iter()
            .map(|path| async move {
                let content = self.get_text(&self.raw_url(path)).await;
                (path, content)
            })
            .collect();

        let mut bundles = Vec::new();
        for (path, content) in join_all(fetches).await {
            let content = match content {
                Ok(content) => content,
                Err(e) if e.is_auth_failure() || matches!(e, SourceError::AuthExhausted { .. }) => {
                    return Err(e)
                }
                Err(e) => {
                    warn!("Skipping collection {}: {}", path, e);
                    continue;
                }
            };

            match CollectionManifest::parse(&content) {
                Ok(manifest) => bundles.push(self.collection_to_bundle(path, manifest)),
                Err(e) => warn!("Skipping malformed collection {}: {}", path, e),
            }
        }

        info!(
            "Found {} collections in {}",
            bundles.len(),
            self.location.full_name()
        );
        self.cache.put(bundles.clone());
        Ok(bundles)
    }

    async fn download_bundle(&self, bundle: &Bundle) -> Result<Vec<u8>> {
        if bundle.manifest_url.is_empty() {
            return Err(SourceError::BundleNotFound {
                bundle_id: bundle.id.clone(),
            });
        }

        let content = self.get_text(&bundle.manifest_url).await?;
        let collection = CollectionManifest::parse(&content).map_err(|e| {
            SourceError::invalid_response(&bundle.manifest_url, format!("malformed collection: {}", e))
        })?;

        let fetches: Vec<_> = collection
            .items
            .iter()
            .map(|item| async move {
                let url = self.raw_url(&item.path);
                let body = self
                    .chain
                    .execute(|token| {
                        let http = self.http.clone();
                        let url = url.clone();
                        async move { http.get_bytes(&url, token.as_deref(), None).await }
                    })
                    .await?;
                Ok::<_, SourceError>((item.path.trim_start_matches('/').to_string(), body))
            })
            .collect();

        let mut files = Vec::with_capacity(collection.items.len() + 1);
        for result in join_all(fetches).await {
            files.push(result?);
        }

        let manifest = BundleManifest {
            id: bundle.id.clone(),
            version: bundle.version.clone(),
            name: bundle.name.clone(),
            description: bundle.description.clone(),
            author: bundle.author.clone(),
            tags: bundle.tags.clone(),
            environments: bundle.environments.clone(),
            license: bundle.license.clone(),
            dependencies: bundle.dependencies.clone(),
            items: collection.items.clone(),
        };
        files.push((MANIFEST_FILE_NAME.to_string(), manifest.to_yaml()?.into_bytes()));

        debug!("Assembled {} with {} files", bundle.id, files.len());
        pack_files(&files)
    }

    async fn fetch_metadata(&self) -> Result<SourceMetadata> {
        let bundles = self.fetch_bundles().await?;
        Ok(SourceMetadata {
            name: self.location.full_name(),
            description: format!(
                "Collections under '{}' on {}",
                self.collections_path(),
                self.branch()
            ),
            bundle_count: bundles.len(),
            last_updated: None,
            version: None,
        })
    }

    fn manifest_url(&self, bundle_id: &str, _version: Option<&str>) -> String {
        self.raw_url(&format!(
            "{}/{}{}",
            self.collections_path(),
            bundle_id,
            COLLECTION_SUFFIXES[0]
        ))
    }

    fn download_url(&self, bundle_id: &str, version: Option<&str>) -> String {
        self.manifest_url(bundle_id, version)
    }

    fn invalidate_cache(&self) {
        self.cache.clear();
    }
}
