//! Curated YAML index adapter
//!
//! The source URL points at a single YAML document listing items. Each item
//! becomes one bundle. The document may live on an HTTP host or on disk.

use super::{AdapterContext, SourceAdapter};
use crate::cache::FetchCache;
use crate::error::{Result, SourceError};
use crate::http::HttpClient;
use async_trait::async_trait;
use cairn_core::types::{Bundle, Source, SourceMetadata, ValidationResult, MANIFEST_FILE_NAME};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use url::Url;

/// Version assumed for items that do not declare one
const DEFAULT_ITEM_VERSION: &str = "0.0.0";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CuratedIndex {
    pub name: Option<String>,
    pub description: Option<String>,
    pub version: Option<String>,
    pub last_updated: Option<String>,
    /// Raw entries, decoded one at a time so a bad item only loses itself
    #[serde(default)]
    pub items: Vec<serde_yaml_ng::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CuratedItem {
    pub id: Option<String>,
    pub name: Option<String>,
    pub version: Option<String>,
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
    #[serde(alias = "url")]
    pub download_url: Option<String>,
    pub manifest_url: Option<String>,
    pub last_updated: Option<String>,
    #[serde(default)]
    pub size: u64,
}

/// Where the index document lives
#[derive(Debug, Clone)]
enum IndexLocation {
    Remote(Url),
    File(PathBuf),
}

pub struct CuratedIndexAdapter {
    source: Source,
    location: IndexLocation,
    http: HttpClient,
    cache: FetchCache<Vec<Bundle>>,
}

impl CuratedIndexAdapter {
    pub fn new(source: Source, ctx: &AdapterContext) -> Result<Self> {
        let location = parse_location(&source.url)?;
        Ok(Self {
            http: ctx.http.clone(),
            cache: ctx.bundle_cache(),
            location,
            source,
        })
    }

    async fn load_index(&self) -> Result<CuratedIndex> {
        let (origin, content) = match &self.location {
            IndexLocation::Remote(url) => (
                url.to_string(),
                self.http
                    .get_text(url.as_str(), self.source.explicit_token())
                    .await?,
            ),
            IndexLocation::File(path) => {
                (path.display().to_string(), std::fs::read_to_string(path)?)
            }
        };

        serde_yaml_ng::from_str(&content).map_err(|e| {
            SourceError::invalid_response(origin, format!("could not parse index YAML: {}", e))
        })
    }

    /// Resolve a reference relative to the index document
    fn resolve(&self, reference: &str) -> String {
        if reference.contains("://") {
            return reference.to_string();
        }
        match &self.location {
            IndexLocation::Remote(url) => url
                .join(reference)
                .map(String::from)
                .unwrap_or_else(|_| reference.to_string()),
            IndexLocation::File(path) => {
                let base = path.parent().unwrap_or_else(|| Path::new("."));
                format!("file://{}", base.join(reference).display())
            }
        }
    }

    fn item_to_bundle(&self, position: usize, raw: serde_yaml_ng::Value) -> Option<Bundle> {
        let item: CuratedItem = match serde_yaml_ng::from_value(raw) {
            Ok(item) => item,
            Err(e) => {
                warn!(
                    "Skipping malformed index item {} in {}: {}",
                    position, self.source.id, e
                );
                return None;
            }
        };

        let id = match item.id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                warn!(
                    "Skipping index item without an id in {} ({})",
                    self.source.id,
                    item.name.as_deref().unwrap_or("unnamed")
                );
                return None;
            }
        };

        let download_url = match item.download_url.as_deref().map(str::trim) {
            Some(u) if !u.is_empty() => self.resolve(u),
            _ => {
                warn!("Skipping index item '{}': no download location", id);
                return None;
            }
        };

        Some(Bundle {
            name: item.name.unwrap_or_else(|| id.clone()),
            version: item
                .version
                .unwrap_or_else(|| DEFAULT_ITEM_VERSION.to_string()),
            description: item.description,
            author: item.author,
            source_id: self.source.id.clone(),
            environments: item.environments,
            tags: item.tags,
            last_updated: item.last_updated.unwrap_or_default(),
            size: item.size,
            dependencies: item.dependencies,
            license: item.license,
            manifest_url: item
                .manifest_url
                .map(|u| self.resolve(&u))
                .unwrap_or_default(),
            download_url,
            id,
            ..Default::default()
        })
    }
}

fn parse_location(raw: &str) -> Result<IndexLocation> {
    let trimmed = raw.trim();
    if let Some(path) = trimmed.strip_prefix("file://") {
        return Ok(IndexLocation::File(PathBuf::from(path)));
    }
    if !trimmed.contains("://") {
        return Ok(IndexLocation::File(PathBuf::from(trimmed)));
    }

    let url = Url::parse(trimmed)
        .map_err(|e| SourceError::Core(cairn_core::Error::invalid_url(raw, e.to_string())))?;
    match url.scheme() {
        "http" | "https" => Ok(IndexLocation::Remote(url)),
        other => Err(SourceError::Core(cairn_core::Error::unsupported_scheme(raw, other))),
    }
}

#[async_trait]
impl SourceAdapter for CuratedIndexAdapter {
    fn source(&self) -> &Source {
        &self.source
    }

    async fn fetch_bundles(&self) -> Result<Vec<Bundle>> {
        if let Some(bundles) = self.cache.get() {
            debug!("Using cached index for {}", self.source.id);
            return Ok(bundles);
        }

        let index = self.load_index().await?;
        let total = index.items.len();
        let bundles: Vec<Bundle> = index
            .items
            .into_iter()
            .enumerate()
            .filter_map(|(i, item)| self.item_to_bundle(i, item))
            .collect();

        info!(
            "Loaded {} of {} index items from {}",
            bundles.len(),
            total,
            self.source.url
        );
        self.cache.put(bundles.clone());
        Ok(bundles)
    }

    async fn download_bundle(&self, bundle: &Bundle) -> Result<Vec<u8>> {
        let url = bundle.download_url.trim();
        if url.is_empty() {
            return Err(SourceError::BundleNotFound {
                bundle_id: bundle.id.clone(),
            });
        }

        match url.strip_prefix("file://") {
            Some(path) => Ok(std::fs::read(path)?),
            None => {
                self.http
                    .get_bytes(url, self.source.explicit_token(), None)
                    .await
            }
        }
    }

    async fn fetch_metadata(&self) -> Result<SourceMetadata> {
        let index = self.load_index().await?;
        Ok(SourceMetadata {
            name: index.name.unwrap_or_else(|| self.source.name.clone()),
            description: index.description.unwrap_or_default(),
            bundle_count: index.items.len(),
            last_updated: index.last_updated,
            version: index.version,
        })
    }

    async fn validate(&self) -> ValidationResult {
        let index = match self.load_index().await {
            Ok(index) => index,
            Err(e) => return ValidationResult::failed(e.to_string()),
        };

        let total = index.items.len();
        let usable = index
            .items
            .into_iter()
            .enumerate()
            .filter_map(|(i, item)| self.item_to_bundle(i, item))
            .count();

        let mut result = ValidationResult::ok(usable);
        if usable < total {
            result = result.with_warning(format!(
                "{} of {} items were skipped (malformed, or missing id or download location)",
                total - usable,
                total
            ));
        }
        if total == 0 {
            result = result.with_warning("Index lists no items");
        }
        result
    }

    fn manifest_url(&self, bundle_id: &str, version: Option<&str>) -> String {
        self.resolve(&format!(
            "{}/{}/{}",
            bundle_id,
            version.unwrap_or("latest"),
            MANIFEST_FILE_NAME
        ))
    }

    fn download_url(&self, bundle_id: &str, version: Option<&str>) -> String {
        self.resolve(&format!(
            "{}/{}.tar.gz",
            bundle_id,
            version.unwrap_or("latest")
        ))
    }

    fn invalidate_cache(&self) {
        self.cache.clear();
    }
}
