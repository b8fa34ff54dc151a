//! Plain HTTP catalog adapter (`index.json`)

use super::{AdapterContext, SourceAdapter};
use crate::cache::FetchCache;
use crate::error::{Result, SourceError};
use crate::http::HttpClient;
use async_trait::async_trait;
use cairn_core::types::{Bundle, Source, SourceMetadata, MANIFEST_FILE_NAME};
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

const INDEX_FILE: &str = "index.json";

/// `index.json` document
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDocument {
    pub name: Option<String>,
    pub description: Option<String>,
    pub version: Option<String>,
    pub last_updated: Option<String>,
    /// Raw entries; see [`HttpAdapter::entries_to_bundles`]
    #[serde(default)]
    pub bundles: Vec<serde_json::Value>,
}

/// One bundle listed in `index.json`; URLs may be relative to the source
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub id: String,
    pub name: Option<String>,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub environments: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub downloads: Option<u64>,
    pub rating: Option<f32>,
    #[serde(default)]
    pub last_updated: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub license: String,
    pub manifest_url: Option<String>,
    pub download_url: Option<String>,
}

pub struct HttpAdapter {
    source: Source,
    base: Url,
    http: HttpClient,
    cache: FetchCache<Vec<Bundle>>,
}

impl HttpAdapter {
    pub fn new(source: Source, ctx: &AdapterContext) -> Result<Self> {
        let base = base_url(&source.url)?;
        Ok(Self {
            http: ctx.http.clone(),
            cache: ctx.bundle_cache(),
            base,
            source,
        })
    }

    fn index_url(&self) -> String {
        if self.source.url.trim_end_matches('/').ends_with(".json") {
            self.source.url.trim().to_string()
        } else {
            self.resolve(INDEX_FILE)
        }
    }

    /// Resolve a possibly relative URL against the source
    fn resolve(&self, reference: &str) -> String {
        self.base
            .join(reference)
            .map(String::from)
            .unwrap_or_else(|_| reference.to_string())
    }

    async fn fetch_index(&self) -> Result<IndexDocument> {
        let url = self.index_url();
        self.http
            .get_json(&url, self.source.explicit_token())
            .await
    }

    /// Decode entries one by one, skipping any that do not fit [`IndexEntry`]
    fn entries_to_bundles(&self, entries: Vec<serde_json::Value>) -> Vec<Bundle> {
        entries
            .into_iter()
            .enumerate()
            .filter_map(|(i, raw)| match serde_json::from_value::<IndexEntry>(raw) {
                Ok(entry) => Some(self.entry_to_bundle(entry)),
                Err(e) => {
                    warn!("Skipping malformed index entry {} in {}: {}", i, self.source.id, e);
                    None
                }
            })
            .collect()
    }

    fn entry_to_bundle(&self, entry: IndexEntry) -> Bundle {
        let version = Some(entry.version.as_str());
        let download_url = match &entry.download_url {
            Some(u) => self.resolve(u),
            None => self.download_url(&entry.id, version),
        };
        let manifest_url = match &entry.manifest_url {
            Some(u) => self.resolve(u),
            None => self.manifest_url(&entry.id, version),
        };

        Bundle {
            name: entry.name.unwrap_or_else(|| entry.id.clone()),
            id: entry.id,
            version: entry.version,
            description: entry.description,
            author: entry.author,
            source_id: self.source.id.clone(),
            environments: entry.environments,
            tags: entry.tags,
            downloads: entry.downloads,
            rating: entry.rating,
            last_updated: entry.last_updated,
            size: entry.size,
            dependencies: entry.dependencies,
            license: entry.license,
            manifest_url,
            download_url,
            available_versions: Vec::new(),
        }
    }
}

/// Directory-style base URL so relative references resolve beneath it
fn base_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    let with_slash = if trimmed.ends_with(".json") || trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    };

    let url = Url::parse(&with_slash)
        .map_err(|e| SourceError::Core(cairn_core::Error::invalid_url(raw, e.to_string())))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(SourceError::Core(cairn_core::Error::unsupported_scheme(raw, other))),
    }
}

#[async_trait]
impl SourceAdapter for HttpAdapter {
    fn source(&self) -> &Source {
        &self.source
    }

    async fn fetch_bundles(&self) -> Result<Vec<Bundle>> {
        if let Some(bundles) = self.cache.get() {
            debug!("Using cached index for {}", self.source.id);
            return Ok(bundles);
        }

        let index = self.fetch_index().await?;
        let bundles = self.entries_to_bundles(index.bundles);

        info!("Fetched {} bundles from {}", bundles.len(), self.index_url());
        self.cache.put(bundles.clone());
        Ok(bundles)
    }

    async fn download_bundle(&self, bundle: &Bundle) -> Result<Vec<u8>> {
        let url = if bundle.download_url.is_empty() {
            self.download_url(&bundle.id, Some(&bundle.version))
        } else {
            bundle.download_url.clone()
        };
        self.http
            .get_bytes(&url, self.source.explicit_token(), None)
            .await
    }

    async fn fetch_metadata(&self) -> Result<SourceMetadata> {
        let index = self.fetch_index().await?;
        Ok(SourceMetadata {
            name: index.name.unwrap_or_else(|| self.source.name.clone()),
            description: index.description.unwrap_or_default(),
            bundle_count: index.bundles.len(),
            last_updated: index.last_updated,
            version: index.version,
        })
    }

    fn manifest_url(&self, bundle_id: &str, version: Option<&str>) -> String {
        self.resolve(&format!(
            "bundles/{}/{}/{}",
            bundle_id,
            version.unwrap_or("latest"),
            MANIFEST_FILE_NAME
        ))
    }

    fn download_url(&self, bundle_id: &str, version: Option<&str>) -> String {
        self.resolve(&format!(
            "bundles/{}/{}.tar.gz",
            bundle_id,
            version.unwrap_or("latest")
        ))
    }

    fn invalidate_cache(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_core::types::SourceType;
    use cairn_core::RuntimeSettings;

    fn adapter(url: &str) -> HttpAdapter {
        let ctx = AdapterContext::new(RuntimeSettings::default()).unwrap();
        HttpAdapter::new(Source::new("Web", SourceType::Http, url), &ctx).unwrap()
    }

    #[test]
    fn test_index_and_relative_urls() {
        let adapter = adapter("https://bundles.example.com/catalog");
        assert_eq!(adapter.index_url(), "https://bundles.example.com/catalog/index.json");
        assert_eq!(
            adapter.resolve("files/a.tar.gz"),
            "https://bundles.example.com/catalog/files/a.tar.gz"
        );
        assert_eq!(
            adapter.resolve("https://cdn.example.com/a.tar.gz"),
            "https://cdn.example.com/a.tar.gz"
        );
        assert_eq!(
            adapter.download_url("tools", Some("1.0.0")),
            "https://bundles.example.com/catalog/bundles/tools/1.0.0.tar.gz"
        );
    }

    #[test]
    fn test_explicit_index_file() {
        let adapter = adapter("https://bundles.example.com/v2/index.json");
        assert_eq!(adapter.index_url(), "https://bundles.example.com/v2/index.json");
        assert_eq!(adapter.resolve("a.tgz"), "https://bundles.example.com/v2/a.tgz");
    }

    #[test]
    fn test_rejects_non_http_scheme() {
        let ctx = AdapterContext::new(RuntimeSettings::default()).unwrap();
        let source = Source::new("Ftp", SourceType::Http, "ftp://example.com/catalog");
        assert!(HttpAdapter::new(source, &ctx).is_err());
    }

    #[test]
    fn test_entry_defaults() {
        let adapter = adapter("https://bundles.example.com");
        let entry: IndexEntry =
            serde_json::from_str(r#"{"id": "tools", "version": "1.0.0"}"#).unwrap();
        let bundle = adapter.entry_to_bundle(entry);
        assert_eq!(bundle.name, "tools");
        assert_eq!(
            bundle.download_url,
            "https://bundles.example.com/bundles/tools/1.0.0.tar.gz"
        );
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let adapter = adapter("https://bundles.example.com");
        let entries: Vec<serde_json::Value> = serde_json::from_str(
            r#"[
                {"id": "tools", "version": "1.0.0"},
                {"id": "no-version"},
                {"id": "bad-tags", "version": "1.0.0", "tags": "notalist"},
                {"id": "docs", "version": "2.0.0", "tags": ["docs"]}
            ]"#,
        )
        .unwrap();

        let bundles = adapter.entries_to_bundles(entries);
        let ids: Vec<_> = bundles.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["tools", "docs"]);
    }
}
