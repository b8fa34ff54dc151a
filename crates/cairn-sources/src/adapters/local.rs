//! Local directory adapter
//!
//! Each immediate subdirectory of the source directory that contains a
//! `deployment-manifest.yml` is a bundle. Downloads pack the directory into
//! a `tar.gz` in memory so local bundles install exactly like remote ones.

use super::{AdapterContext, SourceAdapter};
use crate::archive::pack_directory;
use crate::cache::FetchCache;
use crate::error::{Result, SourceError};
use async_trait::async_trait;
use cairn_core::types::{Bundle, BundleManifest, Source, SourceMetadata, MANIFEST_FILE_NAME};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

pub struct LocalAdapter {
    source: Source,
    root: PathBuf,
    cache: FetchCache<Vec<Bundle>>,
}

impl LocalAdapter {
    pub fn new(source: Source, ctx: &AdapterContext) -> Result<Self> {
        let root = local_path(&source.url);
        Ok(Self {
            cache: ctx.bundle_cache(),
            root,
            source,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Bundle directories with their parsed manifests
    fn scan(&self) -> Result<Vec<(PathBuf, BundleManifest)>> {
        if !self.root.is_dir() {
            return Err(SourceError::NotFound {
                url: self.root.display().to_string(),
            });
        }

        let mut found = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let dir = entry?.path();
            let manifest_path = dir.join(MANIFEST_FILE_NAME);
            if !dir.is_dir() || !manifest_path.is_file() {
                continue;
            }

            let parsed = fs::read_to_string(&manifest_path)
                .map_err(cairn_core::Error::from)
                .and_then(|content| BundleManifest::from_yaml(&content));

            match parsed {
                Ok(mut manifest) => {
                    if manifest.id.trim().is_empty() {
                        manifest.id = dir_name(&dir);
                    }
                    found.push((dir, manifest));
                }
                Err(e) => warn!("Skipping {}: {}", manifest_path.display(), e),
            }
        }

        found.sort_by(|a, b| a.1.id.cmp(&b.1.id));
        Ok(found)
    }

    fn to_bundle(&self, dir: &Path, manifest: BundleManifest) -> Bundle {
        let last_updated = fs::metadata(dir.join(MANIFEST_FILE_NAME))
            .and_then(|m| m.modified())
            .map(|t| DateTime::<Utc>::from(t).to_rfc3339())
            .unwrap_or_default();

        Bundle {
            name: if manifest.name.is_empty() {
                manifest.id.clone()
            } else {
                manifest.name
            },
            id: manifest.id,
            version: manifest.version,
            description: manifest.description,
            author: manifest.author,
            source_id: self.source.id.clone(),
            environments: manifest.environments,
            tags: manifest.tags,
            last_updated,
            size: dir_size(dir),
            dependencies: manifest.dependencies,
            license: manifest.license,
            manifest_url: file_url(&dir.join(MANIFEST_FILE_NAME)),
            download_url: file_url(dir),
            ..Default::default()
        }
    }
}

/// Accept both plain paths and `file://` URLs
fn local_path(url: &str) -> PathBuf {
    let trimmed = url.trim();
    PathBuf::from(trimmed.strip_prefix("file://").unwrap_or(trimmed))
}

fn file_url(path: &Path) -> String {
    format!("file://{}", path.display())
}

fn dir_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Total size of regular files under `dir`; symlinks are not followed
fn dir_size(dir: &Path) -> u64 {
    WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

#[async_trait]
impl SourceAdapter for LocalAdapter {
    fn source(&self) -> &Source {
        &self.source
    }

    async fn fetch_bundles(&self) -> Result<Vec<Bundle>> {
        if let Some(bundles) = self.cache.get() {
            return Ok(bundles);
        }

        let bundles: Vec<Bundle> = self
            .scan()?
            .into_iter()
            .map(|(dir, manifest)| self.to_bundle(&dir, manifest))
            .collect();

        debug!("Found {} bundles in {}", bundles.len(), self.root.display());
        self.cache.put(bundles.clone());
        Ok(bundles)
    }

    async fn download_bundle(&self, bundle: &Bundle) -> Result<Vec<u8>> {
        let dir = self
            .scan()?
            .into_iter()
            .find(|(_, m)| m.id == bundle.id)
            .map(|(dir, _)| dir)
            .ok_or_else(|| SourceError::BundleNotFound {
                bundle_id: bundle.id.clone(),
            })?;

        debug!("Packing {} from {}", bundle.id, dir.display());
        pack_directory(&dir)
    }

    async fn fetch_metadata(&self) -> Result<SourceMetadata> {
        let bundles = self.fetch_bundles().await?;
        Ok(SourceMetadata {
            name: self.source.name.clone(),
            description: format!("Local bundles in {}", self.root.display()),
            bundle_count: bundles.len(),
            last_updated: bundles.iter().map(|b| b.last_updated.clone()).max(),
            version: None,
        })
    }

    fn manifest_url(&self, bundle_id: &str, _version: Option<&str>) -> String {
        file_url(&self.root.join(bundle_id).join(MANIFEST_FILE_NAME))
    }

    fn download_url(&self, bundle_id: &str, _version: Option<&str>) -> String {
        file_url(&self.root.join(bundle_id))
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
    use tempfile::TempDir;

    fn write_bundle(root: &Path, dir: &str, manifest: &str) {
        let path = root.join(dir);
        fs::create_dir_all(path.join("prompts")).unwrap();
        fs::write(path.join(MANIFEST_FILE_NAME), manifest).unwrap();
        fs::write(path.join("prompts/review.md"), "# Review").unwrap();
    }

    fn adapter(root: &Path) -> LocalAdapter {
        let ctx = AdapterContext::new(RuntimeSettings::default()).unwrap();
        let url = format!("file://{}", root.display());
        LocalAdapter::new(Source::new("Disk", SourceType::Local, url), &ctx).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_bundles_reads_manifests() {
        let temp = TempDir::new().unwrap();
        write_bundle(temp.path(), "review", "id: review-kit\nversion: 1.2.0\nname: Review Kit\n");
        write_bundle(temp.path(), "broken", ": not yaml : [");
        fs::create_dir_all(temp.path().join("no-manifest")).unwrap();

        let adapter = adapter(temp.path());
        let bundles = adapter.fetch_bundles().await.unwrap();

        assert_eq!(bundles.len(), 1);
        assert_eq!(bundles[0].id, "review-kit");
        assert_eq!(bundles[0].version, "1.2.0");
        assert_eq!(bundles[0].name, "Review Kit");
        assert!(bundles[0].size > 0);
        assert!(bundles[0].download_url.starts_with("file://"));
    }

    #[test]
    fn test_dir_size_counts_nested_files() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("a/b")).unwrap();
        fs::write(temp.path().join("top.txt"), b"1234").unwrap();
        fs::write(temp.path().join("a/mid.txt"), b"12").unwrap();
        fs::write(temp.path().join("a/b/deep.txt"), b"123456").unwrap();

        assert_eq!(dir_size(temp.path()), 12);
        assert_eq!(dir_size(&temp.path().join("absent")), 0);
    }

    #[tokio::test]
    async fn test_missing_directory_is_not_found() {
        let temp = TempDir::new().unwrap();
        let adapter = adapter(&temp.path().join("absent"));
        assert!(matches!(
            adapter.fetch_bundles().await,
            Err(SourceError::NotFound { .. })
        ));
        assert!(!adapter.validate().await.valid);
    }

    #[tokio::test]
    async fn test_download_unknown_bundle() {
        let temp = TempDir::new().unwrap();
        let adapter = adapter(temp.path());
        let bundle = Bundle {
            id: "ghost".into(),
            ..Default::default()
        };
        assert!(matches!(
            adapter.download_bundle(&bundle).await,
            Err(SourceError::BundleNotFound { .. })
        ));
    }
}
