//! Bundle installation from downloaded archives
//!
//! Every source type delivers a gzip-compressed tarball. The installer
//! unpacks it into a staging directory next to the final location, locates
//! `deployment-manifest.yml`, and swaps the staged tree into place so a
//! failed install never leaves a half-written bundle behind.

use crate::error::{RegistryError, Result};
use async_trait::async_trait;
use cairn_core::sanitize_filename;
use cairn_core::types::{
    Bundle, BundleManifest, InstallOptions, InstallScope, InstalledBundle, MANIFEST_FILE_NAME,
};
use flate2::read::GzDecoder;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};
use tracing::{debug, info, warn};

/// Outcome of unpacking a bundle on disk
#[derive(Debug, Clone, PartialEq)]
pub struct InstalledFiles {
    pub install_path: PathBuf,
    pub manifest: BundleManifest,
}

/// Places bundle payloads on disk
#[async_trait]
pub trait BundleInstaller: Send + Sync {
    /// Unpack `bytes` for `bundle` at the scope in `options`
    async fn install_from_buffer(
        &self,
        bundle: &Bundle,
        bytes: &[u8],
        options: &InstallOptions,
    ) -> Result<InstalledFiles>;

    /// Delete the files of an installed bundle
    async fn remove(&self, record: &InstalledBundle) -> Result<()>;
}

/// Directory layout for installed bundle files
#[derive(Debug, Clone)]
pub struct InstallLayout {
    root: PathBuf,
}

impl InstallLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `bundles/{scope}/{bundle id}` under the root
    pub fn bundle_dir(&self, bundle_id: &str, scope: InstallScope) -> PathBuf {
        self.root
            .join("bundles")
            .join(scope.as_str())
            .join(sanitize_filename(bundle_id))
    }
}

/// Filesystem installer backed by an [`InstallLayout`]
#[derive(Debug, Clone)]
pub struct FsInstaller {
    layout: InstallLayout,
}

impl FsInstaller {
    pub fn new(layout: InstallLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &InstallLayout {
        &self.layout
    }

    fn install_sync(&self, bundle: &Bundle, bytes: &[u8], scope: InstallScope) -> Result<InstalledFiles> {
        let target = self.layout.bundle_dir(&bundle.id, scope);
        let parent = target
            .parent()
            .ok_or_else(|| RegistryError::invalid_archive(&bundle.id, "install path has no parent"))?;
        fs::create_dir_all(parent)?;

        let name = sanitize_filename(&bundle.id);
        let staging = parent.join(format!(".{}.staging", name));
        remove_dir_if_exists(&staging)?;
        fs::create_dir_all(&staging)?;

        let staged = extract_archive(&bundle.id, bytes, &staging)
            .and_then(|()| prepare_content_root(bundle, &staging));

        let (content_root, manifest) = match staged {
            Ok(staged) => staged,
            Err(e) => {
                let _ = fs::remove_dir_all(&staging);
                return Err(e);
            }
        };

        swap_into_place(&content_root, &target, &parent.join(format!(".{}.old", name)))?;
        remove_dir_if_exists(&staging)?;

        info!("Installed {} {} to {}", bundle.id, bundle.version, target.display());
        Ok(InstalledFiles {
            install_path: target,
            manifest,
        })
    }
}

#[async_trait]
impl BundleInstaller for FsInstaller {
    async fn install_from_buffer(
        &self,
        bundle: &Bundle,
        bytes: &[u8],
        options: &InstallOptions,
    ) -> Result<InstalledFiles> {
        self.install_sync(bundle, bytes, options.scope)
    }

    async fn remove(&self, record: &InstalledBundle) -> Result<()> {
        if record.install_path.exists() {
            fs::remove_dir_all(&record.install_path)?;
            debug!("Removed {}", record.install_path.display());
        } else {
            warn!(
                "Install path for {} is already gone: {}",
                record.bundle_id,
                record.install_path.display()
            );
        }
        Ok(())
    }
}

/// Unpack a tar.gz buffer into `dest`, refusing entries that escape it
fn extract_archive(bundle_id: &str, bytes: &[u8], dest: &Path) -> Result<()> {
    let mut archive = Archive::new(GzDecoder::new(bytes));
    let entries = archive
        .entries()
        .map_err(|e| RegistryError::invalid_archive(bundle_id, e.to_string()))?;

    let mut extracted = 0usize;
    for entry in entries {
        let mut entry = entry.map_err(|e| RegistryError::invalid_archive(bundle_id, e.to_string()))?;
        let raw_path = entry
            .path()
            .map_err(|e| RegistryError::invalid_archive(bundle_id, e.to_string()))?
            .into_owned();
        let relative = safe_relative_path(bundle_id, &raw_path)?;
        if relative.as_os_str().is_empty() {
            continue;
        }

        let out = dest.join(&relative);
        match entry.header().entry_type() {
            EntryType::Directory => fs::create_dir_all(&out)?,
            EntryType::Regular | EntryType::Continuous => {
                if let Some(parent) = out.parent() {
                    fs::create_dir_all(parent)?;
                }
                entry
                    .unpack(&out)
                    .map_err(|e| RegistryError::invalid_archive(bundle_id, e.to_string()))?;
                extracted += 1;
            }
            EntryType::Symlink | EntryType::Link => {
                return Err(RegistryError::invalid_archive(
                    bundle_id,
                    format!("links are not allowed: {}", raw_path.display()),
                ));
            }
            other => debug!("Skipping {:?} entry {}", other, raw_path.display()),
        }
    }

    if extracted == 0 {
        return Err(RegistryError::invalid_archive(bundle_id, "archive contains no files"));
    }
    debug!("Extracted {} files for {}", extracted, bundle_id);
    Ok(())
}

fn safe_relative_path(bundle_id: &str, path: &Path) -> Result<PathBuf> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(RegistryError::invalid_archive(
                    bundle_id,
                    format!("path escapes the install directory: {}", path.display()),
                ));
            }
        }
    }
    Ok(clean)
}

/// Locate the manifest and return the directory to install
///
/// Archives produced by release tooling often wrap everything in one
/// top-level directory; that directory becomes the content root when it
/// holds the manifest. Without any manifest one is generated from the
/// catalog entry.
fn prepare_content_root(bundle: &Bundle, staging: &Path) -> Result<(PathBuf, BundleManifest)> {
    if staging.join(MANIFEST_FILE_NAME).is_file() {
        let manifest = read_manifest(&bundle.id, staging)?;
        return Ok((staging.to_path_buf(), manifest));
    }

    let subdirs: Vec<PathBuf> = fs::read_dir(staging)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    if let [only] = subdirs.as_slice() {
        if only.join(MANIFEST_FILE_NAME).is_file() {
            let manifest = read_manifest(&bundle.id, only)?;
            return Ok((only.clone(), manifest));
        }
    }

    warn!(
        "{} ships no {}; generating one from catalog data",
        bundle.id, MANIFEST_FILE_NAME
    );
    let manifest = manifest_from_bundle(bundle);
    fs::write(staging.join(MANIFEST_FILE_NAME), manifest.to_yaml()?)?;
    Ok((staging.to_path_buf(), manifest))
}

fn read_manifest(bundle_id: &str, dir: &Path) -> Result<BundleManifest> {
    let content = fs::read_to_string(dir.join(MANIFEST_FILE_NAME))?;
    BundleManifest::from_yaml(&content).map_err(|e| {
        RegistryError::invalid_archive(bundle_id, format!("malformed {}: {}", MANIFEST_FILE_NAME, e))
    })
}

fn manifest_from_bundle(bundle: &Bundle) -> BundleManifest {
    BundleManifest {
        id: bundle.id.clone(),
        version: bundle.version.clone(),
        name: bundle.name.clone(),
        description: bundle.description.clone(),
        author: bundle.author.clone(),
        tags: bundle.tags.clone(),
        environments: bundle.environments.clone(),
        license: bundle.license.clone(),
        dependencies: bundle.dependencies.clone(),
        items: Vec::new(),
    }
}

/// Move `content` to `target`, keeping the previous tree until the move succeeds
fn swap_into_place(content: &Path, target: &Path, backup: &Path) -> Result<()> {
    remove_dir_if_exists(backup)?;

    let had_previous = target.exists();
    if had_previous {
        fs::rename(target, backup)?;
    }

    if let Err(e) = fs::rename(content, target) {
        if had_previous {
            if let Err(restore) = fs::rename(backup, target) {
                warn!("Could not restore {}: {}", target.display(), restore);
            }
        }
        return Err(e.into());
    }

    if had_previous {
        remove_dir_if_exists(backup)?;
    }
    Ok(())
}

fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
