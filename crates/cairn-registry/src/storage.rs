//! File-backed registry state
//!
//! Layout under the registry home:
//!
//! ```text
//! config.yaml                      configured sources
//! cache/sources/<source id>.json   last fetched catalog per source
//! installed/<bundle id>.json       workspace-scope install records
//! user-installed/<bundle id>.json  user-scope install records
//! migrations.json                  migration state
//! ```
//!
//! Ids are passed through [`sanitize_filename`] before they touch the
//! filesystem. Every write goes to a temporary file in the target directory
//! that is then renamed over the destination.

use crate::error::Result;
use cairn_core::sanitize_filename;
use cairn_core::types::{
    Bundle, InstallScope, InstalledBundle, MigrationState, RegistryConfig, Source,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

const CONFIG_FILE: &str = "config.yaml";
const MIGRATIONS_FILE: &str = "migrations.json";

/// Catalog snapshot written on every successful sync
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceCache {
    pub source_id: String,
    pub last_synced: DateTime<Utc>,
    #[serde(default)]
    pub bundles: Vec<Bundle>,
}

/// Persistence for migration bookkeeping
pub trait MigrationStateStore: Send + Sync {
    fn load_migration_state(&self) -> Result<MigrationState>;

    fn save_migration_state(&self, state: &MigrationState) -> Result<()>;
}

/// Registry state rooted at one directory
#[derive(Debug, Clone)]
pub struct RegistryStorage {
    root: PathBuf,
}

impl RegistryStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Storage at `CAIRN_HOME`, or `~/.cairn`
    pub fn open_default() -> Result<Self> {
        let root = cairn_core::registry_home()
            .map_err(|e| cairn_core::Error::invalid_config(e.to_string()))?;
        Ok(Self::new(root))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn sources_cache_dir(&self) -> PathBuf {
        self.root.join("cache").join("sources")
    }

    /// Workspace-scope install records
    pub fn installed_dir(&self) -> PathBuf {
        self.root.join("installed")
    }

    /// User-scope install records
    pub fn user_installed_dir(&self) -> PathBuf {
        self.root.join("user-installed")
    }

    pub fn records_dir(&self, scope: InstallScope) -> PathBuf {
        match scope {
            InstallScope::User => self.user_installed_dir(),
            InstallScope::Workspace => self.installed_dir(),
        }
    }

    pub fn cache_path(&self, source_id: &str) -> PathBuf {
        self.sources_cache_dir()
            .join(format!("{}.json", sanitize_filename(source_id)))
    }

    pub fn record_path(&self, bundle_id: &str, scope: InstallScope) -> PathBuf {
        self.records_dir(scope)
            .join(format!("{}.json", sanitize_filename(bundle_id)))
    }

    // -- configuration ---------------------------------------------------

    pub fn load_config(&self) -> Result<RegistryConfig> {
        let path = self.config_path();
        if !path.exists() {
            return Ok(RegistryConfig::default());
        }
        let content = fs::read_to_string(&path)?;
        if content.trim().is_empty() {
            return Ok(RegistryConfig::default());
        }
        Ok(serde_yaml_ng::from_str(&content)?)
    }

    pub fn save_config(&self, config: &RegistryConfig) -> Result<()> {
        let yaml = serde_yaml_ng::to_string(config)?;
        write_atomic(&self.config_path(), yaml.as_bytes())
    }

    pub fn get_sources(&self) -> Result<Vec<Source>> {
        Ok(self.load_config()?.sources)
    }

    pub fn get_source(&self, id: &str) -> Result<Option<Source>> {
        Ok(self.load_config()?.source(id).cloned())
    }

    // -- catalog cache ----------------------------------------------------

    pub fn read_cache(&self, source_id: &str) -> Result<Option<SourceCache>> {
        read_json(&self.cache_path(source_id))
    }

    pub fn write_cache(&self, source_id: &str, bundles: &[Bundle]) -> Result<SourceCache> {
        let cache = SourceCache {
            source_id: source_id.to_string(),
            last_synced: Utc::now(),
            bundles: bundles.to_vec(),
        };
        write_json(&self.cache_path(source_id), &cache)?;
        Ok(cache)
    }

    pub fn remove_cache(&self, source_id: &str) -> Result<()> {
        remove_if_exists(&self.cache_path(source_id))
    }

    // -- install records --------------------------------------------------

    pub fn read_record(&self, bundle_id: &str, scope: InstallScope) -> Result<Option<InstalledBundle>> {
        read_json(&self.record_path(bundle_id, scope))
    }

    pub fn write_record(&self, record: &InstalledBundle) -> Result<()> {
        write_json(&self.record_path(&record.bundle_id, record.scope), record)
    }

    pub fn delete_record(&self, bundle_id: &str, scope: InstallScope) -> Result<()> {
        remove_if_exists(&self.record_path(bundle_id, scope))
    }

    /// Records of one scope; unreadable files are skipped with a warning
    pub fn list_records(&self, scope: InstallScope) -> Result<Vec<InstalledBundle>> {
        let dir = self.records_dir(scope);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_json::<InstalledBundle>(&path) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => warn!("Ignoring unreadable install record {}: {}", path.display(), e),
            }
        }
        records.sort_by(|a, b| a.bundle_id.cmp(&b.bundle_id));
        Ok(records)
    }

    /// Records across both scopes
    pub fn list_all_records(&self) -> Result<Vec<InstalledBundle>> {
        let mut all = Vec::new();
        for scope in InstallScope::ALL {
            all.extend(self.list_records(scope)?);
        }
        Ok(all)
    }
}

impl MigrationStateStore for RegistryStorage {
    fn load_migration_state(&self) -> Result<MigrationState> {
        Ok(read_json(&self.root.join(MIGRATIONS_FILE))?.unwrap_or_default())
    }

    fn save_migration_state(&self, state: &MigrationState) -> Result<()> {
        write_json(&self.root.join(MIGRATIONS_FILE), state)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &json)
}

/// Write to a sibling temporary file, then rename over `path`
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    temp.persist(path)?;

    debug!("Wrote {}", path.display());
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_core::types::{BundleManifest, MigrationRecord, SourceType};
    use tempfile::TempDir;

    fn create_test_storage() -> (RegistryStorage, TempDir) {
        let temp = TempDir::new().unwrap();
        (RegistryStorage::new(temp.path()), temp)
    }

    fn record(bundle_id: &str, scope: InstallScope) -> InstalledBundle {
        InstalledBundle {
            bundle_id: bundle_id.to_string(),
            version: "1.0.0".to_string(),
            install_path: PathBuf::from("/tmp/x"),
            installed_at: Utc::now(),
            scope,
            source_id: "github-a1b2c3d4e5f6".to_string(),
            source_type: SourceType::Github,
            manifest: BundleManifest::default(),
        }
    }

    #[test]
    fn test_config_round_trip() {
        let (storage, _temp) = create_test_storage();
        assert!(storage.get_sources().unwrap().is_empty());

        let source = Source::new("Acme", SourceType::Github, "https://github.com/acme/prompts");
        storage
            .save_config(&RegistryConfig {
                sources: vec![source.clone()],
            })
            .unwrap();

        assert_eq!(storage.get_sources().unwrap(), vec![source.clone()]);
        assert_eq!(storage.get_source(&source.id).unwrap(), Some(source));
        assert!(storage.get_source("missing").unwrap().is_none());
    }

    #[test]
    fn test_cache_uses_sanitized_names() {
        let (storage, _temp) = create_test_storage();
        storage.write_cache("odd/id:1", &[]).unwrap();

        assert!(storage.sources_cache_dir().join("odd_id_1.json").exists());
        let cache = storage.read_cache("odd/id:1").unwrap().unwrap();
        assert_eq!(cache.source_id, "odd/id:1");

        storage.remove_cache("odd/id:1").unwrap();
        storage.remove_cache("odd/id:1").unwrap();
        assert!(storage.read_cache("odd/id:1").unwrap().is_none());
    }

    #[test]
    fn test_cache_json_shape() {
        let (storage, _temp) = create_test_storage();
        storage.write_cache("github-a1b2c3d4e5f6", &[]).unwrap();
        let raw = fs::read_to_string(storage.cache_path("github-a1b2c3d4e5f6")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["sourceId"], "github-a1b2c3d4e5f6");
        assert!(json.get("lastSynced").is_some());
        assert!(json["bundles"].is_array());
    }

    #[test]
    fn test_records_are_scoped() {
        let (storage, _temp) = create_test_storage();
        storage.write_record(&record("a", InstallScope::User)).unwrap();
        storage.write_record(&record("b", InstallScope::Workspace)).unwrap();

        assert!(storage.user_installed_dir().join("a.json").exists());
        assert!(storage.installed_dir().join("b.json").exists());
        assert_eq!(storage.list_records(InstallScope::User).unwrap().len(), 1);
        assert_eq!(storage.list_all_records().unwrap().len(), 2);

        assert!(storage.read_record("a", InstallScope::Workspace).unwrap().is_none());
        storage.delete_record("a", InstallScope::User).unwrap();
        assert!(storage.read_record("a", InstallScope::User).unwrap().is_none());
    }

    #[test]
    fn test_unreadable_record_is_skipped() {
        let (storage, _temp) = create_test_storage();
        storage.write_record(&record("good", InstallScope::User)).unwrap();
        fs::write(storage.user_installed_dir().join("bad.json"), "{").unwrap();

        let records = storage.list_records(InstallScope::User).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].bundle_id, "good");
    }

    #[test]
    fn test_migration_state_round_trip() {
        let (storage, _temp) = create_test_storage();
        assert!(storage.load_migration_state().unwrap().is_empty());

        let mut state = MigrationState::new();
        state.insert("example".into(), MigrationRecord::completed(None));
        storage.save_migration_state(&state).unwrap();

        let loaded = storage.load_migration_state().unwrap();
        assert!(loaded["example"].is_final());
    }

    #[test]
    fn test_write_atomic_replaces_content() {
        let (storage, _temp) = create_test_storage();
        let path = storage.root().join("nested/file.txt");
        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "two");

        let leftovers = fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
