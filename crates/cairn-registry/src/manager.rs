//! Registry manager
//!
//! Ties configured sources, their adapters, the installer and persisted
//! state together. Every install goes through the same two steps regardless
//! of source type: the adapter downloads the payload, the installer unpacks
//! it. The install record is written only after both succeed.

use crate::consolidation::{consolidate, is_newer, logical_id, release_version};
use crate::error::{RegistryError, Result};
use crate::events::{EventBus, RegistryEvent};
use crate::installer::{BundleInstaller, FsInstaller, InstallLayout};
use crate::storage::RegistryStorage;
use cairn_core::identity::dual_read::{resolve_source, SourceIdCandidates};
use cairn_core::types::{
    Bundle, BundleUpdate, InstallOptions, InstallScope, InstalledBundle, Source, ValidationResult,
};
use cairn_core::RuntimeSettings;
use cairn_sources::adapters::{AdapterFactory, DefaultAdapterFactory, SourceAdapter};
use chrono::Utc;
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Highest accepted source priority
pub const MAX_PRIORITY: i64 = 100;

/// Filters for [`RegistryManager::search_bundles`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleQuery {
    /// Case-insensitive text matched against id, name, description and tags
    pub text: String,
    /// Restrict results to one source
    pub source_id: Option<String>,
    /// Require an exact (case-insensitive) tag
    pub tag: Option<String>,
}

impl BundleQuery {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    fn matches(&self, bundle: &Bundle) -> bool {
        let text_ok = self.text.trim().is_empty() || bundle.matches_text(self.text.trim());
        let tag_ok = self
            .tag
            .as_deref()
            .map(|tag| bundle.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)))
            .unwrap_or(true);
        text_ok && tag_ok
    }
}

/// Outcome of refreshing one source
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub source_id: String,
    pub bundle_count: usize,
    /// Records moved to a newer version as part of the sync
    pub updated: Vec<InstalledBundle>,
}

/// Entry point for every registry operation
pub struct RegistryManager {
    storage: RegistryStorage,
    factory: Arc<dyn AdapterFactory>,
    installer: Arc<dyn BundleInstaller>,
    events: EventBus,
    adapters: Mutex<HashMap<String, Arc<dyn SourceAdapter>>>,
}

impl RegistryManager {
    pub fn new(
        storage: RegistryStorage,
        factory: Arc<dyn AdapterFactory>,
        installer: Arc<dyn BundleInstaller>,
    ) -> Self {
        Self {
            storage,
            factory,
            installer,
            events: EventBus::new(),
            adapters: Mutex::new(HashMap::new()),
        }
    }

    /// Manager using the default adapters and a filesystem installer rooted
    /// at the storage directory
    pub fn from_settings(storage: RegistryStorage, settings: RuntimeSettings) -> Result<Self> {
        let factory = Arc::new(DefaultAdapterFactory::from_settings(settings)?);
        let installer = Arc::new(FsInstaller::new(InstallLayout::new(storage.root())));
        Ok(Self::new(storage, factory, installer))
    }

    pub fn storage(&self) -> &RegistryStorage {
        &self.storage
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    // -- sources -----------------------------------------------------------

    pub fn list_sources(&self) -> Result<Vec<Source>> {
        self.storage.get_sources()
    }

    /// Look up a source by current or legacy id
    pub fn find_source(&self, id: &str) -> Result<Source> {
        let sources = self.storage.get_sources()?;
        resolve_source(&sources, id)
            .cloned()
            .ok_or_else(|| cairn_core::Error::unknown_source(id).into())
    }

    /// Register a source, deriving its id when none is given
    pub fn add_source(&self, mut source: Source) -> Result<Source> {
        validate_priority(i64::from(source.priority))?;
        if source.id.trim().is_empty() {
            source.id = source.computed_id();
        }

        let mut config = self.storage.load_config()?;
        if config.source(&source.id).is_some() {
            return Err(RegistryError::DuplicateSource { id: source.id });
        }

        // Rejects malformed URLs before anything is persisted
        self.factory.create(&source)?;

        config.sources.push(source.clone());
        self.storage.save_config(&config)?;
        info!("Added source {} ({})", source.id, source.source_type);
        Ok(source)
    }

    /// Remove a source and its cached catalog, optionally uninstalling
    /// every bundle installed from it
    pub async fn remove_source(&self, id: &str, uninstall_bundles: bool) -> Result<Source> {
        let source = self.find_source(id)?;

        if uninstall_bundles {
            let candidates = SourceIdCandidates::for_source(&source);
            for record in self.storage.list_all_records()? {
                if candidates.matches(&record.source_id) {
                    self.uninstall_bundle(&record.bundle_id, record.scope).await?;
                }
            }
        }

        let mut config = self.storage.load_config()?;
        config.sources.retain(|s| s.id != source.id);
        self.storage.save_config(&config)?;
        self.storage.remove_cache(&source.id)?;
        self.forget_adapter(&source.id);

        info!("Removed source {}", source.id);
        Ok(source)
    }

    pub fn set_source_enabled(&self, id: &str, enabled: bool) -> Result<Source> {
        self.update_source(id, |s| s.enabled = enabled)
    }

    /// Change a source's priority; values outside 0-100 are rejected
    pub fn set_source_priority(&self, id: &str, priority: i64) -> Result<Source> {
        let priority = validate_priority(priority)?;
        self.update_source(id, |s| s.priority = priority)
    }

    fn update_source(&self, id: &str, change: impl FnOnce(&mut Source)) -> Result<Source> {
        let resolved = self.find_source(id)?;
        let mut config = self.storage.load_config()?;
        let source = config
            .source_mut(&resolved.id)
            .ok_or_else(|| cairn_core::Error::unknown_source(id))?;
        change(source);
        let updated = source.clone();
        self.storage.save_config(&config)?;
        self.forget_adapter(&updated.id);
        Ok(updated)
    }

    // -- adapters ----------------------------------------------------------

    fn adapter(&self, source: &Source) -> Result<Arc<dyn SourceAdapter>> {
        let mut adapters = self.adapters.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(adapter) = adapters.get(&source.id) {
            return Ok(Arc::clone(adapter));
        }
        let adapter = self.factory.create(source)?;
        adapters.insert(source.id.clone(), Arc::clone(&adapter));
        Ok(adapter)
    }

    fn forget_adapter(&self, source_id: &str) {
        self.adapters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(source_id);
    }

    /// Fetch and consolidate one source's catalog
    ///
    /// A consolidation failure is not fatal: the raw release list is used.
    async fn fetch_catalog(&self, source: &Source) -> Result<Vec<Bundle>> {
        let adapter = self.adapter(source)?;
        let bundles = adapter.fetch_bundles().await?;
        match consolidate(bundles.clone(), source.source_type) {
            Ok(consolidated) => Ok(consolidated),
            Err(e) => {
                warn!("Using unconsolidated list for {}: {}", source.id, e);
                Ok(bundles)
            }
        }
    }

    /// Catalog for bulk operations: falls back to the last synced copy
    async fn catalog_or_cached(&self, source: &Source) -> Vec<Bundle> {
        match self.fetch_catalog(source).await {
            Ok(bundles) => bundles,
            Err(e) => {
                warn!("Failed to fetch {}: {}", source.id, e);
                match self.storage.read_cache(&source.id) {
                    Ok(Some(cache)) => {
                        debug!("Using cached catalog for {}", source.id);
                        cache.bundles
                    }
                    _ => Vec::new(),
                }
            }
        }
    }

    // -- discovery ---------------------------------------------------------

    /// Search enabled sources, highest priority first
    ///
    /// When the same bundle id appears in several sources only the entry
    /// from the highest-priority source is kept.
    pub async fn search_bundles(&self, query: &BundleQuery) -> Result<Vec<Bundle>> {
        let mut sources: Vec<Source> = self
            .storage
            .get_sources()?
            .into_iter()
            .filter(|s| s.enabled)
            .collect();
        if let Some(wanted) = &query.source_id {
            let candidates: Vec<Source> = sources
                .iter()
                .filter(|s| SourceIdCandidates::for_source(s).matches(wanted))
                .cloned()
                .collect();
            if candidates.is_empty() {
                return Err(cairn_core::Error::unknown_source(wanted).into());
            }
            sources = candidates;
        }
        sources.sort_by(|a, b| b.priority.cmp(&a.priority));

        let catalogs = join_all(sources.iter().map(|s| self.catalog_or_cached(s))).await;

        let mut seen = HashSet::new();
        let mut results = Vec::new();
        for bundle in catalogs.into_iter().flatten() {
            if query.matches(&bundle) && seen.insert(bundle.id.clone()) {
                results.push(bundle);
            }
        }
        debug!("Search matched {} bundles", results.len());
        Ok(results)
    }

    pub fn list_installed(&self, scope: Option<InstallScope>) -> Result<Vec<InstalledBundle>> {
        match scope {
            Some(scope) => self.storage.list_records(scope),
            None => self.storage.list_all_records(),
        }
    }

    // -- install pipeline --------------------------------------------------

    /// Install a bundle from a source
    ///
    /// Returns the existing record untouched when the same version is
    /// already installed at that scope and `force` is not set. Replacing an
    /// existing record publishes [`RegistryEvent::BundleUpdated`].
    pub async fn install_bundle(
        &self,
        source_id: &str,
        bundle_id: &str,
        options: &InstallOptions,
    ) -> Result<InstalledBundle> {
        let source = self.find_source(source_id)?;
        if !source.enabled {
            return Err(RegistryError::SourceDisabled { id: source.id });
        }

        let catalog = self.fetch_catalog(&source).await?;
        let mut bundle = find_bundle(&catalog, bundle_id, &source)
            .cloned()
            .ok_or_else(|| cairn_core::Error::unknown_bundle(bundle_id))?;

        // A tagged release id names its version unless one is given explicitly
        let requested = options.version.clone().or_else(|| {
            (bundle.id != bundle_id)
                .then(|| release_version(bundle_id, source.source_type))
                .flatten()
        });
        if let Some(requested) = requested.as_deref() {
            pin_version(&mut bundle, requested);
        }

        let existing = self.storage.read_record(&bundle.id, options.scope)?;
        if let Some(existing) = &existing {
            if !options.force && same_version(&existing.version, &bundle.version) {
                info!(
                    "{} {} is already installed ({} scope)",
                    bundle.id, bundle.version, options.scope
                );
                return Ok(existing.clone());
            }
        }

        let record = self.install_resolved(&source, &bundle, options).await?;
        let event = match existing {
            Some(_) => RegistryEvent::BundleUpdated(record.clone()),
            None => RegistryEvent::BundleInstalled(record.clone()),
        };
        self.events.publish(event);
        Ok(record)
    }

    /// Reinstall the newest version of an installed bundle
    ///
    /// Returns `None` when the installed version is already the latest.
    pub async fn update_bundle(
        &self,
        bundle_id: &str,
        scope: InstallScope,
    ) -> Result<Option<InstalledBundle>> {
        let record = self
            .storage
            .read_record(bundle_id, scope)?
            .ok_or_else(|| RegistryError::NotInstalled {
                bundle_id: bundle_id.to_string(),
                scope,
            })?;

        let source = self.find_source(&record.source_id)?;
        let catalog = self.fetch_catalog(&source).await?;
        let latest = find_bundle(&catalog, &record.bundle_id, &source)
            .cloned()
            .ok_or_else(|| cairn_core::Error::unknown_bundle(bundle_id))?;

        if !is_newer(&latest.version, &record.version) {
            debug!("{} is up to date at {}", bundle_id, record.version);
            return Ok(None);
        }

        info!("Updating {} from {} to {}", bundle_id, record.version, latest.version);
        let options = InstallOptions::new(scope).forced();
        let updated = self.install_resolved(&source, &latest, &options).await?;
        self.events
            .publish(RegistryEvent::BundleUpdated(updated.clone()));
        Ok(Some(updated))
    }

    pub async fn uninstall_bundle(&self, bundle_id: &str, scope: InstallScope) -> Result<InstalledBundle> {
        let record = self
            .storage
            .read_record(bundle_id, scope)?
            .ok_or_else(|| RegistryError::NotInstalled {
                bundle_id: bundle_id.to_string(),
                scope,
            })?;

        self.installer.remove(&record).await?;
        self.storage.delete_record(bundle_id, scope)?;

        info!("Uninstalled {} ({} scope)", bundle_id, scope);
        self.events.publish(RegistryEvent::BundleUninstalled {
            bundle_id: record.bundle_id.clone(),
        });
        Ok(record)
    }

    /// Download, unpack, then persist the record
    async fn install_resolved(
        &self,
        source: &Source,
        bundle: &Bundle,
        options: &InstallOptions,
    ) -> Result<InstalledBundle> {
        let adapter = self.adapter(source)?;
        let bytes = adapter.download_bundle(bundle).await?;
        debug!("Downloaded {} bytes for {}", bytes.len(), bundle.id);

        let files = self
            .installer
            .install_from_buffer(bundle, &bytes, options)
            .await?;

        let record = InstalledBundle {
            bundle_id: bundle.id.clone(),
            version: bundle.version.clone(),
            install_path: files.install_path,
            installed_at: Utc::now(),
            scope: options.scope,
            source_id: source.id.clone(),
            source_type: source.source_type,
            manifest: files.manifest,
        };
        self.storage.write_record(&record)?;
        Ok(record)
    }

    /// Installed bundles with a newer version available
    pub async fn check_updates(&self) -> Result<Vec<BundleUpdate>> {
        let records = self.storage.list_all_records()?;
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let configured = self.storage.get_sources()?;
        let mut sources: Vec<Source> = Vec::new();
        for record in &records {
            match resolve_source(&configured, &record.source_id) {
                Some(source) if !sources.iter().any(|s| s.id == source.id) => {
                    sources.push(source.clone())
                }
                Some(_) => {}
                None => warn!(
                    "{} was installed from unknown source {}",
                    record.bundle_id, record.source_id
                ),
            }
        }

        let catalogs = join_all(sources.iter().map(|s| self.catalog_or_cached(s))).await;

        let mut updates = Vec::new();
        for record in &records {
            let Some(position) = sources
                .iter()
                .position(|s| SourceIdCandidates::for_source(s).matches(&record.source_id))
            else {
                continue;
            };
            let source = &sources[position];
            let Some(latest) = find_bundle(&catalogs[position], &record.bundle_id, source) else {
                continue;
            };
            if is_newer(&latest.version, &record.version) {
                updates.push(BundleUpdate {
                    bundle_id: record.bundle_id.clone(),
                    scope: record.scope,
                    source_id: source.id.clone(),
                    current_version: record.version.clone(),
                    latest_version: latest.version.clone(),
                });
            }
        }
        Ok(updates)
    }

    // -- sync & validation -------------------------------------------------

    /// Refresh a source and persist its catalog
    ///
    /// Curated sources then update every outdated bundle installed from
    /// them. Git-hosted releases are never installed automatically.
    pub async fn sync_source(&self, source_id: &str) -> Result<SyncReport> {
        let source = self.find_source(source_id)?;
        self.adapter(&source)?.invalidate_cache();

        let catalog = self.fetch_catalog(&source).await?;
        self.storage.write_cache(&source.id, &catalog)?;
        info!("Synced {}: {} bundles", source.id, catalog.len());
        self.events.publish(RegistryEvent::SourceSynced {
            source_id: source.id.clone(),
            bundle_count: catalog.len(),
        });

        let mut report = SyncReport {
            source_id: source.id.clone(),
            bundle_count: catalog.len(),
            updated: Vec::new(),
        };
        if !source.source_type.auto_updates_on_sync() {
            return Ok(report);
        }

        let candidates = SourceIdCandidates::for_source(&source);
        for record in self.storage.list_all_records()? {
            if !candidates.matches(&record.source_id) {
                continue;
            }
            let outdated = find_bundle(&catalog, &record.bundle_id, &source)
                .map(|latest| is_newer(&latest.version, &record.version))
                .unwrap_or(false);
            if !outdated {
                continue;
            }
            match self.update_bundle(&record.bundle_id, record.scope).await {
                Ok(Some(updated)) => report.updated.push(updated),
                Ok(None) => {}
                Err(e) => warn!("Auto-update of {} failed: {}", record.bundle_id, e),
            }
        }
        Ok(report)
    }

    /// Sync every enabled source concurrently
    pub async fn sync_all_sources(&self) -> Result<Vec<(String, Result<SyncReport>)>> {
        let ids: Vec<String> = self
            .storage
            .get_sources()?
            .into_iter()
            .filter(|s| s.enabled)
            .map(|s| s.id)
            .collect();

        let results = join_all(ids.iter().map(|id| self.sync_source(id))).await;
        Ok(ids.into_iter().zip(results).collect())
    }

    pub async fn validate_source(&self, source_id: &str) -> Result<ValidationResult> {
        let source = self.find_source(source_id)?;
        Ok(self.adapter(&source)?.validate().await)
    }

    /// Validate every configured source concurrently
    pub async fn validate_all_sources(&self) -> Result<Vec<(Source, ValidationResult)>> {
        let sources = self.storage.get_sources()?;
        let results = join_all(sources.iter().map(|source| async move {
            match self.adapter(source) {
                Ok(adapter) => adapter.validate().await,
                Err(e) => ValidationResult::failed(e.to_string()),
            }
        }))
        .await;
        Ok(sources.into_iter().zip(results).collect())
    }
}

fn validate_priority(priority: i64) -> Result<u8> {
    if !(0..=MAX_PRIORITY).contains(&priority) {
        return Err(cairn_core::Error::InvalidPriority { priority }.into());
    }
    Ok(priority as u8)
}

fn same_version(a: &str, b: &str) -> bool {
    a.trim_start_matches('v') == b.trim_start_matches('v')
}

/// Find a bundle by its id or by the logical id of a versioned release id
fn find_bundle<'a>(catalog: &'a [Bundle], bundle_id: &str, source: &Source) -> Option<&'a Bundle> {
    catalog.iter().find(|b| b.id == bundle_id).or_else(|| {
        let wanted = logical_id(bundle_id, source.source_type);
        catalog
            .iter()
            .find(|b| logical_id(&b.id, source.source_type) == wanted)
    })
}

/// Point the bundle at a specific version, or keep the latest when that
/// version is not published
fn pin_version(bundle: &mut Bundle, requested: &str) {
    if same_version(&bundle.version, requested) {
        return;
    }
    match bundle.find_version(requested).cloned() {
        Some(version) => bundle.pin_to(&version),
        None => warn!(
            "Version {} of {} not found; installing latest {}",
            requested, bundle.id, bundle.version
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_core::types::{BundleVersion, SourceType};

    fn source() -> Source {
        Source::new("Acme", SourceType::Github, "https://github.com/acme/prompts")
    }

    fn consolidated() -> Bundle {
        Bundle {
            id: "acme-prompts".into(),
            version: "1.1.0".into(),
            download_url: "https://example.com/1.1.0.tar.gz".into(),
            available_versions: vec![
                BundleVersion {
                    version: "1.1.0".into(),
                    download_url: "https://example.com/1.1.0.tar.gz".into(),
                    ..Default::default()
                },
                BundleVersion {
                    version: "1.0.0".into(),
                    download_url: "https://example.com/1.0.0.tar.gz".into(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_priority_bounds() {
        assert_eq!(validate_priority(0).unwrap(), 0);
        assert_eq!(validate_priority(100).unwrap(), 100);
        assert!(matches!(
            validate_priority(101),
            Err(RegistryError::Core(cairn_core::Error::InvalidPriority { priority: 101 }))
        ));
        assert!(validate_priority(-1).is_err());
    }

    #[test]
    fn test_find_bundle_accepts_release_ids() {
        let catalog = vec![consolidated()];
        let source = source();
        assert!(find_bundle(&catalog, "acme-prompts", &source).is_some());
        assert!(find_bundle(&catalog, "acme-prompts-v1.0.0", &source).is_some());
        assert!(find_bundle(&catalog, "other", &source).is_none());
    }

    #[test]
    fn test_pin_version_rewrites_download() {
        let mut bundle = consolidated();
        pin_version(&mut bundle, "v1.0.0");
        assert_eq!(bundle.version, "1.0.0");
        assert_eq!(bundle.download_url, "https://example.com/1.0.0.tar.gz");
    }

    #[test]
    fn test_pin_missing_version_keeps_latest() {
        let mut bundle = consolidated();
        pin_version(&mut bundle, "9.9.9");
        assert_eq!(bundle.version, "1.1.0");
        assert_eq!(bundle.download_url, "https://example.com/1.1.0.tar.gz");
    }

    #[test]
    fn test_query_matching() {
        let mut bundle = consolidated();
        bundle.tags = vec!["Review".into()];

        assert!(BundleQuery::default().matches(&bundle));
        assert!(BundleQuery::text("acme").matches(&bundle));
        assert!(!BundleQuery::text("kube").matches(&bundle));

        let tagged = BundleQuery {
            tag: Some("review".into()),
            ..Default::default()
        };
        assert!(tagged.matches(&bundle));
    }
}
