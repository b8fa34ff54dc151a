//! Scripted adapters and a recording installer

use super::fixtures::bundle_archive;
use async_trait::async_trait;
use cairn_core::types::{
    Bundle, InstallOptions, InstalledBundle, Source, SourceMetadata,
};
use cairn_registry::{BundleInstaller, FsInstaller, InstalledFiles, RegistryError};
use cairn_sources::adapters::{AdapterFactory, SourceAdapter};
use cairn_sources::SourceError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Adapter serving a mutable catalog and generated archives
pub struct MockAdapter {
    source: Source,
    bundles: Mutex<Vec<Bundle>>,
    downloads: Mutex<Vec<String>>,
    fetches: AtomicUsize,
    invalidations: AtomicUsize,
    fail_fetch: AtomicBool,
    fail_download: AtomicBool,
}

impl MockAdapter {
    pub fn new(source: &Source, bundles: Vec<Bundle>) -> Arc<Self> {
        Arc::new(Self {
            source: source.clone(),
            bundles: Mutex::new(bundles),
            downloads: Mutex::new(Vec::new()),
            fetches: AtomicUsize::new(0),
            invalidations: AtomicUsize::new(0),
            fail_fetch: AtomicBool::new(false),
            fail_download: AtomicBool::new(false),
        })
    }

    pub fn set_bundles(&self, bundles: Vec<Bundle>) {
        *self.bundles.lock().unwrap() = bundles;
    }

    /// Download URLs requested so far
    pub fn downloads(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn invalidation_count(&self) -> usize {
        self.invalidations.load(Ordering::SeqCst)
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn fail_downloads(&self, fail: bool) {
        self.fail_download.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SourceAdapter for MockAdapter {
    fn source(&self) -> &Source {
        &self.source
    }

    async fn fetch_bundles(&self) -> cairn_sources::Result<Vec<Bundle>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(SourceError::network(&self.source.url, "connection reset"));
        }
        Ok(self.bundles.lock().unwrap().clone())
    }

    async fn download_bundle(&self, bundle: &Bundle) -> cairn_sources::Result<Vec<u8>> {
        if self.fail_download.load(Ordering::SeqCst) {
            return Err(SourceError::NotFound {
                url: bundle.download_url.clone(),
            });
        }
        self.downloads
            .lock()
            .unwrap()
            .push(bundle.download_url.clone());
        Ok(bundle_archive(bundle))
    }

    async fn fetch_metadata(&self) -> cairn_sources::Result<SourceMetadata> {
        Ok(SourceMetadata {
            name: self.source.name.clone(),
            bundle_count: self.bundles.lock().unwrap().len(),
            ..Default::default()
        })
    }

    fn manifest_url(&self, bundle_id: &str, version: Option<&str>) -> String {
        format!("mock://{}/{}.yml", bundle_id, version.unwrap_or("latest"))
    }

    fn download_url(&self, bundle_id: &str, version: Option<&str>) -> String {
        format!("mock://{}/{}.tar.gz", bundle_id, version.unwrap_or("latest"))
    }

    fn invalidate_cache(&self) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
    }
}

/// Factory handing out pre-registered adapters by source id
#[derive(Default)]
pub struct MockFactory {
    adapters: Mutex<HashMap<String, Arc<MockAdapter>>>,
    created: Mutex<Vec<String>>,
}

impl MockFactory {
    pub fn register(&self, source_id: &str, adapter: Arc<MockAdapter>) {
        self.adapters
            .lock()
            .unwrap()
            .insert(source_id.to_string(), adapter);
    }

    /// Source ids adapters were created for, in order
    pub fn created(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }
}

impl AdapterFactory for MockFactory {
    fn create(&self, source: &Source) -> cairn_sources::Result<Arc<dyn SourceAdapter>> {
        self.created.lock().unwrap().push(source.id.clone());
        let adapter: Arc<dyn SourceAdapter> = self
            .adapters
            .lock()
            .unwrap()
            .get(&source.id)
            .cloned()
            .unwrap_or_else(|| MockAdapter::new(source, Vec::new()));
        Ok(adapter)
    }
}

/// One call to [`BundleInstaller::install_from_buffer`]
#[derive(Debug, Clone, PartialEq)]
pub struct InstallCall {
    pub bundle_id: String,
    pub version: String,
    pub bytes: Vec<u8>,
}

/// Filesystem installer that records its calls and can be told to fail
pub struct RecordingInstaller {
    inner: FsInstaller,
    installs: Mutex<Vec<InstallCall>>,
    removals: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl RecordingInstaller {
    pub fn new(inner: FsInstaller) -> Self {
        Self {
            inner,
            installs: Mutex::new(Vec::new()),
            removals: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn installs(&self) -> Vec<InstallCall> {
        self.installs.lock().unwrap().clone()
    }

    pub fn removals(&self) -> Vec<String> {
        self.removals.lock().unwrap().clone()
    }

    pub fn fail_installs(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl BundleInstaller for RecordingInstaller {
    async fn install_from_buffer(
        &self,
        bundle: &Bundle,
        bytes: &[u8],
        options: &InstallOptions,
    ) -> cairn_registry::Result<InstalledFiles> {
        self.installs.lock().unwrap().push(InstallCall {
            bundle_id: bundle.id.clone(),
            version: bundle.version.clone(),
            bytes: bytes.to_vec(),
        });
        if self.fail.load(Ordering::SeqCst) {
            return Err(RegistryError::invalid_archive(&bundle.id, "disk full"));
        }
        self.inner.install_from_buffer(bundle, bytes, options).await
    }

    async fn remove(&self, record: &InstalledBundle) -> cairn_registry::Result<()> {
        self.removals.lock().unwrap().push(record.bundle_id.clone());
        self.inner.remove(record).await
    }
}

/// Session provider with no ambient credentials
pub struct NoSession;

#[async_trait]
impl cairn_sources::SessionProvider for NoSession {
    async fn session_token(&self, _platform: cairn_sources::Platform) -> Option<String> {
        None
    }
}
