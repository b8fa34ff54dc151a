//! Common test infrastructure for cairn-registry tests
//!
//! - `fixtures`: bundles, manifests and archives
//! - `mocks`: scripted adapters, a factory handing them out, and a
//!   recording installer
//! - `TestRegistry`: a manager over a temporary home wired to the mocks

#![allow(dead_code)]
#![allow(unused_imports)]

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;

use cairn_core::types::{RegistryConfig, Source};
use cairn_registry::{FsInstaller, InstallLayout, RegistryManager, RegistryStorage};
use std::sync::Arc;
use tempfile::TempDir;

/// Registry manager over a temporary directory with scripted sources
pub struct TestRegistry {
    pub temp: TempDir,
    pub manager: RegistryManager,
    pub factory: Arc<MockFactory>,
    pub installer: Arc<RecordingInstaller>,
}

impl TestRegistry {
    /// Configure `sources` and serve each from its paired adapter
    pub fn new(sources: Vec<(Source, Arc<MockAdapter>)>) -> Self {
        let temp = TempDir::new().unwrap();
        let storage = RegistryStorage::new(temp.path());
        storage
            .save_config(&RegistryConfig {
                sources: sources.iter().map(|(s, _)| s.clone()).collect(),
            })
            .unwrap();

        let factory = Arc::new(MockFactory::default());
        for (source, adapter) in sources {
            factory.register(&source.id, adapter);
        }
        let installer = Arc::new(RecordingInstaller::new(FsInstaller::new(InstallLayout::new(
            temp.path(),
        ))));

        let manager = RegistryManager::new(storage, factory.clone(), installer.clone());
        Self {
            temp,
            manager,
            factory,
            installer,
        }
    }

    pub fn storage(&self) -> &RegistryStorage {
        self.manager.storage()
    }
}
