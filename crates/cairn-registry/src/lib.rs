//! # cairn-registry
//!
//! Bundle registry for Cairn:
//! - [`RegistryManager`] for source management, search, install, update and sync
//! - Version consolidation of per-tag release records
//! - File-backed storage for configuration, catalogs and install records
//! - Staged archive installation
//! - Idempotent migrations of persisted state

pub mod consolidation;
pub mod error;
pub mod events;
pub mod hub;
pub mod installer;
pub mod manager;
pub mod migration;
pub mod storage;

pub use error::{RegistryError, Result};
pub use events::{EventBus, RegistryEvent};
pub use installer::{BundleInstaller, FsInstaller, InstallLayout, InstalledFiles};
pub use manager::{BundleQuery, RegistryManager, SyncReport};
pub use migration::{Migration, MigrationOutcome, MigrationReport, MigrationRunner, SourceIdMigration};
pub use storage::{MigrationStateStore, RegistryStorage, SourceCache};
