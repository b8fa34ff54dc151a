//! Command implementations

pub mod bundle;
pub mod check_urls;
pub mod completions;
pub mod migrate;
pub mod source;

use anyhow::{Context, Result};
use cairn_core::SettingsLoader;
use cairn_registry::{MigrationRunner, RegistryManager, RegistryStorage};
use camino::Utf8Path;
use tracing::{debug, warn};

/// Settings loader for an explicit home, or the default registry home
pub(crate) fn settings_loader(home: Option<&Utf8Path>) -> Result<SettingsLoader> {
    match home {
        Some(dir) => Ok(SettingsLoader::with_dir(dir.to_path_buf())),
        None => SettingsLoader::new().context("Failed to locate registry home"),
    }
}

/// Storage rooted at the selected home
pub(crate) fn open_storage(home: Option<&Utf8Path>) -> Result<RegistryStorage> {
    match home {
        Some(dir) => Ok(RegistryStorage::new(dir.as_std_path())),
        None => RegistryStorage::open_default().context("Failed to open registry storage"),
    }
}

/// Open the registry, applying pending migrations first
///
/// A failing migration is logged and retried on the next invocation; it
/// never blocks the command itself.
pub(crate) async fn open_registry(home: Option<&Utf8Path>) -> Result<RegistryManager> {
    let settings = settings_loader(home)?
        .load()
        .context("Failed to load runtime settings")?;
    let storage = open_storage(home)?;

    match MigrationRunner::standard().run(&storage).await {
        Ok(reports) => {
            for report in reports.iter().filter(|r| r.outcome.is_some()) {
                debug!("Applied migration {}", report.name);
            }
        }
        Err(e) => warn!("Registry migration failed, will retry: {}", e),
    }

    RegistryManager::from_settings(storage, settings).context("Failed to initialize registry")
}
