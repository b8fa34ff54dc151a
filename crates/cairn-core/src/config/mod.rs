//! Runtime settings

mod loader;

pub use loader::{AuthSettings, CacheSettings, NetworkSettings, RuntimeSettings, SettingsLoader};
