//! Hierarchical runtime settings loader
//!
//! Loads settings from multiple layers with the following precedence (low to high):
//! 1. Embedded defaults (built into binary)
//! 2. Runtime file (`<registry home>/runtime.yaml`)
//! 3. Environment variables (CAIRN_* prefix)
//! 4. CLI flags (handled by caller)

use crate::error::{Error, Result};
use camino::{Utf8Path, Utf8PathBuf};
use rust_embed::RustEmbed;
use serde::{Deserialize, Serialize};
use serde_yaml_ng::Value;
use std::env;
use std::fs;
use std::time::Duration;
use tracing::debug;

/// Embedded configuration files
#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/../../embedded/config/"]
#[prefix = ""]
struct EmbeddedConfigs;

const DEFAULTS_FILE: &str = "runtime-defaults.yaml";
const RUNTIME_FILE: &str = "runtime.yaml";

/// HTTP behaviour shared by adapters and the prober
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSettings {
    pub timeout_secs: u64,
    pub probe_timeout_secs: u64,
    pub user_agent: String,
}

/// Catalog memoization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    pub ttl_secs: u64,
}

/// Credential resolution for git-hosted sources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSettings {
    /// Ask locally installed platform CLIs (`gh`, `glab`) for a token
    pub use_cli: bool,
    pub cli_timeout_secs: u64,
}

/// Effective runtime settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeSettings {
    pub network: NetworkSettings,
    pub cache: CacheSettings,
    pub auth: AuthSettings,
}

impl RuntimeSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.network.timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.network.probe_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    pub fn cli_timeout(&self) -> Duration {
        Duration::from_secs(self.auth.cli_timeout_secs)
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            network: NetworkSettings {
                timeout_secs: 30,
                probe_timeout_secs: 10,
                user_agent: "cairn-cli".to_string(),
            },
            cache: CacheSettings { ttl_secs: 300 },
            auth: AuthSettings {
                use_cli: true,
                cli_timeout_secs: 5,
            },
        }
    }
}

/// Settings hierarchy loader
pub struct SettingsLoader {
    config_dir: Utf8PathBuf,
}

impl SettingsLoader {
    /// Create a loader rooted at the registry home directory
    pub fn new() -> Result<Self> {
        let home = crate::utils::registry_home()
            .map_err(|e| Error::invalid_config(e.to_string()))?;
        let config_dir = Utf8PathBuf::from_path_buf(home)
            .map_err(|p| Error::invalid_config(format!("Non UTF-8 registry home: {:?}", p)))?;
        Ok(Self { config_dir })
    }

    /// Create a loader with a custom config directory
    pub fn with_dir(config_dir: Utf8PathBuf) -> Self {
        Self { config_dir }
    }

    /// Load runtime settings with hierarchical precedence
    pub fn load(&self) -> Result<RuntimeSettings> {
        let mut merged = Self::load_embedded_defaults()?;

        let runtime_path = self.config_dir.join(RUNTIME_FILE);
        if runtime_path.exists() {
            debug!("Loading runtime settings from {}", runtime_path);
            let overlay = self.load_yaml_file(&runtime_path)?;
            merge_values(&mut merged, overlay);
        }

        let settings: RuntimeSettings = serde_yaml_ng::from_value(merged)
            .map_err(|e| Error::invalid_config(format!("Invalid runtime settings: {}", e)))?;

        self.apply_env_overrides(settings)
    }

    fn load_embedded_defaults() -> Result<Value> {
        let embedded_file = EmbeddedConfigs::get(DEFAULTS_FILE).ok_or_else(|| {
            Error::config_not_found(format!("Embedded config not found: {}", DEFAULTS_FILE))
        })?;

        let content = std::str::from_utf8(&embedded_file.data).map_err(|_| {
            Error::invalid_config(format!("Invalid UTF-8 in embedded config: {}", DEFAULTS_FILE))
        })?;

        serde_yaml_ng::from_str(content).map_err(|e| {
            Error::invalid_config(format!(
                "Failed to parse embedded config {}: {}",
                DEFAULTS_FILE, e
            ))
        })
    }

    fn load_yaml_file(&self, path: &Utf8Path) -> Result<Value> {
        let content = fs::read_to_string(path)?;
        serde_yaml_ng::from_str(&content)
            .map_err(|e| Error::invalid_config(format!("Failed to parse {}: {}", path, e)))
    }

    fn apply_env_overrides(&self, mut settings: RuntimeSettings) -> Result<RuntimeSettings> {
        if let Ok(val) = env::var("CAIRN_HTTP_TIMEOUT_SECS") {
            settings.network.timeout_secs = val.parse().map_err(|_| {
                Error::invalid_config("CAIRN_HTTP_TIMEOUT_SECS must be a valid number")
            })?;
        }

        if let Ok(val) = env::var("CAIRN_PROBE_TIMEOUT_SECS") {
            settings.network.probe_timeout_secs = val.parse().map_err(|_| {
                Error::invalid_config("CAIRN_PROBE_TIMEOUT_SECS must be a valid number")
            })?;
        }

        if let Ok(val) = env::var("CAIRN_USER_AGENT") {
            settings.network.user_agent = val;
        }

        if let Ok(val) = env::var("CAIRN_CACHE_TTL_SECS") {
            settings.cache.ttl_secs = val.parse().map_err(|_| {
                Error::invalid_config("CAIRN_CACHE_TTL_SECS must be a valid number")
            })?;
        }

        if let Ok(val) = env::var("CAIRN_DISABLE_CLI_AUTH") {
            settings.auth.use_cli = !val.parse().unwrap_or(false);
        }

        Ok(settings)
    }

    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }
}

/// Deep-merge `overlay` into `base`; mappings merge key by key, anything else replaces
fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
