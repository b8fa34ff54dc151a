//! Error types for the registry

use cairn_core::types::InstallScope;
use cairn_sources::SourceError;
use thiserror::Error;

/// Result type alias for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error(transparent)]
    Core(#[from] cairn_core::Error),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("Source already exists: {id}")]
    DuplicateSource { id: String },

    #[error("Source '{id}' is disabled")]
    SourceDisabled { id: String },

    #[error("Bundle '{bundle_id}' is not installed in {scope} scope")]
    NotInstalled {
        bundle_id: String,
        scope: InstallScope,
    },

    #[error("Invalid bundle archive for '{bundle_id}': {message}")]
    InvalidArchive { bundle_id: String, message: String },

    #[error("Version consolidation failed: {message}")]
    Consolidation { message: String },

    #[error("Migration '{name}' failed: {message}")]
    Migration { name: String, message: String },
}

impl RegistryError {
    pub fn invalid_archive(bundle_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArchive {
            bundle_id: bundle_id.into(),
            message: message.into(),
        }
    }

    pub fn migration(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Migration {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl From<tempfile::PersistError> for RegistryError {
    fn from(err: tempfile::PersistError) -> Self {
        Self::Io(err.error)
    }
}
