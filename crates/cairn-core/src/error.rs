//! Error types for cairn-core

use thiserror::Error;

/// Result type alias using cairn-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for Cairn
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Invalid configuration format
    #[error("Invalid configuration format: {message}")]
    InvalidConfig { message: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml_ng::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// URL could not be parsed
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// URL scheme other than http/https
    #[error("Unsupported URL scheme '{scheme}' in '{url}'. Only http and https are supported")]
    UnsupportedScheme { url: String, scheme: String },

    /// Unknown source type tag
    #[error("Unknown source type: {value}. Valid types: github, gitlab, http, local, curated-index, git-tree-index")]
    InvalidSourceType { value: String },

    /// Source id not present in configuration
    #[error("Unknown source: {id}")]
    UnknownSource { id: String },

    /// Bundle id not found
    #[error("Unknown bundle: {id}")]
    UnknownBundle { id: String },

    /// Priority outside the 0-100 range
    #[error("Invalid priority {priority}: must be between 0 and 100")]
    InvalidPriority { priority: i64 },
}

impl Error {
    /// Create a config not found error
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create an invalid URL error
    pub fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create an unsupported scheme error
    pub fn unsupported_scheme(url: impl Into<String>, scheme: impl Into<String>) -> Self {
        Self::UnsupportedScheme {
            url: url.into(),
            scheme: scheme.into(),
        }
    }

    /// Create an unknown source error
    pub fn unknown_source(id: impl Into<String>) -> Self {
        Self::UnknownSource { id: id.into() }
    }

    /// Create an unknown bundle error
    pub fn unknown_bundle(id: impl Into<String>) -> Self {
        Self::UnknownBundle { id: id.into() }
    }
}
