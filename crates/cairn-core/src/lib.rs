//! # cairn-core
//!
//! Core library for the Cairn bundle registry providing:
//! - Source, bundle and install-record types shared by every crate
//! - Deterministic source identity and its legacy form
//! - Filesystem-safe naming for per-source and per-bundle files
//! - Hierarchical runtime settings (embedded defaults, file, environment)

pub mod config;
pub mod error;
pub mod identity;
pub mod types;
pub mod utils;

pub use config::{RuntimeSettings, SettingsLoader};
pub use error::{Error, Result};
pub use identity::{generate_id, generate_legacy_id};
pub use utils::{get_home_dir, registry_home, sanitize_filename, token_preview};
