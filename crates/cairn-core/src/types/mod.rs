//! Type definitions shared across Cairn crates

mod bundle_types;
mod migration_types;
mod source_types;

pub use bundle_types::*;
pub use migration_types::*;
pub use source_types::*;
