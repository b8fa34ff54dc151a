//! Dual-read lookup for source ids that predate the normalization change
//!
//! Committed lock files and hub profiles may still name a source by its
//! legacy id. They are never rewritten in place; instead readers resolve a
//! referenced id against both the current and the legacy id of every
//! configured source. Remove this module once no persisted data can carry a
//! legacy id.

use crate::types::Source;

/// The ids a single source may be referenced by
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceIdCandidates {
    pub stored: String,
    pub current: String,
    pub legacy: Option<String>,
}

impl SourceIdCandidates {
    pub fn for_source(source: &Source) -> Self {
        Self {
            stored: source.id.clone(),
            current: source.computed_id(),
            legacy: source.legacy_id(),
        }
    }

    /// Whether `id` refers to this source under any known rule
    pub fn matches(&self, id: &str) -> bool {
        self.stored == id || self.current == id || self.legacy.as_deref() == Some(id)
    }
}

/// Resolve a referenced source id, preferring exact matches over legacy ones
pub fn resolve_source<'a>(sources: &'a [Source], referenced_id: &str) -> Option<&'a Source> {
    sources
        .iter()
        .find(|s| s.id == referenced_id)
        .or_else(|| {
            sources
                .iter()
                .find(|s| SourceIdCandidates::for_source(s).matches(referenced_id))
        })
}
