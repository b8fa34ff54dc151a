//! `source-id-normalization`: move sources created under the host-only
//! lowercase rule to ids computed with the full lowercase rule
//!
//! Touches configuration, cached catalogs and install records. Lock files
//! and hub profiles keep their ids; readers resolve those through
//! `identity::dual_read`.

use super::{Migration, MigrationOutcome};
use crate::error::Result;
use crate::storage::RegistryStorage;
use async_trait::async_trait;
use cairn_core::identity::is_generated_id;
use cairn_core::types::InstallScope;
use std::collections::HashSet;
use std::fs;
use tracing::{debug, info, warn};

/// One source id moved by the migration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceIdRewrite {
    pub old_id: String,
    pub new_id: String,
}

/// Rewrites legacy source ids everywhere the registry stores them
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceIdMigration;

impl SourceIdMigration {
    pub const NAME: &'static str = "source-id-normalization";

    /// Sources whose stored id is exactly their legacy id
    pub fn plan(storage: &RegistryStorage) -> Result<Vec<SourceIdRewrite>> {
        let mut rewrites = Vec::new();
        for source in storage.get_sources()? {
            if !is_generated_id(&source.id, source.source_type) {
                continue;
            }
            let current = source.computed_id();
            if current == source.id {
                continue;
            }
            if source.legacy_id().as_deref() != Some(source.id.as_str()) {
                warn!(
                    "Source {} does not match its current or legacy id; leaving it unchanged",
                    source.id
                );
                continue;
            }
            rewrites.push(SourceIdRewrite {
                old_id: source.id.clone(),
                new_id: current,
            });
        }
        Ok(rewrites)
    }

    fn rewrite_config(storage: &RegistryStorage, rewrites: &[SourceIdRewrite]) -> Result<()> {
        let mut config = storage.load_config()?;
        let existing: HashSet<String> = config.sources.iter().map(|s| s.id.clone()).collect();

        let mut dropped = HashSet::new();
        for rewrite in rewrites {
            if existing.contains(&rewrite.new_id) {
                warn!(
                    "Source {} duplicates {}; keeping the normalized entry",
                    rewrite.old_id, rewrite.new_id
                );
                dropped.insert(rewrite.old_id.clone());
                continue;
            }
            if let Some(source) = config.source_mut(&rewrite.old_id) {
                source.id = rewrite.new_id.clone();
            }
        }
        config.sources.retain(|s| !dropped.contains(&s.id));

        storage.save_config(&config)
    }

    fn rename_caches(storage: &RegistryStorage, rewrites: &[SourceIdRewrite]) -> Result<()> {
        for rewrite in rewrites {
            let from = storage.cache_path(&rewrite.old_id);
            let to = storage.cache_path(&rewrite.new_id);
            if !from.exists() {
                continue;
            }
            if to.exists() {
                debug!("Cache for {} already present; keeping it", rewrite.new_id);
                continue;
            }
            fs::rename(&from, &to)?;
        }
        Ok(())
    }

    fn rewrite_records(storage: &RegistryStorage, rewrites: &[SourceIdRewrite]) -> Result<usize> {
        let mut rewritten = 0;
        for scope in InstallScope::ALL {
            for mut record in storage.list_records(scope)? {
                let Some(rewrite) = rewrites.iter().find(|r| r.old_id == record.source_id) else {
                    continue;
                };
                record.source_id = rewrite.new_id.clone();
                storage.write_record(&record)?;
                rewritten += 1;
            }
        }
        Ok(rewritten)
    }
}

#[async_trait]
impl Migration for SourceIdMigration {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn run(&self, storage: &RegistryStorage) -> Result<MigrationOutcome> {
        if storage.get_sources()?.is_empty() {
            return Ok(MigrationOutcome::Skipped {
                reason: "no sources configured".to_string(),
            });
        }

        let rewrites = Self::plan(storage)?;
        if rewrites.is_empty() {
            return Ok(MigrationOutcome::Completed {
                details: Some("no legacy source ids found".to_string()),
            });
        }

        for rewrite in &rewrites {
            info!("Migrating source id {} -> {}", rewrite.old_id, rewrite.new_id);
        }

        Self::rewrite_config(storage, &rewrites)?;
        Self::rename_caches(storage, &rewrites)?;
        let records = Self::rewrite_records(storage, &rewrites)?;

        Ok(MigrationOutcome::Completed {
            details: Some(format!(
                "migrated {} source ids and {} install records",
                rewrites.len(),
                records
            )),
        })
    }
}
