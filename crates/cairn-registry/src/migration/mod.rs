//! One-time migrations of persisted registry state
//!
//! Each migration has a stable name. Its outcome is stored in
//! `migrations.json`; completed or skipped migrations never run again. A
//! failing migration is not recorded, so it is retried on the next run.

mod source_id;

pub use source_id::{SourceIdMigration, SourceIdRewrite};

use crate::error::Result;
use crate::storage::{MigrationStateStore, RegistryStorage};
use async_trait::async_trait;
use cairn_core::types::{MigrationRecord, MigrationStatus};
use tracing::{debug, info};

/// What a migration did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    Completed { details: Option<String> },
    Skipped { reason: String },
}

impl MigrationOutcome {
    fn into_record(self) -> MigrationRecord {
        match self {
            MigrationOutcome::Completed { details } => MigrationRecord::completed(details),
            MigrationOutcome::Skipped { reason } => MigrationRecord::skipped(reason),
        }
    }
}

/// A named transformation of persisted state
#[async_trait]
pub trait Migration: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, storage: &RegistryStorage) -> Result<MigrationOutcome>;
}

/// Result of one runner pass for one migration
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationReport {
    pub name: String,
    /// `None` when the migration had already finished in an earlier run
    pub outcome: Option<MigrationOutcome>,
}

/// Runs registered migrations in order
pub struct MigrationRunner {
    migrations: Vec<Box<dyn Migration>>,
}

impl MigrationRunner {
    pub fn new(migrations: Vec<Box<dyn Migration>>) -> Self {
        Self { migrations }
    }

    /// Runner with every migration the registry ships
    pub fn standard() -> Self {
        Self::new(vec![Box::new(SourceIdMigration)])
    }

    /// Run pending migrations, saving state after each one
    ///
    /// Stops at the first failure; earlier successes stay recorded.
    pub async fn run(&self, storage: &RegistryStorage) -> Result<Vec<MigrationReport>> {
        let mut state = storage.load_migration_state()?;
        let mut reports = Vec::with_capacity(self.migrations.len());

        for migration in &self.migrations {
            let name = migration.name();
            if state.get(name).is_some_and(MigrationRecord::is_final) {
                debug!("Migration {} already applied", name);
                reports.push(MigrationReport {
                    name: name.to_string(),
                    outcome: None,
                });
                continue;
            }

            info!("Running migration {}", name);
            let outcome = migration.run(storage).await?;
            state.insert(name.to_string(), outcome.clone().into_record());
            storage.save_migration_state(&state)?;

            reports.push(MigrationReport {
                name: name.to_string(),
                outcome: Some(outcome),
            });
        }

        Ok(reports)
    }

    /// Names of migrations that have not finished yet
    pub fn pending(&self, storage: &RegistryStorage) -> Result<Vec<&'static str>> {
        let state = storage.load_migration_state()?;
        Ok(self
            .migrations
            .iter()
            .map(|m| m.name())
            .filter(|name| {
                state
                    .get(*name)
                    .map(|r| r.status == MigrationStatus::Pending)
                    .unwrap_or(true)
            })
            .collect())
    }
}
