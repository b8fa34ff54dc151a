use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle state of a named migration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationStatus {
    #[default]
    Pending,
    Completed,
    Skipped,
}

/// Persisted outcome of one migration, kept after success
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationRecord {
    pub status: MigrationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl MigrationRecord {
    pub fn completed(details: Option<String>) -> Self {
        Self {
            status: MigrationStatus::Completed,
            completed_at: Some(Utc::now()),
            details,
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: MigrationStatus::Skipped,
            completed_at: Some(Utc::now()),
            details: Some(reason.into()),
        }
    }

    /// Completed or skipped migrations never run again
    pub fn is_final(&self) -> bool {
        matches!(
            self.status,
            MigrationStatus::Completed | MigrationStatus::Skipped
        )
    }
}

/// Migration-state map keyed by migration name
pub type MigrationState = BTreeMap<String, MigrationRecord>;
