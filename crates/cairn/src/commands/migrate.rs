//! Registry state migrations

use anyhow::{Context, Result};
use cairn_registry::{MigrationOutcome, MigrationRunner};
use camino::Utf8Path;

use super::open_storage;
use crate::cli::MigrateArgs;
use crate::output;

pub async fn run(args: MigrateArgs, home: Option<&Utf8Path>) -> Result<()> {
    let storage = open_storage(home)?;
    let runner = MigrationRunner::standard();

    if args.status {
        let pending = runner
            .pending(&storage)
            .context("Failed to read migration state")?;
        if pending.is_empty() {
            output::success("No pending migrations");
        } else {
            output::header("Pending migrations");
            for name in pending {
                println!("  {}", name);
            }
        }
        return Ok(());
    }

    let reports = runner.run(&storage).await.context("Migration failed")?;
    for report in reports {
        match report.outcome {
            None => output::info(&format!("{}: already applied", report.name)),
            Some(MigrationOutcome::Completed { details }) => {
                output::success(&format!("{}: completed", report.name));
                if let Some(details) = details {
                    output::kv("Details", &details);
                }
            }
            Some(MigrationOutcome::Skipped { reason }) => {
                output::info(&format!("{}: skipped ({})", report.name, reason))
            }
        }
    }
    Ok(())
}
