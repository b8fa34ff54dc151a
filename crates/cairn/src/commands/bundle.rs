//! Bundle commands: search, install, update, uninstall, list, outdated

use anyhow::{anyhow, bail, Context, Result};
use cairn_core::types::{Bundle, InstallOptions, InstallScope, InstalledBundle};
use cairn_registry::{BundleQuery, RegistryManager};
use camino::Utf8Path;
use tabled::{
    settings::{object::Columns, Modify, Style, Width},
    Table, Tabled,
};

use super::open_registry;
use crate::cli::{InstallArgs, ListArgs, OutdatedArgs, SearchArgs, UninstallArgs, UpdateArgs};
use crate::output;

#[derive(Tabled)]
struct BundleRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Source")]
    source_id: String,
    #[tabled(rename = "Description")]
    description: String,
}

impl From<&Bundle> for BundleRow {
    fn from(bundle: &Bundle) -> Self {
        let version = match bundle.available_versions.len() {
            0 | 1 => bundle.version.clone(),
            n => format!("{} (+{} older)", bundle.version, n - 1),
        };
        Self {
            id: bundle.id.clone(),
            version,
            source_id: bundle.source_id.clone(),
            description: bundle.description.clone(),
        }
    }
}

#[derive(Tabled)]
struct InstalledRow {
    #[tabled(rename = "ID")]
    bundle_id: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Scope")]
    scope: String,
    #[tabled(rename = "Source")]
    source_id: String,
    #[tabled(rename = "Installed")]
    installed_at: String,
}

impl From<&InstalledBundle> for InstalledRow {
    fn from(record: &InstalledBundle) -> Self {
        Self {
            bundle_id: record.bundle_id.clone(),
            version: record.version.clone(),
            scope: record.scope.to_string(),
            source_id: record.source_id.clone(),
            installed_at: record.installed_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

/// Split `id@version` into its parts
fn parse_bundle_ref(reference: &str) -> (&str, Option<&str>) {
    match reference.rsplit_once('@') {
        Some((id, version)) if !id.is_empty() && !version.is_empty() => (id, Some(version)),
        _ => (reference, None),
    }
}

pub async fn search(args: SearchArgs, home: Option<&Utf8Path>) -> Result<()> {
    let manager = open_registry(home).await?;
    let query = BundleQuery {
        text: args.query.unwrap_or_default(),
        source_id: args.source,
        tag: args.tag,
    };

    let spinner = output::spinner("Searching sources");
    let result = manager.search_bundles(&query).await;
    spinner.finish_and_clear();
    let bundles = result?;

    if args.json {
        return output::json(&bundles);
    }
    if bundles.is_empty() {
        output::info("No bundles found");
        return Ok(());
    }

    let rows: Vec<BundleRow> = bundles.iter().map(BundleRow::from).collect();
    let mut table = Table::new(rows);
    table
        .with(Style::sharp())
        .with(Modify::new(Columns::new(3..4)).with(Width::wrap(60).keep_words(true)));
    println!("{}", table);
    output::info(&format!("{} bundle(s)", bundles.len()));
    Ok(())
}

/// Pick the source for a bundle when none was given
///
/// Search results are already ordered by source priority, so the first
/// exact id match wins.
async fn resolve_source_for(manager: &RegistryManager, bundle_id: &str) -> Result<String> {
    let found = manager
        .search_bundles(&BundleQuery::text(bundle_id))
        .await
        .context("Failed to search sources")?;
    found
        .into_iter()
        .find(|b| b.id == bundle_id)
        .map(|b| b.source_id)
        .ok_or_else(|| anyhow!("Bundle '{}' not found in any enabled source", bundle_id))
}

pub async fn install(args: InstallArgs, home: Option<&Utf8Path>) -> Result<()> {
    let manager = open_registry(home).await?;
    let (bundle_id, pinned) = parse_bundle_ref(&args.bundle);
    let version = args.version.as_deref().or(pinned);

    let source_id = match args.source {
        Some(source) => manager.find_source(&source)?.id,
        None => resolve_source_for(&manager, bundle_id).await?,
    };

    let mut options = InstallOptions::new(args.scope.into());
    if let Some(version) = version {
        options = options.with_version(version);
    }
    if args.force {
        options = options.forced();
    }

    let spinner = output::spinner(&format!("Installing {}", bundle_id));
    let result = manager.install_bundle(&source_id, bundle_id, &options).await;
    spinner.finish_and_clear();
    let record = result?;

    if let Some(wanted) = version {
        if record.version.trim_start_matches('v') != wanted.trim_start_matches('v') {
            output::warning(&format!(
                "Version {} not found, installed {} instead",
                wanted, record.version
            ));
        }
    }
    output::success(&format!(
        "Installed {} {} ({})",
        record.bundle_id, record.version, record.scope
    ));
    output::kv("Path", &record.install_path.display().to_string());
    Ok(())
}

pub async fn update(args: UpdateArgs, home: Option<&Utf8Path>) -> Result<()> {
    let manager = open_registry(home).await?;
    let scope: InstallScope = args.scope.into();

    let targets: Vec<String> = match args.bundle {
        Some(bundle) => vec![bundle],
        None => manager
            .check_updates()
            .await?
            .into_iter()
            .filter(|u| u.scope == scope)
            .map(|u| u.bundle_id)
            .collect(),
    };

    if targets.is_empty() {
        output::info("Everything is up to date");
        return Ok(());
    }

    let mut failures = 0usize;
    for bundle_id in &targets {
        let spinner = output::spinner(&format!("Updating {}", bundle_id));
        let result = manager.update_bundle(bundle_id, scope).await;
        spinner.finish_and_clear();
        match result {
            Ok(Some(record)) => {
                output::success(&format!("Updated {} to {}", record.bundle_id, record.version))
            }
            Ok(None) => output::info(&format!("{} is up to date", bundle_id)),
            Err(e) => {
                failures += 1;
                output::error(&format!("Failed to update {}: {}", bundle_id, e));
            }
        }
    }

    if failures > 0 {
        bail!("{} bundle(s) failed to update", failures);
    }
    Ok(())
}

pub async fn uninstall(args: UninstallArgs, home: Option<&Utf8Path>) -> Result<()> {
    use dialoguer::Confirm;

    let manager = open_registry(home).await?;
    let scope: InstallScope = args.scope.into();

    if !args.yes {
        let confirmed = Confirm::new()
            .with_prompt(format!("Uninstall {} ({})?", args.bundle, scope))
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;
        if !confirmed {
            output::info("Cancelled");
            return Ok(());
        }
    }

    let record = manager.uninstall_bundle(&args.bundle, scope).await?;
    output::success(&format!(
        "Uninstalled {} {} ({})",
        record.bundle_id, record.version, record.scope
    ));
    Ok(())
}

pub async fn list(args: ListArgs, home: Option<&Utf8Path>) -> Result<()> {
    let manager = open_registry(home).await?;
    let records = manager.list_installed(args.scope.map(Into::into))?;

    if args.json {
        return output::json(&records);
    }
    if records.is_empty() {
        output::info("No bundles installed");
        return Ok(());
    }

    let rows: Vec<InstalledRow> = records.iter().map(InstalledRow::from).collect();
    let mut table = Table::new(rows);
    table.with(Style::sharp());
    println!("{}", table);
    Ok(())
}

#[derive(Tabled)]
struct UpdateRow {
    #[tabled(rename = "ID")]
    bundle_id: String,
    #[tabled(rename = "Scope")]
    scope: String,
    #[tabled(rename = "Current")]
    current: String,
    #[tabled(rename = "Latest")]
    latest: String,
    #[tabled(rename = "Source")]
    source_id: String,
}

pub async fn outdated(args: OutdatedArgs, home: Option<&Utf8Path>) -> Result<()> {
    let manager = open_registry(home).await?;

    let spinner = output::spinner("Checking for updates");
    let result = manager.check_updates().await;
    spinner.finish_and_clear();
    let updates = result?;

    if args.json {
        return output::json(&updates);
    }
    if updates.is_empty() {
        output::success("All installed bundles are up to date");
        return Ok(());
    }

    let rows: Vec<UpdateRow> = updates
        .iter()
        .map(|u| UpdateRow {
            bundle_id: u.bundle_id.clone(),
            scope: u.scope.to_string(),
            current: u.current_version.clone(),
            latest: u.latest_version.clone(),
            source_id: u.source_id.clone(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::sharp());
    println!("{}", table);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bundle_ref() {
        assert_eq!(parse_bundle_ref("acme-prompts"), ("acme-prompts", None));
        assert_eq!(
            parse_bundle_ref("acme-prompts@1.2.0"),
            ("acme-prompts", Some("1.2.0"))
        );
        assert_eq!(parse_bundle_ref("@scope"), ("@scope", None));
        assert_eq!(parse_bundle_ref("trailing@"), ("trailing@", None));
    }

    #[test]
    fn test_bundle_row_counts_older_versions() {
        let bundle = Bundle {
            id: "acme-prompts".into(),
            version: "1.2.0".into(),
            available_versions: vec![Default::default(), Default::default(), Default::default()],
            ..Default::default()
        };
        assert_eq!(BundleRow::from(&bundle).version, "1.2.0 (+2 older)");
    }
}
