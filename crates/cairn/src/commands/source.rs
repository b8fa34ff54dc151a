//! Source management commands

use anyhow::{anyhow, bail, Context, Result};
use cairn_core::token_preview;
use cairn_core::types::Source;
use cairn_registry::hub::{check_profile_references, HubProfile, ReferenceIssue};
use cairn_registry::RegistryManager;
use camino::Utf8Path;
use serde::Serialize;
use tabled::{
    settings::{object::Columns, Modify, Style, Width},
    Table, Tabled,
};

use super::open_registry;
use crate::cli::{
    SourceAddArgs, SourceCommands, SourceListArgs, SourcePriorityArgs, SourceRemoveArgs,
    SourceSyncArgs, SourceValidateArgs,
};
use crate::output;

pub async fn run(cmd: SourceCommands, home: Option<&Utf8Path>) -> Result<()> {
    let manager = open_registry(home).await?;
    match cmd {
        SourceCommands::List(args) => list(&manager, args),
        SourceCommands::Add(args) => add(&manager, args),
        SourceCommands::Remove(args) => remove(&manager, args).await,
        SourceCommands::Enable(args) => set_enabled(&manager, &args.id, true),
        SourceCommands::Disable(args) => set_enabled(&manager, &args.id, false),
        SourceCommands::Priority(args) => priority(&manager, args),
        SourceCommands::Sync(args) => sync(&manager, args).await,
        SourceCommands::Validate(args) => validate(&manager, args).await,
    }
}

/// Source as shown to users; tokens are reduced to a preview
#[derive(Tabled, Serialize)]
#[serde(rename_all = "camelCase")]
struct SourceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    #[serde(rename = "type")]
    source_type: String,
    #[tabled(rename = "URL")]
    url: String,
    #[tabled(rename = "Priority")]
    priority: u8,
    #[tabled(rename = "Enabled")]
    enabled: bool,
    #[tabled(rename = "Token")]
    token: String,
}

impl From<&Source> for SourceRow {
    fn from(source: &Source) -> Self {
        Self {
            id: source.id.clone(),
            name: source.name.clone(),
            source_type: source.source_type.as_str().to_string(),
            url: source.url.clone(),
            priority: source.priority,
            enabled: source.enabled,
            token: source
                .token
                .as_deref()
                .map(token_preview)
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

fn list(manager: &RegistryManager, args: SourceListArgs) -> Result<()> {
    let mut sources = manager.list_sources().context("Failed to load sources")?;
    sources.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));
    let rows: Vec<SourceRow> = sources.iter().map(SourceRow::from).collect();

    if args.json {
        return output::json(&rows);
    }
    if rows.is_empty() {
        output::info("No sources configured. Add one with 'cairn source add'");
        return Ok(());
    }

    let mut table = Table::new(rows);
    table
        .with(Style::sharp())
        .with(Modify::new(Columns::new(3..4)).with(Width::wrap(50).keep_words(true)));
    println!("{}", table);
    Ok(())
}

fn add(manager: &RegistryManager, args: SourceAddArgs) -> Result<()> {
    let name = args.name.unwrap_or_else(|| args.url.clone());
    let mut source = Source::new(name, args.source_type, args.url).with_priority(args.priority);
    if let Some(branch) = args.branch {
        source = source.with_branch(branch);
    }
    if let Some(path) = args.collections_path {
        source = source.with_collections_path(path);
    }
    source.private = args.private;
    let token = args.token;
    if let Some(token) = &token {
        source = source.with_token(token);
    }

    let source = manager.add_source(source)?;
    output::success(&format!("Added source {}", source.id));
    output::kv("Type", source.source_type.as_str());
    output::kv("URL", &source.url);
    output::kv("Priority", &source.priority.to_string());
    if let Some(token) = &token {
        output::kv("Token", &token_preview(token));
    }
    Ok(())
}

async fn remove(manager: &RegistryManager, args: SourceRemoveArgs) -> Result<()> {
    use dialoguer::Confirm;

    let source = manager.find_source(&args.id)?;
    if !args.yes {
        let prompt = if args.uninstall {
            format!(
                "Remove source '{}' and uninstall its bundles?",
                source.name
            )
        } else {
            format!("Remove source '{}'?", source.name)
        };
        let confirmed = Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;
        if !confirmed {
            output::info("Cancelled");
            return Ok(());
        }
    }

    let removed = manager.remove_source(&source.id, args.uninstall).await?;
    output::success(&format!("Removed source {}", removed.id));
    Ok(())
}

fn set_enabled(manager: &RegistryManager, id: &str, enabled: bool) -> Result<()> {
    let source = manager.set_source_enabled(id, enabled)?;
    let state = if enabled { "Enabled" } else { "Disabled" };
    output::success(&format!("{} source {}", state, source.id));
    Ok(())
}

fn priority(manager: &RegistryManager, args: SourcePriorityArgs) -> Result<()> {
    let source = manager.set_source_priority(&args.id, args.priority)?;
    output::success(&format!(
        "Source {} now has priority {}",
        source.id, source.priority
    ));
    Ok(())
}

async fn sync(manager: &RegistryManager, args: SourceSyncArgs) -> Result<()> {
    if let Some(id) = args.id {
        let spinner = output::spinner(&format!("Syncing {}", id));
        let result = manager.sync_source(&id).await;
        spinner.finish_and_clear();
        let report = result?;
        output::success(&format!(
            "Synced {}: {} bundle(s)",
            report.source_id, report.bundle_count
        ));
        for record in &report.updated {
            output::kv("Updated", &format!("{} {}", record.bundle_id, record.version));
        }
        return Ok(());
    }

    let spinner = output::spinner("Syncing all enabled sources");
    let results = manager.sync_all_sources().await;
    spinner.finish_and_clear();

    let mut failures = 0usize;
    for (source_id, result) in results? {
        match result {
            Ok(report) => {
                output::success(&format!(
                    "Synced {}: {} bundle(s)",
                    source_id, report.bundle_count
                ));
                for record in &report.updated {
                    output::kv("Updated", &format!("{} {}", record.bundle_id, record.version));
                }
            }
            Err(e) => {
                failures += 1;
                output::error(&format!("Failed to sync {}: {}", source_id, e));
            }
        }
    }

    if failures > 0 {
        bail!("{} source(s) failed to sync", failures);
    }
    Ok(())
}

#[derive(Tabled, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidationRow {
    #[tabled(rename = "Source")]
    source_id: String,
    #[tabled(rename = "Valid")]
    valid: bool,
    #[tabled(rename = "Bundles")]
    bundles_found: usize,
    #[tabled(rename = "Problems")]
    problems: String,
}

async fn validate(manager: &RegistryManager, args: SourceValidateArgs) -> Result<()> {
    let results = match &args.id {
        Some(id) => {
            let source = manager.find_source(id)?;
            let result = manager.validate_source(&source.id).await?;
            vec![(source, result)]
        }
        None => manager.validate_all_sources().await?,
    };

    let issues = match &args.profile {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read profile {}", path))?;
            let profile = HubProfile::from_yaml(&content)
                .with_context(|| format!("Failed to parse profile {}", path))?;
            check_profile_references(&profile, &manager.list_sources()?)
        }
        None => Vec::new(),
    };

    let rows: Vec<ValidationRow> = results
        .iter()
        .map(|(source, result)| ValidationRow {
            source_id: source.id.clone(),
            valid: result.valid,
            bundles_found: result.bundles_found,
            problems: result
                .errors
                .iter()
                .chain(result.warnings.iter())
                .cloned()
                .collect::<Vec<_>>()
                .join("; "),
        })
        .collect();
    let invalid = rows.iter().filter(|r| !r.valid).count();
    let broken_refs = issues.iter().filter(|i| i.is_error()).count();

    if args.json {
        output::json(&serde_json::json!({
            "sources": rows,
            "profileIssues": issues,
        }))?;
    } else {
        if !rows.is_empty() {
            let mut table = Table::new(&rows);
            table
                .with(Style::sharp())
                .with(Modify::new(Columns::new(3..4)).with(Width::wrap(60).keep_words(true)));
            println!("{}", table);
        }
        for issue in &issues {
            match issue {
                ReferenceIssue::UnknownSource {
                    bundle_id,
                    source_id,
                } => output::error(&format!(
                    "{} references unknown source {}",
                    bundle_id, source_id
                )),
                ReferenceIssue::LegacySourceId {
                    bundle_id,
                    source_id,
                    current_id,
                } => output::warning(&format!(
                    "{} references legacy source id {} (now {})",
                    bundle_id, source_id, current_id
                )),
            }
        }
    }

    if invalid > 0 || broken_refs > 0 {
        return Err(anyhow!(
            "{} invalid source(s), {} broken profile reference(s)",
            invalid,
            broken_refs
        ));
    }
    if !args.json {
        output::success("All sources valid");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_core::types::SourceType;

    #[test]
    fn test_source_row_hides_token() {
        let source = Source::new("Private", SourceType::Github, "https://github.com/acme/secret")
            .with_token("ghp_abcdefghijklmnopqrstuvwxyz");
        let row = SourceRow::from(&source);
        assert_eq!(row.token, "ghp_abcd...");

        let json = serde_json::to_string(&row).unwrap();
        assert!(!json.contains("ijklmnop"));
        assert!(json.contains("\"type\":\"github\""));
    }

    #[test]
    fn test_source_row_without_token() {
        let source = Source::new("Web", SourceType::Http, "https://bundles.example.com");
        assert_eq!(SourceRow::from(&source).token, "-");
    }
}
