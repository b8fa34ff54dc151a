//! URL reachability checks

use anyhow::{bail, Context, Result};
use cairn_probe::{Severity, UrlCheckResult, UrlProber};
use cairn_registry::hub::probe_source_urls;
use camino::Utf8Path;
use std::time::Duration;
use tabled::{
    settings::{object::Columns, Modify, Style, Width},
    Table, Tabled,
};

use super::{open_registry, settings_loader};
use crate::cli::CheckUrlsArgs;
use crate::output;

#[derive(Tabled)]
struct CheckRow {
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

fn status_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Success => "ok",
        Severity::Warning => "warning",
        Severity::Error => "error",
    }
}

pub async fn run(args: CheckUrlsArgs, home: Option<&Utf8Path>) -> Result<()> {
    if args.urls.is_empty() && !args.sources {
        bail!("Nothing to check: pass URLs or --sources");
    }

    let settings = settings_loader(home)?
        .load()
        .context("Failed to load runtime settings")?;
    let timeout = args.timeout.map(Duration::from_secs);
    let prober = UrlProber::with_timeout(settings.probe_timeout())
        .context("Failed to create HTTP client")?;

    // (label, result) pairs; source checks are labelled by source id
    let mut results: Vec<(String, UrlCheckResult)> = Vec::new();
    let spinner = output::spinner("Checking URLs");
    for result in prober.check_urls(args.urls.as_slice(), timeout).await {
        results.push((result.url.clone(), result));
    }
    if args.sources {
        let manager = open_registry(home).await?;
        let sources = manager.list_sources()?;
        results.extend(probe_source_urls(&prober, &sources, timeout).await);
    }
    spinner.finish_and_clear();

    let errors = results
        .iter()
        .filter(|(_, r)| r.severity == Severity::Error)
        .count();

    if args.json {
        let payload: Vec<_> = results
            .iter()
            .map(|(target, result)| serde_json::json!({ "target": target, "result": result }))
            .collect();
        output::json(&payload)?;
    } else {
        let rows: Vec<CheckRow> = results
            .iter()
            .map(|(target, result)| CheckRow {
                target: target.clone(),
                status: status_label(result.severity).to_string(),
                message: match &result.final_url {
                    Some(final_url) => format!("{} via {}", result.message, final_url),
                    None => result.message.clone(),
                },
            })
            .collect();
        let mut table = Table::new(rows);
        table
            .with(Style::sharp())
            .with(Modify::new(Columns::new(0..1)).with(Width::wrap(50)));
        println!("{}", table);
    }

    if errors > 0 {
        bail!("{} URL(s) failed", errors);
    }
    Ok(())
}
