//! Cairn CLI - client-side bundle registry
//!
//! Entry point for the `cairn` command-line interface.

mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize rustls crypto provider (required for rustls 0.23+)
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let home = cli.home.as_deref();
    match cli.command {
        Commands::Source(cmd) => commands::source::run(cmd, home).await,
        Commands::Search(args) => commands::bundle::search(args, home).await,
        Commands::Install(args) => commands::bundle::install(args, home).await,
        Commands::Update(args) => commands::bundle::update(args, home).await,
        Commands::Uninstall(args) => commands::bundle::uninstall(args, home).await,
        Commands::List(args) => commands::bundle::list(args, home).await,
        Commands::Outdated(args) => commands::bundle::outdated(args, home).await,
        Commands::Migrate(args) => commands::migrate::run(args, home).await,
        Commands::CheckUrls(args) => commands::check_urls::run(args, home).await,
        Commands::Completions(args) => commands::completions::run(args),
    }
}

/// Initialize tracing with appropriate verbosity
fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
