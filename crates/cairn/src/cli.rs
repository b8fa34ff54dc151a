//! CLI argument parsing with clap

use cairn_core::types::{InstallScope, SourceType};
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

/// Cairn - discover, install and update content bundles
#[derive(Parser, Debug)]
#[command(name = "cairn")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only print errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Registry home directory (default: ~/.cairn)
    #[arg(long, global = true, env = "CAIRN_HOME")]
    pub home: Option<Utf8PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage bundle sources
    #[command(subcommand)]
    Source(SourceCommands),

    /// Search bundles across enabled sources
    Search(SearchArgs),

    /// Install a bundle
    #[command(disable_version_flag = true)]
    Install(InstallArgs),

    /// Update installed bundles to their latest version
    Update(UpdateArgs),

    /// Remove an installed bundle
    Uninstall(UninstallArgs),

    /// List installed bundles
    List(ListArgs),

    /// Show installed bundles with newer versions available
    Outdated(OutdatedArgs),

    /// Apply pending migrations of registry state
    Migrate(MigrateArgs),

    /// Check that URLs are reachable
    CheckUrls(CheckUrlsArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Installation scope on the command line
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScopeArg {
    #[default]
    User,
    Workspace,
}

impl From<ScopeArg> for InstallScope {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::User => InstallScope::User,
            ScopeArg::Workspace => InstallScope::Workspace,
        }
    }
}

fn parse_source_type(value: &str) -> Result<SourceType, String> {
    value.parse().map_err(|e: cairn_core::Error| e.to_string())
}

// Source commands
#[derive(Subcommand, Debug)]
pub enum SourceCommands {
    /// List configured sources
    List(SourceListArgs),

    /// Add a source
    Add(SourceAddArgs),

    /// Remove a source
    Remove(SourceRemoveArgs),

    /// Enable a source
    Enable(SourceIdArgs),

    /// Disable a source
    Disable(SourceIdArgs),

    /// Set a source's priority (0-100, higher wins)
    Priority(SourcePriorityArgs),

    /// Refresh cached catalogs
    Sync(SourceSyncArgs),

    /// Check that sources are usable
    Validate(SourceValidateArgs),
}

#[derive(Args, Debug)]
pub struct SourceListArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct SourceAddArgs {
    /// Repository, catalog or directory URL
    pub url: String,

    /// Source type: github, gitlab, http, local, curated-index, git-tree-index
    #[arg(short = 't', long = "type", value_parser = parse_source_type)]
    pub source_type: SourceType,

    /// Display name (defaults to the URL)
    #[arg(short, long)]
    pub name: Option<String>,

    /// Branch to read from
    #[arg(long)]
    pub branch: Option<String>,

    /// Directory holding collection manifests
    #[arg(long)]
    pub collections_path: Option<String>,

    /// Priority between 0 and 100
    #[arg(short, long, default_value_t = 50, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub priority: u8,

    /// Access token for private sources
    #[arg(long, env = "CAIRN_SOURCE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Mark the source as private
    #[arg(long)]
    pub private: bool,
}

#[derive(Args, Debug)]
pub struct SourceRemoveArgs {
    /// Source id
    pub id: String,

    /// Also uninstall every bundle installed from this source
    #[arg(long)]
    pub uninstall: bool,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct SourceIdArgs {
    /// Source id
    pub id: String,
}

#[derive(Args, Debug)]
pub struct SourcePriorityArgs {
    /// Source id
    pub id: String,

    /// New priority
    #[arg(allow_negative_numbers = true)]
    pub priority: i64,
}

#[derive(Args, Debug)]
pub struct SourceSyncArgs {
    /// Source id (all enabled sources when omitted)
    pub id: Option<String>,
}

#[derive(Args, Debug)]
pub struct SourceValidateArgs {
    /// Source id (all sources when omitted)
    pub id: Option<String>,

    /// Also check the source references of a hub profile file
    #[arg(long)]
    pub profile: Option<Utf8PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// Bundle commands
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Text matched against id, name, description and tags
    pub query: Option<String>,

    /// Only search this source
    #[arg(short, long)]
    pub source: Option<String>,

    /// Only show bundles with this tag
    #[arg(long)]
    pub tag: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Bundle id (with optional @version)
    pub bundle: String,

    /// Source to install from (searched by priority when omitted)
    #[arg(short, long)]
    pub source: Option<String>,

    /// Specific version to install
    #[arg(long)]
    pub version: Option<String>,

    /// Installation scope
    #[arg(long, value_enum, default_value_t = ScopeArg::User)]
    pub scope: ScopeArg,

    /// Reinstall even if the same version is installed
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Bundle id (every outdated bundle when omitted)
    pub bundle: Option<String>,

    /// Installation scope
    #[arg(long, value_enum, default_value_t = ScopeArg::User)]
    pub scope: ScopeArg,
}

#[derive(Args, Debug)]
pub struct UninstallArgs {
    /// Bundle id
    pub bundle: String,

    /// Installation scope
    #[arg(long, value_enum, default_value_t = ScopeArg::User)]
    pub scope: ScopeArg,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only show this scope
    #[arg(long, value_enum)]
    pub scope: Option<ScopeArg>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct OutdatedArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Show pending migrations without running them
    #[arg(long)]
    pub status: bool,
}

#[derive(Args, Debug)]
pub struct CheckUrlsArgs {
    /// URLs to check
    pub urls: Vec<String>,

    /// Also check every configured source URL
    #[arg(long)]
    pub sources: bool,

    /// Per-request timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}
