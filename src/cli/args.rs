//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// datacache - dependency-aware computation cache
///
/// Inspect and maintain the cache files written by analysis jobs.
#[derive(Parser, Debug)]
#[command(name = "datacache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "DATACACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Skip local .datacache.toml discovery
    #[arg(long, global = true)]
    pub no_local: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the entries and fingerprint of a cache file
    Inspect(InspectArgs),

    /// Print one stored value as JSON
    Get(GetArgs),

    /// Print the output captured when a cache was computed
    Output(OutputArgs),

    /// Remove cache files older than a number of days
    Gc(GcArgs),

    /// Show or edit configuration
    Config(ConfigArgs),
}

/// Arguments for the inspect command
#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// Cache file
    pub file: PathBuf,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the get command
#[derive(Parser, Debug)]
pub struct GetArgs {
    /// Cache file
    pub file: PathBuf,

    /// Name of the stored value
    pub name: String,

    /// Print compact JSON on one line
    #[arg(long)]
    pub compact: bool,
}

/// Arguments for the output command
#[derive(Parser, Debug)]
pub struct OutputArgs {
    /// Cache file
    pub file: PathBuf,

    /// Print captured stderr instead of stdout
    #[arg(long)]
    pub stderr: bool,
}

/// Arguments for the gc command
#[derive(Parser, Debug)]
pub struct GcArgs {
    /// Directory holding cache files (default: from config)
    pub dir: Option<PathBuf>,

    /// Remove caches older than N days (default: from config)
    #[arg(long)]
    pub days: Option<u32>,

    /// Dry run - show what would be removed
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., cache.directory)
        key: String,
        /// Value to set
        value: String,
        /// Write to project-local .datacache.toml instead of global config
        #[arg(long)]
        local: bool,
    },
}

/// Output format for listings
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}
