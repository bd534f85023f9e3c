//! datacache - dependency-aware computation cache
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use datacache::cli::{Cli, Commands};
use datacache::config::{Config, ConfigManager};
use datacache::error::{CacheError, CacheResult};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

fn run() -> CacheResult<()> {
    let cli = Cli::parse();

    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };

    // Find local config unless --no-local is set
    let local_config_path = if cli.no_local {
        None
    } else {
        let cwd =
            std::env::current_dir().map_err(|e| CacheError::io("getting current directory", e))?;
        ConfigManager::find_local_config(&cwd)
    };

    let config = config_manager.load_merged(local_config_path.as_deref())?;
    init_logging(cli.verbose, &config);

    match local_config_path {
        Some(ref path) => debug!("Found local config: {}", path.display()),
        None if cli.no_local => debug!("Local config discovery disabled (--no-local)"),
        None => {}
    }

    match cli.command {
        Commands::Inspect(args) => datacache::cli::commands::inspect(args),
        Commands::Get(args) => datacache::cli::commands::get(args),
        Commands::Output(args) => datacache::cli::commands::output(args),
        Commands::Gc(args) => datacache::cli::commands::gc(args, &config),
        Commands::Config(args) => datacache::cli::commands::config(args, &config_manager, &config),
    }
}

/// 0 = warn, 1 = info, 2+ = debug
fn init_logging(verbose: u8, config: &Config) {
    let level = if verbose == 0 && config.general.verbose {
        1
    } else {
        verbose
    };
    let filter = match level {
        0 => EnvFilter::new("datacache=warn"),
        1 => EnvFilter::new("datacache=info"),
        _ => EnvFilter::new("datacache=debug"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if config.general.log_format == "json" {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}
