//! Config command - show or edit configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager, LOCAL_CONFIG_NAME};
use crate::error::{CacheError, CacheResult};
use console::style;
use std::fs;
use std::path::{Path, PathBuf};

/// Execute the config command
pub fn execute(args: ConfigArgs, manager: &ConfigManager, config: &Config) -> CacheResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => show_path(manager),
        Some(ConfigAction::Init { force }) => init_config(manager, force)?,
        Some(ConfigAction::Set { key, value, local }) => {
            if local {
                let cwd = std::env::current_dir()
                    .map_err(|e| CacheError::io("getting current directory", e))?;
                set_local_value(&cwd.join(LOCAL_CONFIG_NAME), &key, &value)?
            } else {
                set_value(manager, config, &key, &value)?
            }
        }
    }

    Ok(())
}

fn show_config(config: &Config) -> CacheResult<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

fn show_path(manager: &ConfigManager) {
    println!("{}", manager.path().display());
}

fn init_config(manager: &ConfigManager, force: bool) -> CacheResult<()> {
    let path = manager.path();

    if path.exists() && !force {
        eprintln!(
            "{} Config already exists at {}",
            style("!").yellow(),
            path.display()
        );
        eprintln!("  Use --force to overwrite");
        return Ok(());
    }

    manager.save(&Config::default())?;
    println!(
        "{} Configuration initialized at {}",
        style("✓").green(),
        path.display()
    );

    Ok(())
}

fn set_value(manager: &ConfigManager, config: &Config, key: &str, value: &str) -> CacheResult<()> {
    let mut config = config.clone();

    let parts: Vec<&str> = key.split('.').collect();
    match parts.as_slice() {
        ["general", "verbose"] => config.general.verbose = parse_bool(value)?,
        ["general", "log_format"] => config.general.log_format = parse_log_format(value)?,

        ["cache", "directory"] => config.cache.directory = Some(PathBuf::from(value)),
        ["cache", "debug"] => config.cache.debug = parse_bool(value)?,
        ["cache", "capture_output"] => config.cache.capture_output = parse_bool(value)?,
        ["cache", "print_output"] => config.cache.print_output = parse_bool(value)?,
        ["cache", "force_update"] => config.cache.force_update = parse_bool(value)?,
        ["cache", "gc_days"] => config.cache.gc_days = parse_u32(value)?,

        _ => {
            eprintln!("{} Unknown config key: {}", style("✗").red(), key);
            eprintln!("Valid keys:");
            print_valid_keys();
            return Ok(());
        }
    }

    manager.save(&config)?;
    println!("{} Set {} = {}", style("✓").green(), key, value);

    Ok(())
}

/// Set one key in a project-local file, keeping only explicitly set keys
fn set_local_value(local_path: &Path, key: &str, value: &str) -> CacheResult<()> {
    validate_config_key(key)?;

    let mut doc: toml::Value = if local_path.exists() {
        let content = fs::read_to_string(local_path)
            .map_err(|e| CacheError::io(format!("reading {}", local_path.display()), e))?;
        content
            .parse()
            .map_err(|e: toml::de::Error| CacheError::ConfigInvalid {
                path: local_path.to_path_buf(),
                reason: e.to_string(),
            })?
    } else {
        toml::Value::Table(toml::map::Map::new())
    };

    set_toml_value(&mut doc, key, value)?;

    let content = toml::to_string_pretty(&doc)?;
    fs::write(local_path, content)
        .map_err(|e| CacheError::io(format!("writing {}", local_path.display()), e))?;

    println!(
        "{} Set {} = {} in {}",
        style("✓").green(),
        key,
        value,
        local_path.display()
    );

    Ok(())
}

fn validate_config_key(key: &str) -> CacheResult<()> {
    let parts: Vec<&str> = key.split('.').collect();
    match parts.as_slice() {
        ["general", "verbose" | "log_format"]
        | ["cache", "directory" | "debug" | "capture_output" | "print_output" | "force_update"
        | "gc_days"] => Ok(()),
        _ => Err(CacheError::User(format!("Unknown config key: {}", key))),
    }
}

/// Set a dot-separated key in a TOML tree, creating intermediate tables
fn set_toml_value(doc: &mut toml::Value, key: &str, value: &str) -> CacheResult<()> {
    let (path, leaf) = match key.rsplit_once('.') {
        Some((path, leaf)) => (path.split('.').collect::<Vec<_>>(), leaf),
        None => (Vec::new(), key),
    };

    let mut current = doc;
    for part in path {
        current = current
            .as_table_mut()
            .ok_or_else(|| CacheError::User(format!("Expected table at key: {}", part)))?
            .entry(part)
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    }

    let table = current
        .as_table_mut()
        .ok_or_else(|| CacheError::User(format!("Expected table for key: {}", key)))?;

    // directory and log_format are always strings, even if they look numeric
    let toml_value = if key.ends_with("directory") || key.ends_with("log_format") {
        toml::Value::String(value.to_string())
    } else if let Ok(b) = value.parse::<bool>() {
        toml::Value::Boolean(b)
    } else if let Ok(n) = value.parse::<i64>() {
        toml::Value::Integer(n)
    } else {
        toml::Value::String(value.to_string())
    };

    table.insert(leaf.to_string(), toml_value);
    Ok(())
}

fn parse_bool(value: &str) -> CacheResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(CacheError::User(format!(
            "Invalid boolean value: {}. Use true/false",
            value
        ))),
    }
}

fn parse_u32(value: &str) -> CacheResult<u32> {
    value
        .parse()
        .map_err(|_| CacheError::User(format!("Invalid number: {}", value)))
}

fn parse_log_format(value: &str) -> CacheResult<String> {
    match value {
        "text" | "json" => Ok(value.to_string()),
        _ => Err(CacheError::User(format!(
            "Invalid log format: {}. Use text/json",
            value
        ))),
    }
}

fn print_valid_keys() {
    let keys = [
        "general.verbose",
        "general.log_format",
        "cache.directory",
        "cache.debug",
        "cache.capture_output",
        "cache.print_output",
        "cache.force_update",
        "cache.gc_days",
    ];

    for key in keys {
        eprintln!("  {}", key);
    }
}
