//! Configuration management for datacache

pub mod schema;

pub use schema::{CacheConfig, Config, GeneralConfig};

use crate::error::{CacheError, CacheResult};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File name of project-local configuration
pub const LOCAL_CONFIG_NAME: &str = ".datacache.toml";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("datacache")
            .join("config.toml")
    }

    /// Find the nearest `.datacache.toml` in `start` or its ancestors
    pub fn find_local_config(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(LOCAL_CONFIG_NAME))
            .find(|candidate| candidate.is_file())
    }

    /// Load configuration, using defaults if the file does not exist
    pub fn load(&self) -> CacheResult<Config> {
        self.load_merged(None)
    }

    /// Load configuration with a project-local file layered on top
    ///
    /// Each file is validated on its own first, so an invalid key is reported
    /// against the file that contains it.
    pub fn load_merged(&self, local: Option<&Path>) -> CacheResult<Config> {
        let mut table = if self.config_path.exists() {
            let table = Self::read_table(&self.config_path)?;
            Self::parse_table(table.clone(), &self.config_path)?;
            table
        } else {
            debug!("Config file not found, using defaults");
            toml::Table::new()
        };

        let Some(local) = local else {
            return Self::parse_table(table, &self.config_path);
        };
        debug!("Merging local config {}", local.display());
        let overlay = Self::read_table(local)?;
        Self::parse_table(overlay.clone(), local)?;
        merge_tables(&mut table, overlay);
        Self::parse_table(table, local)
    }

    fn parse_table(table: toml::Table, path: &Path) -> CacheResult<Config> {
        toml::Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| CacheError::ConfigInvalid {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }

    fn read_table(path: &Path) -> CacheResult<toml::Table> {
        let content = fs::read_to_string(path)
            .map_err(|e| CacheError::io(format!("reading config from {}", path.display()), e))?;

        content.parse().map_err(|e: toml::de::Error| CacheError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to file
    pub fn save(&self, config: &Config) -> CacheResult<()> {
        self.ensure_config_dir()?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).map_err(|e| {
            CacheError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    fn ensure_config_dir(&self) -> CacheResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| CacheError::ConfigDirCreate {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Overlay `other` onto `base`, recursing into nested tables
fn merge_tables(base: &mut toml::Table, other: toml::Table) {
    for (key, value) in other {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
