//! Configuration schema for datacache
//!
//! Configuration is stored at `~/.config/datacache/config.toml`; a project
//! may override any key in a local `.datacache.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Cache defaults
    pub cache: CacheConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging
    pub verbose: bool,

    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            log_format: "text".to_string(),
        }
    }
}

/// Defaults applied to every cache built with this configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory for caches built without an explicit location
    pub directory: Option<PathBuf>,

    /// Log each cache's load/retrieve/execute trail
    pub debug: bool,

    /// Capture stdout/stderr of computations
    pub capture_output: bool,

    /// Replay captured output after computing
    pub print_output: bool,

    /// Ignore persisted results and recompute everything
    pub force_update: bool,

    /// `gc` removes caches older than N days (0 = disabled)
    pub gc_days: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: None,
            debug: false,
            capture_output: true,
            print_output: true,
            force_update: false,
            gc_days: 30,
        }
    }
}
