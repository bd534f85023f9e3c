//! Error types for datacache
//!
//! All modules use `CacheResult<T>` as their return type.

use std::collections::BTreeSet;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for datacache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Boxed error returned by compute functions
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// All errors that can occur in datacache
#[derive(Error, Debug)]
pub enum CacheError {
    // Construction errors
    #[error("Cache {cache:?} wraps an anonymous function ({function}); give it an explicit function_id")]
    AnonymousFunction { cache: String, function: String },

    #[error("Cache {0:?} has no location and no cache directory is configured")]
    MissingLocation(String),

    #[error("Cache {cache:?} cannot produce a result named {name:?}: the name is reserved by the store")]
    ReservedName { cache: String, name: String },

    // Access errors
    #[error("Cache {cache:?} has no result named {name:?}")]
    UnknownResult { cache: String, name: String },

    #[error("Cache {0:?} holds no values to write")]
    NotLoaded(String),

    // Computation errors
    #[error(
        "Cache {cache:?} expected names {}, but got {}",
        format_names(.expected),
        format_names(.actual)
    )]
    SchemaViolation {
        cache: String,
        expected: BTreeSet<String>,
        actual: BTreeSet<String>,
    },

    #[error("Computation for cache {cache:?} failed: {source}")]
    Computation {
        cache: String,
        #[source]
        source: BoxError,
    },

    #[error("Cache {cache:?} has no argument {what}")]
    MissingArgument { cache: String, what: String },

    // Store errors
    #[error("Cache file {path} doesn't contain an object named {name:?}")]
    EntryNotFound { path: PathBuf, name: String },

    #[error("Cache file {path} is corrupt: {reason}")]
    StoreCorrupt { path: PathBuf, reason: String },

    // Value errors
    #[error("Expected a {expected} value, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Invalid table: {0}")]
    InvalidTable(String),

    #[error("Invalid histogram: {0}")]
    InvalidHistogram(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    // Serialization errors
    #[error("Encoding error: {0}")]
    Encode(#[from] bincode::Error),

    #[error("Pickle error: {0}")]
    Pickle(#[from] serde_pickle::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

fn format_names(names: &BTreeSet<String>) -> String {
    let joined = names
        .iter()
        .map(|n| format!("{n:?}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{{joined}}}")
}

impl CacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a corrupt-store error
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::StoreCorrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Wrap a compute function's own error
    pub fn computation(cache: impl Into<String>, source: BoxError) -> Self {
        Self::Computation {
            cache: cache.into(),
            source,
        }
    }

    /// Whether the error comes from the user's compute function
    pub fn is_computation(&self) -> bool {
        matches!(self, Self::Computation { .. })
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::AnonymousFunction { .. } => {
                Some("Use a named fn item, or call .function_id(\"module::name\") on the builder")
            }
            Self::MissingLocation(_) => {
                Some("Call .location(path) or set [cache] directory in the config file")
            }
            Self::StoreCorrupt { .. } => Some("Delete the file; it will be recomputed on next access"),
            Self::ConfigInvalid { .. } => Some("Run: datacache config show"),
            _ => None,
        }
    }
}
