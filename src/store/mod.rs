//! File-backed store for named values
//!
//! A unit is one file holding named entries. Each entry is tagged:
//! native objects (tables, histograms) are stored as-is, everything else
//! is pickled and stored as an opaque byte blob under the same name.
//!
//! # Layout
//!
//! | Bytes | Content |
//! |-------|---------|
//! | 0..8 | magic `DCACHE01` |
//! | 8.. | bincode-encoded entry map |
//!
//! Writes are not transactional: a unit is truncated when recreated and
//! only filled on [`StoreUnit::close`]. A unit left behind by a crash fails
//! to open, which callers treat as a cache miss.

pub mod native;

pub use native::{Histogram, Table};

use crate::error::{CacheError, CacheResult};
use crate::value::Value;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_pickle::{DeOptions, SerOptions};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::trace;

const MAGIC: &[u8; 8] = b"DCACHE01";

/// Extension used for cache units
pub const EXTENSION: &str = "dcache";

/// Natively storable objects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NativeObject {
    Table(Table),
    Histogram(Histogram),
}

/// A stored entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Entry {
    Native(NativeObject),
    Pickled(Vec<u8>),
}

/// Encoding of an entry, for listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Table,
    Histogram,
    Pickled,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Histogram => "histogram",
            Self::Pickled => "pickled",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Entry {
    pub fn kind(&self) -> EntryKind {
        match self {
            Self::Native(NativeObject::Table(_)) => EntryKind::Table,
            Self::Native(NativeObject::Histogram(_)) => EntryKind::Histogram,
            Self::Pickled(_) => EntryKind::Pickled,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Contents {
    entries: BTreeMap<String, Entry>,
}

/// An open persistence unit
pub struct StoreUnit {
    path: PathBuf,
    contents: Contents,
    writer: Option<BufWriter<File>>,
}

impl StoreUnit {
    /// Open an existing unit for reading
    pub fn open(path: impl AsRef<Path>) -> CacheResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CacheError::PathNotFound(path.to_path_buf()));
        }
        let bytes = fs::read(path)
            .map_err(|e| CacheError::io(format!("reading cache file {}", path.display()), e))?;

        let body = bytes
            .strip_prefix(MAGIC.as_slice())
            .ok_or_else(|| CacheError::corrupt(path, "missing header"))?;
        let contents: Contents = bincode::deserialize(body)
            .map_err(|e| CacheError::corrupt(path, e.to_string()))?;

        trace!(
            "Opened {} with {} entries",
            path.display(),
            contents.entries.len()
        );
        Ok(Self {
            path: path.to_path_buf(),
            contents,
            writer: None,
        })
    }

    /// Open a unit in overwrite mode, truncating any previous content
    pub fn recreate(path: impl AsRef<Path>) -> CacheResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                CacheError::io(format!("creating directory {}", parent.display()), e)
            })?;
        }
        let file = File::create(path)
            .map_err(|e| CacheError::io(format!("creating cache file {}", path.display()), e))?;

        Ok(Self {
            path: path.to_path_buf(),
            contents: Contents::default(),
            writer: Some(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store a value under `name`, natively if possible, pickled otherwise
    pub fn write(&mut self, name: &str, value: &Value) -> CacheResult<()> {
        let entry = match value {
            Value::Table(t) => Entry::Native(NativeObject::Table(t.clone())),
            Value::Histogram(h) => Entry::Native(NativeObject::Histogram(h.clone())),
            Value::Object(v) => Entry::Pickled(serde_pickle::to_vec(v, SerOptions::new())?),
        };
        self.contents.entries.insert(name.to_string(), entry);
        Ok(())
    }

    /// Load the value stored under `name`
    pub fn load(&self, name: &str) -> CacheResult<Value> {
        Ok(match self.entry(name)? {
            Entry::Native(NativeObject::Table(t)) => Value::Table(t.clone()),
            Entry::Native(NativeObject::Histogram(h)) => Value::Histogram(h.clone()),
            Entry::Pickled(bytes) => Value::Object(serde_pickle::from_slice(bytes, DeOptions::new())?),
        })
    }

    /// Store a typed record through the pickled path
    pub fn write_record<T: Serialize + ?Sized>(&mut self, name: &str, record: &T) -> CacheResult<()> {
        let bytes = serde_pickle::to_vec(&record, SerOptions::new())?;
        self.contents
            .entries
            .insert(name.to_string(), Entry::Pickled(bytes));
        Ok(())
    }

    /// Load a typed record written by [`write_record`](Self::write_record)
    pub fn load_record<T: DeserializeOwned>(&self, name: &str) -> CacheResult<T> {
        match self.entry(name)? {
            Entry::Pickled(bytes) => Ok(serde_pickle::from_slice(bytes, DeOptions::new())?),
            other => Err(CacheError::TypeMismatch {
                expected: "pickled",
                found: other.kind().as_str(),
            }),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.contents.entries.contains_key(name)
    }

    /// All entries with their encodings, in name order
    pub fn entries(&self) -> impl Iterator<Item = (&str, EntryKind)> {
        self.contents
            .entries
            .iter()
            .map(|(name, entry)| (name.as_str(), entry.kind()))
    }

    fn entry(&self, name: &str) -> CacheResult<&Entry> {
        self.contents
            .entries
            .get(name)
            .ok_or_else(|| CacheError::EntryNotFound {
                path: self.path.clone(),
                name: name.to_string(),
            })
    }

    /// Write everything to disk; a no-op for units opened for reading
    pub fn close(mut self) -> CacheResult<()> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        let context = || format!("writing cache file {}", self.path.display());

        writer
            .write_all(MAGIC)
            .map_err(|e| CacheError::io(context(), e))?;
        bincode::serialize_into(&mut writer, &self.contents)?;
        writer.flush().map_err(|e| CacheError::io(context(), e))?;

        trace!(
            "Wrote {} entries to {}",
            self.contents.entries.len(),
            self.path.display()
        );
        Ok(())
    }
}
