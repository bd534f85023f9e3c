//! Arguments of a cached computation
//!
//! Plain arguments are part of the persisted fingerprint and compared by
//! value. Dependencies are other caches: they are never persisted, only
//! their `ctime` takes part in the staleness check.

use crate::cache::ComputationCache;
use crate::error::{CacheError, CacheResult};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Plain keyword arguments, as persisted
pub type Kwargs = BTreeMap<String, serde_json::Value>;

/// The arguments of a computation, split by kind
#[derive(Clone, Default)]
pub struct Args {
    pub(crate) plain: Vec<serde_json::Value>,
    pub(crate) plain_kw: Kwargs,
    pub(crate) deps: Vec<Arc<ComputationCache>>,
    pub(crate) deps_kw: BTreeMap<String, Arc<ComputationCache>>,
}

impl Args {
    pub fn plain(&self) -> &[serde_json::Value] {
        &self.plain
    }

    pub fn plain_kwargs(&self) -> &Kwargs {
        &self.plain_kw
    }

    /// Every dependency cache, positional ones first
    pub fn dependencies(&self) -> impl Iterator<Item = &Arc<ComputationCache>> {
        self.deps.iter().chain(self.deps_kw.values())
    }
}

/// Read-only view of the arguments handed to a compute function
pub struct Inputs<'a> {
    cache: &'a str,
    args: &'a Args,
}

impl<'a> Inputs<'a> {
    pub(crate) fn new(cache: &'a str, args: &'a Args) -> Self {
        Self { cache, args }
    }

    /// Name of the cache being computed
    pub fn cache_name(&self) -> &str {
        self.cache
    }

    /// Positional plain argument
    pub fn arg(&self, index: usize) -> CacheResult<&'a serde_json::Value> {
        self.args
            .plain
            .get(index)
            .ok_or_else(|| self.missing(format!("at position {index}")))
    }

    /// Keyword plain argument
    pub fn kwarg(&self, name: &str) -> CacheResult<&'a serde_json::Value> {
        self.args
            .plain_kw
            .get(name)
            .ok_or_else(|| self.missing(format!("named {name:?}")))
    }

    /// Positional plain argument, deserialized
    pub fn arg_as<T: DeserializeOwned>(&self, index: usize) -> CacheResult<T> {
        Ok(serde_json::from_value(self.arg(index)?.clone())?)
    }

    /// Keyword plain argument, deserialized
    pub fn kwarg_as<T: DeserializeOwned>(&self, name: &str) -> CacheResult<T> {
        Ok(serde_json::from_value(self.kwarg(name)?.clone())?)
    }

    /// Keyword plain argument with a fallback
    pub fn kwarg_or<T: DeserializeOwned>(&self, name: &str, default: T) -> CacheResult<T> {
        match self.args.plain_kw.get(name) {
            Some(v) => Ok(serde_json::from_value(v.clone())?),
            None => Ok(default),
        }
    }

    /// Positional dependency cache
    pub fn dep(&self, index: usize) -> CacheResult<&'a ComputationCache> {
        self.args
            .deps
            .get(index)
            .map(Arc::as_ref)
            .ok_or_else(|| self.missing(format!("dependency at position {index}")))
    }

    /// Keyword dependency cache
    pub fn dep_kwarg(&self, name: &str) -> CacheResult<&'a ComputationCache> {
        self.args
            .deps_kw
            .get(name)
            .map(Arc::as_ref)
            .ok_or_else(|| self.missing(format!("dependency named {name:?}")))
    }

    fn missing(&self, what: String) -> CacheError {
        CacheError::MissingArgument {
            cache: self.cache.to_string(),
            what,
        }
    }
}
