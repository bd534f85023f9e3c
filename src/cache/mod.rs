//! Dependency-aware memoization of computations
//!
//! A [`ComputationCache`] wraps a compute function, its arguments and the
//! names of the values it produces. The first access to any value either
//! reuses the persisted result or recomputes it.
//!
//! # Invalidation
//!
//! A persisted result is reused only if all of these hold:
//!
//! | Record | Check |
//! |--------|-------|
//! | `names` | equal to the expected result names |
//! | `function` | equal to the function identity |
//! | `args`, `kwargs` | equal to the plain arguments |
//! | `ctime` | not older than any dependency's `ctime` |
//!
//! Anything unreadable counts as a miss and triggers recomputation.
//! Dependencies are only checked one level deep: a cache nested inside a
//! plain argument is not seen.

pub mod args;
pub mod capture;

pub use args::{Args, Inputs, Kwargs};
pub use capture::Captured;

use crate::config::CacheConfig;
use crate::error::{BoxError, CacheError, CacheResult};
use crate::store::{StoreUnit, EXTENSION};
use crate::value::{Value, Values};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Creation time of the cached values
pub const CTIME: &str = "ctime";
/// Captured standard output of the computation
pub const STDOUT: &str = "stdout";
/// Captured standard error of the computation
pub const STDERR: &str = "stderr";

/// Result names every cache carries
pub const RESERVED_RESULTS: [&str; 3] = [CTIME, STDOUT, STDERR];

/// Store record names holding a cache's fingerprint
pub mod records {
    /// The expected result names
    pub const NAMES: &str = "names";
    /// The compute function identity
    pub const FUNCTION: &str = "function";
    /// Plain positional arguments
    pub const ARGS: &str = "args";
    /// Plain keyword arguments
    pub const KWARGS: &str = "kwargs";

    pub const ALL: [&str; 4] = [NAMES, FUNCTION, ARGS, KWARGS];
}

/// What a compute function returns
pub type ComputeResult = Result<Values, BoxError>;

type ComputeFn = Arc<dyn Fn(&Inputs<'_>) -> ComputeResult + Send + Sync>;

/// Behaviour switches of a cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    /// Skip the persisted result and always recompute on first access
    pub force_update: bool,
    /// Log the load/retrieve/execute trail at debug level
    pub debug: bool,
    /// Capture stdout/stderr of the computation into the cache
    pub capture_output: bool,
    /// Replay captured output after a successful computation
    pub print_output: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            force_update: false,
            debug: false,
            capture_output: true,
            print_output: true,
        }
    }
}

impl From<&CacheConfig> for CacheOptions {
    fn from(config: &CacheConfig) -> Self {
        Self {
            force_update: config.force_update,
            debug: config.debug,
            capture_output: config.capture_output,
            print_output: config.print_output,
        }
    }
}

/// Why a persisted result was not reused
enum Miss {
    Unreadable(CacheError),
    Mismatch {
        record: &'static str,
        stored: String,
        expected: String,
    },
    Stale {
        dependency: String,
        updated: DateTime<Utc>,
        ctime: DateTime<Utc>,
    },
}

impl fmt::Display for Miss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreadable(e) => write!(f, "{e}"),
            Self::Mismatch {
                record,
                stored,
                expected,
            } => write!(
                f,
                "{record} doesn't match what's in the file: expected {expected}, stored {stored}"
            ),
            Self::Stale {
                dependency,
                updated,
                ctime,
            } => write!(
                f,
                "dependency {dependency:?} was updated at {updated}, this cache at {ctime}"
            ),
        }
    }
}

#[derive(Default)]
struct State {
    values: Option<Values>,
    loaded: bool,
}

/// A memoized computation persisted to a single store unit
pub struct ComputationCache {
    name: String,
    location: PathBuf,
    names: BTreeSet<String>,
    function: ComputeFn,
    function_id: String,
    args: Args,
    options: CacheOptions,
    state: Mutex<State>,
}

impl ComputationCache {
    /// Start building a cache around a compute function
    ///
    /// The function is identified by its Rust path, so it must be a named
    /// `fn` item; closures, `fn` pointers and boxed functions need an explicit
    /// [`CacheBuilder::function_id`].
    pub fn builder<F>(name: impl Into<String>, function: F) -> CacheBuilder
    where
        F: Fn(&Inputs<'_>) -> ComputeResult + Send + Sync + 'static,
    {
        CacheBuilder {
            name: name.into(),
            location: None,
            names: BTreeSet::new(),
            function: Arc::new(function),
            function_id: std::any::type_name::<F>().to_string(),
            explicit_id: false,
            args: Args::default(),
            config: None,
            force_update: None,
            debug: None,
            capture_output: None,
            print_output: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Every result name, reserved ones included
    pub fn names(&self) -> &BTreeSet<String> {
        &self.names
    }

    pub fn function_id(&self) -> &str {
        &self.function_id
    }

    pub fn args(&self) -> &Args {
        &self.args
    }

    pub fn options(&self) -> CacheOptions {
        self.options
    }

    /// Whether values are held in memory
    pub fn is_loaded(&self) -> bool {
        self.state.lock().loaded
    }

    /// Get a result, loading the cache on first access
    pub fn get(&self, name: &str) -> CacheResult<Value> {
        self.check_name(name)?;
        let mut state = self.state.lock();
        let values = self.ensure_loaded(&mut state)?;
        values.get(name).cloned().ok_or_else(|| self.unknown(name))
    }

    /// Get a generic result and deserialize it
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> CacheResult<T> {
        self.get(name)?.decode()
    }

    /// When the values were computed
    pub fn ctime(&self) -> CacheResult<DateTime<Utc>> {
        self.get_as(CTIME)
    }

    /// Captured stdout, if output was captured
    pub fn stdout(&self) -> CacheResult<Option<String>> {
        self.get_as(STDOUT)
    }

    /// Captured stderr, if output was captured
    pub fn stderr(&self) -> CacheResult<Option<String>> {
        self.get_as(STDERR)
    }

    /// Replace a result in memory; nothing is persisted
    pub fn set(&self, name: &str, value: impl Into<Value>) -> CacheResult<()> {
        self.check_name(name)?;
        let mut state = self.state.lock();
        let values = self.ensure_loaded(&mut state)?;
        values.insert(name.to_string(), value.into());
        Ok(())
    }

    /// Load the values, retrieving or recomputing them; runs at most once
    pub fn load(&self) -> CacheResult<Values> {
        let mut state = self.state.lock();
        self.ensure_loaded(&mut state).map(|v| v.clone())
    }

    /// Read the persisted values if they are still valid
    ///
    /// Returns `None` when the values must be recomputed. Only failures of
    /// a dependency's own computation are returned as errors.
    pub fn retrieve(&self) -> CacheResult<Option<Values>> {
        let mut state = self.state.lock();
        self.retrieve_locked(&mut state)
    }

    /// Recompute the values unconditionally and persist them
    pub fn execute(&self) -> CacheResult<Values> {
        let mut state = self.state.lock();
        self.execute_locked(&mut state)
    }

    /// Alias of [`execute`](Self::execute)
    pub fn update(&self) -> CacheResult<Values> {
        self.execute()
    }

    /// Persist the in-memory values
    pub fn write(&self) -> CacheResult<()> {
        let state = self.state.lock();
        let values = state
            .values
            .as_ref()
            .ok_or_else(|| CacheError::NotLoaded(self.name.clone()))?;
        self.write_values(values)
    }

    /// Adopt a complete set of values
    pub fn set_values(&self, values: Values) -> CacheResult<()> {
        self.trail(format_args!("set_values"));
        self.check_keys(&values, &self.names)?;
        let mut state = self.state.lock();
        state.values = Some(values);
        state.loaded = true;
        Ok(())
    }

    /// Short digest of the fingerprint records, for display
    pub fn recipe_digest(&self) -> CacheResult<String> {
        recipe_digest(
            &self.names,
            &self.function_id,
            &self.args.plain,
            &self.args.plain_kw,
        )
    }

    fn ensure_loaded<'s>(&self, state: &'s mut State) -> CacheResult<&'s mut Values> {
        if !state.loaded {
            self.trail(format_args!("load"));
            let retrieved = if self.options.force_update {
                self.trail(format_args!("update requested"));
                None
            } else {
                self.trail(format_args!("update not requested, attempt to retrieve"));
                self.retrieve_locked(state)?
            };
            if retrieved.is_none() {
                self.execute_locked(state)?;
            }
            state.loaded = true;
            self.trail(format_args!("load complete"));
        }
        state
            .values
            .as_mut()
            .ok_or_else(|| CacheError::Internal(format!("cache {:?} loaded without values", self.name)))
    }

    fn retrieve_locked(&self, state: &mut State) -> CacheResult<Option<Values>> {
        self.trail(format_args!("retrieve from {}", self.location.display()));
        match self.try_retrieve()? {
            Ok(values) => {
                state.values = Some(values.clone());
                state.loaded = true;
                debug!(cache = %self.name, "Reusing values from {}", self.location.display());
                Ok(Some(values))
            }
            Err(miss) => {
                self.trail(format_args!("retrieve missed: {miss}"));
                Ok(None)
            }
        }
    }

    fn try_retrieve(&self) -> CacheResult<Result<Values, Miss>> {
        let unit = match StoreUnit::open(&self.location) {
            Ok(unit) => unit,
            Err(e) => return Ok(Err(Miss::Unreadable(e))),
        };
        if let Err(miss) = self.check_fingerprint(&unit) {
            return Ok(Err(miss));
        }

        let mut values = Values::new();
        for name in &self.names {
            match unit.load(name) {
                Ok(value) => {
                    values.insert(name.clone(), value);
                }
                Err(e) => return Ok(Err(Miss::Unreadable(e))),
            }
        }
        let ctime = match values.get(CTIME).map(Value::decode::<DateTime<Utc>>) {
            Some(Ok(ctime)) => ctime,
            Some(Err(e)) => return Ok(Err(Miss::Unreadable(e))),
            None => return Ok(Err(Miss::Unreadable(self.unknown(CTIME)))),
        };

        for dep in self.args.dependencies() {
            let updated = dep.ctime()?;
            if updated > ctime {
                return Ok(Err(Miss::Stale {
                    dependency: dep.name.clone(),
                    updated,
                    ctime,
                }));
            }
        }
        Ok(Ok(values))
    }

    fn check_fingerprint(&self, unit: &StoreUnit) -> Result<(), Miss> {
        let names: BTreeSet<String> = unit.load_record(records::NAMES).map_err(Miss::Unreadable)?;
        mismatch(records::NAMES, &names, &self.names)?;

        let function: String = unit
            .load_record(records::FUNCTION)
            .map_err(Miss::Unreadable)?;
        mismatch(records::FUNCTION, &function, &self.function_id)?;

        let args: Vec<serde_json::Value> =
            unit.load_record(records::ARGS).map_err(Miss::Unreadable)?;
        mismatch(records::ARGS, &args, &self.args.plain)?;

        let kwargs: Kwargs = unit.load_record(records::KWARGS).map_err(Miss::Unreadable)?;
        mismatch(records::KWARGS, &kwargs, &self.args.plain_kw)
    }

    fn execute_locked(&self, state: &mut State) -> CacheResult<Values> {
        self.trail(format_args!("execute"));
        // Dependencies are settled first so their ctime precedes ours.
        for dep in self.args.dependencies() {
            dep.ensure_ready()?;
        }

        let ctime = Utc::now();
        let inputs = Inputs::new(&self.name, &self.args);
        let (result, captured) = if self.options.capture_output {
            self.run_captured(&inputs)?
        } else {
            ((self.function)(&inputs), None)
        };
        let mut values = result.map_err(|e| CacheError::computation(&self.name, e))?;

        let produced: BTreeSet<String> = self
            .names
            .iter()
            .filter(|n| !RESERVED_RESULTS.contains(&n.as_str()))
            .cloned()
            .collect();
        self.check_keys(&values, &produced)?;

        let (stdout, stderr) = match captured {
            Some(c) => (Value::from(c.stdout), Value::from(c.stderr)),
            None => (
                Value::Object(serde_json::Value::Null),
                Value::Object(serde_json::Value::Null),
            ),
        };
        values.insert(CTIME.to_string(), Value::object(&ctime)?);
        values.insert(STDOUT.to_string(), stdout);
        values.insert(STDERR.to_string(), stderr);

        self.check_keys(&values, &self.names)?;
        state.values = Some(values.clone());
        state.loaded = true;
        self.write_values(&values)?;

        info!(cache = %self.name, "Computed and stored {}", self.location.display());
        Ok(values)
    }

    fn run_captured(&self, inputs: &Inputs<'_>) -> CacheResult<(ComputeResult, Option<Captured>)> {
        let (attempt, captured) =
            capture::capture(|| panic::catch_unwind(AssertUnwindSafe(|| (self.function)(inputs))))?;
        match attempt {
            Ok(Ok(values)) => {
                if self.options.print_output {
                    captured.echo();
                }
                Ok((Ok(values), Some(captured)))
            }
            _ => {
                // Call again without redirection so the failure reaches the caller intact.
                self.trail(format_args!("caught failure, call function again to raise it"));
                Ok(((self.function)(inputs), None))
            }
        }
    }

    fn write_values(&self, values: &Values) -> CacheResult<()> {
        self.trail(format_args!("write to {}", self.location.display()));
        let mut unit = StoreUnit::recreate(&self.location)?;
        for (name, value) in values {
            unit.write(name, value)?;
        }
        unit.write_record(records::NAMES, &self.names)?;
        unit.write_record(records::FUNCTION, &self.function_id)?;
        unit.write_record(records::ARGS, &self.args.plain)?;
        unit.write_record(records::KWARGS, &self.args.plain_kw)?;
        unit.close()
    }

    /// Make sure values are in memory without copying them out
    pub(crate) fn ensure_ready(&self) -> CacheResult<()> {
        let mut state = self.state.lock();
        self.ensure_loaded(&mut state).map(|_| ())
    }

    fn check_keys(&self, values: &Values, expected: &BTreeSet<String>) -> CacheResult<()> {
        if values.len() == expected.len() && values.keys().all(|k| expected.contains(k)) {
            return Ok(());
        }
        Err(CacheError::SchemaViolation {
            cache: self.name.clone(),
            expected: expected.clone(),
            actual: values.keys().cloned().collect(),
        })
    }

    fn check_name(&self, name: &str) -> CacheResult<()> {
        if self.names.contains(name) {
            Ok(())
        } else {
            Err(self.unknown(name))
        }
    }

    fn unknown(&self, name: &str) -> CacheError {
        CacheError::UnknownResult {
            cache: self.name.clone(),
            name: name.to_string(),
        }
    }

    fn trail(&self, message: fmt::Arguments<'_>) {
        if self.options.debug {
            debug!(cache = %self.name, "{message}");
        } else {
            trace!(cache = %self.name, "{message}");
        }
    }
}

impl fmt::Debug for ComputationCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputationCache")
            .field("name", &self.name)
            .field("location", &self.location)
            .field("names", &self.names)
            .field("function_id", &self.function_id)
            .field("options", &self.options)
            .field("loaded", &self.state.try_lock().map(|s| s.loaded))
            .finish()
    }
}

fn mismatch<T: PartialEq + fmt::Debug>(
    record: &'static str,
    stored: &T,
    expected: &T,
) -> Result<(), Miss> {
    if stored == expected {
        return Ok(());
    }
    Err(Miss::Mismatch {
        record,
        stored: format!("{stored:?}"),
        expected: format!("{expected:?}"),
    })
}

/// Whether a type name identifies one specific function
///
/// Closures, `fn` pointers and trait objects share a name with every other
/// function of the same signature.
fn names_an_item(type_name: &str) -> bool {
    !(type_name.contains("{{closure}}")
        || type_name.contains("dyn ")
        || type_name.starts_with("fn(")
        || type_name.starts_with("for<")
        || type_name.starts_with("unsafe fn(")
        || type_name.starts_with("extern "))
}

/// Short SHA256 digest of a cache's fingerprint records (first 12 hex chars)
pub fn recipe_digest(
    names: &BTreeSet<String>,
    function: &str,
    args: &[serde_json::Value],
    kwargs: &Kwargs,
) -> CacheResult<String> {
    let encoded = serde_json::to_vec(&(names, function, args, kwargs))?;
    let mut hasher = Sha256::new();
    hasher.update(&encoded);
    let result = hasher.finalize();
    Ok(hex::encode(&result[..6]))
}

/// Builder for [`ComputationCache`]
pub struct CacheBuilder {
    name: String,
    location: Option<PathBuf>,
    names: BTreeSet<String>,
    function: ComputeFn,
    function_id: String,
    explicit_id: bool,
    args: Args,
    config: Option<CacheConfig>,
    force_update: Option<bool>,
    debug: Option<bool>,
    capture_output: Option<bool>,
    print_output: Option<bool>,
}

impl CacheBuilder {
    /// File the cache is persisted to
    pub fn location(mut self, path: impl Into<PathBuf>) -> Self {
        self.location = Some(path.into());
        self
    }

    /// Names of the values the function produces
    pub fn names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names.extend(names.into_iter().map(Into::into));
        self
    }

    /// Append a plain positional argument
    pub fn arg(mut self, value: impl Into<serde_json::Value>) -> Self {
        self.args.plain.push(value.into());
        self
    }

    /// Set a plain keyword argument
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.args.plain_kw.insert(name.into(), value.into());
        self
    }

    /// Append a positional dependency
    pub fn dep(mut self, cache: Arc<ComputationCache>) -> Self {
        self.args.deps.push(cache);
        self
    }

    /// Set a keyword dependency
    pub fn dep_kwarg(mut self, name: impl Into<String>, cache: Arc<ComputationCache>) -> Self {
        self.args.deps_kw.insert(name.into(), cache);
        self
    }

    /// Identify the function explicitly instead of by its Rust path
    pub fn function_id(mut self, id: impl Into<String>) -> Self {
        self.function_id = id.into();
        self.explicit_id = true;
        self
    }

    /// Take defaults and the cache directory from configuration
    pub fn config(mut self, config: &CacheConfig) -> Self {
        self.config = Some(config.clone());
        self
    }

    pub fn force_update(mut self, yes: bool) -> Self {
        self.force_update = Some(yes);
        self
    }

    pub fn debug(mut self, yes: bool) -> Self {
        self.debug = Some(yes);
        self
    }

    pub fn capture_output(mut self, yes: bool) -> Self {
        self.capture_output = Some(yes);
        self
    }

    pub fn print_output(mut self, yes: bool) -> Self {
        self.print_output = Some(yes);
        self
    }

    /// Validate and create the cache; performs no I/O
    pub fn build(self) -> CacheResult<ComputationCache> {
        if !self.explicit_id && !names_an_item(&self.function_id) {
            return Err(CacheError::AnonymousFunction {
                cache: self.name,
                function: self.function_id,
            });
        }
        if let Some(name) = self.names.iter().find(|n| records::ALL.contains(&n.as_str())) {
            return Err(CacheError::ReservedName {
                cache: self.name.clone(),
                name: name.clone(),
            });
        }

        let location = match (self.location, self.config.as_ref().and_then(|c| c.directory.as_ref())) {
            (Some(path), _) => path,
            (None, Some(dir)) => dir.join(format!("{}.{}", self.name, EXTENSION)),
            (None, None) => return Err(CacheError::MissingLocation(self.name)),
        };

        let defaults = self
            .config
            .as_ref()
            .map(CacheOptions::from)
            .unwrap_or_default();
        let options = CacheOptions {
            force_update: self.force_update.unwrap_or(defaults.force_update),
            debug: self.debug.unwrap_or(defaults.debug),
            capture_output: self.capture_output.unwrap_or(defaults.capture_output),
            print_output: self.print_output.unwrap_or(defaults.print_output),
        };

        let mut names = self.names;
        names.extend(RESERVED_RESULTS.iter().map(|n| n.to_string()));

        Ok(ComputationCache {
            name: self.name,
            location,
            names,
            function: self.function,
            function_id: self.function_id,
            args: self.args,
            options,
            state: Mutex::new(State::default()),
        })
    }
}
