//! datacache - dependency-aware computation cache
//!
//! Memoizes expensive computations to disk. A cache is reused as long as
//! its function, arguments and result names are unchanged and none of the
//! caches it depends on was recomputed after it.
//!
//! ```no_run
//! use datacache::{ComputationCache, ComputeResult, Inputs, Value, Values};
//!
//! fn calc_pi(inputs: &Inputs<'_>) -> ComputeResult {
//!     let n: u64 = inputs.kwarg_as("n")?;
//!     let pi = (0..n)
//!         .map(|k| (if k % 2 == 0 { 4.0 } else { -4.0 }) / (2 * k + 1) as f64)
//!         .sum::<f64>();
//!     Ok(Values::from([("pi".to_string(), Value::from(pi))]))
//! }
//!
//! # fn main() -> datacache::CacheResult<()> {
//! let cache = ComputationCache::builder("pi", calc_pi)
//!     .location("caches/pi.dcache")
//!     .names(["pi"])
//!     .kwarg("n", 1_000_000)
//!     .build()?;
//! let pi: f64 = cache.get_as("pi")?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod store;
pub mod value;

pub use cache::{CacheBuilder, CacheOptions, ComputationCache, ComputeResult, Inputs};
pub use error::{BoxError, CacheError, CacheResult};
pub use store::{Histogram, StoreUnit, Table};
pub use value::{Value, Values};
