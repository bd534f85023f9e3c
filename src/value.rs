//! Values held by a cache
//!
//! A [`Value`] is either a native storable object or a generic
//! serde-compatible object. Generic objects are what the store pickles.

use crate::error::{CacheError, CacheResult};
use crate::store::{Histogram, Table};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;

/// Named values produced by a compute function
pub type Values = BTreeMap<String, Value>;

/// A single cached value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Columnar numeric table (native)
    Table(Table),
    /// One-dimensional histogram (native)
    Histogram(Histogram),
    /// Anything else, as a JSON-like tree
    Object(serde_json::Value),
}

impl Value {
    /// Convert any serializable value into a generic object
    pub fn object<T: Serialize + ?Sized>(value: &T) -> CacheResult<Self> {
        Ok(Self::Object(serde_json::to_value(value)?))
    }

    /// Deserialize a generic object back into a concrete type
    pub fn decode<T: DeserializeOwned>(&self) -> CacheResult<T> {
        match self {
            Self::Object(v) => Ok(serde_json::from_value(v.clone())?),
            other => Err(other.mismatch("object")),
        }
    }

    /// Whether the store keeps this value in its native encoding
    pub fn is_native(&self) -> bool {
        matches!(self, Self::Table(_) | Self::Histogram(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Table(_) => "table",
            Self::Histogram(_) => "histogram",
            Self::Object(_) => "object",
        }
    }

    pub fn as_table(&self) -> CacheResult<&Table> {
        match self {
            Self::Table(t) => Ok(t),
            other => Err(other.mismatch("table")),
        }
    }

    pub fn as_histogram(&self) -> CacheResult<&Histogram> {
        match self {
            Self::Histogram(h) => Ok(h),
            other => Err(other.mismatch("histogram")),
        }
    }

    pub fn as_object(&self) -> CacheResult<&serde_json::Value> {
        match self {
            Self::Object(v) => Ok(v),
            other => Err(other.mismatch("object")),
        }
    }

    /// Numeric shortcut for scalar results
    pub fn as_f64(&self) -> CacheResult<f64> {
        self.as_object()?
            .as_f64()
            .ok_or(CacheError::TypeMismatch {
                expected: "number",
                found: "object",
            })
    }

    /// JSON rendering, used by the CLI
    pub fn to_json(&self) -> CacheResult<serde_json::Value> {
        Ok(match self {
            Self::Table(t) => serde_json::to_value(t)?,
            Self::Histogram(h) => serde_json::to_value(h)?,
            Self::Object(v) => v.clone(),
        })
    }

    fn mismatch(&self, expected: &'static str) -> CacheError {
        CacheError::TypeMismatch {
            expected,
            found: self.kind(),
        }
    }
}

impl From<Table> for Value {
    fn from(table: Table) -> Self {
        Self::Table(table)
    }
}

impl From<Histogram> for Value {
    fn from(hist: Histogram) -> Self {
        Self::Histogram(hist)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Self::Object(value)
    }
}

macro_rules! impl_from_scalar {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::Object(serde_json::Value::from(v))
                }
            }
        )*
    };
}

impl_from_scalar!(f64, i64, u64, i32, bool, String, &str);
