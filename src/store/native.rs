//! Native storable objects
//!
//! Numeric tables and histograms are stored directly in a unit, without
//! going through the pickled fallback.

use crate::error::{CacheError, CacheResult};
use serde::{Deserialize, Serialize};

/// A columnar table of named `f64` columns of equal length
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<String>,
    data: Vec<Vec<f64>>,
}

impl Table {
    /// Create an empty table with the given column names
    pub fn new<I, S>(columns: I) -> CacheResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        for (i, name) in columns.iter().enumerate() {
            if columns[..i].contains(name) {
                return Err(CacheError::InvalidTable(format!(
                    "duplicate column {name:?}"
                )));
            }
        }
        let data = vec![Vec::new(); columns.len()];
        Ok(Self { columns, data })
    }

    /// Build a table from whole columns
    pub fn from_columns<I, S>(columns: I) -> CacheResult<Self>
    where
        I: IntoIterator<Item = (S, Vec<f64>)>,
        S: Into<String>,
    {
        let (names, data): (Vec<String>, Vec<Vec<f64>>) =
            columns.into_iter().map(|(n, c)| (n.into(), c)).unzip();
        let mut table = Self::new(names)?;
        if let Some(first) = data.first() {
            if let Some(bad) = data.iter().position(|c| c.len() != first.len()) {
                return Err(CacheError::InvalidTable(format!(
                    "column {:?} has {} rows, expected {}",
                    table.columns[bad],
                    data[bad].len(),
                    first.len()
                )));
            }
        }
        table.data = data;
        Ok(table)
    }

    /// Append one row; its length must match the number of columns
    pub fn push_row(&mut self, row: &[f64]) -> CacheResult<()> {
        if row.len() != self.columns.len() {
            return Err(CacheError::InvalidTable(format!(
                "row has {} values, table has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        for (column, value) in self.data.iter_mut().zip(row) {
            column.push(*value);
        }
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Values of a named column
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|i| self.data[i].as_slice())
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn n_rows(&self) -> usize {
        self.data.first().map_or(0, Vec::len)
    }

    /// A single row, in column order
    pub fn row(&self, index: usize) -> Option<Vec<f64>> {
        if index >= self.n_rows() {
            return None;
        }
        Some(self.data.iter().map(|c| c[index]).collect())
    }
}

/// A one-dimensional histogram with explicit bin edges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    edges: Vec<f64>,
    contents: Vec<f64>,
    underflow: f64,
    overflow: f64,
    entries: u64,
}

impl Histogram {
    /// Create a histogram with `nbins` equal-width bins over `[low, high)`
    pub fn uniform(nbins: usize, low: f64, high: f64) -> CacheResult<Self> {
        if nbins == 0 {
            return Err(CacheError::InvalidHistogram(
                "at least one bin is required".to_string(),
            ));
        }
        if !(low < high) {
            return Err(CacheError::InvalidHistogram(format!(
                "range [{low}, {high}) is empty"
            )));
        }
        let width = (high - low) / nbins as f64;
        let edges = (0..=nbins).map(|i| low + width * i as f64).collect();
        Self::with_edges(edges)
    }

    /// Create a histogram from strictly increasing bin edges
    pub fn with_edges(edges: Vec<f64>) -> CacheResult<Self> {
        if edges.len() < 2 {
            return Err(CacheError::InvalidHistogram(
                "at least two edges are required".to_string(),
            ));
        }
        if edges.windows(2).any(|w| !(w[0] < w[1])) {
            return Err(CacheError::InvalidHistogram(
                "edges must be strictly increasing".to_string(),
            ));
        }
        let nbins = edges.len() - 1;
        Ok(Self {
            edges,
            contents: vec![0.0; nbins],
            underflow: 0.0,
            overflow: 0.0,
            entries: 0,
        })
    }

    pub fn fill(&mut self, x: f64) {
        self.fill_weighted(x, 1.0);
    }

    pub fn fill_weighted(&mut self, x: f64, weight: f64) {
        self.entries += 1;
        match self.find_bin(x) {
            Some(bin) => self.contents[bin] += weight,
            None if x < self.edges[0] => self.underflow += weight,
            None => self.overflow += weight,
        }
    }

    /// Index of the bin containing `x`, if it is in range
    pub fn find_bin(&self, x: f64) -> Option<usize> {
        let last = *self.edges.last()?;
        if x.is_nan() || x < self.edges[0] || x >= last {
            return None;
        }
        // partition_point gives the first edge > x
        Some(self.edges.partition_point(|e| *e <= x) - 1)
    }

    pub fn nbins(&self) -> usize {
        self.contents.len()
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    pub fn bin_content(&self, bin: usize) -> Option<f64> {
        self.contents.get(bin).copied()
    }

    pub fn underflow(&self) -> f64 {
        self.underflow
    }

    pub fn overflow(&self) -> f64 {
        self.overflow
    }

    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Sum of in-range bin contents
    pub fn integral(&self) -> f64 {
        self.contents.iter().sum()
    }
}
