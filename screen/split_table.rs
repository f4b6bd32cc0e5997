//! # Nested split table
//!
//! For a pool `[start, end]` known to be positive, the table gives the size of
//! the first sub-pool to peel off. The optimizer emits this as a dense N×N
//! matrix, but the resolver only ever queries the handful of ranges its own
//! recursion reaches, so the table is stored sparsely.

use crate::error::ScreenError;
use ahash::AHashMap;
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

/// One populated cell of the split table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitEntry {
    pub start: usize,
    pub end: usize,
    pub size: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<SplitEntry>", into = "Vec<SplitEntry>")]
pub struct SplitTable {
    sizes: AHashMap<(usize, usize), usize>,
}

impl SplitTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the first sub-pool size for `[start, end]`, replacing any
    /// previous entry.
    pub fn insert(&mut self, start: usize, end: usize, size: usize) {
        self.sizes.insert((start, end), size);
    }

    #[inline]
    pub fn get(&self, start: usize, end: usize) -> Option<usize> {
        self.sizes.get(&(start, end)).copied()
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// Imports the optimizer's dense matrix. Cell `(i, j)` with `i <= j` holds
    /// the first sub-pool size for `[i, j]`; zero cells are unused and skipped.
    pub fn from_dense(matrix: ArrayView2<f64>) -> Result<Self, ScreenError> {
        let (rows, cols) = matrix.dim();
        if rows != cols {
            return Err(ScreenError::MalformedDesign(format!(
                "split matrix must be square, got {rows}x{cols}"
            )));
        }

        let mut table = Self::new();
        for ((start, end), &value) in matrix.indexed_iter() {
            if start > end || value == 0.0 {
                continue;
            }
            if !value.is_finite() || value < 0.0 || value.fract() != 0.0 {
                return Err(ScreenError::MalformedDesign(format!(
                    "split matrix cell ({start}, {end}) holds {value}, which is not a group size"
                )));
            }
            table.insert(start, end, value as usize);
        }
        Ok(table)
    }

    /// Checks every stored entry against a population of `n` individuals.
    ///
    /// Entries must describe a range inside the population, and their size
    /// must peel off at least one and at most all of its members. Whether a
    /// full-length peel is legal depends on how the resolver reached the range,
    /// so that last check happens during resolution.
    pub fn validate(&self, n: usize) -> Result<(), ScreenError> {
        for (&(start, end), &size) in &self.sizes {
            if start > end || end >= n {
                return Err(ScreenError::MalformedDesign(format!(
                    "split entry for [{start}, {end}] lies outside a population of {n}"
                )));
            }
            let len = end - start + 1;
            if size == 0 || size > len {
                return Err(ScreenError::MalformedDesign(format!(
                    "split entry for [{start}, {end}] has size {size}, outside 1..={len}"
                )));
            }
        }
        Ok(())
    }

    /// Entries sorted by range, for stable serialization.
    pub fn entries(&self) -> Vec<SplitEntry> {
        let mut entries: Vec<SplitEntry> = self
            .sizes
            .iter()
            .map(|(&(start, end), &size)| SplitEntry { start, end, size })
            .collect();
        entries.sort_unstable_by_key(|e| (e.start, e.end));
        entries
    }
}

impl From<Vec<SplitEntry>> for SplitTable {
    fn from(entries: Vec<SplitEntry>) -> Self {
        let mut table = Self::new();
        for e in entries {
            table.insert(e.start, e.end, e.size);
        }
        table
    }
}

impl From<SplitTable> for Vec<SplitEntry> {
    fn from(table: SplitTable) -> Self {
        table.entries()
    }
}

impl FromIterator<SplitEntry> for SplitTable {
    fn from_iter<I: IntoIterator<Item = SplitEntry>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}
