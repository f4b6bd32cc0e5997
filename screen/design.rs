//! # Design artifacts and the optimizer seam
//!
//! A design is what the external dynamic-programming optimizer produces for an
//! ordered prevalence vector: the initial partition sizes, the nested split
//! table, and the analytic expected number of tests. The engine never computes
//! one; it consumes designs through [`DesignOptimizer`].

use crate::error::ScreenError;
use crate::io::InputError;
use crate::oracle::Assay;
use crate::partition::load_initial_groups;
use crate::split_table::SplitTable;
use crate::types::GroupRange;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

/// The three artifacts of an optimized hierarchical design.
///
/// Field order matters for TOML: scalars and inline arrays must precede the
/// `[[splits]]` table array.
///
/// On disk the split table may also be given as the optimizer's dense
/// `split_matrix` (N rows of N sizes); listed `[[splits]]` entries override
/// matrix cells for the same range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DesignFile")]
pub struct Design {
    /// Analytic expected number of tests reported by the optimizer.
    pub expected_tests: f64,
    /// `partition[i]` is the size of the initial group starting at `i`.
    pub partition: Vec<usize>,
    #[serde(default)]
    pub splits: SplitTable,
}

impl Design {
    pub fn population_size(&self) -> usize {
        self.partition.len()
    }

    pub fn initial_groups(&self) -> Result<Vec<GroupRange>, ScreenError> {
        load_initial_groups(&self.partition)
    }

    /// Checks the design is usable for a population of `n` individuals.
    pub fn validate(&self, n: usize) -> Result<(), ScreenError> {
        if self.partition.len() != n {
            return Err(ScreenError::invalid(
                "design",
                format!(
                    "design covers {} individuals but the population has {n}",
                    self.partition.len()
                ),
            ));
        }
        if !(self.expected_tests.is_finite() && self.expected_tests >= 0.0) {
            return Err(ScreenError::MalformedDesign(format!(
                "expected test count {} is not a non-negative number",
                self.expected_tests
            )));
        }
        let groups = self.initial_groups()?;
        self.splits.validate(n)?;
        log::debug!(
            "Design validated: {n} individuals, {} initial groups, {} split entries.",
            groups.len(),
            self.splits.len()
        );
        Ok(())
    }

    /// Loads a design from a TOML file.
    pub fn load(path: &Path) -> Result<Self, InputError> {
        let content = fs::read_to_string(path)?;
        let design: Design = toml::from_str(&content)?;
        Ok(design)
    }

    /// Saves the design as TOML.
    pub fn save(&self, path: &Path) -> Result<(), InputError> {
        let toml_string = toml::to_string_pretty(self)?;
        let file = fs::File::create(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(toml_string.as_bytes())?;
        writer.flush()?;
        Ok(())
    }
}

/// On-disk form of [`Design`].
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct DesignFile {
    expected_tests: f64,
    partition: Vec<usize>,
    #[serde(default)]
    split_matrix: Option<Vec<Vec<f64>>>,
    #[serde(default)]
    splits: SplitTable,
}

impl TryFrom<DesignFile> for Design {
    type Error = ScreenError;

    fn try_from(file: DesignFile) -> Result<Self, Self::Error> {
        let splits = match file.split_matrix {
            None => file.splits,
            Some(rows) => {
                let n = rows.len();
                if let Some((idx, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != n) {
                    return Err(ScreenError::MalformedDesign(format!(
                        "split matrix row {idx} has {} cells but the matrix has {n} rows",
                        row.len()
                    )));
                }
                let dense = Array2::from_shape_vec((n, n), rows.into_iter().flatten().collect())
                    .map_err(|e| ScreenError::MalformedDesign(format!("split matrix: {e}")))?;
                let mut table = SplitTable::from_dense(dense.view())?;
                for entry in file.splits.entries() {
                    table.insert(entry.start, entry.end, entry.size);
                }
                table
            }
        };
        Ok(Design {
            expected_tests: file.expected_tests,
            partition: file.partition,
            splits,
        })
    }
}

/// The external optimizer that turns prevalences and assay accuracy into a
/// design.
pub trait DesignOptimizer {
    fn optimize(&self, prevalences: &[f64], assay: Assay) -> Result<Design, ScreenError>;
}

impl<F> DesignOptimizer for F
where
    F: Fn(&[f64], Assay) -> Result<Design, ScreenError>,
{
    fn optimize(&self, prevalences: &[f64], assay: Assay) -> Result<Design, ScreenError> {
        self(prevalences, assay)
    }
}

/// Serves designs that were optimized elsewhere, typically loaded from disk.
///
/// Each design answers only the assay it was optimized for. A second design
/// can be registered for the perfect assay (Se = Sp = 1); any other request is
/// an error rather than a silently mismatched design.
#[derive(Debug, Clone)]
pub struct PrecomputedDesign {
    design: Design,
    assay: Assay,
    perfect_assay: Option<Design>,
}

impl PrecomputedDesign {
    /// `design` as optimized for `assay`.
    pub fn new(design: Design, assay: Assay) -> Self {
        Self {
            design,
            assay,
            perfect_assay: None,
        }
    }

    pub fn with_perfect_assay_design(mut self, design: Design) -> Self {
        self.perfect_assay = Some(design);
        self
    }
}

impl DesignOptimizer for PrecomputedDesign {
    fn optimize(&self, prevalences: &[f64], assay: Assay) -> Result<Design, ScreenError> {
        let design = if assay == self.assay {
            &self.design
        } else {
            match &self.perfect_assay {
                Some(perfect) if assay == Assay::PERFECT => perfect,
                _ => {
                    return Err(ScreenError::invalid(
                        "assay",
                        format!(
                            "no precomputed design for Se={}, Sp={}",
                            assay.sensitivity(),
                            assay.specificity()
                        ),
                    ));
                }
            }
        };
        design.validate(prevalences.len())?;
        Ok(design.clone())
    }
}
