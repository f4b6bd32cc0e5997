//! One pass of the screening protocol over one population realization.

use crate::error::ScreenError;
use crate::oracle::Assay;
use crate::resolve::Resolver;
use crate::split_table::SplitTable;
use crate::types::{GroupRange, IterationCounts, Status, TestCounter};
use rand::Rng;
use rand::distributions::Standard;

/// Draws a true-status realization: individual `i` is positive when a uniform
/// draw exceeds `1 - q[i]`, so `P(positive) = q[i]`.
pub fn sample_status<R: Rng>(prevalences: &[f64], rng: &mut R) -> Vec<Status> {
    prevalences
        .iter()
        .map(|&q| {
            let u: f64 = rng.sample(Standard);
            Status::from(u > 1.0 - q)
        })
        .collect()
}

/// Resolves every initial group in order, returning the population-wide
/// classification and the tests it took.
pub fn classify_population<R: Rng>(
    status: &[Status],
    groups: &[GroupRange],
    splits: &SplitTable,
    assay: Assay,
    rng: &mut R,
) -> Result<(Vec<Status>, TestCounter), ScreenError> {
    let resolver = Resolver::new(splits, assay);
    let mut tests = TestCounter::new();
    let mut classification = Vec::with_capacity(status.len());
    for &group in groups {
        resolver.resolve_into(group, status, rng, &mut tests, &mut classification)?;
    }
    if classification.len() != status.len() {
        return Err(ScreenError::MalformedDesign(format!(
            "initial groups cover {} individuals but the population has {}",
            classification.len(),
            status.len()
        )));
    }
    Ok((classification, tests))
}

/// Samples a fresh realization from `prevalences`, screens it, and tallies
/// the outcome.
pub fn run_iteration<R: Rng>(
    prevalences: &[f64],
    groups: &[GroupRange],
    splits: &SplitTable,
    assay: Assay,
    rng: &mut R,
) -> Result<IterationCounts, ScreenError> {
    let status = sample_status(prevalences, rng);
    let (classification, tests) = classify_population(&status, groups, splits, assay, rng)?;
    Ok(IterationCounts::tally(&status, &classification, tests))
}

/// The result of screening one known status vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayOutcome {
    pub classification: Vec<Status>,
    pub counts: IterationCounts,
}

impl ReplayOutcome {
    pub fn total_tests(&self) -> u64 {
        self.counts.tests
    }

    pub fn sensitivity(&self) -> Result<f64, ScreenError> {
        self.counts.sensitivity()
    }

    pub fn specificity(&self) -> Result<f64, ScreenError> {
        self.counts.specificity()
    }
}

/// Screens a caller-supplied status vector without resampling it.
pub fn replay<R: Rng>(
    status: &[Status],
    groups: &[GroupRange],
    splits: &SplitTable,
    assay: Assay,
    rng: &mut R,
) -> Result<ReplayOutcome, ScreenError> {
    let (classification, tests) = classify_population(status, groups, splits, assay, rng)?;
    let counts = IterationCounts::tally(status, &classification, tests);
    Ok(ReplayOutcome {
        classification,
        counts,
    })
}
