//! # Monte Carlo Aggregator
//!
//! Estimates a design's expected test count, overall sensitivity and overall
//! specificity by screening many independent population realizations.
//!
//! Iterations share nothing mutable: each one derives its own `StdRng` from
//! `(seed, iteration)`, owns its status vector and test counter, and only
//! borrows the design. They run on the rayon pool in fixed-size chunks and the
//! per-chunk tallies are summed. Because every tally is an integer and every
//! iteration's random stream is fixed by its index, a given seed produces the
//! same summary whatever the thread count or scheduling.

use crate::error::{ScreenError, validate_prevalences};
use crate::oracle::Assay;
use crate::partition::load_initial_groups;
use crate::progress::{NoopScreenProgress, ScreenProgressObserver, ScreenProgressStage};
use crate::simulate::run_iteration;
use crate::split_table::SplitTable;
use crate::types::IterationCounts;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use std::time::{Duration, Instant};

/// Iterations handed to one rayon task.
pub const DEFAULT_CHUNK_SIZE: usize = 256;

/// Iterations run when the caller does not say otherwise.
pub const DEFAULT_ITERATIONS: usize = 10_000;

#[derive(Debug, Clone, PartialEq)]
pub struct MonteCarloConfig {
    /// Number of population realizations to screen (`M`).
    pub iterations: usize,
    /// Base seed; iteration `i` draws from a stream derived from `(seed, i)`.
    pub seed: u64,
    pub chunk_size: usize,
    /// Iterations not yet started when this much wall time has passed are
    /// skipped.
    pub deadline: Option<Duration>,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            seed: 0,
            chunk_size: DEFAULT_CHUNK_SIZE,
            deadline: None,
        }
    }
}

impl MonteCarloConfig {
    pub fn new(iterations: usize, seed: u64) -> Self {
        Self {
            iterations,
            seed,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ScreenError> {
        if self.iterations == 0 {
            return Err(ScreenError::invalid(
                "iterations",
                "at least one Monte Carlo iteration is required",
            ));
        }
        if self.chunk_size == 0 {
            return Err(ScreenError::invalid("chunk_size", "chunk size must be positive"));
        }
        Ok(())
    }
}

/// Pooled result of a Monte Carlo run.
#[derive(Debug, Clone, PartialEq)]
pub struct MonteCarloSummary {
    /// Mean tests per realization, `ΣT / M`.
    pub expected_tests: f64,
    /// `Σest_1 / Σtrue_1`; `None` if no realization contained a positive.
    pub sensitivity: Option<f64>,
    /// `Σest_0 / Σtrue_0`; `None` if no realization contained a negative.
    pub specificity: Option<f64>,
    /// Iterations actually run. Below the requested count only when a
    /// deadline cut the run short.
    pub iterations: usize,
    pub totals: IterationCounts,
}

#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    counts: IterationCounts,
    iterations: usize,
}

impl Accumulator {
    fn merge(mut self, other: Self) -> Self {
        self.counts += other.counts;
        self.iterations += other.iterations;
        self
    }
}

/// Counter-based iteration RNG. Same `(seed, iteration)`, same draw sequence.
#[inline]
fn iteration_rng(seed: u64, iteration: u64) -> StdRng {
    StdRng::seed_from_u64(seed.wrapping_mul(2654435761).wrapping_add(iteration))
}

/// Runs the Monte Carlo evaluation of the design `(partition, splits)`.
pub fn aggregate(
    partition: &[usize],
    splits: &SplitTable,
    prevalences: &[f64],
    assay: Assay,
    config: &MonteCarloConfig,
) -> Result<MonteCarloSummary, ScreenError> {
    aggregate_with_progress(
        partition,
        splits,
        prevalences,
        assay,
        config,
        &NoopScreenProgress,
    )
}

/// [`aggregate`], reporting each finished chunk to `progress`.
pub fn aggregate_with_progress(
    partition: &[usize],
    splits: &SplitTable,
    prevalences: &[f64],
    assay: Assay,
    config: &MonteCarloConfig,
    progress: &dyn ScreenProgressObserver,
) -> Result<MonteCarloSummary, ScreenError> {
    config.validate()?;
    validate_prevalences(prevalences)?;
    if partition.len() != prevalences.len() {
        return Err(ScreenError::invalid(
            "partition",
            format!(
                "partition has {} entries but there are {} prevalences",
                partition.len(),
                prevalences.len()
            ),
        ));
    }
    let groups = load_initial_groups(partition)?;
    splits.validate(prevalences.len())?;

    log::info!(
        "Running {} Monte Carlo iterations over {} individuals in {} initial groups (Se={}, Sp={}).",
        config.iterations,
        prevalences.len(),
        groups.len(),
        assay.sensitivity(),
        assay.specificity()
    );

    let n_chunks = config.iterations.div_ceil(config.chunk_size);
    let chunk_ranges: Vec<(usize, usize)> = (0..n_chunks)
        .map(|c| {
            let start = c * config.chunk_size;
            let end = (start + config.chunk_size).min(config.iterations);
            (start, end)
        })
        .collect();

    let stage = ScreenProgressStage::MonteCarlo;
    progress.on_stage_start(stage, config.iterations);
    let started = Instant::now();

    let total = chunk_ranges
        .into_par_iter()
        .map(|(start, end)| -> Result<Accumulator, ScreenError> {
            let mut acc = Accumulator::default();
            for iteration in start..end {
                if config.deadline.is_some_and(|limit| started.elapsed() >= limit) {
                    break;
                }
                let mut rng = iteration_rng(config.seed, iteration as u64);
                acc.counts += run_iteration(prevalences, &groups, splits, assay, &mut rng)?;
                acc.iterations += 1;
            }
            progress.on_stage_advance(stage, acc.iterations);
            Ok(acc)
        })
        .try_reduce(Accumulator::default, |a, b| Ok(a.merge(b)))?;

    progress.on_stage_finish(stage);

    if total.iterations == 0 {
        // Only reachable through the deadline: iterations >= 1 was validated.
        return Err(ScreenError::DeadlineExceeded(
            config.deadline.unwrap_or_default(),
        ));
    }
    if total.iterations < config.iterations {
        log::warn!(
            "Deadline reached after {} of {} Monte Carlo iterations; estimates use the completed iterations only.",
            total.iterations,
            config.iterations
        );
    }

    let summary = summarize(total);
    log::info!(
        "Monte Carlo finished in {:.2?}: expected tests {:.4}, sensitivity {}, specificity {}.",
        started.elapsed(),
        summary.expected_tests,
        describe_ratio(summary.sensitivity),
        describe_ratio(summary.specificity)
    );
    Ok(summary)
}

fn summarize(total: Accumulator) -> MonteCarloSummary {
    let counts = total.counts;
    let sensitivity = counts.sensitivity().ok();
    if sensitivity.is_none() {
        log::warn!(
            "No simulated individual was positive; overall sensitivity is undefined for this run."
        );
    }
    let specificity = counts.specificity().ok();
    if specificity.is_none() {
        log::warn!(
            "No simulated individual was negative; overall specificity is undefined for this run."
        );
    }
    MonteCarloSummary {
        expected_tests: counts.tests as f64 / total.iterations as f64,
        sensitivity,
        specificity,
        iterations: total.iterations,
        totals: counts,
    }
}

fn describe_ratio(ratio: Option<f64>) -> String {
    ratio.map_or_else(|| "undefined".to_string(), |r| format!("{r:.4}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pooled_design() -> (Vec<usize>, SplitTable) {
        // Pools of three, each positive pool split 1 + 2 and then 1 + 1.
        let partition = vec![3, 0, 0, 3, 0, 0];
        let mut splits = SplitTable::new();
        for start in [0usize, 3] {
            splits.insert(start, start + 2, 1);
            splits.insert(start + 1, start + 2, 1);
        }
        (partition, splits)
    }

    #[derive(Default)]
    struct CountingProgress {
        total: AtomicUsize,
        advanced: AtomicUsize,
        finished: AtomicUsize,
    }

    impl ScreenProgressObserver for CountingProgress {
        fn on_stage_start(&self, stage: ScreenProgressStage, total_iterations: usize) {
            assert_eq!(stage, ScreenProgressStage::MonteCarlo);
            self.total.store(total_iterations, Ordering::SeqCst);
        }
        fn on_stage_advance(&self, stage: ScreenProgressStage, completed_iterations: usize) {
            assert_eq!(stage, ScreenProgressStage::MonteCarlo);
            self.advanced.fetch_add(completed_iterations, Ordering::SeqCst);
        }
        fn on_stage_finish(&self, stage: ScreenProgressStage) {
            assert_eq!(stage, ScreenProgressStage::MonteCarlo);
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn zero_iterations_is_rejected() {
        let (partition, splits) = pooled_design();
        let err = aggregate(
            &partition,
            &splits,
            &[0.1; 6],
            Assay::PERFECT,
            &MonteCarloConfig::new(0, 1),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ScreenError::InvalidParameter {
                name: "iterations",
                ..
            }
        ));
    }

    #[test]
    fn mismatched_partition_length_is_rejected() {
        let (partition, splits) = pooled_design();
        let err = aggregate(
            &partition,
            &splits,
            &[0.1; 5],
            Assay::PERFECT,
            &MonteCarloConfig::new(10, 1),
        )
        .unwrap_err();
        assert!(matches!(err, ScreenError::InvalidParameter { .. }));
    }

    #[test]
    fn expected_tests_is_the_mean_of_per_iteration_counts() {
        let (partition, splits) = pooled_design();
        let prevalences = [0.1, 0.2, 0.3, 0.05, 0.15, 0.4];
        let assay = Assay::new(0.85, 0.9).unwrap();
        let config = MonteCarloConfig {
            iterations: 1_000,
            seed: 77,
            chunk_size: 64,
            deadline: None,
        };

        let summary = aggregate(&partition, &splits, &prevalences, assay, &config).unwrap();

        // Re-run the same iterations sequentially with the same streams.
        let groups = load_initial_groups(&partition).unwrap();
        let mut pooled = IterationCounts::default();
        let mut tests_per_iteration = Vec::new();
        for i in 0..config.iterations {
            let mut rng = iteration_rng(config.seed, i as u64);
            let counts = run_iteration(&prevalences, &groups, &splits, assay, &mut rng).unwrap();
            tests_per_iteration.push(counts.tests as f64);
            pooled += counts;
        }
        let mean = tests_per_iteration.iter().sum::<f64>() / tests_per_iteration.len() as f64;

        assert_eq!(summary.iterations, 1_000);
        assert_eq!(summary.totals, pooled);
        assert_abs_diff_eq!(summary.expected_tests, mean, epsilon = 1e-12);
        assert_abs_diff_eq!(
            summary.sensitivity.unwrap(),
            pooled.est_1 as f64 / pooled.true_1 as f64,
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(
            summary.specificity.unwrap(),
            pooled.est_0 as f64 / pooled.true_0 as f64,
            epsilon = 1e-12
        );
    }

    #[test]
    fn same_seed_same_summary_regardless_of_chunking() {
        let (partition, splits) = pooled_design();
        let prevalences = [0.3; 6];
        let assay = Assay::new(0.9, 0.95).unwrap();

        let coarse = MonteCarloConfig {
            iterations: 500,
            seed: 5,
            chunk_size: 500,
            deadline: None,
        };
        let fine = MonteCarloConfig {
            chunk_size: 7,
            ..coarse.clone()
        };

        let a = aggregate(&partition, &splits, &prevalences, assay, &coarse).unwrap();
        let b = aggregate(&partition, &splits, &prevalences, assay, &fine).unwrap();
        assert_eq!(a, b);

        let other_seed = MonteCarloConfig { seed: 6, ..coarse };
        let c = aggregate(&partition, &splits, &prevalences, assay, &other_seed).unwrap();
        assert_ne!(a.totals, c.totals);
    }

    #[test]
    fn same_seed_same_summary_regardless_of_thread_count() {
        let (partition, splits) = pooled_design();
        let prevalences = [0.25; 6];
        let assay = Assay::new(0.8, 0.7).unwrap();
        let config = MonteCarloConfig {
            iterations: 700,
            seed: 31,
            chunk_size: 16,
            deadline: None,
        };
        let run_on = |threads: usize| {
            rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .unwrap()
                .install(|| aggregate(&partition, &splits, &prevalences, assay, &config))
                .unwrap()
        };

        let single = run_on(1);
        assert_eq!(single.iterations, 700);
        assert_eq!(run_on(4), single);
        assert_eq!(run_on(7), single);
    }

    #[test]
    fn zero_prevalence_leaves_sensitivity_undefined() {
        let (partition, splits) = pooled_design();
        let summary = aggregate(
            &partition,
            &splits,
            &[0.0; 6],
            Assay::PERFECT,
            &MonteCarloConfig::new(50, 3),
        )
        .unwrap();
        assert_eq!(summary.sensitivity, None);
        assert_eq!(summary.specificity, Some(1.0));
        // One negative test per pool.
        assert_abs_diff_eq!(summary.expected_tests, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn expired_deadline_runs_nothing() {
        let (partition, splits) = pooled_design();
        let config = MonteCarloConfig {
            deadline: Some(Duration::ZERO),
            ..MonteCarloConfig::new(100, 1)
        };
        let err = aggregate(&partition, &splits, &[0.1; 6], Assay::PERFECT, &config).unwrap_err();
        assert_eq!(err, ScreenError::DeadlineExceeded(Duration::ZERO));
    }

    #[test]
    fn progress_observer_sees_every_iteration() {
        let (partition, splits) = pooled_design();
        let progress = CountingProgress::default();
        let config = MonteCarloConfig {
            iterations: 300,
            seed: 9,
            chunk_size: 32,
            deadline: None,
        };
        aggregate_with_progress(
            &partition,
            &splits,
            &[0.2; 6],
            Assay::PERFECT,
            &config,
            &progress,
        )
        .unwrap();

        assert_eq!(progress.total.load(Ordering::SeqCst), 300);
        assert_eq!(progress.advanced.load(Ordering::SeqCst), 300);
        assert_eq!(progress.finished.load(Ordering::SeqCst), 1);
    }
}
