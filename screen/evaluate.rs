//! # Downstream-facing operations
//!
//! The entry points a caller uses to evaluate a design: fetch it from the
//! optimizer, estimate its operating characteristics by Monte Carlo, replay it
//! on a known status vector, or run a single pooled test.

use crate::design::{Design, DesignOptimizer};
use crate::error::{ScreenError, validate_prevalences};
use crate::monte_carlo::{MonteCarloConfig, aggregate_with_progress};
use crate::oracle::Assay;
use crate::progress::{NoopScreenProgress, ScreenProgressObserver};
use crate::simulate::replay;
use crate::types::{GroupRange, Status, TestCounter, statuses_from_u8};
use rand::Rng;

/// Which assay accuracy the design is optimized for when replaying.
///
/// The replay always simulates the actual assay; `Perfect` asks the optimizer
/// for the design it would choose if tests never erred, which shows what
/// ignoring misclassification at design time costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DesignAccuracy {
    #[default]
    Assay,
    Perfect,
}

/// A design together with its simulated operating characteristics.
#[derive(Debug, Clone, PartialEq)]
pub struct MonteCarloEvaluation {
    pub design: Design,
    pub simulated_expected_tests: f64,
    pub sensitivity: Option<f64>,
    pub specificity: Option<f64>,
    pub iterations: usize,
}

/// The result of replaying a design on a known status vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayReport {
    pub classification: Vec<Status>,
    pub sensitivity: f64,
    pub specificity: f64,
    pub total_tests: u64,
    /// The optimizer's analytic expected test count for the design used.
    pub expected_tests: f64,
}

/// Asks the optimizer for a design and checks it fits the population.
pub fn evaluate_design<O: DesignOptimizer + ?Sized>(
    optimizer: &O,
    prevalences: &[f64],
    assay: Assay,
) -> Result<Design, ScreenError> {
    validate_prevalences(prevalences)?;
    let design = optimizer.optimize(prevalences, assay)?;
    design.validate(prevalences.len())?;
    log::info!(
        "Design for {} individuals: {} initial groups, analytic expected tests {:.4}.",
        prevalences.len(),
        design.initial_groups()?.len(),
        design.expected_tests
    );
    Ok(design)
}

/// [`evaluate_design`] followed by a Monte Carlo estimate of the design's
/// expected tests, sensitivity and specificity.
pub fn evaluate_design_with_monte_carlo<O: DesignOptimizer + ?Sized>(
    optimizer: &O,
    prevalences: &[f64],
    assay: Assay,
    config: &MonteCarloConfig,
) -> Result<MonteCarloEvaluation, ScreenError> {
    evaluate_design_with_progress(optimizer, prevalences, assay, config, &NoopScreenProgress)
}

/// [`evaluate_design_with_monte_carlo`] with progress reporting.
pub fn evaluate_design_with_progress<O: DesignOptimizer + ?Sized>(
    optimizer: &O,
    prevalences: &[f64],
    assay: Assay,
    config: &MonteCarloConfig,
    progress: &dyn ScreenProgressObserver,
) -> Result<MonteCarloEvaluation, ScreenError> {
    let design = evaluate_design(optimizer, prevalences, assay)?;
    let summary = aggregate_with_progress(
        &design.partition,
        &design.splits,
        prevalences,
        assay,
        config,
        progress,
    )?;
    Ok(MonteCarloEvaluation {
        design,
        simulated_expected_tests: summary.expected_tests,
        sensitivity: summary.sensitivity,
        specificity: summary.specificity,
        iterations: summary.iterations,
    })
}

/// Replays the optimizer's design on a known 0/1 status vector.
///
/// Measured sensitivity and specificity come from this single pass, so a
/// vector with no positives (or no negatives) is a `DegenerateRatio` error.
pub fn simulate_given_outcomes<O: DesignOptimizer + ?Sized, R: Rng>(
    optimizer: &O,
    true_status: &[u8],
    prevalences: &[f64],
    assay: Assay,
    design_accuracy: DesignAccuracy,
    rng: &mut R,
) -> Result<ReplayReport, ScreenError> {
    if true_status.len() != prevalences.len() {
        return Err(ScreenError::invalid(
            "true_status",
            format!(
                "status vector has {} entries but there are {} prevalences",
                true_status.len(),
                prevalences.len()
            ),
        ));
    }
    let status = statuses_from_u8(true_status)?;
    let design_assay = match design_accuracy {
        DesignAccuracy::Assay => assay,
        DesignAccuracy::Perfect => Assay::PERFECT,
    };
    let design = evaluate_design(optimizer, prevalences, design_assay)?;
    let groups = design.initial_groups()?;

    let outcome = replay(&status, &groups, &design.splits, assay, rng)?;
    Ok(ReplayReport {
        sensitivity: outcome.sensitivity()?,
        specificity: outcome.specificity()?,
        total_tests: outcome.total_tests(),
        expected_tests: design.expected_tests,
        classification: outcome.classification,
    })
}

/// Tests the whole status vector as one pool.
pub fn test_range<R: Rng>(true_status: &[u8], assay: Assay, rng: &mut R) -> Result<Status, ScreenError> {
    if true_status.is_empty() {
        return Err(ScreenError::invalid("true_status", "cannot test an empty pool"));
    }
    let status = statuses_from_u8(true_status)?;
    let mut tests = TestCounter::new();
    assay.test(GroupRange::new(0, status.len() - 1), &status, rng, &mut tests)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::PrecomputedDesign;
    use crate::split_table::SplitTable;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn worked_example() -> PrecomputedDesign {
        let mut splits = SplitTable::new();
        splits.insert(0, 3, 2);
        splits.insert(0, 1, 1);
        splits.insert(2, 3, 1);
        PrecomputedDesign::new(
            Design {
                expected_tests: 2.1,
                partition: vec![4, 0, 0, 0],
                splits,
            },
            Assay::PERFECT,
        )
    }

    #[test]
    fn replay_report_carries_both_test_counts() {
        let optimizer = worked_example();
        let mut rng = StdRng::seed_from_u64(3);
        let report = simulate_given_outcomes(
            &optimizer,
            &[0, 1, 0, 0],
            &[0.1, 0.3, 0.1, 0.1],
            Assay::PERFECT,
            DesignAccuracy::Assay,
            &mut rng,
        )
        .unwrap();

        assert_eq!(
            report.classification,
            statuses_from_u8(&[0, 1, 0, 0]).unwrap()
        );
        assert_eq!(report.total_tests, 4);
        assert_eq!(report.expected_tests, 2.1);
        assert_eq!(report.sensitivity, 1.0);
        assert_eq!(report.specificity, 1.0);
    }

    #[test]
    fn replay_validates_its_inputs() {
        let optimizer = worked_example();
        let mut rng = StdRng::seed_from_u64(3);
        let q = [0.1; 4];

        let short = simulate_given_outcomes(
            &optimizer,
            &[0, 1, 0],
            &q,
            Assay::PERFECT,
            DesignAccuracy::Assay,
            &mut rng,
        );
        assert!(matches!(
            short,
            Err(ScreenError::InvalidParameter {
                name: "true_status",
                ..
            })
        ));

        let non_binary = simulate_given_outcomes(
            &optimizer,
            &[0, 2, 0, 0],
            &q,
            Assay::PERFECT,
            DesignAccuracy::Assay,
            &mut rng,
        );
        assert!(matches!(
            non_binary,
            Err(ScreenError::InvalidParameter { name: "status", .. })
        ));

        let all_negative = simulate_given_outcomes(
            &optimizer,
            &[0, 0, 0, 0],
            &q,
            Assay::PERFECT,
            DesignAccuracy::Assay,
            &mut rng,
        );
        assert!(matches!(
            all_negative,
            Err(ScreenError::DegenerateRatio {
                measure: "sensitivity",
                ..
            })
        ));
    }

    #[test]
    fn perfect_design_accuracy_asks_for_the_perfect_assay_design() {
        let requested = std::sync::Mutex::new(Vec::new());
        let optimizer = |q: &[f64], assay: Assay| -> Result<Design, ScreenError> {
            requested.lock().unwrap().push(assay);
            Ok(Design {
                expected_tests: q.len() as f64,
                partition: vec![1; q.len()],
                splits: SplitTable::new(),
            })
        };
        let assay = Assay::new(0.95, 0.99).unwrap();
        let mut rng = StdRng::seed_from_u64(10);

        simulate_given_outcomes(
            &optimizer,
            &[1, 0, 1],
            &[0.5; 3],
            assay,
            DesignAccuracy::Perfect,
            &mut rng,
        )
        .unwrap();
        assert_eq!(*requested.lock().unwrap(), vec![Assay::PERFECT]);
    }

    #[test]
    fn perfect_design_accuracy_needs_a_perfect_assay_design() {
        let assay = Assay::new(0.9, 0.9).unwrap();
        let design = Design {
            expected_tests: 9.0,
            partition: vec![1; 3],
            splits: SplitTable::new(),
        };
        let mut rng = StdRng::seed_from_u64(2);

        let without = PrecomputedDesign::new(design.clone(), assay);
        let err = simulate_given_outcomes(
            &without,
            &[1, 0, 0],
            &[0.2; 3],
            assay,
            DesignAccuracy::Perfect,
            &mut rng,
        )
        .unwrap_err();
        assert!(matches!(err, ScreenError::InvalidParameter { name: "assay", .. }));

        let perfect = Design {
            expected_tests: 3.0,
            ..design.clone()
        };
        let with = PrecomputedDesign::new(design, assay).with_perfect_assay_design(perfect);
        let report = simulate_given_outcomes(
            &with,
            &[1, 0, 0],
            &[0.2; 3],
            assay,
            DesignAccuracy::Perfect,
            &mut rng,
        )
        .unwrap();
        assert_eq!(report.expected_tests, 3.0);
    }

    #[test]
    fn monte_carlo_evaluation_keeps_the_design() {
        let optimizer = worked_example();
        let evaluation = evaluate_design_with_monte_carlo(
            &optimizer,
            &[0.05, 0.1, 0.05, 0.05],
            Assay::PERFECT,
            &MonteCarloConfig::new(400, 8),
        )
        .unwrap();

        assert_eq!(evaluation.design.expected_tests, 2.1);
        assert_eq!(evaluation.iterations, 400);
        assert!(evaluation.simulated_expected_tests >= 1.0);
        assert_eq!(evaluation.specificity, Some(1.0));
        if let Some(se) = evaluation.sensitivity {
            assert_eq!(se, 1.0);
        }
    }

    #[test]
    fn evaluate_design_rejects_a_mismatched_design() {
        let optimizer = worked_example();
        assert!(evaluate_design(&optimizer, &[0.1; 5], Assay::PERFECT).is_err());
        assert!(evaluate_design(&optimizer, &[0.1, 0.1, 2.0, 0.1], Assay::PERFECT).is_err());
    }

    #[test]
    fn test_range_tests_the_whole_vector_once() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            test_range(&[0, 0, 1], Assay::PERFECT, &mut rng).unwrap(),
            Status::Positive
        );
        assert_eq!(
            test_range(&[0, 0, 0], Assay::PERFECT, &mut rng).unwrap(),
            Status::Negative
        );
        assert!(test_range(&[], Assay::PERFECT, &mut rng).is_err());
        assert!(test_range(&[3], Assay::PERFECT, &mut rng).is_err());
    }
}
