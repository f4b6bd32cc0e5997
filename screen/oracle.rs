//! # Single-Test Oracle
//!
//! One call is one physical pooled test. The pool's true status is the logical
//! OR of its members; the reported outcome is that status passed through an
//! imperfect assay. Misclassification is drawn fresh on every call from the
//! random source the caller injects, so the oracle holds no hidden state.

use crate::error::ScreenError;
use crate::types::{GroupRange, Status, TestCounter};
use rand::Rng;
use rand::distributions::Standard;

/// Accuracy of the diagnostic assay applied to every pool.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assay {
    sensitivity: f64,
    specificity: f64,
}

impl Assay {
    /// A perfect assay: every pool is reported as its true status.
    pub const PERFECT: Assay = Assay {
        sensitivity: 1.0,
        specificity: 1.0,
    };

    pub fn new(sensitivity: f64, specificity: f64) -> Result<Self, ScreenError> {
        check_probability("sensitivity", sensitivity)?;
        check_probability("specificity", specificity)?;
        if sensitivity == 0.0 {
            log::warn!("Assay sensitivity is 0; every defective pool will test negative.");
        }
        Ok(Self {
            sensitivity,
            specificity,
        })
    }

    #[inline(always)]
    pub fn sensitivity(&self) -> f64 {
        self.sensitivity
    }

    #[inline(always)]
    pub fn specificity(&self) -> f64 {
        self.specificity
    }

    /// Runs one pooled test over `range` and records it in `tests`.
    ///
    /// A defective pool reads positive when the uniform draw falls below Se; a
    /// clean pool reads positive when it lands above Sp. Exactly one draw and
    /// one counter increment happen per call, whatever the pool size.
    pub fn test<R: Rng>(
        &self,
        range: GroupRange,
        status: &[Status],
        rng: &mut R,
        tests: &mut TestCounter,
    ) -> Result<Status, ScreenError> {
        if range.start > range.end || range.end >= status.len() {
            return Err(ScreenError::MalformedDesign(format!(
                "pool {range} lies outside a population of {} individuals",
                status.len()
            )));
        }
        let defective = status[range.start..=range.end]
            .iter()
            .any(|s| s.is_positive());
        Ok(self.draw(defective, rng, tests))
    }

    #[inline]
    fn draw<R: Rng>(&self, defective: bool, rng: &mut R, tests: &mut TestCounter) -> Status {
        let u: f64 = rng.sample(Standard);
        tests.increment();
        if defective {
            Status::from(u < self.sensitivity)
        } else {
            Status::from(u > self.specificity)
        }
    }
}

fn check_probability(name: &'static str, value: f64) -> Result<(), ScreenError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ScreenError::invalid(
            name,
            format!("{value} is not a probability in [0, 1]"),
        ))
    }
}
