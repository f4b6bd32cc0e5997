use std::time::Duration;
use thiserror::Error;

/// Every way the screening engine can refuse to produce a result.
///
/// Stochastic test outcomes are never errors: a misclassified pool is the
/// model working as intended. These variants describe inputs the engine cannot
/// give a meaning to.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScreenError {
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error(
        "Measured {measure} is undefined because the realization contains no truly {class} individuals."
    )]
    DegenerateRatio {
        measure: &'static str,
        class: &'static str,
    },

    #[error("Malformed design: {0}")]
    MalformedDesign(String),

    #[error("The Monte Carlo deadline of {0:?} expired before a single iteration completed.")]
    DeadlineExceeded(Duration),
}

impl ScreenError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

/// Checks that every prevalence is a probability.
pub(crate) fn validate_prevalences(prevalences: &[f64]) -> Result<(), ScreenError> {
    match prevalences
        .iter()
        .enumerate()
        .find(|&(_, &q)| !(q.is_finite() && (0.0..=1.0).contains(&q)))
    {
        Some((idx, q)) => Err(ScreenError::invalid(
            "prevalences",
            format!("entry {idx} is {q}, which is not a probability in [0, 1]"),
        )),
        None => Ok(()),
    }
}
