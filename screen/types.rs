// ========================================================================================
//                             High-Level Data Contracts
// ========================================================================================

// This file is ONLY for types that are SHARED BETWEEN FILES, not types that only are used in one file.

use crate::error::ScreenError;
use std::fmt;
use std::ops::AddAssign;

/// The binary condition of one individual, or the outcome of one pooled test.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Status {
    #[default]
    Negative = 0,
    Positive = 1,
}

impl Status {
    #[inline(always)]
    pub fn is_positive(self) -> bool {
        self == Status::Positive
    }

    #[inline(always)]
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl From<bool> for Status {
    #[inline(always)]
    fn from(positive: bool) -> Self {
        if positive {
            Status::Positive
        } else {
            Status::Negative
        }
    }
}

impl TryFrom<u8> for Status {
    type Error = ScreenError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Status::Negative),
            1 => Ok(Status::Positive),
            other => Err(ScreenError::invalid(
                "status",
                format!("{other} is not a binary status (expected 0 or 1)"),
            )),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// Converts a raw 0/1 vector into statuses, rejecting anything else.
pub fn statuses_from_u8(raw: &[u8]) -> Result<Vec<Status>, ScreenError> {
    raw.iter().map(|&v| Status::try_from(v)).collect()
}

/// An inclusive, non-empty range of population indices: one pool.
///
/// Ranges never permute the population; `start..=end` always refers to the
/// individuals in their original order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupRange {
    pub start: usize,
    pub end: usize,
}

impl GroupRange {
    #[inline]
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "Inverted group range created: {start}..={end}");
        Self { start, end }
    }

    #[inline]
    pub fn singleton(index: usize) -> Self {
        Self {
            start: index,
            end: index,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    #[inline]
    pub fn is_singleton(&self) -> bool {
        self.start == self.end
    }

    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        index >= self.start && index <= self.end
    }
}

impl fmt::Display for GroupRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Number of physical tests consumed by one resolution pass.
///
/// A counter belongs to exactly one pass. It is threaded through the resolver
/// by `&mut`, so concurrent iterations can never share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct TestCounter(u64);

impl TestCounter {
    #[inline(always)]
    pub fn new() -> Self {
        Self(0)
    }

    #[inline(always)]
    pub fn increment(&mut self) {
        self.0 += 1;
    }

    #[inline(always)]
    pub fn get(&self) -> u64 {
        self.0
    }
}

/// Classification accuracy tallies for one population realization.
///
/// Tallies from many realizations are pooled by addition; ratios are only
/// taken after pooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IterationCounts {
    /// Truly positive individuals classified positive.
    pub est_1: u64,
    /// Truly negative individuals classified negative.
    pub est_0: u64,
    /// Truly positive individuals.
    pub true_1: u64,
    /// Truly negative individuals.
    pub true_0: u64,
    /// Tests consumed.
    pub tests: u64,
}

impl IterationCounts {
    /// Tallies a classification against the truth it was produced from.
    pub fn tally(truth: &[Status], classification: &[Status], tests: TestCounter) -> Self {
        debug_assert_eq!(truth.len(), classification.len());
        let mut counts = Self {
            tests: tests.get(),
            ..Self::default()
        };
        for (&x, &x_hat) in truth.iter().zip(classification) {
            match (x, x_hat) {
                (Status::Positive, Status::Positive) => counts.est_1 += 1,
                (Status::Negative, Status::Negative) => counts.est_0 += 1,
                _ => {}
            }
            if x.is_positive() {
                counts.true_1 += 1;
            }
        }
        counts.true_0 = truth.len() as u64 - counts.true_1;
        counts
    }

    /// Fraction of truly positive individuals classified positive.
    pub fn sensitivity(&self) -> Result<f64, ScreenError> {
        if self.true_1 == 0 {
            return Err(ScreenError::DegenerateRatio {
                measure: "sensitivity",
                class: "positive",
            });
        }
        Ok(self.est_1 as f64 / self.true_1 as f64)
    }

    /// Fraction of truly negative individuals classified negative.
    pub fn specificity(&self) -> Result<f64, ScreenError> {
        if self.true_0 == 0 {
            return Err(ScreenError::DegenerateRatio {
                measure: "specificity",
                class: "negative",
            });
        }
        Ok(self.est_0 as f64 / self.true_0 as f64)
    }
}

impl AddAssign for IterationCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.est_1 += rhs.est_1;
        self.est_0 += rhs.est_0;
        self.true_1 += rhs.true_1;
        self.true_0 += rhs.true_0;
        self.tests += rhs.tests;
    }
}
