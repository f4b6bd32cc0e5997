//! # Recursive Group Resolver
//!
//! Resolves one pool to a per-individual classification by adaptive retesting.
//!
//! The protocol has two modes. *Resolve* tests a pool whose status is unknown:
//! a negative clears every member at the cost of one test, a positive hands the
//! pool to *split*. *Split* works on a pool known to be positive, peeling
//! sub-pools off its left edge using the sizes from the split table. Negative
//! sub-pools are cleared; when only one member remains after everything to
//! its left cleared, that member is declared positive by elimination without a
//! test. A positive sub-pool is split in turn, after which the untouched rest
//! of the parent returns to resolve mode, since it may hold further positives.
//!
//! The two modes are naturally mutually recursive. Here they are frames on an
//! explicit stack so that pathological split tables cannot exhaust the call
//! stack. Frames are popped in the same order the recursive formulation would
//! enter them, which keeps both the classification order and the sequence of
//! random draws identical to it.

use crate::error::ScreenError;
use crate::oracle::Assay;
use crate::split_table::SplitTable;
use crate::types::{GroupRange, Status, TestCounter};
use rand::Rng;

#[derive(Debug, Clone, Copy)]
enum Frame {
    /// Status of `range` unknown.
    Resolve(GroupRange),
    /// `[cursor, end]` is known to contain a positive. `entered` is true when
    /// the whole range has just tested positive, false when it is the
    /// remainder left after negative sub-pools.
    Split {
        cursor: usize,
        end: usize,
        entered: bool,
    },
}

/// Everything the resolver reads. Shared immutably across all pools and all
/// iterations; only the random source and the counter are per-pass.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    splits: &'a SplitTable,
    assay: Assay,
}

impl<'a> Resolver<'a> {
    pub fn new(splits: &'a SplitTable, assay: Assay) -> Self {
        Self { splits, assay }
    }

    /// Classifies every member of `range`, returning exactly `range.len()`
    /// statuses in index order.
    pub fn resolve<R: Rng>(
        &self,
        range: GroupRange,
        status: &[Status],
        rng: &mut R,
        tests: &mut TestCounter,
    ) -> Result<Vec<Status>, ScreenError> {
        let mut out = Vec::with_capacity(range.len());
        self.resolve_into(range, status, rng, tests, &mut out)?;
        Ok(out)
    }

    /// Like [`Resolver::resolve`], appending to `out` so that consecutive pools
    /// build one population-wide classification without intermediate vectors.
    pub fn resolve_into<R: Rng>(
        &self,
        range: GroupRange,
        status: &[Status],
        rng: &mut R,
        tests: &mut TestCounter,
        out: &mut Vec<Status>,
    ) -> Result<(), ScreenError> {
        if range.start > range.end || range.end >= status.len() {
            return Err(ScreenError::MalformedDesign(format!(
                "pool {range} lies outside a population of {} individuals",
                status.len()
            )));
        }

        let expected_len = out.len() + range.len();
        let mut stack = vec![Frame::Resolve(range)];

        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Resolve(pool) => {
                    let outcome = self.assay.test(pool, status, rng, tests)?;
                    if pool.is_singleton() {
                        out.push(outcome);
                    } else if outcome.is_positive() {
                        stack.push(Frame::Split {
                            cursor: pool.start,
                            end: pool.end,
                            entered: true,
                        });
                    } else {
                        out.extend(std::iter::repeat_n(Status::Negative, pool.len()));
                    }
                }
                Frame::Split {
                    cursor,
                    end,
                    entered,
                } => {
                    let sub = self.peel(cursor, end, entered)?;
                    let outcome = self.assay.test(sub, status, rng, tests)?;

                    if !outcome.is_positive() {
                        out.extend(std::iter::repeat_n(Status::Negative, sub.len()));
                        let next = sub.end + 1;
                        if sub.end == end {
                            continue;
                        }
                        if next == end {
                            // Everything else in a positive pool cleared.
                            out.push(Status::Positive);
                            continue;
                        }
                        stack.push(Frame::Split {
                            cursor: next,
                            end,
                            entered: false,
                        });
                        continue;
                    }

                    // The rest of the parent is resolved after the positive
                    // sub-pool, so it goes on the stack first.
                    if sub.end < end {
                        stack.push(Frame::Resolve(GroupRange::new(sub.end + 1, end)));
                    }
                    if sub.is_singleton() {
                        out.push(Status::Positive);
                    } else {
                        stack.push(Frame::Split {
                            cursor: sub.start,
                            end: sub.end,
                            entered: true,
                        });
                    }
                }
            }
        }

        debug_assert_eq!(out.len(), expected_len);
        Ok(())
    }

    /// The next sub-pool to test inside the positive range `[cursor, end]`.
    fn peel(&self, cursor: usize, end: usize, entered: bool) -> Result<GroupRange, ScreenError> {
        let size = self.splits.get(cursor, end).ok_or_else(|| {
            ScreenError::MalformedDesign(format!(
                "split table has no entry for positive pool [{cursor}, {end}]"
            ))
        })?;
        let len = end - cursor + 1;
        if size == 0 || size > len {
            return Err(ScreenError::MalformedDesign(format!(
                "split table entry for [{cursor}, {end}] has size {size}, outside 1..={len}"
            )));
        }
        // Re-testing the pool that just came back positive would never make
        // progress.
        if entered && size == len {
            return Err(ScreenError::MalformedDesign(format!(
                "split table entry for [{cursor}, {end}] does not subdivide the pool"
            )));
        }
        Ok(GroupRange::new(cursor, cursor + size - 1))
    }
}
