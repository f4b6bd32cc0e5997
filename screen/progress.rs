use std::fmt;

/// Stages reported while evaluating a design.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScreenProgressStage {
    MonteCarlo,
}

impl ScreenProgressStage {
    pub fn describe(self) -> &'static str {
        match self {
            Self::MonteCarlo => "Monte Carlo iterations",
        }
    }
}

impl fmt::Display for ScreenProgressStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Observer for reporting incremental progress while iterations run.
///
/// Iterations run on the rayon pool, so callbacks arrive from worker threads
/// and take `&self`. `on_stage_advance` reports a delta, not a running total.
pub trait ScreenProgressObserver: Sync {
    fn on_stage_start(&self, stage: ScreenProgressStage, total_iterations: usize) {
        let _ = (stage, total_iterations);
    }
    fn on_stage_advance(&self, stage: ScreenProgressStage, completed_iterations: usize) {
        let _ = (stage, completed_iterations);
    }
    fn on_stage_finish(&self, stage: ScreenProgressStage) {
        let _ = stage;
    }
}

#[derive(Default)]
pub struct NoopScreenProgress;

impl ScreenProgressObserver for NoopScreenProgress {}
