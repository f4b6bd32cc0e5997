#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod config;
pub mod design;
pub mod error;
pub mod evaluate;
pub mod io;
pub mod monte_carlo;
pub mod oracle;
pub mod partition;
pub mod progress;
pub mod resolve;
pub mod simulate;
pub mod split_table;
pub mod types;

pub use design::{Design, DesignOptimizer, PrecomputedDesign};
pub use error::ScreenError;
pub use evaluate::{
    DesignAccuracy, MonteCarloEvaluation, ReplayReport, evaluate_design,
    evaluate_design_with_monte_carlo, simulate_given_outcomes, test_range,
};
pub use monte_carlo::{MonteCarloConfig, MonteCarloSummary, aggregate};
pub use oracle::Assay;
pub use split_table::SplitTable;
pub use types::{GroupRange, IterationCounts, Status, TestCounter};
