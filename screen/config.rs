//! Simulation settings as read from a TOML file and the command line.

use crate::error::ScreenError;
use crate::io::InputError;
use crate::monte_carlo::{DEFAULT_CHUNK_SIZE, DEFAULT_ITERATIONS, MonteCarloConfig};
use crate::oracle::Assay;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Every knob of a screening evaluation. Missing fields take their defaults,
/// so a config file only needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    pub sensitivity: f64,
    pub specificity: f64,
    pub iterations: usize,
    pub seed: u64,
    pub chunk_size: usize,
    /// Worker threads for the Monte Carlo loop; `None` uses every core.
    pub threads: Option<usize>,
    /// Wall-clock budget for the Monte Carlo loop, in seconds.
    pub deadline_secs: Option<f64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            sensitivity: 1.0,
            specificity: 1.0,
            iterations: DEFAULT_ITERATIONS,
            seed: 0,
            chunk_size: DEFAULT_CHUNK_SIZE,
            threads: None,
            deadline_secs: None,
        }
    }
}

impl SimulationConfig {
    pub fn load(path: &Path) -> Result<Self, InputError> {
        let content = fs::read_to_string(path)?;
        let config: SimulationConfig = toml::from_str(&content)?;
        log::debug!("Loaded simulation config from {}: {config:?}", path.display());
        Ok(config)
    }

    pub fn assay(&self) -> Result<Assay, ScreenError> {
        Assay::new(self.sensitivity, self.specificity)
    }

    pub fn thread_count(&self) -> usize {
        self.threads.unwrap_or_else(num_cpus::get).max(1)
    }

    /// The validated runtime form consumed by the aggregator.
    pub fn monte_carlo(&self) -> Result<MonteCarloConfig, ScreenError> {
        let deadline = match self.deadline_secs {
            None => None,
            Some(secs) if secs.is_finite() && secs > 0.0 => Some(Duration::from_secs_f64(secs)),
            Some(secs) => {
                return Err(ScreenError::invalid(
                    "deadline_secs",
                    format!("{secs} is not a positive number of seconds"),
                ));
            }
        };
        let config = MonteCarloConfig {
            iterations: self.iterations,
            seed: self.seed,
            chunk_size: self.chunk_size,
            deadline,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: SimulationConfig =
            toml::from_str("sensitivity = 0.9\nspecificity = 0.95\nseed = 42\n").unwrap();
        assert_eq!(config.sensitivity, 0.9);
        assert_eq!(config.seed, 42);
        assert_eq!(config.iterations, DEFAULT_ITERATIONS);
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert!(config.threads.is_none());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<SimulationConfig>("sensitivty = 0.9\n").is_err());
    }

    #[test]
    fn runtime_config_is_validated() {
        let mut config = SimulationConfig {
            deadline_secs: Some(1.5),
            ..SimulationConfig::default()
        };
        let mc = config.monte_carlo().unwrap();
        assert_eq!(mc.deadline, Some(Duration::from_millis(1500)));

        config.deadline_secs = Some(-1.0);
        assert!(config.monte_carlo().is_err());

        config.deadline_secs = None;
        config.iterations = 0;
        assert!(matches!(
            config.monte_carlo(),
            Err(ScreenError::InvalidParameter {
                name: "iterations",
                ..
            })
        ));
    }

    #[test]
    fn assay_and_threads_come_from_the_config() {
        let config = SimulationConfig {
            sensitivity: 1.1,
            threads: Some(0),
            ..SimulationConfig::default()
        };
        assert!(config.assay().is_err());
        assert_eq!(config.thread_count(), 1);
    }

    #[test]
    fn load_reads_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("screen.toml");
        fs::write(&path, "iterations = 500\nthreads = 2\ndeadline_secs = 30.0\n").unwrap();
        let config = SimulationConfig::load(&path).unwrap();
        assert_eq!(config.iterations, 500);
        assert_eq!(config.thread_count(), 2);
        assert_eq!(config.monte_carlo().unwrap().deadline, Some(Duration::from_secs(30)));
    }
}
