//! Experiment configuration.
//!
//! One immutable [`ExperimentConfig`] is built per experiment (usually from a
//! JSON file) and passed by reference into every reader, validator and
//! runner. Missing JSON fields fall back to the defaults of the reference
//! cell-free infection experiment.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{Error, Result};
use crate::window::CutoffWindow;

/// Configuration validation failures.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("at least one prior parameter is required")]
    NoPriors,
    #[error("parameter name '{0}' is empty or contains '-'")]
    InvalidParameterName(String),
    #[error("parameter '{0}' is declared more than once")]
    DuplicateParameter(String),
    #[error("prior '{name}' has invalid bounds [{low}, {high})")]
    InvalidPriorBounds { name: String, low: f64, high: f64 },
    #[error("grid_size must be positive")]
    InvalidGridSize,
    #[error(
        "cutoff window is empty: timesteps={timesteps}, cut_off_start={start}, cut_off_end={end}"
    )]
    EmptyWindow {
        timesteps: usize,
        start: usize,
        end: usize,
    },
    #[error("param_upper_bound must be finite")]
    InvalidUpperBound,
    #[error("poll_interval_ms must be positive")]
    InvalidPollInterval,
    #[error("error_marker must not be empty")]
    EmptyErrorMarker,
}

/// Uniform prior declaration for one sampled parameter.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PriorSpec {
    pub name: String,
    #[serde(default)]
    pub low: f64,
    #[serde(default = "default_prior_high")]
    pub high: f64,
}

fn default_prior_high() -> f64 {
    1.0
}

impl PriorSpec {
    pub fn uniform(name: &str, low: f64, high: f64) -> Self {
        Self {
            name: name.to_string(),
            low,
            high,
        }
    }
}

/// File names and column labels of the simulator's loggers.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogFiles {
    /// Per-cell discrete state log (`time`, `cell.id`, state column).
    pub cell_states: String,
    /// Per-timestep population counts.
    pub population: String,
    /// Grid log of cell ids.
    pub cell_ids: String,
    /// Grid log of the diffusing quantity.
    pub concentration: String,
    pub target_column: String,
    pub infected_column: String,
    pub time_column: String,
    pub cell_id_column: String,
    pub state_column: String,
}

impl Default for LogFiles {
    fn default() -> Self {
        Self {
            cell_states: "logger_1.csv".to_string(),
            population: "logger_2.csv".to_string(),
            cell_ids: "logger_4_cell.id.csv".to_string(),
            concentration: "logger_6_Ve.csv".to_string(),
            target_column: "celltype.target.size".to_string(),
            infected_column: "celltype.infected.size".to_string(),
            time_column: "time".to_string(),
            cell_id_column: "cell.id".to_string(),
            state_column: "V".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Sampled parameters, in the order used for parameter tensors.
    pub priors: Vec<PriorSpec>,
    /// Parameters passed to every simulation but not inferred.
    pub fixed_params: IndexMap<String, f64>,
    /// Root holding `model/` and the run output folder.
    pub data_path: PathBuf,
    /// Run output folder below `data_path`.
    pub folder: String,
    /// Glob (relative to `data_path/model`) selecting the model definition.
    pub model_pattern: String,
    /// Simulator executable.
    pub simulator_binary: String,
    /// Side length of the square lattice.
    pub grid_size: usize,
    /// Final simulated timestep.
    pub timesteps: usize,
    /// Warm-up timesteps dropped from the start of every series.
    pub cut_off_start: usize,
    /// Cool-down timesteps dropped from the end of every series.
    pub cut_off_end: usize,
    /// Use full grids instead of per-timestep aggregates. A request for
    /// lattices on the command line wins over `false` here.
    pub spatial: bool,
    /// Runs with any parameter above this bound are rejected.
    pub param_upper_bound: f64,
    /// Decimal digits kept when reading parameters back from directory names.
    pub param_precision: u32,
    /// Directory-name substring marking a failed run.
    pub error_marker: String,
    /// Discrete state value of infected cells.
    pub infected_state: f64,
    /// State assigned to lattice sites without a cell (id 0).
    pub empty_cell_state: f64,
    pub poll_interval_ms: u64,
    /// Give up waiting for the completion marker after this many seconds.
    /// `None` waits forever.
    pub completion_timeout_secs: Option<u64>,
    pub logs: LogFiles,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        let mut fixed_params = IndexMap::new();
        fixed_params.insert("cv".to_string(), 0.33);
        fixed_params.insert("DV".to_string(), 999.0);
        Self {
            priors: vec![
                PriorSpec::uniform("b_cf", 0.0, 1.0),
                PriorSpec::uniform("p_V", 0.0, 1.0),
            ],
            fixed_params,
            data_path: PathBuf::from("."),
            folder: "output".to_string(),
            model_pattern: "*.xml".to_string(),
            simulator_binary: "morpheus".to_string(),
            grid_size: 10,
            timesteps: 50,
            cut_off_start: 9,
            cut_off_end: 10,
            spatial: false,
            param_upper_bound: 1.0,
            param_precision: 3,
            error_marker: "error".to_string(),
            infected_state: 1.0,
            empty_cell_state: 0.0,
            poll_interval_ms: 1000,
            completion_timeout_secs: None,
            logs: LogFiles::default(),
        }
    }
}

impl ExperimentConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.validate_priors()?;
        self.validate_lattice()?;
        if !self.param_upper_bound.is_finite() {
            return Err(ConfigError::InvalidUpperBound);
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidPollInterval);
        }
        if self.error_marker.is_empty() {
            return Err(ConfigError::EmptyErrorMarker);
        }
        Ok(())
    }

    fn validate_priors(&self) -> std::result::Result<(), ConfigError> {
        if self.priors.is_empty() {
            return Err(ConfigError::NoPriors);
        }
        let mut seen = HashSet::new();
        let names = self
            .priors
            .iter()
            .map(|p| p.name.as_str())
            .chain(self.fixed_params.keys().map(String::as_str));
        for name in names {
            if name.is_empty() || name.contains('-') {
                return Err(ConfigError::InvalidParameterName(name.to_string()));
            }
            if !seen.insert(name) {
                return Err(ConfigError::DuplicateParameter(name.to_string()));
            }
        }
        for prior in &self.priors {
            if !(prior.low.is_finite() && prior.high.is_finite() && prior.low < prior.high) {
                return Err(ConfigError::InvalidPriorBounds {
                    name: prior.name.clone(),
                    low: prior.low,
                    high: prior.high,
                });
            }
        }
        Ok(())
    }

    fn validate_lattice(&self) -> std::result::Result<(), ConfigError> {
        if self.grid_size == 0 {
            return Err(ConfigError::InvalidGridSize);
        }
        if self.timesteps <= self.cut_off_start + self.cut_off_end + 1 {
            return Err(ConfigError::EmptyWindow {
                timesteps: self.timesteps,
                start: self.cut_off_start,
                end: self.cut_off_end,
            });
        }
        Ok(())
    }

    /// Number of inferred parameters.
    pub fn param_nr(&self) -> usize {
        self.priors.len()
    }

    pub fn prior_names(&self) -> Vec<&str> {
        self.priors.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn window(&self) -> CutoffWindow {
        CutoffWindow::new(self.cut_off_start, self.cut_off_end, self.timesteps)
    }

    /// Folder receiving one sub-directory per run.
    pub fn output_root(&self) -> PathBuf {
        self.data_path.join(&self.folder)
    }

    /// Glob matching every run directory of the output folder.
    pub fn offline_pattern(&self) -> String {
        self.output_root().join("*").to_string_lossy().into_owned()
    }

    /// Glob matching candidate model definitions.
    pub fn model_glob(&self) -> String {
        self.data_path
            .join("model")
            .join(&self.model_pattern)
            .to_string_lossy()
            .into_owned()
    }

    /// Image the simulator renders last; its presence marks a finished run.
    pub fn completion_marker(&self) -> String {
        format!("plot_{:05}.png", self.timesteps)
    }

    /// Whether observations are full lattices, given a caller's explicit request.
    pub fn use_lattice(&self, requested: bool) -> bool {
        requested || self.spatial
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn completion_timeout(&self) -> Option<Duration> {
        self.completion_timeout_secs.map(Duration::from_secs)
    }
}
