//! Data side of simulation-based inference for Morpheus cell-population models.
//!
//! Runs the external simulator, parses its tab-separated loggers, windows and
//! validates every run and stacks the survivors into dense tensors for an
//! amortized-inference trainer. With the `python` feature the same pipeline
//! is exposed as the `morpheus_sbi_rust` extension module.

pub mod config;
pub mod configurator;
pub mod dataset;
pub mod error;
pub mod logs;
pub mod observation;
pub mod params;
pub mod prior;
pub mod simulator;
pub mod validate;
pub mod window;

#[cfg(feature = "python")]
mod python;

pub use config::{ConfigError, ExperimentConfig, LogFiles, PriorSpec};
pub use configurator::{Configured, Configurator};
pub use dataset::{Dataset, DatasetAssembler, Rejection, ScalarDataset, SpatialDataset};
pub use error::{Error, Result};
pub use observation::{ObservationKind, ObservationReader, Scalar, Spatial};
pub use params::ParameterVector;
pub use prior::UniformPrior;
pub use simulator::SimulationRunner;
pub use validate::{RejectReason, RunValidator, Validity};
pub use window::{CutoffWindow, WindowError};
