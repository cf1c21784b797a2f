//! Per-run validity rules.
//!
//! A run is dropped from a dataset when any rule fires:
//! 1. a required log failed to parse
//! 2. the directory name carries the error marker
//! 3. the windowed infected count drops below one (or is NaN)
//! 4. a parameter exceeds the configured upper bound (or is NaN)
//! 5. the windowed series has the wrong length

use ndarray::ArrayView1;
use serde::Serialize;

use crate::config::ExperimentConfig;
use crate::error::Error;
use crate::params::ParameterVector;
use crate::window::WindowError;

/// Why a run was excluded.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    ParseFailure { message: String },
    ErrorMarker { marker: String },
    DegenerateTrajectory { timestep: usize, count: f64 },
    ParameterOutOfRange { name: String, value: f64, bound: f64 },
    LengthMismatch { expected: usize, actual: usize },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::ParseFailure { message } => write!(f, "parse failure: {}", message),
            RejectReason::ErrorMarker { marker } => {
                write!(f, "directory name contains '{}'", marker)
            }
            RejectReason::DegenerateTrajectory { timestep, count } => {
                write!(f, "infected count {} < 1 at windowed step {}", count, timestep)
            }
            RejectReason::ParameterOutOfRange { name, value, bound } => {
                write!(f, "parameter {} = {} exceeds {}", name, value, bound)
            }
            RejectReason::LengthMismatch { expected, actual } => {
                write!(f, "series has {} timesteps, expected {}", actual, expected)
            }
        }
    }
}

impl From<Error> for RejectReason {
    fn from(err: Error) -> Self {
        match err {
            Error::Window(WindowError::LengthMismatch { expected, actual }) => {
                RejectReason::LengthMismatch { expected, actual }
            }
            other => RejectReason::ParseFailure {
                message: other.to_string(),
            },
        }
    }
}

/// Outcome of validating one run.
#[derive(Clone, Debug, PartialEq)]
pub enum Validity {
    Valid,
    Invalid(RejectReason),
}

impl Validity {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validity::Valid)
    }

    pub fn into_result(self) -> Result<(), RejectReason> {
        match self {
            Validity::Valid => Ok(()),
            Validity::Invalid(reason) => Err(reason),
        }
    }
}

/// What the content rules look at for one parsed run.
#[derive(Clone, Debug)]
pub struct RunEvidence<'a> {
    pub name: &'a str,
    pub parameters: &'a ParameterVector,
    /// Windowed infected (or infected-site) counts.
    pub infected: ArrayView1<'a, f32>,
}

pub struct RunValidator<'a> {
    config: &'a ExperimentConfig,
}

impl<'a> RunValidator<'a> {
    pub fn new(config: &'a ExperimentConfig) -> Self {
        Self { config }
    }

    /// Name-only check, cheap enough to run before any file is opened.
    pub fn check_name(&self, name: &str) -> Result<(), RejectReason> {
        if name.contains(&self.config.error_marker) {
            return Err(RejectReason::ErrorMarker {
                marker: self.config.error_marker.clone(),
            });
        }
        Ok(())
    }

    pub fn check_parameters(&self, parameters: &ParameterVector) -> Result<(), RejectReason> {
        let bound = self.config.param_upper_bound;
        match parameters.iter().find(|&(_, value)| !(value <= bound)) {
            Some((name, value)) => Err(RejectReason::ParameterOutOfRange {
                name: name.to_string(),
                value,
                bound,
            }),
            None => Ok(()),
        }
    }

    pub fn check_infected(&self, infected: ArrayView1<'_, f32>) -> Result<(), RejectReason> {
        let expected = self.config.window().expected_len();
        if infected.len() != expected {
            return Err(RejectReason::LengthMismatch {
                expected,
                actual: infected.len(),
            });
        }
        match infected.iter().position(|&count| !(count >= 1.0)) {
            Some(timestep) => Err(RejectReason::DegenerateTrajectory {
                timestep,
                count: f64::from(infected[timestep]),
            }),
            None => Ok(()),
        }
    }

    pub fn validate(&self, run: &RunEvidence<'_>) -> Validity {
        let checks = self
            .check_name(run.name)
            .and_then(|()| self.check_parameters(run.parameters))
            .and_then(|()| self.check_infected(run.infected));
        match checks {
            Ok(()) => Validity::Valid,
            Err(reason) => Validity::Invalid(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    fn config() -> ExperimentConfig {
        ExperimentConfig {
            timesteps: 10,
            cut_off_start: 1,
            cut_off_end: 2,
            ..ExperimentConfig::default()
        }
    }

    fn params(values: &[f64]) -> ParameterVector {
        ParameterVector::from_values(&["b_cf", "p_V"], values).unwrap()
    }

    #[test]
    fn test_valid_run() {
        let config = config();
        let validator = RunValidator::new(&config);
        let infected = Array1::from_elem(6, 3.0f32);
        let parameters = params(&[0.2, 1.0]);
        let run = RunEvidence {
            name: "b_cf-0.2_p_V-1.0",
            parameters: &parameters,
            infected: infected.view(),
        };
        assert!(validator.validate(&run).is_valid());
    }

    #[test]
    fn test_zero_infected_inside_window() {
        let config = config();
        let validator = RunValidator::new(&config);
        let mut infected = Array1::from_elem(6, 3.0f32);
        infected[4] = 0.0;
        assert_eq!(
            validator.check_infected(infected.view()),
            Err(RejectReason::DegenerateTrajectory {
                timestep: 4,
                count: 0.0
            })
        );
    }

    #[test]
    fn test_parameter_above_bound() {
        let config = config();
        let validator = RunValidator::new(&config);
        let infected = Array1::from_elem(6, 3.0f32);
        let parameters = params(&[1.5, 0.1]);
        let run = RunEvidence {
            name: "b_cf-1.5_p_V-0.1",
            parameters: &parameters,
            infected: infected.view(),
        };
        assert_eq!(
            validator.validate(&run),
            Validity::Invalid(RejectReason::ParameterOutOfRange {
                name: "b_cf".to_string(),
                value: 1.5,
                bound: 1.0
            })
        );
    }

    #[test]
    fn test_nan_parameter_rejected() {
        let config = config();
        let validator = RunValidator::new(&config);
        let parameters = params(&[f64::NAN, 0.2]);
        assert!(matches!(
            validator.check_parameters(&parameters),
            Err(RejectReason::ParameterOutOfRange { ref name, .. }) if name == "b_cf"
        ));
    }

    #[test]
    fn test_nan_infected_count_rejected() {
        let config = config();
        let validator = RunValidator::new(&config);
        let mut infected = Array1::from_elem(6, 3.0f32);
        infected[1] = f32::NAN;
        assert!(matches!(
            validator.check_infected(infected.view()),
            Err(RejectReason::DegenerateTrajectory { timestep: 1, .. })
        ));
    }

    #[test]
    fn test_error_marker() {
        let config = config();
        let validator = RunValidator::new(&config);
        assert!(validator.check_name("b_cf-0.1_p_V-0.2_error").is_err());
        assert!(validator.check_name("sweep3_b_cf-0.1_p_V-0.2").is_ok());
    }

    #[test]
    fn test_wrong_length() {
        let config = config();
        let validator = RunValidator::new(&config);
        let infected = Array1::from_elem(5, 3.0f32);
        assert_eq!(
            validator.check_infected(infected.view()),
            Err(RejectReason::LengthMismatch {
                expected: 6,
                actual: 5
            })
        );
    }

    #[test]
    fn test_window_error_maps_to_length_mismatch() {
        let err = Error::Window(WindowError::LengthMismatch {
            expected: 6,
            actual: 2,
        });
        assert_eq!(
            RejectReason::from(err),
            RejectReason::LengthMismatch {
                expected: 6,
                actual: 2
            }
        );
    }
}
