//! Offline dataset assembly.
//!
//! Every run directory matching a glob is parsed, windowed and validated;
//! valid runs are stacked into one observation tensor and one parameter
//! matrix with matching rows. Invalid runs become [`Rejection`]s instead of
//! errors.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use ndarray::{Array, Array2, Axis, Dimension, Ix3, Ix5};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::ExperimentConfig;
use crate::error::{Error, Result};
use crate::observation::{zeros_batch, ObservationKind, ObservationReader, Scalar, Spatial};
use crate::params::ParameterVector;
use crate::validate::{RejectReason, RunEvidence, RunValidator};

/// Log file receiving the output of one assembly.
pub const OFFLINE_LOG: &str = "log_read_offline.txt";
/// Structured list of rejected runs, written next to the log.
pub const REJECTION_REPORT: &str = "rejected_runs.json";

/// A run left out of a dataset.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Rejection {
    /// Position of the run in the sorted enumeration.
    pub index: usize,
    pub run: String,
    pub reason: RejectReason,
}

/// Stacked valid runs. Row `i` of `observations` and `parameters` belong to
/// the run `run_names[i]`.
#[derive(Clone, Debug)]
pub struct Dataset<D: Dimension> {
    pub observations: Array<f32, D>,
    pub parameters: Array2<f32>,
    pub run_names: Vec<String>,
    pub rejections: Vec<Rejection>,
}

impl<D: Dimension> Dataset<D> {
    pub fn len(&self) -> usize {
        self.parameters.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn write_rejections(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.rejections)?;
        fs::write(path, json).map_err(|e| Error::io(path, e))
    }
}

/// Aggregate observations `(n, T, 4)`.
pub type ScalarDataset = Dataset<Ix3>;
/// Lattice observations `(n, H, W, T, 3)`.
pub type SpatialDataset = Dataset<Ix5>;

/// Sorted directories matching `pattern`.
pub fn run_directories(pattern: &str) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in glob::glob(pattern)? {
        match entry {
            Ok(path) if path.is_dir() => dirs.push(path),
            Ok(_) => {}
            Err(err) => warn!(path = %err.path().display(), "skipping unreadable entry"),
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn dir_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

type RunOutcome<D> = std::result::Result<(ParameterVector, Array<f32, D>), RejectReason>;

pub struct DatasetAssembler<'a> {
    config: &'a ExperimentConfig,
}

impl<'a> DatasetAssembler<'a> {
    pub fn new(config: &'a ExperimentConfig) -> Self {
        Self { config }
    }

    /// Scalar dataset from the directories matching `pattern`; the log and
    /// rejection report go to `workdir`.
    pub fn assemble_scalar(&self, pattern: &str, workdir: &Path) -> Result<ScalarDataset> {
        self.assemble::<Scalar>(pattern, workdir)
    }

    pub fn assemble_spatial(&self, pattern: &str, workdir: &Path) -> Result<SpatialDataset> {
        self.assemble::<Spatial>(pattern, workdir)
    }

    pub fn assemble<K: ObservationKind>(
        &self,
        pattern: &str,
        workdir: &Path,
    ) -> Result<Dataset<<K::Dim as Dimension>::Larger>> {
        fs::create_dir_all(workdir).map_err(|e| Error::io(workdir, e))?;
        let log_path = workdir.join(OFFLINE_LOG);
        let log_file = File::create(&log_path).map_err(|e| Error::io(&log_path, e))?;
        let subscriber = tracing_subscriber::fmt()
            .with_writer(Mutex::new(log_file))
            .with_ansi(false)
            .finish();

        let dataset =
            tracing::subscriber::with_default(subscriber, || self.assemble_runs::<K>(pattern))?;
        dataset.write_rejections(&workdir.join(REJECTION_REPORT))?;
        Ok(dataset)
    }

    /// Parse runs in parallel, then keep the valid rows in enumeration order.
    fn assemble_runs<K: ObservationKind>(
        &self,
        pattern: &str,
    ) -> Result<Dataset<<K::Dim as Dimension>::Larger>> {
        let started = Instant::now();
        let dirs = run_directories(pattern)?;
        let n = dirs.len();
        info!(pattern, runs = n, kind = K::NAME, "reading offline runs");

        let outcomes: Vec<RunOutcome<K::Dim>> = dirs
            .par_iter()
            .map(|dir| self.read_run::<K>(dir))
            .collect();

        let mut observations = zeros_batch::<K>(self.config, n)?;
        let mut parameters = Array2::<f32>::zeros((n, self.config.param_nr()));
        let mut keep = Vec::with_capacity(n);
        let mut rejections = Vec::new();

        for (index, (dir, outcome)) in dirs.iter().zip(outcomes).enumerate() {
            let run = dir_name(dir);
            match outcome {
                Ok((params, observation)) => {
                    observations
                        .index_axis_mut(Axis(0), index)
                        .assign(&observation);
                    let mut row = parameters.row_mut(index);
                    for (slot, value) in row.iter_mut().zip(params.values()) {
                        *slot = value as f32;
                    }
                    keep.push(index);
                }
                Err(reason) => {
                    warn!(index, run = %run, %reason, "run rejected");
                    rejections.push(Rejection { index, run, reason });
                }
            }
        }

        let observations = observations.select(Axis(0), &keep);
        let parameters = parameters.select(Axis(0), &keep);
        let run_names = keep.iter().map(|&i| dir_name(&dirs[i])).collect();

        info!(
            "Read data in the form of {:?} ({} of {} runs rejected)",
            observations.shape(),
            rejections.len(),
            n
        );
        info!(elapsed = ?started.elapsed(), "finished reading offline runs");

        Ok(Dataset {
            observations,
            parameters,
            run_names,
            rejections,
        })
    }

    fn read_run<K: ObservationKind>(&self, dir: &Path) -> RunOutcome<K::Dim> {
        let config = self.config;
        let validator = RunValidator::new(config);
        let name = dir_name(dir);
        validator.check_name(&name)?;

        let parameters =
            ParameterVector::from_dir_name(&name, &config.prior_names(), config.param_precision)?;
        let observation = K::read(&ObservationReader::new(config), dir)?;
        let infected = K::infected(config, &observation);
        validator
            .validate(&RunEvidence {
                name: &name,
                parameters: &parameters,
                infected: infected.view(),
            })
            .into_result()?;
        Ok((parameters, observation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::fixtures::{write_run, RunSpec};
    use tempfile::tempdir;

    fn config(data_path: &Path) -> ExperimentConfig {
        ExperimentConfig {
            data_path: data_path.to_path_buf(),
            grid_size: 3,
            timesteps: 8,
            cut_off_start: 1,
            cut_off_end: 2,
            ..ExperimentConfig::default()
        }
    }

    fn populate(config: &ExperimentConfig) {
        let root = config.output_root();
        let healthy = RunSpec::healthy(config);
        write_run(&root.join("b_cf-0.1_p_V-0.2_cv-0.33_DV-999"), config, &healthy);
        write_run(&root.join("b_cf-0.3_p_V-0.4_cv-0.33_DV-999"), config, &healthy);

        let mut infected = vec![2.0; config.timesteps];
        infected[4] = 0.0;
        write_run(
            &root.join("b_cf-0.5_p_V-0.6_cv-0.33_DV-999"),
            config,
            &RunSpec {
                infected,
                ..RunSpec::healthy(config)
            },
        );
        write_run(&root.join("b_cf-1.5_p_V-0.6_cv-0.33_DV-999"), config, &healthy);
        write_run(&root.join("b_cf-0.7_p_V-0.8_error"), config, &healthy);
        fs::write(root.join("notes.txt"), "not a run").unwrap();
    }

    #[test]
    fn test_scalar_assembly_drops_invalid_runs() {
        let data = tempdir().unwrap();
        let work = tempdir().unwrap();
        let config = config(data.path());
        populate(&config);

        let dataset = DatasetAssembler::new(&config)
            .assemble_scalar(&config.offline_pattern(), work.path())
            .unwrap();

        assert_eq!(dataset.observations.shape(), &[2, 4, 4]);
        assert_eq!(dataset.parameters.shape(), &[2, 2]);
        assert_eq!(dataset.parameters.row(0).to_vec(), vec![0.1f32, 0.2]);
        assert_eq!(dataset.parameters.row(1).to_vec(), vec![0.3f32, 0.4]);
        assert_eq!(dataset.run_names.len(), 2);

        let reasons: Vec<&RejectReason> = dataset.rejections.iter().map(|r| &r.reason).collect();
        assert_eq!(reasons.len(), 3);
        assert!(matches!(reasons[0], RejectReason::DegenerateTrajectory { timestep: 2, .. }));
        assert!(matches!(reasons[1], RejectReason::ErrorMarker { .. }));
        assert!(matches!(reasons[2], RejectReason::ParameterOutOfRange { .. }));
        assert_eq!(dataset.rejections[1].index, 3);

        let log = fs::read_to_string(work.path().join(OFFLINE_LOG)).unwrap();
        assert!(
            log.contains("Read data in the form of [2, 4, 4] (3 of 5 runs rejected)"),
            "{log}"
        );
        let report = fs::read_to_string(work.path().join(REJECTION_REPORT)).unwrap();
        assert!(report.contains("parameter_out_of_range"));
    }

    #[test]
    fn test_spatial_assembly_rows_match() {
        let data = tempdir().unwrap();
        let work = tempdir().unwrap();
        let config = config(data.path());
        populate(&config);

        let dataset = DatasetAssembler::new(&config)
            .assemble_spatial(&config.offline_pattern(), work.path())
            .unwrap();

        // Population-log zeros are invisible on the lattice; only the name and
        // parameter rules fire here.
        assert_eq!(dataset.observations.shape(), &[3, 3, 3, 4, 3]);
        assert_eq!(dataset.parameters.nrows(), dataset.observations.shape()[0]);
        assert_eq!(dataset.rejections.len(), 2);
    }

    #[test]
    fn test_spatial_assembly_rejects_uninfected_lattice() {
        let data = tempdir().unwrap();
        let work = tempdir().unwrap();
        let config = config(data.path());
        let root = config.output_root();
        write_run(&root.join("b_cf-0.1_p_V-0.2"), &config, &RunSpec::healthy(&config));
        // Raw timestep 3 is the second step of the 2..6 window.
        let cured = RunSpec {
            cured_at: Some(3),
            ..RunSpec::healthy(&config)
        };
        write_run(&root.join("b_cf-0.3_p_V-0.4"), &config, &cured);

        let dataset = DatasetAssembler::new(&config)
            .assemble_spatial(&config.offline_pattern(), work.path())
            .unwrap();
        assert_eq!(dataset.observations.shape(), &[1, 3, 3, 4, 3]);
        assert_eq!(dataset.run_names, vec!["b_cf-0.1_p_V-0.2".to_string()]);
        assert_eq!(dataset.rejections.len(), 1);
        assert_eq!(dataset.rejections[0].index, 1);
        assert!(matches!(
            dataset.rejections[0].reason,
            RejectReason::DegenerateTrajectory { timestep: 1, .. }
        ));

        // The scalar view reads the population log, which stays infected.
        let scalar = DatasetAssembler::new(&config)
            .assemble_scalar(&config.offline_pattern(), work.path())
            .unwrap();
        assert_eq!(scalar.observations.shape()[0], 2);
    }

    #[test]
    fn test_corrupt_log_becomes_rejection() {
        let data = tempdir().unwrap();
        let work = tempdir().unwrap();
        let config = config(data.path());
        let run = config.output_root().join("b_cf-0.1_p_V-0.2");
        write_run(&run, &config, &RunSpec::healthy(&config));
        fs::write(run.join(&config.logs.concentration), "3\t0\t1\t2\n3\t0\t1\n").unwrap();

        let dataset = DatasetAssembler::new(&config)
            .assemble_scalar(&config.offline_pattern(), work.path())
            .unwrap();
        assert!(dataset.is_empty());
        assert_eq!(dataset.observations.shape(), &[0, 4, 4]);
        assert!(matches!(
            dataset.rejections[0].reason,
            RejectReason::ParseFailure { .. }
        ));
    }

    #[test]
    fn test_no_matching_directories() {
        let data = tempdir().unwrap();
        let work = tempdir().unwrap();
        let config = config(data.path());
        let dataset = DatasetAssembler::new(&config)
            .assemble_scalar(&config.offline_pattern(), work.path())
            .unwrap();
        assert!(dataset.is_empty());
        assert!(dataset.rejections.is_empty());
    }

    #[test]
    fn test_run_directories_sorted() {
        let data = tempdir().unwrap();
        for name in ["c", "a", "b"] {
            fs::create_dir_all(data.path().join(name)).unwrap();
        }
        let pattern = data.path().join("*").to_string_lossy().into_owned();
        let names: Vec<String> = run_directories(&pattern)
            .unwrap()
            .iter()
            .map(|d| dir_name(d))
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
