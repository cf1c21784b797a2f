//! Online simulation: one parameter draw in, one observation tensor out.
//!
//! A run walks through building the command line, launching the simulator,
//! polling for the completion marker and parsing the fresh run directory with
//! the same reader the offline assembler uses. Every failure propagates.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use ndarray::{Array, Array2, Array4, ArrayView2, Axis, Dimension};
use tracing::{debug, info, warn};

use crate::config::ExperimentConfig;
use crate::error::{Error, Result};
use crate::observation::{zeros_batch, ObservationKind, ObservationReader, Scalar, Spatial};
use crate::params::ParameterVector;

/// Log file receiving the simulator's stdout and stderr.
pub const SIMULATOR_LOG: &str = "log_morpheus.txt";

/// Block until `path` exists, checking every `interval`.
///
/// With `timeout` set, gives up once that much time has passed.
pub fn wait_for_file(path: &Path, interval: Duration, timeout: Option<Duration>) -> Result<()> {
    let started = Instant::now();
    while !path.exists() {
        let waited = started.elapsed();
        if timeout.is_some_and(|limit| waited >= limit) {
            return Err(Error::SimulationTimeout {
                marker: path.to_path_buf(),
                waited,
            });
        }
        thread::sleep(interval);
    }
    Ok(())
}

/// Shell-style rendering of a command for logs and error messages.
pub fn command_line(command: &Command) -> String {
    std::iter::once(command.get_program())
        .chain(command.get_args())
        .map(|part| part.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// A simulation ready to launch.
#[derive(Debug)]
pub struct PreparedRun {
    pub parameters: ParameterVector,
    pub output_dir: PathBuf,
    pub command: Command,
}

pub struct SimulationRunner<'a> {
    config: &'a ExperimentConfig,
    workdir: PathBuf,
}

impl<'a> SimulationRunner<'a> {
    pub fn new(config: &'a ExperimentConfig, workdir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            workdir: workdir.into(),
        }
    }

    /// First model definition matching the configured pattern.
    pub fn find_model(&self) -> Result<PathBuf> {
        let pattern = self.config.model_glob();
        let mut models: Vec<PathBuf> = glob::glob(&pattern)?.filter_map(|m| m.ok()).collect();
        models.sort();
        models
            .into_iter()
            .next()
            .ok_or(Error::ModelNotFound { pattern })
    }

    /// Output directory and simulator command for one draw.
    pub fn prepare(&self, values: &[f64]) -> Result<PreparedRun> {
        let config = self.config;
        let parameters = ParameterVector::from_values(&config.prior_names(), values)?;
        let output_dir = config
            .output_root()
            .join(parameters.dir_name(&config.fixed_params));
        let model = self.find_model()?;

        let mut command = Command::new(&config.simulator_binary);
        command
            .arg("-f")
            .arg(&model)
            .arg("-o")
            .arg(&output_dir)
            .args(parameters.simulator_overrides(&config.fixed_params));

        Ok(PreparedRun {
            parameters,
            output_dir,
            command,
        })
    }

    /// Launch the simulator for `values` and wait until its run is complete.
    ///
    /// Returns the run directory.
    pub fn launch(&self, values: &[f64]) -> Result<PathBuf> {
        let PreparedRun {
            output_dir,
            mut command,
            ..
        } = self.prepare(values)?;
        let rendered = command_line(&command);

        fs::create_dir_all(&output_dir).map_err(|e| Error::io(&output_dir, e))?;
        fs::create_dir_all(&self.workdir).map_err(|e| Error::io(&self.workdir, e))?;
        let log_path = self.workdir.join(SIMULATOR_LOG);
        let stdout = File::create(&log_path).map_err(|e| Error::io(&log_path, e))?;
        let stderr = stdout.try_clone().map_err(|e| Error::io(&log_path, e))?;

        info!(command = %rendered, "launching simulator");
        let started = Instant::now();
        let status = command
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .status()
            .map_err(|source| Error::Launch {
                command: rendered.clone(),
                source,
            })?;
        if !status.success() {
            warn!(%status, command = %rendered, "simulator exited unsuccessfully");
        }

        let marker = output_dir.join(self.config.completion_marker());
        debug!(marker = %marker.display(), "waiting for completion marker");
        wait_for_file(
            &marker,
            self.config.poll_interval(),
            self.config.completion_timeout(),
        )?;
        info!(elapsed = ?started.elapsed(), dir = %output_dir.display(), "simulation finished");
        Ok(output_dir)
    }

    pub fn invoke<K: ObservationKind>(&self, values: &[f64]) -> Result<Array<f32, K::Dim>> {
        let run_dir = self.launch(values)?;
        K::read(&ObservationReader::new(self.config), &run_dir)
    }

    /// `(T, 4)` aggregates of a fresh run.
    pub fn run(&self, values: &[f64]) -> Result<Array2<f32>> {
        self.invoke::<Scalar>(values)
    }

    /// `(H, W, T, 3)` lattices of a fresh run.
    pub fn run_2d(&self, values: &[f64]) -> Result<Array4<f32>> {
        self.invoke::<Spatial>(values)
    }

    /// Simulate every row of `draws` in turn and stack the observations.
    pub fn invoke_batch<K: ObservationKind>(
        &self,
        draws: ArrayView2<'_, f64>,
    ) -> Result<Array<f32, <K::Dim as Dimension>::Larger>> {
        let mut batch = zeros_batch::<K>(self.config, draws.nrows())?;
        for (i, draw) in draws.outer_iter().enumerate() {
            let values = draw.to_vec();
            let observation = self.invoke::<K>(&values)?;
            batch.index_axis_mut(Axis(0), i).assign(&observation);
        }
        Ok(batch)
    }
}
