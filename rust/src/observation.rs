//! One run directory → one windowed observation tensor.
//!
//! Shared by the offline dataset assembler and the online simulation runner,
//! so both produce identical tensors for identical logs.

use std::path::Path;

use ndarray::{Array, Array1, Array2, Array3, Array4, Axis, Dimension, Ix2, Ix4, IxDyn};

use crate::config::ExperimentConfig;
use crate::error::Result;
use crate::logs::{lattice_totals, read_grid, CellStateLog, GridKind, PopulationLog};

/// Channels of the aggregate observation: target count, infected count,
/// total diffusing quantity, infected volume.
pub const SCALAR_CHANNELS: usize = 4;
/// Channels of the lattice observation: concentration, cell id, cell state.
pub const SPATIAL_CHANNELS: usize = 3;

/// Reads the logs of finished runs according to one configuration.
#[derive(Clone, Copy)]
pub struct ObservationReader<'a> {
    config: &'a ExperimentConfig,
}

impl<'a> ObservationReader<'a> {
    pub fn new(config: &'a ExperimentConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExperimentConfig {
        self.config
    }

    /// Population counts of a run, one row per timestep.
    pub fn parse_time_series(&self, run_dir: &Path) -> Result<PopulationLog> {
        let layout = &self.config.logs;
        PopulationLog::read(&layout.population_path(run_dir), layout)
    }

    /// `(timesteps + 1, grid, grid)` lattice log of a run.
    pub fn parse_spatial_grid(&self, run_dir: &Path, kind: GridKind) -> Result<Array3<f64>> {
        let path = self.config.logs.grid_path(run_dir, kind);
        read_grid(&path, self.config.grid_size, self.config.timesteps)
    }

    /// `(window_len, 4)` per-timestep aggregates.
    pub fn read_scalar(&self, run_dir: &Path) -> Result<Array2<f32>> {
        let config = self.config;
        let layout = &config.logs;
        let window = config.window();

        let population = self.parse_time_series(run_dir)?;
        let concentration = self.parse_spatial_grid(run_dir, GridKind::Concentration)?;
        let ids = self.parse_spatial_grid(run_dir, GridKind::CellId)?;
        let states = CellStateLog::read(&layout.cell_state_path(run_dir), layout)?;
        let volume = states.occupied_volume(&ids, window.start + 1, config.infected_state)?;

        let channels = [
            window.apply(&population.target, Axis(0))?,
            window.apply(&population.infected, Axis(0))?,
            window.apply(&lattice_totals(&concentration), Axis(0))?,
            window.apply(&volume, Axis(0))?,
        ];

        let mut observation = Array2::zeros((window.expected_len(), SCALAR_CHANNELS));
        for (c, series) in channels.iter().enumerate() {
            observation
                .column_mut(c)
                .assign(&series.mapv(|v| v as f32));
        }
        Ok(observation)
    }

    /// `(grid, grid, window_len, 3)` lattices, time on the third axis.
    pub fn read_spatial(&self, run_dir: &Path) -> Result<Array4<f32>> {
        let config = self.config;
        let layout = &config.logs;
        let window = config.window();

        let concentration = self.parse_spatial_grid(run_dir, GridKind::Concentration)?;
        let ids = self.parse_spatial_grid(run_dir, GridKind::CellId)?;
        let states = CellStateLog::read(&layout.cell_state_path(run_dir), layout)?
            .project_onto(&ids, config.empty_cell_state)?;

        let g = config.grid_size;
        let mut observation = Array4::zeros((g, g, window.expected_len(), SPATIAL_CHANNELS));
        for (c, layers) in [concentration, ids, states].into_iter().enumerate() {
            let rows_cols_time = layers.permuted_axes([1, 2, 0]);
            let windowed = window.apply(&rows_cols_time, Axis(2))?;
            observation
                .index_axis_mut(Axis(3), c)
                .assign(&windowed.mapv(|v| v as f32));
        }
        Ok(observation)
    }
}

/// The two observation layouts, for code generic over them.
pub trait ObservationKind {
    type Dim: Dimension;

    const NAME: &'static str;

    /// Shape of one run's observation.
    fn shape(config: &ExperimentConfig) -> Self::Dim;

    fn read(reader: &ObservationReader<'_>, run_dir: &Path) -> Result<Array<f32, Self::Dim>>;

    /// Per-timestep infected count used by the validity rules.
    fn infected(config: &ExperimentConfig, observation: &Array<f32, Self::Dim>) -> Array1<f32>;
}

/// Zeroed `(n, ...)` stack for `n` observations of kind `K`.
pub fn zeros_batch<K: ObservationKind>(
    config: &ExperimentConfig,
    n: usize,
) -> Result<Array<f32, <K::Dim as Dimension>::Larger>> {
    let dims: Vec<usize> = std::iter::once(n)
        .chain(K::shape(config).slice().iter().copied())
        .collect();
    Ok(Array::zeros(IxDyn(&dims)).into_dimensionality()?)
}

/// Per-timestep aggregates, `(T, 4)`.
pub struct Scalar;

/// Full lattices, `(H, W, T, 3)`.
pub struct Spatial;

impl ObservationKind for Scalar {
    type Dim = Ix2;

    const NAME: &'static str = "scalar";

    fn shape(config: &ExperimentConfig) -> Ix2 {
        ndarray::Ix2(config.window().expected_len(), SCALAR_CHANNELS)
    }

    fn read(reader: &ObservationReader<'_>, run_dir: &Path) -> Result<Array2<f32>> {
        reader.read_scalar(run_dir)
    }

    fn infected(_config: &ExperimentConfig, observation: &Array2<f32>) -> Array1<f32> {
        observation.column(1).to_owned()
    }
}

impl ObservationKind for Spatial {
    type Dim = Ix4;

    const NAME: &'static str = "spatial";

    fn shape(config: &ExperimentConfig) -> Ix4 {
        let g = config.grid_size;
        ndarray::Ix4(g, g, config.window().expected_len(), SPATIAL_CHANNELS)
    }

    fn read(reader: &ObservationReader<'_>, run_dir: &Path) -> Result<Array4<f32>> {
        reader.read_spatial(run_dir)
    }

    /// Number of lattice sites held by an infected cell.
    fn infected(config: &ExperimentConfig, observation: &Array4<f32>) -> Array1<f32> {
        let infected_state = config.infected_state as f32;
        let states = observation.index_axis(Axis(3), 2);
        states
            .axis_iter(Axis(2))
            .map(|layer| layer.iter().filter(|&&s| s == infected_state).count() as f32)
            .collect()
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{write_run, RunSpec};
    use super::*;
    use tempfile::tempdir;

    fn config() -> ExperimentConfig {
        ExperimentConfig {
            grid_size: 3,
            timesteps: 8,
            cut_off_start: 1,
            cut_off_end: 2,
            ..ExperimentConfig::default()
        }
    }

    #[test]
    fn test_scalar_observation() {
        let config = config();
        let dir = tempdir().unwrap();
        write_run(dir.path(), &config, &RunSpec::healthy(&config));

        let obs = ObservationReader::new(&config).read_scalar(dir.path()).unwrap();
        assert_eq!(obs.shape(), &[4, SCALAR_CHANNELS]);
        // Window keeps timesteps 2..6.
        assert_eq!(obs[[0, 0]], 98.0);
        assert_eq!(obs[[0, 1]], 2.0);
        assert_eq!(obs[[0, 2]], 2.0 * 9.0);
        assert_eq!(obs[[3, 2]], 5.0 * 9.0);
        // Infected cell 1 covers the three sites of row 0.
        assert!(obs.column(3).iter().all(|&v| v == 3.0));
        assert_eq!(Scalar::infected(&config, &obs).to_vec(), vec![2.0; 4]);
    }

    #[test]
    fn test_spatial_observation() {
        let config = config();
        let dir = tempdir().unwrap();
        write_run(dir.path(), &config, &RunSpec::healthy(&config));

        let obs = ObservationReader::new(&config).read_spatial(dir.path()).unwrap();
        assert_eq!(obs.shape(), &[3, 3, 4, SPATIAL_CHANNELS]);
        assert_eq!(obs[[2, 1, 0, 0]], 2.0);
        assert_eq!(obs[[0, 0, 3, 1]], 1.0);
        assert_eq!(obs[[1, 2, 3, 1]], 2.0);
        assert_eq!(obs[[2, 2, 3, 1]], 0.0);
        assert_eq!(obs[[0, 1, 1, 2]], 1.0);
        assert_eq!(obs[[1, 1, 1, 2]], 0.0);
        assert_eq!(obs[[2, 1, 1, 2]], config.empty_cell_state as f32);
        assert_eq!(Spatial::infected(&config, &obs).to_vec(), vec![3.0; 4]);
    }

    #[test]
    fn test_zeros_batch_shapes() {
        let config = config();
        assert_eq!(zeros_batch::<Scalar>(&config, 5).unwrap().shape(), &[5, 4, 4]);
        assert_eq!(
            zeros_batch::<Spatial>(&config, 0).unwrap().shape(),
            &[0, 3, 3, 4, 3]
        );
    }

    #[test]
    fn test_missing_log_is_error() {
        let config = config();
        let dir = tempdir().unwrap();
        write_run(dir.path(), &config, &RunSpec::healthy(&config));
        std::fs::remove_file(dir.path().join(&config.logs.cell_states)).unwrap();
        assert!(ObservationReader::new(&config).read_scalar(dir.path()).is_err());
    }

    #[test]
    fn test_short_population_log_is_window_error() {
        let config = config();
        let dir = tempdir().unwrap();
        let short = RunSpec {
            infected: vec![2.0; 4],
            ..RunSpec::healthy(&config)
        };
        write_run(dir.path(), &config, &short);
        let err = ObservationReader::new(&config).read_scalar(dir.path()).unwrap_err();
        assert!(matches!(err, crate::error::Error::Window(_)));
    }
}
