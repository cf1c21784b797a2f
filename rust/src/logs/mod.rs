//! Readers for the simulator's tab-separated loggers.
//!
//! - TsvTable: header plus numeric body, columns by label
//! - grid: lattice logs with sentinel rows, reshaped per timestep
//! - PopulationLog: per-timestep target/infected counts
//! - CellStateLog: sparse per-cell states, lattice projection, occupied volume

pub mod tsv;
pub mod grid;
pub mod population;
pub mod cell_state;

use std::path::{Path, PathBuf};

pub use tsv::TsvTable;
pub use grid::{grid_from_table, lattice_totals, read_grid, GridKind};
pub use population::PopulationLog;
pub use cell_state::{CellStateLog, CellStateRecord, EMPTY_SITE};

use crate::config::LogFiles;

impl LogFiles {
    /// Path of a lattice log inside `run_dir`.
    pub fn grid_path(&self, run_dir: &Path, kind: GridKind) -> PathBuf {
        match kind {
            GridKind::Concentration => run_dir.join(&self.concentration),
            GridKind::CellId => run_dir.join(&self.cell_ids),
        }
    }

    pub fn population_path(&self, run_dir: &Path) -> PathBuf {
        run_dir.join(&self.population)
    }

    pub fn cell_state_path(&self, run_dir: &Path) -> PathBuf {
        run_dir.join(&self.cell_states)
    }
}
