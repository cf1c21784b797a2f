//! Lattice snapshots written one timestep after another.
//!
//! Each timestep occupies `grid_size + 1` lines: a sentinel line whose
//! grid-index column holds `grid_size`, then one line per lattice row. The
//! very first sentinel doubles as the file header, so the grid-index column is
//! the one labelled with the grid size.

use std::path::Path;

use ndarray::{Array1, Array3};

use super::tsv::TsvTable;
use crate::error::{Error, Result};

/// Which lattice log to read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GridKind {
    /// Concentration of the diffusing quantity.
    Concentration,
    /// Id of the cell occupying each site, 0 for none.
    CellId,
}

/// Read a lattice log into a `(timesteps + 1, grid_size, grid_size)` array.
pub fn read_grid(path: &Path, grid_size: usize, timesteps: usize) -> Result<Array3<f64>> {
    let table = TsvTable::read(path)?;
    grid_from_table(&table, grid_size, timesteps)
}

/// Drop sentinel rows and reshape the remaining lattice rows.
pub fn grid_from_table(
    table: &TsvTable,
    grid_size: usize,
    timesteps: usize,
) -> Result<Array3<f64>> {
    let index_col = table.column_index(&grid_size.to_string())?;
    let value_cols: Vec<usize> = (0..table.header().len())
        .filter(|&c| c != index_col)
        .collect();
    if value_cols.len() != grid_size {
        return Err(Error::parse(
            table.path(),
            format!(
                "{} value columns, expected one per lattice column ({grid_size})",
                value_cols.len()
            ),
        ));
    }

    let sentinel = grid_size as f64;
    let values = table.values();
    let mut flat = Vec::with_capacity((timesteps + 1) * grid_size * grid_size);
    for row in values.outer_iter() {
        if row[index_col] == sentinel {
            continue;
        }
        flat.extend(value_cols.iter().map(|&c| row[c]));
    }

    let n_rows = flat.len() / grid_size;
    let expected_rows = (timesteps + 1) * grid_size;
    if n_rows != expected_rows {
        return Err(Error::parse(
            table.path(),
            format!("{n_rows} lattice rows after dropping sentinels, expected {expected_rows}"),
        ));
    }
    Ok(Array3::from_shape_vec((timesteps + 1, grid_size, grid_size), flat)?)
}

/// Total amount on the lattice per timestep.
pub fn lattice_totals(grid: &Array3<f64>) -> Array1<f64> {
    grid.outer_iter().map(|layer| layer.sum()).collect()
}
