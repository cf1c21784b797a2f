//! Sparse per-cell discrete states and their projection onto the lattice.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use ndarray::{Array1, Array3, Axis};

use super::tsv::TsvTable;
use crate::config::LogFiles;
use crate::error::{Error, Result};

/// Id used on the lattice for sites without a cell.
pub const EMPTY_SITE: u32 = 0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellStateRecord {
    pub time: usize,
    pub cell_id: u32,
    pub state: f64,
}

/// Cell states grouped by timestep.
#[derive(Clone, Debug, Default)]
pub struct CellStateLog {
    path: PathBuf,
    by_time: BTreeMap<usize, HashMap<u32, f64>>,
}

fn as_index(
    value: f64,
    what: &str,
    path: &Path,
    at: std::fmt::Arguments<'_>,
) -> Result<usize> {
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 {
        Ok(value as usize)
    } else {
        Err(Error::parse(
            path,
            format!("{at}: {what} {value} is not a non-negative integer"),
        ))
    }
}

impl CellStateLog {
    pub fn read(path: &Path, layout: &LogFiles) -> Result<Self> {
        let table = TsvTable::read(path)?;
        Self::from_table(&table, layout)
    }

    pub fn from_table(table: &TsvTable, layout: &LogFiles) -> Result<Self> {
        let times = table.column(&layout.time_column)?;
        let ids = table.column(&layout.cell_id_column)?;
        let states = table.column(&layout.state_column)?;

        let mut records = Vec::with_capacity(table.n_rows());
        for (row, ((&t, &id), &state)) in times.iter().zip(ids).zip(states).enumerate() {
            records.push(CellStateRecord {
                time: as_index(t, "time", table.path(), format_args!("row {row}"))?,
                cell_id: as_index(id, "cell id", table.path(), format_args!("row {row}"))? as u32,
                state,
            });
        }
        Ok(Self::from_records(table.path(), records))
    }

    pub fn from_records(
        path: &Path,
        records: impl IntoIterator<Item = CellStateRecord>,
    ) -> Self {
        let mut by_time: BTreeMap<usize, HashMap<u32, f64>> = BTreeMap::new();
        for record in records {
            by_time
                .entry(record.time)
                .or_default()
                .insert(record.cell_id, record.state);
        }
        Self {
            path: path.to_path_buf(),
            by_time,
        }
    }

    /// Cell id stored on the lattice at timestep `t`.
    fn lattice_id(&self, value: f64, t: usize) -> Result<u32> {
        let id = as_index(value, "lattice id", &self.path, format_args!("time {t}"))?;
        u32::try_from(id).map_err(|_| {
            Error::parse(&self.path, format!("time {t}: lattice id {id} too large"))
        })
    }

    /// States logged at `time`, keyed by cell id.
    pub fn states_at(&self, time: usize) -> Option<&HashMap<u32, f64>> {
        self.by_time.get(&time)
    }

    /// Last logged timestep.
    pub fn max_time(&self) -> Option<usize> {
        self.by_time.keys().next_back().copied()
    }

    /// Replace every cell id on the lattice by that cell's state.
    ///
    /// Empty sites take `empty_state`. A timestep without any record becomes
    /// a layer of `empty_state` (the simulator skips the final frame).
    pub fn project_onto(&self, ids: &Array3<f64>, empty_state: f64) -> Result<Array3<f64>> {
        let mut states = Array3::from_elem(ids.raw_dim(), empty_state);
        for (t, (id_layer, mut state_layer)) in ids
            .axis_iter(Axis(0))
            .zip(states.axis_iter_mut(Axis(0)))
            .enumerate()
        {
            let Some(lookup) = self.states_at(t) else {
                continue;
            };
            for (&id, state) in id_layer.iter().zip(state_layer.iter_mut()) {
                let id = self.lattice_id(id, t)?;
                if id == EMPTY_SITE {
                    continue;
                }
                *state = *lookup.get(&id).ok_or_else(|| {
                    Error::parse(&self.path, format!("cell {id} has no state at time {t}"))
                })?;
            }
        }
        Ok(states)
    }

    /// Lattice volume occupied by cells in `target_state`, per timestep.
    ///
    /// Cell volumes are measured once, on the id layer at `reference_step`
    /// (the first frame after the warm-up freeze), and summed per timestep
    /// over the cells whose logged state equals `target_state`. The result is
    /// dense over `0..=max_time`.
    pub fn occupied_volume(
        &self,
        ids: &Array3<f64>,
        reference_step: usize,
        target_state: f64,
    ) -> Result<Array1<f64>> {
        if reference_step >= ids.len_of(Axis(0)) {
            return Err(Error::parse(
                &self.path,
                format!(
                    "reference step {reference_step} beyond {} logged frames",
                    ids.len_of(Axis(0))
                ),
            ));
        }
        let mut volumes: HashMap<u32, f64> = HashMap::new();
        for &id in ids.index_axis(Axis(0), reference_step) {
            *volumes
                .entry(self.lattice_id(id, reference_step)?)
                .or_insert(0.0) += 1.0;
        }
        volumes.insert(EMPTY_SITE, 0.0);

        let n_times = self.max_time().map_or(0, |t| t + 1);
        let mut occupied = Array1::zeros(n_times);
        for (&t, states) in &self.by_time {
            occupied[t] = states
                .iter()
                .filter(|&(_, &state)| state == target_state)
                .map(|(id, _)| volumes.get(id).copied().unwrap_or(0.0))
                .sum();
        }
        Ok(occupied)
    }
}
