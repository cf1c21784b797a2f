//! Per-timestep population counts.

use std::path::Path;

use ndarray::Array1;

use super::tsv::TsvTable;
use crate::config::LogFiles;
use crate::error::Result;

/// Target and infected cell counts, one entry per logged timestep.
#[derive(Clone, Debug, PartialEq)]
pub struct PopulationLog {
    pub target: Array1<f64>,
    pub infected: Array1<f64>,
}

impl PopulationLog {
    pub fn read(path: &Path, layout: &LogFiles) -> Result<Self> {
        let table = TsvTable::read(path)?;
        Self::from_table(&table, layout)
    }

    pub fn from_table(table: &TsvTable, layout: &LogFiles) -> Result<Self> {
        Ok(Self {
            target: table.column(&layout.target_column)?.to_owned(),
            infected: table.column(&layout.infected_column)?.to_owned(),
        })
    }

    pub fn len(&self) -> usize {
        self.infected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infected.is_empty()
    }
}
