//! Numeric tab-separated tables as written by the simulator's loggers.

use std::fs;
use std::path::{Path, PathBuf};

use ndarray::{Array2, ArrayView1, Axis};

use crate::error::{Error, Result};

/// A header row plus a dense `(rows, columns)` block of numbers.
#[derive(Clone, Debug)]
pub struct TsvTable {
    path: PathBuf,
    header: Vec<String>,
    values: Array2<f64>,
}

impl TsvTable {
    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::parse(path, &text)
    }

    /// Parse table text; `path` only labels errors.
    pub fn parse(path: &Path, text: &str) -> Result<Self> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line.trim_end()))
            .filter(|(_, line)| !line.is_empty());

        let (_, header_line) = lines
            .next()
            .ok_or_else(|| Error::parse(path, "file is empty"))?;
        let header: Vec<String> = header_line
            .split('\t')
            .map(|label| label.trim().trim_matches('"').to_string())
            .collect();
        let n_cols = header.len();

        let mut flat = Vec::new();
        let mut n_rows = 0;
        for (line_no, line) in lines {
            let before = flat.len();
            for field in line.split('\t') {
                let value = field.trim().parse::<f64>().map_err(|_| {
                    Error::parse(path, format!("line {line_no}: '{field}' is not a number"))
                })?;
                flat.push(value);
            }
            let width = flat.len() - before;
            if width != n_cols {
                return Err(Error::parse(
                    path,
                    format!("line {line_no}: {width} fields, header has {n_cols}"),
                ));
            }
            n_rows += 1;
        }

        let values = Array2::from_shape_vec((n_rows, n_cols), flat)?;
        Ok(Self {
            path: path.to_path_buf(),
            header,
            values,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn column_index(&self, label: &str) -> Result<usize> {
        self.header
            .iter()
            .position(|h| h == label)
            .ok_or_else(|| Error::parse(&self.path, format!("missing column '{label}'")))
    }

    pub fn column(&self, label: &str) -> Result<ArrayView1<'_, f64>> {
        let idx = self.column_index(label)?;
        Ok(self.values.index_axis(Axis(1), idx))
    }
}
