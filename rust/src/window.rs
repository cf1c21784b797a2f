//! Temporal cutoff window.
//!
//! Every time axis is cut to `[cut_off_start + 1, timesteps - cut_off_end)`
//! so that all channels of a run share one length, free of warm-up and
//! cool-down artifacts.

use std::ops::Range;

use ndarray::{Array, ArrayBase, Axis, Data, Dimension, Slice};
use serde::Serialize;
use thiserror::Error;

/// The window did not yield the configured number of timesteps.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq, Serialize)]
pub enum WindowError {
    #[error("windowed series has {actual} timesteps, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("axis {axis} out of bounds for array with {ndim} dimensions")]
    AxisOutOfBounds { axis: usize, ndim: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CutoffWindow {
    pub start: usize,
    pub end: usize,
    pub timesteps: usize,
}

impl CutoffWindow {
    pub fn new(start: usize, end: usize, timesteps: usize) -> Self {
        Self {
            start,
            end,
            timesteps,
        }
    }

    /// Number of timesteps kept: `timesteps - start - end - 1`.
    pub fn expected_len(&self) -> usize {
        self.timesteps.saturating_sub(self.start + self.end + 1)
    }

    /// Index range kept along the time axis.
    pub fn range(&self) -> Range<usize> {
        let first = self.start + 1;
        let last = self.timesteps.saturating_sub(self.end).max(first);
        first..last
    }

    /// Slice `array` along `axis`.
    ///
    /// A series too short to cover the window is an error, never a silently
    /// shorter slice.
    pub fn apply<S, D>(
        &self,
        array: &ArrayBase<S, D>,
        axis: Axis,
    ) -> Result<Array<S::Elem, D>, WindowError>
    where
        S: Data,
        S::Elem: Clone,
        D: Dimension,
    {
        if axis.index() >= array.ndim() {
            return Err(WindowError::AxisOutOfBounds {
                axis: axis.index(),
                ndim: array.ndim(),
            });
        }
        let range = self.range();
        let len = array.len_of(axis);
        let available = len.min(range.end).saturating_sub(range.start);
        if available != self.expected_len() {
            return Err(WindowError::LengthMismatch {
                expected: self.expected_len(),
                actual: available,
            });
        }
        Ok(array
            .slice_axis(axis, Slice::from(range.start..range.end))
            .to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array3};

    #[test]
    fn test_window_bounds() {
        let window = CutoffWindow::new(9, 10, 50);
        assert_eq!(window.range(), 10..40);
        assert_eq!(window.expected_len(), 30);
    }

    #[test]
    fn test_apply_series() {
        let window = CutoffWindow::new(1, 2, 10);
        let series = Array1::from_iter((0..11).map(|t| t as f64));
        let cut = window.apply(&series, Axis(0)).unwrap();
        assert_eq!(cut.to_vec(), vec![2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(cut.len(), window.expected_len());
    }

    #[test]
    fn test_series_without_final_frame_still_fits() {
        // Population logs carry `timesteps` rows, grid logs `timesteps + 1`.
        let window = CutoffWindow::new(1, 2, 10);
        let series = Array1::from_iter((0..10).map(|t| t as f64));
        assert_eq!(window.apply(&series, Axis(0)).unwrap().len(), 6);
    }

    #[test]
    fn test_truncated_series_is_rejected() {
        let window = CutoffWindow::new(1, 2, 10);
        let series = Array1::<f64>::zeros(6);
        assert_eq!(
            window.apply(&series, Axis(0)),
            Err(WindowError::LengthMismatch {
                expected: 6,
                actual: 4
            })
        );
    }

    #[test]
    fn test_apply_last_axis_of_grid() {
        let window = CutoffWindow::new(0, 1, 4);
        let grid = Array3::from_shape_fn((2, 2, 5), |(r, c, t)| (r * 100 + c * 10 + t) as f32);
        let cut = window.apply(&grid, Axis(2)).unwrap();
        assert_eq!(cut.shape(), &[2, 2, 2]);
        assert_eq!(cut[[1, 1, 0]], 111.0);
        assert_eq!(cut[[0, 1, 1]], 12.0);
    }

    #[test]
    fn test_bad_axis() {
        let window = CutoffWindow::new(0, 1, 4);
        let series = Array1::<f64>::zeros(5);
        assert!(matches!(
            window.apply(&series, Axis(1)),
            Err(WindowError::AxisOutOfBounds { .. })
        ));
    }
}
