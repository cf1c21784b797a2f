//! Trainer boundary: turns `(prior_draws, sim_data)` into network inputs.

use ndarray::{Array1, Array2, ArrayD, ArrayView2, ArrayViewD};

use crate::error::{Error, Result};
use crate::prior::UniformPrior;

/// Network-ready batch.
#[derive(Clone, Debug, PartialEq)]
pub struct Configured {
    /// `(θ - μ) / σ` per parameter.
    pub parameters: Array2<f64>,
    /// `ln(1 + x)` of every observation entry.
    pub summary_conditions: ArrayD<f64>,
}

#[derive(Clone, Debug)]
pub struct Configurator {
    prior_means: Array1<f64>,
    prior_stds: Array1<f64>,
}

impl Configurator {
    pub fn new(prior_means: Array1<f64>, prior_stds: Array1<f64>) -> Result<Self> {
        if prior_means.len() != prior_stds.len() {
            return Err(Error::Dimension(format!(
                "{} prior means but {} prior stds",
                prior_means.len(),
                prior_stds.len()
            )));
        }
        if let Some(bad) = prior_stds.iter().find(|&&s| !(s.is_finite() && s > 0.0)) {
            return Err(Error::Dimension(format!(
                "prior standard deviation {bad} is not positive"
            )));
        }
        Ok(Self {
            prior_means,
            prior_stds,
        })
    }

    /// Standardize with Monte-Carlo moments of `prior`.
    pub fn from_prior(prior: &UniformPrior, draws: usize, seed: u64) -> Result<Self> {
        let (means, stds) = prior.estimate_means_and_stds(draws, seed)?;
        Self::new(means, stds)
    }

    pub fn prior_means(&self) -> &Array1<f64> {
        &self.prior_means
    }

    pub fn prior_stds(&self) -> &Array1<f64> {
        &self.prior_stds
    }

    fn check_width(&self, params: &ArrayView2<'_, f64>) -> Result<()> {
        if params.ncols() != self.prior_means.len() {
            return Err(Error::Dimension(format!(
                "{} parameter columns for {} priors",
                params.ncols(),
                self.prior_means.len()
            )));
        }
        Ok(())
    }

    pub fn prepare_input(
        &self,
        prior_draws: ArrayView2<'_, f64>,
        sim_data: ArrayViewD<'_, f64>,
    ) -> Result<Configured> {
        self.check_width(&prior_draws)?;
        if sim_data.ndim() == 0 || sim_data.shape()[0] != prior_draws.nrows() {
            return Err(Error::Dimension(format!(
                "sim_data shape {:?} does not match {} prior draws",
                sim_data.shape(),
                prior_draws.nrows()
            )));
        }
        Ok(Configured {
            parameters: (&prior_draws - &self.prior_means) / &self.prior_stds,
            summary_conditions: sim_data.mapv(f64::ln_1p),
        })
    }

    /// Map standardized samples (e.g. posterior draws) back to parameter scale.
    pub fn unstandardize(&self, samples: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        self.check_width(&samples)?;
        Ok(&samples * &self.prior_stds + &self.prior_means)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array3};

    fn configurator() -> Configurator {
        Configurator::new(array![0.5, 2.0], array![0.25, 4.0]).unwrap()
    }

    #[test]
    fn test_prepare_input() {
        let draws = array![[0.5, 2.0], [1.0, 10.0]];
        let sim = Array3::from_elem((2, 3, 4), std::f64::consts::E - 1.0).into_dyn();
        let out = configurator()
            .prepare_input(draws.view(), sim.view())
            .unwrap();

        assert_eq!(out.parameters, array![[0.0, 0.0], [2.0, 2.0]]);
        assert_eq!(out.summary_conditions.shape(), &[2, 3, 4]);
        for &v in out.summary_conditions.iter() {
            assert_abs_diff_eq!(v, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_zero_observation_maps_to_zero() {
        let sim = array![[0.0, 3.0]].into_dyn();
        let out = configurator()
            .prepare_input(array![[0.0, 0.0]].view(), sim.view())
            .unwrap();
        assert_eq!(out.summary_conditions[[0, 0]], 0.0);
        assert_abs_diff_eq!(out.summary_conditions[[0, 1]], 4f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_unstandardize_inverts() {
        let c = configurator();
        let draws = array![[0.1, 7.0], [0.9, -3.0]];
        let sim = Array3::<f64>::zeros((2, 1, 1)).into_dyn();
        let standardized = c.prepare_input(draws.view(), sim.view()).unwrap().parameters;
        let back = c.unstandardize(standardized.view()).unwrap();
        for (a, b) in back.iter().zip(draws.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_rejects_mismatched_inputs() {
        let c = configurator();
        let sim = Array3::<f64>::zeros((2, 1, 1)).into_dyn();
        assert!(c.prepare_input(array![[0.1, 0.2, 0.3]].view(), sim.view()).is_err());
        assert!(c.prepare_input(array![[0.1, 0.2]].view(), sim.view()).is_err());
    }

    #[test]
    fn test_rejects_degenerate_stds() {
        assert!(Configurator::new(array![0.0], array![0.0]).is_err());
        assert!(Configurator::new(array![0.0, 1.0], array![1.0]).is_err());
    }
}
