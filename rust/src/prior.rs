//! Independent uniform priors over the sampled parameters.

use ndarray::{Array1, Array2, Axis};
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::config::ExperimentConfig;
use crate::error::{Error, Result};

/// Draws used by [`UniformPrior::estimate_means_and_stds`] unless told otherwise.
pub const DEFAULT_MOMENT_DRAWS: usize = 1000;

/// One `U[low, high)` per parameter, in configured prior order.
#[derive(Clone, Debug)]
pub struct UniformPrior {
    names: Vec<String>,
    marginals: Vec<Uniform<f64>>,
}

impl UniformPrior {
    pub fn from_config(config: &ExperimentConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            names: config.priors.iter().map(|p| p.name.clone()).collect(),
            marginals: config
                .priors
                .iter()
                .map(|p| Uniform::new(p.low, p.high))
                .collect(),
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn dim(&self) -> usize {
        self.marginals.len()
    }

    /// One draw.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Array1<f64> {
        self.marginals.iter().map(|m| m.sample(rng)).collect()
    }

    /// `(n, dim)` draws. Draw `i` uses the seed `seed + i`, so results do not
    /// depend on the thread count.
    pub fn sample_batch(&self, n: usize, seed: u64) -> Array2<f64> {
        let draws: Vec<Array1<f64>> = (0..n)
            .into_par_iter()
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
                self.sample(&mut rng)
            })
            .collect();

        let mut batch = Array2::zeros((n, self.dim()));
        for (mut row, draw) in batch.outer_iter_mut().zip(&draws) {
            row.assign(draw);
        }
        batch
    }

    /// Monte-Carlo means and population standard deviations from `n` draws.
    pub fn estimate_means_and_stds(
        &self,
        n: usize,
        seed: u64,
    ) -> Result<(Array1<f64>, Array1<f64>)> {
        let draws = self.sample_batch(n, seed);
        let means = draws.mean_axis(Axis(0)).ok_or_else(|| {
            Error::Dimension("cannot estimate prior moments from zero draws".to_string())
        })?;
        let stds = draws.std_axis(Axis(0), 0.0);
        Ok((means, stds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PriorSpec;
    use approx::assert_abs_diff_eq;

    fn prior() -> UniformPrior {
        UniformPrior::from_config(&ExperimentConfig {
            priors: vec![
                PriorSpec::uniform("b_cf", 0.0, 1.0),
                PriorSpec::uniform("p_V", 2.0, 4.0),
            ],
            ..ExperimentConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_draws_within_bounds() {
        let draws = prior().sample_batch(500, 7);
        assert_eq!(draws.shape(), &[500, 2]);
        assert!(draws.column(0).iter().all(|&v| (0.0..1.0).contains(&v)));
        assert!(draws.column(1).iter().all(|&v| (2.0..4.0).contains(&v)));
    }

    #[test]
    fn test_seeded_batches_repeat() {
        let prior = prior();
        assert_eq!(prior.sample_batch(20, 3), prior.sample_batch(20, 3));
        assert_ne!(prior.sample_batch(20, 3), prior.sample_batch(20, 4));
    }

    #[test]
    fn test_moments_close_to_analytic() {
        let (means, stds) = prior().estimate_means_and_stds(20_000, 11).unwrap();
        assert_abs_diff_eq!(means[0], 0.5, epsilon = 0.02);
        assert_abs_diff_eq!(means[1], 3.0, epsilon = 0.04);
        assert_abs_diff_eq!(stds[0], 1.0 / 12f64.sqrt(), epsilon = 0.02);
        assert_abs_diff_eq!(stds[1], 2.0 / 12f64.sqrt(), epsilon = 0.04);
    }

    #[test]
    fn test_moments_need_draws() {
        assert!(prior().estimate_means_and_stds(0, 1).is_err());
    }
}
