// Seedable Gaussian noise for the simulated drive

use rand::prelude::*;
use rand::rngs::SmallRng;
use rand_distr::StandardNormal;

#[derive(Clone)]
pub struct NoiseGenerator {
    rng: SmallRng,
}

impl NoiseGenerator {
    /// Seed 0 draws from entropy; any other seed is reproducible
    pub fn new(seed: u64) -> Self {
        let rng = if seed == 0 {
            SmallRng::from_entropy()
        } else {
            SmallRng::seed_from_u64(seed)
        };
        Self { rng }
    }

    /// Zero-mean sample with the given standard deviation
    #[inline]
    pub fn gaussian(&mut self, stddev: f64) -> f64 {
        if stddev == 0.0 {
            return 0.0;
        }
        let n: f64 = self.rng.sample(StandardNormal);
        n * stddev
    }

    /// `value * (1 + N(0, stddev))`
    #[inline]
    pub fn perturb(&mut self, value: f64, stddev: f64) -> f64 {
        value * (1.0 + self.gaussian(stddev))
    }
}
