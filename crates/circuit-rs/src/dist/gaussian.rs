use rand::{Rng, RngCore};

use super::{DistSignature, Distribution};

/// Univariate Gaussian parameterized by `(mu, sigma)`.
///
/// Flows carry three sufficient statistics per node: total weight, weighted sum and
/// weighted sum of squares.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gaussian {
    pub mu: f32,
    pub sigma: f32,
    pub min_sigma: f32,
}

impl Gaussian {
    pub fn new(mu: f32, sigma: f32) -> Self {
        Self {
            mu,
            sigma,
            min_sigma: 0.01,
        }
    }
}

impl Default for Gaussian {
    fn default() -> Self {
        Self::new(0.0, 1.0)
    }
}

impl Distribution for Gaussian {
    fn signature(&self) -> DistSignature {
        DistSignature("Gaussian")
    }

    fn num_parameters(&self) -> usize {
        2
    }

    fn num_param_flows(&self) -> usize {
        3
    }

    fn metadata(&self) -> Vec<f32> {
        vec![self.min_sigma]
    }

    fn init_parameters(
        &self,
        num_nodes: usize,
        perturbation: f32,
        rng: &mut dyn RngCore,
    ) -> Vec<f32> {
        let mut params = Vec::with_capacity(num_nodes * 2);
        for _ in 0..num_nodes {
            let mu = self.mu + (rng.gen::<f32>() * 2.0 - 1.0) * perturbation * self.sigma;
            let sigma = (self.sigma * (1.0 + rng.gen::<f32>() * 0.1)).max(self.min_sigma);
            params.push(mu);
            params.push(sigma);
        }
        params
    }

    fn normalize_parameters(&self, params: &mut [f32]) {
        for pair in params.chunks_mut(2) {
            if let [_, sigma] = pair {
                *sigma = sigma.max(self.min_sigma);
            }
        }
    }
}
