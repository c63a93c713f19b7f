use rand::{Rng, RngCore};

use super::{DistSignature, Distribution};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bernoulli;

impl Distribution for Bernoulli {
    fn signature(&self) -> DistSignature {
        DistSignature("Bernoulli")
    }

    fn num_parameters(&self) -> usize {
        1
    }

    fn num_param_flows(&self) -> usize {
        1
    }

    fn init_parameters(
        &self,
        num_nodes: usize,
        perturbation: f32,
        rng: &mut dyn RngCore,
    ) -> Vec<f32> {
        (0..num_nodes)
            .map(|_| {
                let a = (rng.gen::<f32>() * perturbation).exp();
                let b = (rng.gen::<f32>() * perturbation).exp();
                a / (a + b)
            })
            .collect()
    }

    fn normalize_parameters(&self, params: &mut [f32]) {
        for p in params {
            *p = if p.is_nan() { 0.5 } else { p.clamp(0.0, 1.0) };
        }
    }
}
