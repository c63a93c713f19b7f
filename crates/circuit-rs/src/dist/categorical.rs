use rand::{Rng, RngCore};

use super::{DistSignature, Distribution};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Categorical {
    pub num_cats: usize,
}

impl Categorical {
    pub fn new(num_cats: usize) -> Self {
        Self { num_cats }
    }
}

impl Distribution for Categorical {
    fn signature(&self) -> DistSignature {
        DistSignature("Categorical")
    }

    fn num_parameters(&self) -> usize {
        self.num_cats
    }

    fn num_param_flows(&self) -> usize {
        self.num_cats
    }

    fn metadata(&self) -> Vec<f32> {
        vec![self.num_cats as f32]
    }

    fn init_parameters(
        &self,
        num_nodes: usize,
        perturbation: f32,
        rng: &mut dyn RngCore,
    ) -> Vec<f32> {
        let mut params = Vec::with_capacity(num_nodes * self.num_cats);
        for _ in 0..num_nodes {
            let start = params.len();
            params.extend((0..self.num_cats).map(|_| (rng.gen::<f32>() * perturbation).exp()));
            let total: f32 = params[start..].iter().sum();
            for value in &mut params[start..] {
                *value /= total;
            }
        }
        params
    }

    /// Rows are rescaled to sum to one; rows without positive mass become uniform.
    fn normalize_parameters(&self, params: &mut [f32]) {
        if self.num_cats == 0 {
            return;
        }
        for row in params.chunks_mut(self.num_cats) {
            for value in row.iter_mut() {
                *value = value.max(0.0);
            }
            let total: f32 = row.iter().sum();
            if total > 0.0 && total.is_finite() {
                row.iter_mut().for_each(|value| *value /= total);
            } else {
                row.fill(1.0 / self.num_cats as f32);
            }
        }
    }
}
