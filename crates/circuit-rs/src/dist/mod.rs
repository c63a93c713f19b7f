//! Capability surface of input-node distributions.
//!
//! The compiler never looks inside a distribution: it only needs to know how many
//! parameters and parameter flows every scalar node owns, how much metadata the node vector
//! carries, and which input layer the distribution belongs to. The numeric kernels that
//! evaluate, differentiate and update these parameters live outside this crate.

mod bernoulli;
mod categorical;
mod gaussian;

use std::fmt;
use std::sync::Arc;

use rand::RngCore;
use serde::Serialize;

pub use bernoulli::Bernoulli;
pub use categorical::Categorical;
pub use gaussian::Gaussian;

/// Distributions sharing a signature are compiled into the same input layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DistSignature(pub &'static str);

impl fmt::Display for DistSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

pub trait Distribution: fmt::Debug + Send + Sync {
    fn signature(&self) -> DistSignature;

    /// Number of variables a single input node reads.
    fn num_vars(&self) -> usize {
        1
    }

    /// The number of parameters per node.
    fn num_parameters(&self) -> usize;

    /// The number of parameter flows per node.
    fn num_param_flows(&self) -> usize;

    /// Per node-vector metadata. Every node vector using this distribution stores a block of
    /// exactly this length.
    fn metadata(&self) -> Vec<f32> {
        Vec::new()
    }

    /// Returns `num_nodes * num_parameters()` flattened, valid parameters.
    fn init_parameters(&self, num_nodes: usize, perturbation: f32, rng: &mut dyn RngCore)
        -> Vec<f32>;

    /// Projects caller-supplied parameters (`num_parameters()` per node) onto valid values.
    fn normalize_parameters(&self, _params: &mut [f32]) {}
}

pub type DistRef = Arc<dyn Distribution>;
