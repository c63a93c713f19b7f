//! Executor surface consumed by numeric backends.
//!
//! Backends receive caller-owned buffers and read-only compiled plans; they never resize a
//! buffer. Every entry point validates the offsets it is about to touch before writing.

pub mod registry;

use thiserror::Error;

use crate::compile::{CompiledCircuit, CompiledLayer};
use crate::fusion::FusionPlan;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("{buffer} buffer holds {actual} values, plan requires {required}")]
    BufferTooSmall {
        buffer: &'static str,
        required: usize,
        actual: usize,
    },
    #[error("offset {offset} with span {span} lies outside the {buffer} buffer of length {len}")]
    OutOfBounds {
        buffer: &'static str,
        offset: u32,
        span: u32,
        len: usize,
    },
    #[error("backend execution failure: {message}")]
    Execution { message: String },
}

impl BackendError {
    pub fn execution(message: impl Into<String>) -> Self {
        BackendError::Execution {
            message: message.into(),
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

pub trait CircuitBackend: Send + Sync {
    fn backend_name(&self) -> &str;

    /// Overwrites every job target of `plan` with the sum of its valid replica spans.
    fn accumulate_tied_flows(&self, flows: &mut [f32], plan: &FusionPlan) -> BackendResult<()>;

    /// Evaluates one product or sum layer in the log domain, batch size one.
    fn forward_layer(
        &self,
        node_values: &mut [f32],
        sum_params: &[f32],
        layer: &CompiledLayer,
    ) -> BackendResult<()>;

    /// Runs every inner layer in order. Input node values must already be in place.
    fn forward(
        &self,
        compiled: &CompiledCircuit,
        node_values: &mut [f32],
        sum_params: &[f32],
    ) -> BackendResult<()> {
        check_len("node value", compiled.num_node_values(), node_values.len())?;
        check_len("sum parameter", compiled.num_sum_params(), sum_params.len())?;
        for layer in &compiled.inner_layers {
            self.forward_layer(node_values, sum_params, layer)?;
        }
        Ok(())
    }
}

pub fn check_len(buffer: &'static str, required: usize, actual: usize) -> BackendResult<()> {
    if actual < required {
        return Err(BackendError::BufferTooSmall {
            buffer,
            required,
            actual,
        });
    }
    Ok(())
}

/// Rejects plans that would touch flows outside `[0, len)`.
pub fn check_fusion_bounds(plan: &FusionPlan, len: usize) -> BackendResult<()> {
    for job in plan.jobs() {
        for offset in std::iter::once(job.target).chain(job.valid_replicas()) {
            let end = offset as usize + job.block_size as usize;
            if end > len {
                return Err(BackendError::OutOfBounds {
                    buffer: "parameter flow",
                    offset,
                    span: job.block_size,
                    len,
                });
            }
        }
    }
    Ok(())
}
