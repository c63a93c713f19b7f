//! Lowering of an immutable [`Circuit`] into offset tables and partitioned index tensors.
//!
//! Compilation is a pure function of the circuit and the [`CompileOptions`]: the same inputs
//! always produce byte-identical plans, which [`CompiledCircuit::fingerprint`] exposes.

mod index;
mod input_layer;
mod layer;
mod layering;
mod offsets;
mod partition;

use std::collections::HashSet;

use anyhow::Result;
use rand::{Rng, RngCore};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::config::CompileOptions;
use crate::fusion::{compile_tied_flow_fusion, FusionPlan};
use crate::graph::{sum_fan_in, Circuit, GraphError, NodeId, NodeKind};
use crate::hashing::hash_serializable;

pub use index::{IndexMatrix, PAD};
pub use input_layer::InputLayer;
pub use layer::{CompiledLayer, LayerPartition};
pub use layering::{plan_layers, InnerLayerNodes, InputLayerNodes, LayerKind, LayerLayout};
pub use offsets::{
    assign_offsets, InputSpaceSizes, NodeOffsets, OffsetAllocator, OffsetRange, OffsetSpace,
    OffsetTable,
};
pub use partition::{padding_ratio, partition_counts, partition_of, partition_widths};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("{space} cannot hold {width} more slots for node {node}")]
    OffsetOverflow {
        space: OffsetSpace,
        node: NodeId,
        width: usize,
    },
    #[error(
        "parameters of node {source_node} are tied to {count} node vectors, a fused cardinality \
         of {cardinality} above the limit of {cap}; tie fewer copies to each source or split \
         them over several sources"
    )]
    TiedCardinality {
        source_node: NodeId,
        count: usize,
        cardinality: usize,
        cap: usize,
    },
    #[error("invalid compile options: {0}")]
    InvalidOptions(String),
}

/// Everything executors need to evaluate and train one circuit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledCircuit {
    pub group_size: usize,
    pub root: NodeId,
    pub offsets: OffsetTable,
    pub input_layers: Vec<InputLayer>,
    /// `product(1), sum(1), product(2), sum(2), ...`
    pub inner_layers: Vec<CompiledLayer>,
    pub sum_fusion: FusionPlan,
    pub options: CompileOptions,
}

impl CompiledCircuit {
    pub fn num_node_values(&self) -> usize {
        self.offsets.num_node_values
    }

    pub fn num_sum_params(&self) -> usize {
        self.offsets.num_sum_params
    }

    pub fn num_sum_param_flows(&self) -> usize {
        self.offsets.num_sum_param_flows
    }

    pub fn node_offsets(&self, node: NodeId) -> Option<&NodeOffsets> {
        self.offsets.get(node)
    }

    /// Node-value range of the root node vector.
    pub fn root_values(&self) -> OffsetRange {
        self.offsets.of(self.root).node_values
    }

    pub fn num_edges(&self) -> usize {
        self.inner_layers.iter().map(|layer| layer.num_edges).sum()
    }

    pub fn fingerprint(&self) -> Result<u64> {
        hash_serializable(self)
    }

    /// Random sum parameters, normalized over the children of every scalar sum node.
    pub fn init_sum_params(&self, circuit: &Circuit, rng: &mut dyn RngCore) -> Vec<f32> {
        let group_size = self.group_size;
        let mut params = vec![0.0f32; self.num_sum_params()];
        let mut seen = HashSet::new();
        for (id, node_offsets) in self.offsets.iter() {
            let node = circuit.node(id);
            if !matches!(node.kind, NodeKind::Sum) || !seen.insert(circuit.param_owner(id)) {
                continue;
            }
            let Some(range) = node_offsets.params else {
                continue;
            };
            let fan_in = sum_fan_in(circuit.raw_nodes(), node);
            for group in 0..node.num_node_groups {
                let base = range.start as usize + group * fan_in * group_size;
                for lane in 0..group_size {
                    let slots = (0..fan_in).map(|j| base + j * group_size + lane);
                    let mut total = 0.0f32;
                    for slot in slots.clone() {
                        let value: f32 = rng.gen_range(0.01..1.0);
                        params[slot] = value;
                        total += value;
                    }
                    for slot in slots {
                        params[slot] /= total;
                    }
                }
            }
        }
        params
    }
}

/// Compiles `circuit` into executable layers and fusion plans.
pub fn compile(
    circuit: &Circuit,
    options: &CompileOptions,
) -> Result<CompiledCircuit, CompileError> {
    options.validate()?;

    let layout = plan_layers(circuit);
    let offsets = assign_offsets(circuit, &layout)?;

    let mut input_layers = Vec::with_capacity(layout.input_layers.len());
    for (index, layer) in layout.input_layers.iter().enumerate() {
        let fusion = compile_tied_flow_fusion(&offsets.input_tied_sets[index], &options.fusion)?;
        input_layers.push(input_layer::compile_input_layer(
            circuit, &offsets, index, layer, fusion,
        ));
    }

    let inner_layers: Vec<CompiledLayer> = layout
        .inner_layers
        .iter()
        .map(|layer| {
            layer::compile_inner_layer(
                circuit,
                &offsets,
                layer,
                options.layer_sparsity_tol,
                options.max_num_partitions,
            )
        })
        .collect();
    let sum_fusion = compile_tied_flow_fusion(&offsets.sum_tied_sets, &options.fusion)?;

    let compiled = CompiledCircuit {
        group_size: circuit.group_size(),
        root: circuit.root(),
        offsets,
        input_layers,
        inner_layers,
        sum_fusion,
        options: *options,
    };
    info!(
        node_values = compiled.num_node_values(),
        sum_params = compiled.num_sum_params(),
        input_layers = compiled.input_layers.len(),
        inner_layers = compiled.inner_layers.len(),
        edges = compiled.num_edges(),
        fusion_jobs = compiled.sum_fusion.num_jobs(),
        "compiled circuit"
    );
    Ok(compiled)
}
