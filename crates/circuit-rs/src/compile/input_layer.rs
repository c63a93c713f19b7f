use std::collections::HashSet;

use rand::RngCore;
use serde::Serialize;

use crate::dist::DistSignature;
use crate::fusion::FusionPlan;
use crate::graph::{Circuit, NodeId};

use super::index::IndexMatrix;
use super::layering::InputLayerNodes;
use super::offsets::{OffsetRange, OffsetTable};

/// Input node vectors sharing one distribution signature, with per-scalar-node metadata.
///
/// Each input layer owns separate parameter, parameter-flow and metadata buffers; the
/// offsets below index into those buffers, not into the sum-layer ones.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputLayer {
    pub index: usize,
    pub signature: DistSignature,
    pub nodes: Vec<NodeId>,
    /// Contiguous node-value range written by this layer.
    pub node_values: OffsetRange,
    /// Variables read by every scalar node, one row per node.
    pub vids: IndexMatrix,
    pub s_pids: Vec<u32>,
    pub s_pfids: Vec<u32>,
    pub s_mids: Vec<u32>,
    /// Layer-local indices of the scalar nodes whose parameter ranges cover the whole
    /// parameter buffer exactly once (one representative per parameter owner).
    pub source_nids: Vec<u32>,
    pub metadata: Vec<f32>,
    pub num_parameters: usize,
    pub num_param_flows: usize,
    pub fusion: FusionPlan,
}

impl InputLayer {
    pub fn num_nodes(&self) -> usize {
        self.s_pids.len()
    }

    /// Initial parameter buffer for this layer. Owners with supplied parameters keep them,
    /// the rest are drawn from their distribution.
    pub fn init_parameters(
        &self,
        circuit: &Circuit,
        offsets: &OffsetTable,
        perturbation: f32,
        rng: &mut dyn RngCore,
    ) -> Vec<f32> {
        let mut params = vec![0.0f32; self.num_parameters];
        let mut seen = HashSet::new();
        for &id in &self.nodes {
            let owner = circuit.param_owner(id);
            if !seen.insert(owner) {
                continue;
            }
            let range = offsets
                .of(id)
                .params
                .expect("input node vectors always have parameters");
            let slot = &mut params[range.start as usize..range.end as usize];
            let node = circuit.node(owner);
            if let Some(supplied) = &node.params {
                slot.copy_from_slice(supplied);
                continue;
            }
            let dist = node.dist().expect("parameter owner of an input is an input");
            slot.copy_from_slice(&dist.init_parameters(node.num_nodes(), perturbation, rng));
        }
        params
    }
}

pub(crate) fn compile_input_layer(
    circuit: &Circuit,
    offsets: &OffsetTable,
    index: usize,
    layer: &InputLayerNodes,
    fusion: FusionPlan,
) -> InputLayer {
    let first = offsets.of(layer.nodes[0]).node_values.start;
    let mut end = first;
    let mut num_vars = 0usize;
    let mut vids: Vec<Vec<u32>> = Vec::new();
    let mut s_pids = Vec::new();
    let mut s_pfids = Vec::new();
    let mut s_mids = Vec::new();
    let mut source_nids = Vec::new();
    let mut metadata = Vec::new();
    let mut owners_seen = HashSet::new();

    for &id in &layer.nodes {
        let node = circuit.node(id);
        let dist = node.dist().expect("input layers only hold input node vectors");
        let node_offsets = offsets.of(id);
        debug_assert_eq!(node_offsets.node_values.start, end);
        end = node_offsets.node_values.end;
        num_vars = num_vars.max(dist.num_vars());

        let params = node_offsets.params.expect("input parameters are allocated");
        let flows = node_offsets.param_flows.expect("input flows are allocated");
        let meta = node_offsets.metadata.expect("input metadata is allocated");
        metadata.extend(dist.metadata());

        let is_representative = owners_seen.insert(circuit.param_owner(id));
        for k in 0..node.num_nodes() as u32 {
            if is_representative {
                source_nids.push(s_pids.len() as u32);
            }
            vids.push(node.scope.vars().to_vec());
            s_pids.push(params.start + k * dist.num_parameters() as u32);
            s_pfids.push(flows.start + k * dist.num_param_flows() as u32);
            s_mids.push(meta.start);
        }
    }

    let layer_sizes = offsets.input_spaces[index];
    debug_assert_eq!(metadata.len(), layer_sizes.metadata);
    InputLayer {
        index,
        signature: layer.signature,
        nodes: layer.nodes.clone(),
        node_values: OffsetRange::new(first, end),
        vids: IndexMatrix::from_rows(vids, num_vars),
        s_pids,
        s_pfids,
        s_mids,
        source_nids,
        metadata,
        num_parameters: layer_sizes.params,
        num_param_flows: layer_sizes.param_flows,
        fusion,
    }
}
