//! Bump-pointer allocation of node-value, parameter, parameter-flow and metadata offsets.
//!
//! Every compilation owns one [`OffsetAllocator`]; nothing is shared across circuits. Node
//! vectors are visited in [`LayerLayout::allocation_order`], so the same circuit always
//! receives the same offsets.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::fusion::TiedSet;
use crate::graph::{sum_fan_in, Circuit, NodeId, NodeKind};

use super::index::PAD;
use super::layering::LayerLayout;
use super::CompileError;

/// Half-open range `[start, end)` inside one offset space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OffsetRange {
    pub start: u32,
    pub end: u32,
}

impl OffsetRange {
    pub fn new(start: u32, end: u32) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        (self.end - self.start) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, offset: u32) -> bool {
        self.start <= offset && offset < self.end
    }

    pub fn overlaps(&self, other: &OffsetRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for OffsetRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OffsetSpace {
    NodeValues,
    SumParams,
    SumParamFlows,
    InputParams { layer: usize },
    InputParamFlows { layer: usize },
    InputMetadata { layer: usize },
}

impl fmt::Display for OffsetSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OffsetSpace::NodeValues => f.write_str("node values"),
            OffsetSpace::SumParams => f.write_str("sum parameters"),
            OffsetSpace::SumParamFlows => f.write_str("sum parameter flows"),
            OffsetSpace::InputParams { layer } => write!(f, "input layer {layer} parameters"),
            OffsetSpace::InputParamFlows { layer } => {
                write!(f, "input layer {layer} parameter flows")
            }
            OffsetSpace::InputMetadata { layer } => write!(f, "input layer {layer} metadata"),
        }
    }
}

#[derive(Debug, Clone)]
struct BumpAllocator {
    space: OffsetSpace,
    next: u32,
}

impl BumpAllocator {
    fn new(space: OffsetSpace) -> Self {
        Self { space, next: 0 }
    }

    fn allocate(&mut self, node: NodeId, width: usize) -> Result<OffsetRange, CompileError> {
        let overflow = || CompileError::OffsetOverflow {
            space: self.space,
            node,
            width,
        };
        let width = u32::try_from(width).map_err(|_| overflow())?;
        let end = self.next.checked_add(width).ok_or_else(overflow)?;
        if end >= PAD {
            return Err(overflow());
        }
        let range = OffsetRange::new(self.next, end);
        self.next = end;
        Ok(range)
    }
}

#[derive(Debug, Clone)]
struct InputSpaces {
    params: BumpAllocator,
    param_flows: BumpAllocator,
    metadata: BumpAllocator,
}

/// Per-compilation offset allocator holding one bump pointer per offset space.
#[derive(Debug, Clone)]
pub struct OffsetAllocator {
    node_values: BumpAllocator,
    sum_params: BumpAllocator,
    sum_param_flows: BumpAllocator,
    inputs: Vec<InputSpaces>,
}

impl OffsetAllocator {
    pub fn new(num_input_layers: usize) -> Self {
        Self {
            node_values: BumpAllocator::new(OffsetSpace::NodeValues),
            sum_params: BumpAllocator::new(OffsetSpace::SumParams),
            sum_param_flows: BumpAllocator::new(OffsetSpace::SumParamFlows),
            inputs: (0..num_input_layers)
                .map(|layer| InputSpaces {
                    params: BumpAllocator::new(OffsetSpace::InputParams { layer }),
                    param_flows: BumpAllocator::new(OffsetSpace::InputParamFlows { layer }),
                    metadata: BumpAllocator::new(OffsetSpace::InputMetadata { layer }),
                })
                .collect(),
        }
    }

    pub fn allocate(
        &mut self,
        space: OffsetSpace,
        node: NodeId,
        width: usize,
    ) -> Result<OffsetRange, CompileError> {
        self.bump_mut(space).allocate(node, width)
    }

    /// Total number of slots handed out in `space`.
    pub fn allocated(&self, space: OffsetSpace) -> usize {
        match space {
            OffsetSpace::NodeValues => self.node_values.next as usize,
            OffsetSpace::SumParams => self.sum_params.next as usize,
            OffsetSpace::SumParamFlows => self.sum_param_flows.next as usize,
            OffsetSpace::InputParams { layer } => self.inputs[layer].params.next as usize,
            OffsetSpace::InputParamFlows { layer } => self.inputs[layer].param_flows.next as usize,
            OffsetSpace::InputMetadata { layer } => self.inputs[layer].metadata.next as usize,
        }
    }

    fn bump_mut(&mut self, space: OffsetSpace) -> &mut BumpAllocator {
        match space {
            OffsetSpace::NodeValues => &mut self.node_values,
            OffsetSpace::SumParams => &mut self.sum_params,
            OffsetSpace::SumParamFlows => &mut self.sum_param_flows,
            OffsetSpace::InputParams { layer } => &mut self.inputs[layer].params,
            OffsetSpace::InputParamFlows { layer } => &mut self.inputs[layer].param_flows,
            OffsetSpace::InputMetadata { layer } => &mut self.inputs[layer].metadata,
        }
    }
}

/// Offsets assigned to one node vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeOffsets {
    pub node_values: OffsetRange,
    /// Parameter range; tied node vectors report their source's range.
    pub params: Option<OffsetRange>,
    pub param_flows: Option<OffsetRange>,
    pub metadata: Option<OffsetRange>,
    pub input_layer: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSpaceSizes {
    pub params: usize,
    pub param_flows: usize,
    pub metadata: usize,
}

/// Result of offset allocation for a whole circuit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OffsetTable {
    nodes: BTreeMap<NodeId, NodeOffsets>,
    pub num_node_values: usize,
    pub num_sum_params: usize,
    pub num_sum_param_flows: usize,
    pub input_spaces: Vec<InputSpaceSizes>,
    pub sum_tied_sets: Vec<TiedSet>,
    pub input_tied_sets: Vec<Vec<TiedSet>>,
}

impl OffsetTable {
    pub fn get(&self, node: NodeId) -> Option<&NodeOffsets> {
        self.nodes.get(&node)
    }

    /// Offsets of a reachable node vector; panics for nodes that were never allocated.
    pub fn of(&self, node: NodeId) -> &NodeOffsets {
        self.nodes
            .get(&node)
            .unwrap_or_else(|| panic!("node {node} has no allocated offsets"))
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &NodeOffsets)> {
        self.nodes.iter().map(|(id, offsets)| (*id, offsets))
    }
}

/// Parameter owner bookkeeping while walking the allocation order.
struct OwnerState {
    params: OffsetRange,
    target: OffsetRange,
    set: Option<usize>,
}

/// Assigns offsets to every node vector of `layout`.
pub fn assign_offsets(
    circuit: &Circuit,
    layout: &LayerLayout,
) -> Result<OffsetTable, CompileError> {
    let nodes = circuit.raw_nodes();
    let mut allocator = OffsetAllocator::new(layout.input_layers.len());

    // Members of every tying relation, in allocation order.
    let mut members: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    let mut tied_owners: Vec<NodeId> = Vec::new();
    for id in layout.allocation_order() {
        let node = circuit.node(id);
        if matches!(node.kind, NodeKind::Product) {
            continue;
        }
        let owner = circuit.param_owner(id);
        members.entry(owner).or_default().push(id);
        if node.is_tied() && !tied_owners.contains(&owner) {
            tied_owners.push(owner);
        }
    }

    let mut table = BTreeMap::new();
    let mut owners: HashMap<NodeId, OwnerState> = HashMap::new();
    let mut sum_tied_sets: Vec<TiedSet> = Vec::new();
    let mut input_tied_sets: Vec<Vec<TiedSet>> = vec![Vec::new(); layout.input_layers.len()];

    for (layer_index, layer) in layout.input_layers.iter().enumerate() {
        for &id in &layer.nodes {
            let node = circuit.node(id);
            let dist = node
                .dist()
                .expect("input layers only hold input node vectors");
            let node_values = allocator.allocate(OffsetSpace::NodeValues, id, node.num_nodes())?;
            let metadata = allocator.allocate(
                OffsetSpace::InputMetadata { layer: layer_index },
                id,
                dist.metadata().len(),
            )?;
            let (params, param_flows) = assign_param_ranges(
                circuit,
                &mut allocator,
                &members,
                &tied_owners,
                &mut owners,
                &mut input_tied_sets[layer_index],
                id,
                node.num_nodes() * dist.num_parameters(),
                node.num_nodes() * dist.num_param_flows(),
                OffsetSpace::InputParams { layer: layer_index },
                OffsetSpace::InputParamFlows { layer: layer_index },
            )?;
            table.insert(
                id,
                NodeOffsets {
                    node_values,
                    params: Some(params),
                    param_flows: Some(param_flows),
                    metadata: Some(metadata),
                    input_layer: Some(layer_index),
                },
            );
        }
    }

    for layer in &layout.inner_layers {
        for &id in &layer.nodes {
            let node = circuit.node(id);
            let node_values = allocator.allocate(OffsetSpace::NodeValues, id, node.num_nodes())?;
            let (params, param_flows) = match node.kind {
                NodeKind::Sum => {
                    let width = node.num_node_groups * sum_fan_in(nodes, node) * node.group_size;
                    let (params, flows) = assign_param_ranges(
                        circuit,
                        &mut allocator,
                        &members,
                        &tied_owners,
                        &mut owners,
                        &mut sum_tied_sets,
                        id,
                        width,
                        width,
                        OffsetSpace::SumParams,
                        OffsetSpace::SumParamFlows,
                    )?;
                    (Some(params), Some(flows))
                }
                _ => (None, None),
            };
            table.insert(
                id,
                NodeOffsets {
                    node_values,
                    params,
                    param_flows,
                    metadata: None,
                    input_layer: None,
                },
            );
        }
    }

    let input_spaces = (0..layout.input_layers.len())
        .map(|layer| InputSpaceSizes {
            params: allocator.allocated(OffsetSpace::InputParams { layer }),
            param_flows: allocator.allocated(OffsetSpace::InputParamFlows { layer }),
            metadata: allocator.allocated(OffsetSpace::InputMetadata { layer }),
        })
        .collect();

    Ok(OffsetTable {
        nodes: table,
        num_node_values: allocator.allocated(OffsetSpace::NodeValues),
        num_sum_params: allocator.allocated(OffsetSpace::SumParams),
        num_sum_param_flows: allocator.allocated(OffsetSpace::SumParamFlows),
        input_spaces,
        sum_tied_sets,
        input_tied_sets,
    })
}

/// Parameter and flow ranges of `id`.
///
/// The first member of a tying relation allocates the owner's parameters and target flow
/// range. A relation with a single member accumulates straight into the target; otherwise a
/// reachable owner uses the target as its own slot and every other member gets a fresh range.
#[allow(clippy::too_many_arguments)]
fn assign_param_ranges(
    circuit: &Circuit,
    allocator: &mut OffsetAllocator,
    members: &HashMap<NodeId, Vec<NodeId>>,
    tied_owners: &[NodeId],
    owners: &mut HashMap<NodeId, OwnerState>,
    tied_sets: &mut Vec<TiedSet>,
    id: NodeId,
    param_width: usize,
    flow_width: usize,
    param_space: OffsetSpace,
    flow_space: OffsetSpace,
) -> Result<(OffsetRange, OffsetRange), CompileError> {
    let owner = circuit.param_owner(id);
    let group = &members[&owner];

    if !owners.contains_key(&owner) {
        let params = allocator.allocate(param_space, owner, param_width)?;
        let target = allocator.allocate(flow_space, owner, flow_width)?;
        let set = if tied_owners.contains(&owner) {
            tied_sets.push(TiedSet {
                source: owner,
                params,
                target,
                members: Vec::with_capacity(group.len()),
                member_flows: Vec::with_capacity(group.len()),
            });
            Some(tied_sets.len() - 1)
        } else {
            None
        };
        owners.insert(
            owner,
            OwnerState {
                params,
                target,
                set,
            },
        );
    }

    let state = &owners[&owner];
    let flows = if group.len() == 1 || id == owner {
        state.target
    } else {
        allocator.allocate(flow_space, id, flow_width)?
    };
    if let Some(set) = state.set {
        let set = &mut tied_sets[set];
        set.members.push(id);
        set.member_flows.push(flows.start);
    }
    debug_assert_eq!(state.params.len(), param_width);
    Ok((state.params, flows))
}
