//! Immutable circuit DAG stored as an arena of node vectors.
//!
//! Nodes reference their children by [`NodeId`]; a child is always created before its
//! parents, so ascending id order is a topological order. Parent links are derived on demand
//! instead of being maintained alongside the child lists.

mod builder;
mod node;
mod scope;
mod validate;

use std::collections::BTreeMap;

use smallvec::SmallVec;

pub use builder::CircuitBuilder;
pub use node::{CircuitNode, NodeId, NodeKind, NodeTag};
pub use scope::Scope;
pub use validate::GraphError;

pub(crate) use validate::sum_fan_in;

#[derive(Debug, Clone)]
pub struct Circuit {
    group_size: usize,
    nodes: Vec<CircuitNode>,
    root: NodeId,
}

impl Circuit {
    /// Validates a hand-built arena and wraps it into a circuit.
    pub fn from_parts(
        group_size: usize,
        nodes: Vec<CircuitNode>,
        root: NodeId,
    ) -> Result<Self, GraphError> {
        if group_size == 0 {
            return Err(GraphError::ZeroGroupSize);
        }
        if root.index() >= nodes.len() {
            return Err(GraphError::UnknownRoot(root));
        }
        for index in 0..nodes.len() {
            validate::validate_node(&nodes, NodeId(index as u32), group_size)?;
        }
        Ok(Self {
            group_size,
            nodes,
            root,
        })
    }

    pub fn group_size(&self) -> usize {
        self.group_size
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &CircuitNode {
        &self.nodes[id.index()]
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &CircuitNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (NodeId(index as u32), node))
    }

    /// Node vectors reachable from the root, children before parents.
    pub fn reachable(&self) -> Vec<NodeId> {
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![self.root];
        seen[self.root.index()] = true;
        while let Some(id) = stack.pop() {
            for &child in &self.node(id).children {
                if !seen[child.index()] {
                    seen[child.index()] = true;
                    stack.push(child);
                }
            }
        }
        seen.iter()
            .enumerate()
            .filter_map(|(index, &hit)| hit.then_some(NodeId(index as u32)))
            .collect()
    }

    /// Reverse edges among reachable nodes; parents are listed in ascending id order.
    pub fn parents(&self) -> BTreeMap<NodeId, SmallVec<[NodeId; 4]>> {
        let mut parents: BTreeMap<NodeId, SmallVec<[NodeId; 4]>> = BTreeMap::new();
        for id in self.reachable() {
            for &child in &self.node(id).children {
                let entry = parents.entry(child).or_default();
                if entry.last() != Some(&id) {
                    entry.push(id);
                }
            }
        }
        parents
    }

    /// Id of the node vector owning the parameters `id` uses.
    pub fn param_owner(&self, id: NodeId) -> NodeId {
        self.node(id).tied_to.unwrap_or(id)
    }

    /// Supplied parameters used by `id`, read from its parameter owner.
    pub fn input_params(&self, id: NodeId) -> Option<&[f32]> {
        self.node(self.param_owner(id)).params.as_deref()
    }

    pub(crate) fn raw_nodes(&self) -> &[CircuitNode] {
        &self.nodes
    }
}
