use std::sync::Arc;

use crate::dist::{DistRef, Distribution};

use super::validate::{sum_fan_in, validate_node};
use super::{Circuit, CircuitNode, GraphError, NodeId, NodeKind, NodeTag, Scope};

/// Incrementally builds a circuit bottom-up; every node is validated when it is added.
#[derive(Debug, Clone)]
pub struct CircuitBuilder {
    group_size: usize,
    nodes: Vec<CircuitNode>,
}

impl CircuitBuilder {
    pub fn new(group_size: usize) -> Self {
        Self {
            group_size,
            nodes: Vec::new(),
        }
    }

    pub fn group_size(&self) -> usize {
        self.group_size
    }

    pub fn node(&self, id: NodeId) -> Option<&CircuitNode> {
        self.nodes.get(id.index())
    }

    /// Adds a fully specified node vector.
    pub fn add_node(&mut self, node: CircuitNode) -> Result<NodeId, GraphError> {
        if self.group_size == 0 {
            return Err(GraphError::ZeroGroupSize);
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        if let Err(err) = validate_node(&self.nodes, id, self.group_size) {
            self.nodes.pop();
            return Err(err);
        }
        Ok(id)
    }

    pub fn inputs(
        &mut self,
        scope: impl Into<Scope>,
        num_node_groups: usize,
        dist: impl Distribution + 'static,
    ) -> Result<NodeId, GraphError> {
        self.inputs_with(scope, num_node_groups, Arc::new(dist))
    }

    pub fn inputs_with(
        &mut self,
        scope: impl Into<Scope>,
        num_node_groups: usize,
        dist: DistRef,
    ) -> Result<NodeId, GraphError> {
        let node = CircuitNode::input(scope.into(), num_node_groups, self.group_size, dist);
        self.add_node(node)
    }

    /// Product of the children's node groups, pairing group `g` of every child.
    pub fn multiply(&mut self, children: &[NodeId]) -> Result<NodeId, GraphError> {
        let next = NodeId(self.nodes.len() as u32);
        let Some(&first) = children.first() else {
            return Err(GraphError::MissingChildren {
                node: next,
                tag: NodeTag::Product,
            });
        };
        let num_node_groups = self.existing(next, first)?.num_node_groups;
        let mut scope = Scope::default();
        for &child in children {
            scope = scope.union(&self.existing(next, child)?.scope);
        }
        let node = CircuitNode::product(scope, num_node_groups, self.group_size, children.to_vec());
        self.add_node(node)
    }

    /// Mixture over every scalar node of the children.
    pub fn summate(
        &mut self,
        children: &[NodeId],
        num_node_groups: usize,
    ) -> Result<NodeId, GraphError> {
        let next = NodeId(self.nodes.len() as u32);
        let Some(&first) = children.first() else {
            return Err(GraphError::MissingChildren {
                node: next,
                tag: NodeTag::Sum,
            });
        };
        let scope = self.existing(next, first)?.scope.clone();
        let node = CircuitNode::sum(scope, num_node_groups, self.group_size, children.to_vec());
        self.add_node(node)
    }

    /// Copies an input node vector, optionally onto a different scope.
    ///
    /// With `tie_params` the copy shares the parameters of `node` (or of its source when
    /// `node` is itself tied) and only keeps its own parameter-flow accumulator.
    pub fn duplicate_inputs(
        &mut self,
        node: NodeId,
        scope: Option<Scope>,
        tie_params: bool,
    ) -> Result<NodeId, GraphError> {
        let next = NodeId(self.nodes.len() as u32);
        let original = self.existing(next, node)?;
        let NodeKind::Input { dist } = &original.kind else {
            return Err(GraphError::InvalidTie {
                node: next,
                owner: node,
                reason: format!("{} nodes cannot be duplicated as inputs", original.tag()),
            });
        };
        let mut copy = CircuitNode::input(
            scope.unwrap_or_else(|| original.scope.clone()),
            original.num_node_groups,
            self.group_size,
            Arc::clone(dist),
        );
        if tie_params {
            copy = copy.tied(original.tied_to.unwrap_or(node));
        }
        self.add_node(copy)
    }

    /// Copies a sum node vector over new children, optionally sharing its parameters.
    ///
    /// The new children must provide the same number of scalar nodes as the original ones.
    pub fn duplicate_sum(
        &mut self,
        node: NodeId,
        children: Option<&[NodeId]>,
        tie_params: bool,
    ) -> Result<NodeId, GraphError> {
        let next = NodeId(self.nodes.len() as u32);
        let original = self.existing(next, node)?;
        if original.tag() != NodeTag::Sum {
            return Err(GraphError::InvalidTie {
                node: next,
                owner: node,
                reason: format!("{} nodes cannot be duplicated as sums", original.tag()),
            });
        }
        let children = children
            .map(<[NodeId]>::to_vec)
            .unwrap_or_else(|| original.children.clone());
        let scope = match children.first() {
            Some(&first) => self.existing(next, first)?.scope.clone(),
            None => original.scope.clone(),
        };
        let source = original.tied_to.unwrap_or(node);
        let mut copy = CircuitNode::sum(scope, original.num_node_groups, self.group_size, children);
        if tie_params {
            copy = copy.tied(source);
        }
        self.add_node(copy)
    }

    /// Number of scalar child nodes feeding each group of a sum node vector.
    pub fn sum_fan_in(&self, node: NodeId) -> Option<usize> {
        let entry = self.nodes.get(node.index())?;
        (entry.tag() == NodeTag::Sum).then(|| sum_fan_in(&self.nodes, entry))
    }

    /// Sets the parameters of an input node vector, or of its source when it is tied.
    ///
    /// `params` holds `num_nodes * num_parameters()` values and is normalized by the
    /// distribution before being stored.
    pub fn set_input_params(&mut self, node: NodeId, params: Vec<f32>) -> Result<(), GraphError> {
        let target = self
            .nodes
            .get(node.index())
            .ok_or(GraphError::UnknownNode(node))?;
        let owner = target.tied_to.unwrap_or(node);
        let owner_node = &mut self.nodes[owner.index()];
        let Some(dist) = owner_node.dist() else {
            return Err(GraphError::NotAnInput {
                node: owner,
                tag: owner_node.tag(),
            });
        };
        let expected = owner_node.num_nodes() * dist.num_parameters();
        if params.len() != expected {
            return Err(GraphError::InputParamCount {
                node: owner,
                expected,
                got: params.len(),
            });
        }
        owner_node.set_params(params);
        Ok(())
    }

    pub fn finish(self, root: NodeId) -> Result<Circuit, GraphError> {
        if self.group_size == 0 {
            return Err(GraphError::ZeroGroupSize);
        }
        if root.index() >= self.nodes.len() {
            return Err(GraphError::UnknownRoot(root));
        }
        Ok(Circuit {
            group_size: self.group_size,
            nodes: self.nodes,
            root,
        })
    }

    fn existing(&self, node: NodeId, child: NodeId) -> Result<&CircuitNode, GraphError> {
        self.nodes
            .get(child.index())
            .ok_or(GraphError::UnregisteredChild { node, child })
    }
}
