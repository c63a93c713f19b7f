use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dist::DistRef;

use super::Scope;

/// Arena index of a node vector inside a [`Circuit`](super::Circuit).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeTag {
    Input,
    Product,
    Sum,
}

impl fmt::Display for NodeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeTag::Input => "input",
            NodeTag::Product => "product",
            NodeTag::Sum => "sum",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Input { dist: DistRef },
    Product,
    Sum,
}

impl NodeKind {
    pub fn tag(&self) -> NodeTag {
        match self {
            NodeKind::Input { .. } => NodeTag::Input,
            NodeKind::Product => NodeTag::Product,
            NodeKind::Sum => NodeTag::Sum,
        }
    }
}

/// A vector of `num_node_groups * group_size` scalar nodes sharing kind, scope and children.
#[derive(Debug, Clone)]
pub struct CircuitNode {
    pub kind: NodeKind,
    pub scope: Scope,
    pub num_node_groups: usize,
    pub group_size: usize,
    pub children: Vec<NodeId>,
    /// Source node vector owning the parameters this one uses.
    pub tied_to: Option<NodeId>,
    /// Caller-supplied input parameters, `num_nodes * num_parameters()` long.
    pub params: Option<Arc<[f32]>>,
}

impl CircuitNode {
    pub fn input(scope: Scope, num_node_groups: usize, group_size: usize, dist: DistRef) -> Self {
        Self {
            kind: NodeKind::Input { dist },
            scope,
            num_node_groups,
            group_size,
            children: Vec::new(),
            tied_to: None,
            params: None,
        }
    }

    pub fn product(
        scope: Scope,
        num_node_groups: usize,
        group_size: usize,
        children: Vec<NodeId>,
    ) -> Self {
        Self {
            kind: NodeKind::Product,
            scope,
            num_node_groups,
            group_size,
            children,
            tied_to: None,
            params: None,
        }
    }

    pub fn sum(
        scope: Scope,
        num_node_groups: usize,
        group_size: usize,
        children: Vec<NodeId>,
    ) -> Self {
        Self {
            kind: NodeKind::Sum,
            scope,
            num_node_groups,
            group_size,
            children,
            tied_to: None,
            params: None,
        }
    }

    pub fn tied(mut self, source: NodeId) -> Self {
        self.tied_to = Some(source);
        self
    }

    /// Attaches input parameters, normalized by the node's distribution.
    pub fn with_params(mut self, params: Vec<f32>) -> Self {
        self.set_params(params);
        self
    }

    pub(crate) fn set_params(&mut self, mut params: Vec<f32>) {
        if let NodeKind::Input { dist } = &self.kind {
            dist.normalize_parameters(&mut params);
        }
        self.params = Some(params.into());
    }

    pub fn tag(&self) -> NodeTag {
        self.kind.tag()
    }

    pub fn num_nodes(&self) -> usize {
        self.num_node_groups * self.group_size
    }

    pub fn is_tied(&self) -> bool {
        self.tied_to.is_some()
    }

    pub fn dist(&self) -> Option<&DistRef> {
        match &self.kind {
            NodeKind::Input { dist } => Some(dist),
            _ => None,
        }
    }
}
