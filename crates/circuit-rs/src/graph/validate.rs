use thiserror::Error;

use crate::compile::PAD;

use super::{CircuitNode, NodeId, NodeKind, NodeTag, Scope};

/// Structural problems detected while building or compiling a circuit.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("group size must be positive")]
    ZeroGroupSize,
    #[error("node {node} references unregistered child {child}")]
    UnregisteredChild { node: NodeId, child: NodeId },
    #[error("node {node} references {child}, which is not created before it (cycle)")]
    ForwardReference { node: NodeId, child: NodeId },
    #[error("node {node} has group size {got}, circuit uses {expected}")]
    GroupSizeMismatch {
        node: NodeId,
        expected: usize,
        got: usize,
    },
    #[error("node {node} must have at least one node group")]
    ZeroNodeGroups { node: NodeId },
    #[error("{tag} node {node} needs at least one child")]
    MissingChildren { node: NodeId, tag: NodeTag },
    #[error("{tag} node {node} cannot take {child_tag} child {child}")]
    InvalidChildKind {
        node: NodeId,
        tag: NodeTag,
        child: NodeId,
        child_tag: NodeTag,
    },
    #[error("product node {node} has {expected} node groups but child {child} has {got}")]
    ChildGroupCountMismatch {
        node: NodeId,
        child: NodeId,
        expected: usize,
        got: usize,
    },
    #[error("product node {node}: children {left} and {right} have overlapping scopes")]
    ProductScopeOverlap {
        node: NodeId,
        left: NodeId,
        right: NodeId,
    },
    #[error("node {node} declares scope {expected} but its children cover {got}")]
    ScopeMismatch {
        node: NodeId,
        expected: Scope,
        got: Scope,
    },
    #[error("sum node {node} has scope {expected} but child {child} has scope {got}")]
    SumScopeMismatch {
        node: NodeId,
        child: NodeId,
        expected: Scope,
        got: Scope,
    },
    #[error("input node {node} reads {got} variables but its distribution expects {expected}")]
    InputArity {
        node: NodeId,
        expected: usize,
        got: usize,
    },
    #[error("node {node} cannot be tied to {owner}: {reason}")]
    InvalidTie {
        node: NodeId,
        owner: NodeId,
        reason: String,
    },
    #[error("node {node} lists child {child} more than once")]
    DuplicateChild { node: NodeId, child: NodeId },
    #[error("node {node} reads variable {var}, which is reserved as the padding index")]
    ReservedVariable { node: NodeId, var: u32 },
    #[error("input node {node} is given {got} parameters but needs {expected}")]
    InputParamCount {
        node: NodeId,
        expected: usize,
        got: usize,
    },
    #[error("{tag} node {node} has no input parameters")]
    NotAnInput { node: NodeId, tag: NodeTag },
    #[error("node {0} is not registered")]
    UnknownNode(NodeId),
    #[error("root {0} is not registered")]
    UnknownRoot(NodeId),
}

/// Checks the node stored at `id` against the nodes created before it.
pub(crate) fn validate_node(
    nodes: &[CircuitNode],
    id: NodeId,
    group_size: usize,
) -> Result<(), GraphError> {
    let node = &nodes[id.index()];
    if node.group_size != group_size {
        return Err(GraphError::GroupSizeMismatch {
            node: id,
            expected: group_size,
            got: node.group_size,
        });
    }
    if node.num_node_groups == 0 {
        return Err(GraphError::ZeroNodeGroups { node: id });
    }
    if node.scope.vars().contains(&PAD) {
        return Err(GraphError::ReservedVariable { node: id, var: PAD });
    }

    for &child in &node.children {
        if child.index() >= nodes.len() {
            return Err(GraphError::UnregisteredChild { node: id, child });
        }
        if child >= id {
            return Err(GraphError::ForwardReference { node: id, child });
        }
    }

    match &node.kind {
        NodeKind::Input { dist } => {
            if node.scope.len() != dist.num_vars() {
                return Err(GraphError::InputArity {
                    node: id,
                    expected: dist.num_vars(),
                    got: node.scope.len(),
                });
            }
            if let Some(params) = &node.params {
                let expected = node.num_nodes() * dist.num_parameters();
                if params.len() != expected {
                    return Err(GraphError::InputParamCount {
                        node: id,
                        expected,
                        got: params.len(),
                    });
                }
            }
        }
        NodeKind::Product => validate_product(nodes, id, node)?,
        NodeKind::Sum => validate_sum(nodes, id, node)?,
    }
    if node.params.is_some() && node.dist().is_none() {
        return Err(GraphError::NotAnInput {
            node: id,
            tag: node.tag(),
        });
    }

    if let Some(source) = node.tied_to {
        validate_tie(nodes, id, source)?;
    }
    Ok(())
}

fn validate_product(
    nodes: &[CircuitNode],
    id: NodeId,
    node: &CircuitNode,
) -> Result<(), GraphError> {
    if node.children.is_empty() {
        return Err(GraphError::MissingChildren {
            node: id,
            tag: NodeTag::Product,
        });
    }
    let mut covered = Scope::default();
    for (pos, &child) in node.children.iter().enumerate() {
        let child_node = &nodes[child.index()];
        if child_node.tag() == NodeTag::Product {
            return Err(GraphError::InvalidChildKind {
                node: id,
                tag: NodeTag::Product,
                child,
                child_tag: NodeTag::Product,
            });
        }
        if child_node.num_node_groups != node.num_node_groups {
            return Err(GraphError::ChildGroupCountMismatch {
                node: id,
                child,
                expected: node.num_node_groups,
                got: child_node.num_node_groups,
            });
        }
        for &other in &node.children[..pos] {
            if !nodes[other.index()].scope.is_disjoint(&child_node.scope) {
                return Err(GraphError::ProductScopeOverlap {
                    node: id,
                    left: other,
                    right: child,
                });
            }
        }
        covered = covered.union(&child_node.scope);
    }
    if covered != node.scope {
        return Err(GraphError::ScopeMismatch {
            node: id,
            expected: node.scope.clone(),
            got: covered,
        });
    }
    Ok(())
}

fn validate_sum(
    nodes: &[CircuitNode],
    id: NodeId,
    node: &CircuitNode,
) -> Result<(), GraphError> {
    if node.children.is_empty() {
        return Err(GraphError::MissingChildren {
            node: id,
            tag: NodeTag::Sum,
        });
    }
    for (pos, &child) in node.children.iter().enumerate() {
        if node.children[..pos].contains(&child) {
            return Err(GraphError::DuplicateChild { node: id, child });
        }
        let child_node = &nodes[child.index()];
        if child_node.tag() != NodeTag::Product {
            return Err(GraphError::InvalidChildKind {
                node: id,
                tag: NodeTag::Sum,
                child,
                child_tag: child_node.tag(),
            });
        }
        if child_node.scope != node.scope {
            return Err(GraphError::SumScopeMismatch {
                node: id,
                child,
                expected: node.scope.clone(),
                got: child_node.scope.clone(),
            });
        }
    }
    Ok(())
}

/// Number of scalar child nodes feeding every group of a sum node vector.
pub(crate) fn sum_fan_in(nodes: &[CircuitNode], node: &CircuitNode) -> usize {
    node.children
        .iter()
        .map(|child| nodes[child.index()].num_nodes())
        .sum()
}

fn validate_tie(nodes: &[CircuitNode], id: NodeId, source: NodeId) -> Result<(), GraphError> {
    let invalid = |reason: &str| GraphError::InvalidTie {
        node: id,
        owner: source,
        reason: reason.to_string(),
    };
    if source == id {
        return Err(invalid("a node cannot be tied to itself"));
    }
    let Some(source_node) = nodes.get(source.index()) else {
        return Err(invalid("source is not registered"));
    };
    if source > id {
        return Err(invalid("source must be created before the tied node"));
    }
    let node = &nodes[id.index()];
    if node.params.is_some() {
        return Err(invalid("tied node vectors read their source's parameters"));
    }
    if source_node.is_tied() {
        return Err(invalid("source is itself tied; tie to its source instead"));
    }
    if source_node.tag() != node.tag() {
        return Err(invalid("node kinds differ"));
    }
    if source_node.group_size != node.group_size {
        return Err(invalid("group sizes differ within the tied set"));
    }
    if source_node.num_node_groups != node.num_node_groups {
        return Err(invalid("number of node groups differs"));
    }
    match (&source_node.kind, &node.kind) {
        (NodeKind::Input { dist: src }, NodeKind::Input { dist }) => {
            if src.signature() != dist.signature() {
                return Err(invalid("distributions have different signatures"));
            }
            if src.num_parameters() != dist.num_parameters()
                || src.num_param_flows() != dist.num_param_flows()
            {
                return Err(invalid("distributions have different parameter counts"));
            }
        }
        (NodeKind::Product, NodeKind::Product) => {
            return Err(invalid("product nodes carry no parameters"));
        }
        (NodeKind::Sum, NodeKind::Sum) => {
            if sum_fan_in(nodes, source_node) != sum_fan_in(nodes, node) {
                return Err(invalid("sum fan-in differs"));
            }
        }
        _ => unreachable!("tags were compared above"),
    }
    Ok(())
}
