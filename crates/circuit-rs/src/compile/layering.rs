use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::dist::DistSignature;
use crate::graph::{Circuit, NodeId, NodeKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayerKind {
    Product,
    Sum,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputLayerNodes {
    pub signature: DistSignature,
    pub nodes: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerLayerNodes {
    pub kind: LayerKind,
    pub depth: usize,
    pub nodes: Vec<NodeId>,
}

/// Reachable node vectors grouped into executable layers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerLayout {
    pub input_layers: Vec<InputLayerNodes>,
    /// `product(1), sum(1), product(2), sum(2), ...`; empty layers are omitted.
    pub inner_layers: Vec<InnerLayerNodes>,
}

impl LayerLayout {
    /// Every node vector in allocation order: input layers first, then inner layers.
    pub fn allocation_order(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.input_layers
            .iter()
            .flat_map(|layer| layer.nodes.iter().copied())
            .chain(
                self.inner_layers
                    .iter()
                    .flat_map(|layer| layer.nodes.iter().copied()),
            )
    }
}

/// Assigns every reachable node vector to a layer.
///
/// Inputs sit at depth 0. A product sits one level above its deepest sum child (inputs count
/// as level 0) and a sum shares the level of its deepest product child, so every product
/// layer is immediately consumed by the sum layer of the same depth.
pub fn plan_layers(circuit: &Circuit) -> LayerLayout {
    let reachable = circuit.reachable();
    let mut depth: HashMap<NodeId, usize> = HashMap::with_capacity(reachable.len());
    let mut input_layers: Vec<InputLayerNodes> = Vec::new();
    let mut max_depth = 0usize;

    for &id in &reachable {
        let node = circuit.node(id);
        let level = match &node.kind {
            NodeKind::Input { dist } => {
                let signature = dist.signature();
                match input_layers
                    .iter_mut()
                    .find(|layer| layer.signature == signature)
                {
                    Some(layer) => layer.nodes.push(id),
                    None => input_layers.push(InputLayerNodes {
                        signature,
                        nodes: vec![id],
                    }),
                }
                0
            }
            NodeKind::Product => {
                1 + node
                    .children
                    .iter()
                    .map(|child| depth[child])
                    .max()
                    .unwrap_or(0)
            }
            NodeKind::Sum => node
                .children
                .iter()
                .map(|child| depth[child])
                .max()
                .unwrap_or(0),
        };
        max_depth = max_depth.max(level);
        depth.insert(id, level);
    }

    let mut inner_layers = Vec::new();
    for level in 1..=max_depth {
        for kind in [LayerKind::Product, LayerKind::Sum] {
            let nodes: Vec<NodeId> = reachable
                .iter()
                .copied()
                .filter(|id| depth[id] == level && layer_kind(circuit, *id) == Some(kind))
                .collect();
            if !nodes.is_empty() {
                inner_layers.push(InnerLayerNodes {
                    kind,
                    depth: level,
                    nodes,
                });
            }
        }
    }

    LayerLayout {
        input_layers,
        inner_layers,
    }
}

fn layer_kind(circuit: &Circuit, id: NodeId) -> Option<LayerKind> {
    match circuit.node(id).kind {
        NodeKind::Input { .. } => None,
        NodeKind::Product => Some(LayerKind::Product),
        NodeKind::Sum => Some(LayerKind::Sum),
    }
}
