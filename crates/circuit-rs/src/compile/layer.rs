//! Partitioned index tensors for product and sum layers.
//!
//! Rows are node groups. Product rows list the node-value offset of the matching group of
//! every child; sum rows list every scalar child node together with the parameter offset of
//! the corresponding edge. The reverse index maps each unique child to the rows consuming it
//! so that backward kernels can give every child exactly one writer.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::graph::{Circuit, NodeId};

use super::index::IndexMatrix;
use super::layering::{InnerLayerNodes, LayerKind};
use super::offsets::OffsetTable;
use super::partition::{padding_ratio, partition_of, partition_widths};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerPartition {
    /// Width of every `cids`/`pids` row.
    pub fan_in: usize,
    /// Node-value offset of the first node of every row's node group.
    pub nids: Vec<u32>,
    pub cids: IndexMatrix,
    /// Sum layers only: parameter offset of every `cids` entry.
    pub pids: Option<IndexMatrix>,
    /// Unique children in ascending order (group start offsets).
    pub u_cids: Vec<u32>,
    /// For every `u_cids` entry, the `nids` of the rows consuming it.
    pub parids: IndexMatrix,
    /// Sum layers only: parameter offset of every `parids` edge.
    pub parpids: Option<IndexMatrix>,
}

impl LayerPartition {
    pub fn num_rows(&self) -> usize {
        self.nids.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledLayer {
    pub kind: LayerKind,
    pub depth: usize,
    pub group_size: usize,
    pub nodes: Vec<NodeId>,
    pub partitions: Vec<LayerPartition>,
    /// Scalar nodes computed by this layer.
    pub num_nodes: usize,
    /// Scalar edges evaluated by this layer.
    pub num_edges: usize,
}

/// One node group before partitioning.
struct Row {
    nid: u32,
    cids: Vec<u32>,
    pids: Vec<u32>,
    /// Unique children of the row with the parameter offset of the edge reaching their first
    /// node; equal to `cids` for product rows.
    edges: Vec<(u32, u32)>,
}

pub(crate) fn compile_inner_layer(
    circuit: &Circuit,
    offsets: &OffsetTable,
    layer: &InnerLayerNodes,
    sparsity_tol: f32,
    max_num_partitions: Option<usize>,
) -> CompiledLayer {
    let group_size = circuit.group_size();
    let rows = match layer.kind {
        LayerKind::Product => product_rows(circuit, offsets, &layer.nodes),
        LayerKind::Sum => sum_rows(circuit, offsets, &layer.nodes),
    };

    let fan_ins: Vec<usize> = rows.iter().map(|row| row.cids.len()).collect();
    let widths = partition_widths(&fan_ins, sparsity_tol, max_num_partitions);
    let mut buckets: Vec<Vec<&Row>> = vec![Vec::new(); widths.len()];
    for row in &rows {
        buckets[partition_of(&widths, row.cids.len())].push(row);
    }

    let partitions: Vec<LayerPartition> = widths
        .iter()
        .zip(buckets)
        .map(|(&width, rows)| build_partition(layer.kind, width, &rows))
        .collect();

    let num_edges = fan_ins.iter().sum::<usize>() * group_size;
    debug!(
        kind = ?layer.kind,
        depth = layer.depth,
        rows = rows.len(),
        partitions = partitions.len(),
        padding = padding_ratio(&fan_ins, &widths),
        "compiled inner layer"
    );

    CompiledLayer {
        kind: layer.kind,
        depth: layer.depth,
        group_size,
        nodes: layer.nodes.clone(),
        partitions,
        num_nodes: rows.len() * group_size,
        num_edges,
    }
}

fn product_rows(circuit: &Circuit, offsets: &OffsetTable, nodes: &[NodeId]) -> Vec<Row> {
    let group_size = circuit.group_size() as u32;
    let mut rows = Vec::new();
    for &id in nodes {
        let node = circuit.node(id);
        let start = offsets.of(id).node_values.start;
        for group in 0..node.num_node_groups as u32 {
            let cids: Vec<u32> = node
                .children
                .iter()
                .map(|&child| offsets.of(child).node_values.start + group * group_size)
                .collect();
            let edges = cids.iter().map(|&cid| (cid, 0)).collect();
            rows.push(Row {
                nid: start + group * group_size,
                cids,
                pids: Vec::new(),
                edges,
            });
        }
    }
    rows
}

fn sum_rows(circuit: &Circuit, offsets: &OffsetTable, nodes: &[NodeId]) -> Vec<Row> {
    let group_size = circuit.group_size() as u32;
    let mut rows = Vec::new();
    for &id in nodes {
        let node = circuit.node(id);
        let node_offsets = offsets.of(id);
        let params = node_offsets
            .params
            .expect("sum node vectors always own a parameter range");
        let fan_in: u32 = node
            .children
            .iter()
            .map(|&child| circuit.node(child).num_nodes() as u32)
            .sum();
        for group in 0..node.num_node_groups as u32 {
            let group_params = params.start + group * fan_in * group_size;
            let mut cids = Vec::with_capacity(fan_in as usize);
            let mut pids = Vec::with_capacity(fan_in as usize);
            let mut edges = Vec::new();
            for &child in &node.children {
                let child_node = circuit.node(child);
                let child_start = offsets.of(child).node_values.start;
                for k in 0..child_node.num_nodes() as u32 {
                    let pid = group_params + cids.len() as u32 * group_size;
                    if k % group_size == 0 {
                        edges.push((child_start + k, pid));
                    }
                    cids.push(child_start + k);
                    pids.push(pid);
                }
            }
            rows.push(Row {
                nid: node_offsets.node_values.start + group * group_size,
                cids,
                pids,
                edges,
            });
        }
    }
    rows
}

fn build_partition(kind: LayerKind, width: usize, rows: &[&Row]) -> LayerPartition {
    let nids: Vec<u32> = rows.iter().map(|row| row.nid).collect();
    let cids = IndexMatrix::from_rows(rows.iter().map(|row| &row.cids), width);
    let pids = match kind {
        LayerKind::Sum => Some(IndexMatrix::from_rows(
            rows.iter().map(|row| &row.pids),
            width,
        )),
        LayerKind::Product => None,
    };

    // Rows are visited in order, so every parent list stays in `nids` order.
    let mut consumers: BTreeMap<u32, (Vec<u32>, Vec<u32>)> = BTreeMap::new();
    for row in rows {
        for &(cid, pid) in &row.edges {
            let entry = consumers.entry(cid).or_default();
            entry.0.push(row.nid);
            entry.1.push(pid);
        }
    }
    let max_parents = consumers
        .values()
        .map(|(parents, _)| parents.len())
        .max()
        .unwrap_or(0);
    let u_cids: Vec<u32> = consumers.keys().copied().collect();
    let parids = IndexMatrix::from_rows(consumers.values().map(|(parents, _)| parents), max_parents);
    let parpids = match kind {
        LayerKind::Sum => Some(IndexMatrix::from_rows(
            consumers.values().map(|(_, pids)| pids),
            max_parents,
        )),
        LayerKind::Product => None,
    };

    LayerPartition {
        fan_in: width,
        nids,
        cids,
        pids,
        u_cids,
        parids,
        parpids,
    }
}
