//! Fusion of tied parameter flows.
//!
//! Node vectors that share parameters each accumulate their own parameter flows during the
//! backward pass. Before the parameters are updated those replica flows are summed into the
//! owner's target flow range. The compiler here turns every tying relation into dense,
//! fixed-cardinality reduction jobs; executors run them through
//! [`CircuitBackend::accumulate_tied_flows`](crate::backend::CircuitBackend::accumulate_tied_flows).

mod plan;

use serde::Serialize;

use crate::compile::OffsetRange;
use crate::graph::NodeId;

pub use plan::{compile_tied_flow_fusion, FusionBucket, FusionJob, FusionPlan};

/// All reachable node vectors drawing their parameters from one owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TiedSet {
    /// Parameter owner; not necessarily reachable itself.
    pub source: NodeId,
    pub params: OffsetRange,
    /// Flow range the fused replica flows are written into.
    pub target: OffsetRange,
    /// Members in allocation order.
    pub members: Vec<NodeId>,
    /// Start of each member's flow range, parallel to `members`.
    pub member_flows: Vec<u32>,
}

impl TiedSet {
    /// Width of the tied flow range.
    pub fn width(&self) -> usize {
        self.target.len()
    }

    pub fn num_replicas(&self) -> usize {
        self.member_flows.len()
    }
}
