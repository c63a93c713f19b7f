use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::compile::{CompileError, IndexMatrix, PAD};
use crate::config::FusionOptions;
use crate::graph::NodeId;

use super::TiedSet;

/// Jobs sharing one replica cardinality, stored column-wise.
///
/// Job `i` sums `block_sizes[i]` consecutive flows starting at every valid entry of
/// `replica_pfids.row(i)` and overwrites the same span at `target_pfids[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FusionBucket {
    /// Power of two; width of every `replica_pfids` row.
    pub cardinality: usize,
    /// Nominal tile width; the final tile of a range may be shorter.
    pub block_width: usize,
    pub sources: Vec<NodeId>,
    pub target_pfids: Vec<u32>,
    pub block_sizes: Vec<u32>,
    pub num_replicas: Vec<u32>,
    pub replica_pfids: IndexMatrix,
}

/// Borrowed view of one reduction job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FusionJob<'a> {
    pub source: NodeId,
    pub target: u32,
    pub block_size: u32,
    pub num_replicas: u32,
    /// Replica starts padded with [`PAD`] to the bucket cardinality.
    pub replicas: &'a [u32],
}

impl<'a> FusionJob<'a> {
    pub fn valid_replicas(&self) -> impl Iterator<Item = u32> + 'a {
        self.replicas.iter().copied().filter(|&pfid| pfid != PAD)
    }
}

impl FusionBucket {
    fn new(cardinality: usize, block_width: usize) -> Self {
        Self {
            cardinality,
            block_width,
            sources: Vec::new(),
            target_pfids: Vec::new(),
            block_sizes: Vec::new(),
            num_replicas: Vec::new(),
            replica_pfids: IndexMatrix::default(),
        }
    }

    pub fn num_jobs(&self) -> usize {
        self.target_pfids.len()
    }

    pub fn job(&self, index: usize) -> FusionJob<'_> {
        FusionJob {
            source: self.sources[index],
            target: self.target_pfids[index],
            block_size: self.block_sizes[index],
            num_replicas: self.num_replicas[index],
            replicas: self.replica_pfids.row(index),
        }
    }

    pub fn jobs(&self) -> impl Iterator<Item = FusionJob<'_>> {
        (0..self.num_jobs()).map(move |index| self.job(index))
    }
}

/// Buckets in ascending cardinality.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FusionPlan {
    pub buckets: Vec<FusionBucket>,
}

impl FusionPlan {
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn num_jobs(&self) -> usize {
        self.buckets.iter().map(FusionBucket::num_jobs).sum()
    }

    pub fn jobs(&self) -> impl Iterator<Item = FusionJob<'_>> {
        self.buckets.iter().flat_map(|bucket| bucket.jobs())
    }

    /// Smallest flow buffer length every job stays inside.
    pub fn required_len(&self) -> usize {
        self.jobs()
            .flat_map(|job| {
                std::iter::once(job.target)
                    .chain(job.valid_replicas())
                    .map(move |start| start as usize + job.block_size as usize)
            })
            .max()
            .unwrap_or(0)
    }

    /// True when no two jobs write overlapping spans.
    pub fn targets_disjoint(&self) -> bool {
        let mut spans: Vec<(u32, u32)> = self
            .jobs()
            .map(|job| (job.target, job.target + job.block_size))
            .collect();
        spans.sort_unstable();
        spans.windows(2).all(|pair| pair[0].1 <= pair[1].0)
    }
}

/// Tiles every tied set with more than one replica into reduction jobs.
///
/// A set of `k` replicas lands in the bucket of cardinality `k.next_power_of_two()` and is
/// split into tiles of `max(1, block_size / cardinality)` flows. Cardinalities above
/// `max_tied_groups` are rejected.
pub fn compile_tied_flow_fusion(
    tied_sets: &[TiedSet],
    options: &FusionOptions,
) -> Result<FusionPlan, CompileError> {
    let mut buckets: BTreeMap<usize, (FusionBucket, Vec<Vec<u32>>)> = BTreeMap::new();

    for set in tied_sets {
        let count = set.num_replicas();
        if count <= 1 {
            continue;
        }
        let cardinality = count.next_power_of_two();
        if cardinality > options.max_tied_groups {
            return Err(CompileError::TiedCardinality {
                source_node: set.source,
                count,
                cardinality,
                cap: options.max_tied_groups,
            });
        }
        let block_width = (options.block_size / cardinality).max(1);
        let (bucket, rows) = buckets
            .entry(cardinality)
            .or_insert_with(|| (FusionBucket::new(cardinality, block_width), Vec::new()));

        let width = set.width() as u32;
        let mut tile = 0u32;
        while tile < width {
            let size = (block_width as u32).min(width - tile);
            bucket.sources.push(set.source);
            bucket.target_pfids.push(set.target.start + tile);
            bucket.block_sizes.push(size);
            bucket.num_replicas.push(count as u32);
            rows.push(set.member_flows.iter().map(|&start| start + tile).collect());
            tile += size;
        }
    }

    let buckets: Vec<FusionBucket> = buckets
        .into_values()
        .map(|(mut bucket, rows)| {
            bucket.replica_pfids = IndexMatrix::from_rows(rows, bucket.cardinality);
            debug!(
                cardinality = bucket.cardinality,
                block_width = bucket.block_width,
                jobs = bucket.num_jobs(),
                "compiled fusion bucket"
            );
            bucket
        })
        .collect();

    let plan = FusionPlan { buckets };
    assert!(
        plan.targets_disjoint(),
        "fusion jobs write overlapping flow spans"
    );
    Ok(plan)
}
