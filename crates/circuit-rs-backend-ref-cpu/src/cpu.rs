use circuit_rs::backend::{check_fusion_bounds, BackendError, BackendResult, CircuitBackend};
use circuit_rs::compile::{CompiledLayer, LayerKind, LayerPartition, PAD};
use circuit_rs::fusion::{FusionBucket, FusionPlan};
use rayon::prelude::*;
use tracing::trace;

/// Host executor over plain `f32` slices.
///
/// Every kernel gathers its results first and scatters them afterwards, so parallel units
/// never observe each other's writes.
#[derive(Debug, Clone, Default)]
pub struct CpuCircuitBackend {
    _private: (),
}

impl CpuCircuitBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn reduce_bucket(&self, flows: &mut [f32], bucket: &FusionBucket) {
        let source: &[f32] = flows;
        let sums: Vec<(usize, Vec<f32>)> = (0..bucket.num_jobs())
            .into_par_iter()
            .map(|index| {
                let job = bucket.job(index);
                let size = job.block_size as usize;
                let mut acc = vec![0.0f32; size];
                for replica in job.valid_replicas() {
                    let start = replica as usize;
                    for (slot, value) in acc.iter_mut().zip(&source[start..start + size]) {
                        *slot += *value;
                    }
                }
                (job.target as usize, acc)
            })
            .collect();

        trace!(
            cardinality = bucket.cardinality,
            jobs = sums.len(),
            "reduced fusion bucket"
        );
        for (target, acc) in sums {
            flows[target..target + acc.len()].copy_from_slice(&acc);
        }
    }
}

impl CircuitBackend for CpuCircuitBackend {
    fn backend_name(&self) -> &str {
        "cpu"
    }

    fn accumulate_tied_flows(&self, flows: &mut [f32], plan: &FusionPlan) -> BackendResult<()> {
        check_fusion_bounds(plan, flows.len())?;
        for bucket in &plan.buckets {
            self.reduce_bucket(flows, bucket);
        }
        Ok(())
    }

    fn forward_layer(
        &self,
        node_values: &mut [f32],
        sum_params: &[f32],
        layer: &CompiledLayer,
    ) -> BackendResult<()> {
        let group_size = layer.group_size;
        for partition in &layer.partitions {
            check_partition(
                partition,
                layer.kind,
                group_size,
                node_values.len(),
                sum_params.len(),
            )?;
            let values: &[f32] = node_values;
            let outputs: Vec<(usize, Vec<f32>)> = (0..partition.num_rows())
                .into_par_iter()
                .map(|row| {
                    let lanes = match layer.kind {
                        LayerKind::Product => product_row(partition, row, group_size, values),
                        LayerKind::Sum => sum_row(partition, row, group_size, values, sum_params),
                    };
                    (partition.nids[row] as usize, lanes)
                })
                .collect();
            for (nid, lanes) in outputs {
                node_values[nid..nid + group_size].copy_from_slice(&lanes);
            }
        }
        trace!(kind = ?layer.kind, depth = layer.depth, "evaluated layer");
        Ok(())
    }
}

fn product_row(
    partition: &LayerPartition,
    row: usize,
    group_size: usize,
    node_values: &[f32],
) -> Vec<f32> {
    let mut lanes = vec![0.0f32; group_size];
    for &cid in partition.cids.valid(row) {
        let start = cid as usize;
        for (lane, value) in lanes.iter_mut().zip(&node_values[start..start + group_size]) {
            *lane += *value;
        }
    }
    lanes
}

fn sum_row(
    partition: &LayerPartition,
    row: usize,
    group_size: usize,
    node_values: &[f32],
    sum_params: &[f32],
) -> Vec<f32> {
    let cids = partition.cids.valid(row);
    let pids = match &partition.pids {
        Some(pids) => pids.row(row),
        None => return vec![f32::NEG_INFINITY; group_size],
    };
    (0..group_size)
        .map(|lane| {
            logsumexp(
                cids.iter()
                    .zip(pids)
                    .map(|(&cid, &pid)| {
                        sum_params[pid as usize + lane].ln() + node_values[cid as usize]
                    }),
            )
        })
        .collect()
}

fn logsumexp(terms: impl Iterator<Item = f32> + Clone) -> f32 {
    let max = terms.clone().fold(f32::NEG_INFINITY, f32::max);
    if max == f32::NEG_INFINITY {
        return max;
    }
    max + terms.map(|term| (term - max).exp()).sum::<f32>().ln()
}

fn check_partition(
    partition: &LayerPartition,
    kind: LayerKind,
    group_size: usize,
    num_values: usize,
    num_params: usize,
) -> BackendResult<()> {
    let span = group_size as u32;
    let in_bounds = |buffer: &'static str, offset: u32, width: u32, len: usize| {
        if offset as usize + width as usize > len {
            Err(BackendError::OutOfBounds {
                buffer,
                offset,
                span: width,
                len,
            })
        } else {
            Ok(())
        }
    };

    for &nid in &partition.nids {
        in_bounds("node value", nid, span, num_values)?;
    }
    let child_span = match kind {
        LayerKind::Product => span,
        LayerKind::Sum => 1,
    };
    for &cid in partition.cids.as_slice().iter().filter(|&&cid| cid != PAD) {
        in_bounds("node value", cid, child_span, num_values)?;
    }
    if kind == LayerKind::Sum {
        let pids = partition.pids.as_ref().ok_or_else(|| {
            BackendError::execution("sum partition is missing its parameter index")
        })?;
        for &pid in pids.as_slice().iter().filter(|&&pid| pid != PAD) {
            in_bounds("sum parameter", pid, span, num_params)?;
        }
    }
    Ok(())
}
