//! Fan-in bucketing for dense per-partition kernels.
//!
//! Wider partitions mean fewer launches but more padded slots for rows whose fan-in is below
//! the partition width. `sparsity_tol` bounds how far apart two fan-ins may be and still
//! share a partition; `max_num_partitions` optionally caps the launch count.

/// Widths of the partitions covering `fan_ins`, in ascending order.
///
/// Distinct fan-ins are visited from the largest down. A partition of width `F` absorbs
/// fan-in `f` while `F - f < sparsity_tol * F`, so a tolerance of 0 keeps every fan-in
/// separate and a tolerance of 1 merges everything into one partition.
pub fn partition_widths(
    fan_ins: &[usize],
    sparsity_tol: f32,
    max_num_partitions: Option<usize>,
) -> Vec<usize> {
    let mut distinct: Vec<usize> = fan_ins.to_vec();
    distinct.sort_unstable_by(|a, b| b.cmp(a));
    distinct.dedup();

    let mut widths: Vec<usize> = Vec::new();
    for fan_in in distinct {
        match widths.last() {
            Some(&width) if ((width - fan_in) as f32) < sparsity_tol * width as f32 => {}
            _ => widths.push(fan_in),
        }
    }
    widths.reverse();

    if let Some(cap) = max_num_partitions {
        let cap = cap.max(1);
        while widths.len() > cap {
            let counts = partition_counts(fan_ins, &widths);
            // Folding partition `i` into `i + 1` pads each of its rows by the width gap.
            let cheapest = (0..widths.len() - 1)
                .min_by_key(|&i| counts[i] * (widths[i + 1] - widths[i]))
                .expect("at least two partitions when over the cap");
            widths.remove(cheapest);
        }
    }
    widths
}

/// Index of the narrowest partition that fits `fan_in`.
pub fn partition_of(widths: &[usize], fan_in: usize) -> usize {
    let index = widths.partition_point(|&width| width < fan_in);
    assert!(
        index < widths.len(),
        "fan-in {fan_in} exceeds every partition width {widths:?}"
    );
    index
}

/// Number of rows landing in each partition.
pub fn partition_counts(fan_ins: &[usize], widths: &[usize]) -> Vec<usize> {
    let mut counts = vec![0usize; widths.len()];
    for &fan_in in fan_ins {
        counts[partition_of(widths, fan_in)] += 1;
    }
    counts
}

/// Fraction of slots wasted on padding for the given partitioning.
pub fn padding_ratio(fan_ins: &[usize], widths: &[usize]) -> f32 {
    let useful: usize = fan_ins.iter().sum();
    let total: usize = fan_ins
        .iter()
        .map(|&fan_in| widths[partition_of(widths, fan_in)])
        .sum();
    if total == 0 {
        0.0
    } else {
        (total - useful) as f32 / total as f32
    }
}
