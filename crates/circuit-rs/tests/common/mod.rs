#![allow(dead_code)]

use circuit_rs::dist::{Bernoulli, Categorical, Gaussian};
use circuit_rs::graph::NodeId;
use circuit_rs::{Circuit, CircuitBuilder};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Random region-graph circuit with tied inputs and tied sums sprinkled in.
pub fn random_circuit(seed: u64) -> Circuit {
    let mut rng = StdRng::seed_from_u64(seed);
    let group_size = [1, 2, 4][rng.gen_range(0..3)];
    let num_groups = rng.gen_range(1..=3);
    let num_vars = rng.gen_range(2..=6u32);
    let vars: Vec<u32> = (0..num_vars).collect();

    let mut builder = CircuitBuilder::new(group_size);
    let top = region(&mut builder, &mut rng, &vars, num_groups);
    let product = builder.multiply(&[top]).expect("top product");
    let root = builder.summate(&[product], 1).expect("root sum");
    builder.finish(root).expect("random circuit")
}

/// Sum (or input) node vector with `groups` node groups over `vars`.
fn region(builder: &mut CircuitBuilder, rng: &mut StdRng, vars: &[u32], groups: usize) -> NodeId {
    if vars.len() == 1 {
        return leaf(builder, rng, vars[0], groups);
    }
    let split = rng.gen_range(1..vars.len());
    let num_products = rng.gen_range(1..=2);
    let mut products = Vec::with_capacity(num_products);
    for _ in 0..num_products {
        let left = region(builder, rng, &vars[..split], groups);
        let right = region(builder, rng, &vars[split..], groups);
        products.push(builder.multiply(&[left, right]).expect("region product"));
    }
    let sum = builder.summate(&products, groups).expect("region sum");
    if !rng.gen_bool(0.4) {
        return sum;
    }
    let replica = builder.duplicate_sum(sum, None, true).expect("tied sum");
    let first = builder.multiply(&[sum]).expect("wrap sum");
    let second = builder.multiply(&[replica]).expect("wrap replica");
    builder.summate(&[first, second], groups).expect("mix replicas")
}

fn leaf(builder: &mut CircuitBuilder, rng: &mut StdRng, var: u32, groups: usize) -> NodeId {
    let input = match rng.gen_range(0..3) {
        0 => builder.inputs(var, groups, Categorical::new(rng.gen_range(2..=5))),
        1 => builder.inputs(var, groups, Bernoulli),
        _ => builder.inputs(var, groups, Gaussian::default()),
    }
    .expect("input");
    if !rng.gen_bool(0.3) {
        return input;
    }
    let replica = builder
        .duplicate_inputs(input, None, true)
        .expect("tied input");
    let first = builder.multiply(&[input]).expect("wrap input");
    let second = builder.multiply(&[replica]).expect("wrap replica");
    builder.summate(&[first, second], groups).expect("mix inputs")
}
