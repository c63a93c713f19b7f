use circuit_rs::compile::{LayerKind, OffsetRange, PAD};
use circuit_rs::dist::{Bernoulli, Categorical, Gaussian};
use circuit_rs::graph::NodeId;
use circuit_rs::{compile, Circuit, CircuitBuilder, CompileOptions, CompiledCircuit, Scope};
use rand::rngs::StdRng;
use rand::SeedableRng;

struct TiedScenario {
    circuit: Circuit,
    inputs: [NodeId; 2],
    source: NodeId,
    replicas: [NodeId; 2],
    root: NodeId,
}

/// Two categorical inputs multiplied together, mixed by two sums sharing one parameter set.
fn tied_scenario() -> TiedScenario {
    let mut builder = CircuitBuilder::new(2);
    let ni0 = builder.inputs(0u32, 1, Categorical::new(4)).expect("input 0");
    let ni1 = builder.inputs(1u32, 1, Categorical::new(4)).expect("input 1");
    let np = builder.multiply(&[ni0, ni1]).expect("product");
    let source = builder.summate(&[np], 1).expect("source sum");
    let ns_a = builder.duplicate_sum(source, None, true).expect("replica a");
    let ns_b = builder.duplicate_sum(source, None, true).expect("replica b");
    let pa = builder.multiply(&[ns_a]).expect("wrap a");
    let pb = builder.multiply(&[ns_b]).expect("wrap b");
    let root = builder.summate(&[pa, pb], 1).expect("root");
    TiedScenario {
        circuit: builder.finish(root).expect("circuit"),
        inputs: [ni0, ni1],
        source,
        replicas: [ns_a, ns_b],
        root,
    }
}

fn compile_default(circuit: &Circuit) -> CompiledCircuit {
    compile(circuit, &CompileOptions::default()).expect("compile")
}

#[test]
fn input_parameters_are_laid_out_per_node_vector() {
    let scenario = tied_scenario();
    let compiled = compile_default(&scenario.circuit);

    let first = compiled.node_offsets(scenario.inputs[0]).expect("input 0 offsets");
    let second = compiled.node_offsets(scenario.inputs[1]).expect("input 1 offsets");
    assert_eq!(first.params, Some(OffsetRange::new(0, 8)));
    assert_eq!(second.params, Some(OffsetRange::new(8, 16)));
    assert_eq!(first.node_values, OffsetRange::new(0, 2));
    assert_eq!(second.node_values, OffsetRange::new(2, 4));

    assert_eq!(compiled.input_layers.len(), 1);
    let layer = &compiled.input_layers[0];
    assert_eq!(layer.signature.to_string(), "Categorical");
    assert_eq!(layer.num_parameters, 16);
    assert_eq!(layer.s_pids, vec![0, 4, 8, 12]);
    assert_eq!(layer.s_pfids, vec![0, 4, 8, 12]);
    assert_eq!(layer.s_mids, vec![0, 0, 1, 1]);
    assert_eq!(layer.source_nids, vec![0, 1, 2, 3]);
    assert_eq!(layer.metadata, vec![4.0, 4.0]);
    assert_eq!(layer.vids.valid(2), &[1]);
    assert!(layer.fusion.is_empty());
}

#[test]
fn tied_sums_share_parameters_and_fuse_into_the_source_flows() {
    let scenario = tied_scenario();
    let compiled = compile_default(&scenario.circuit);

    assert!(compiled.node_offsets(scenario.source).is_none());
    let a = compiled.node_offsets(scenario.replicas[0]).expect("replica a");
    let b = compiled.node_offsets(scenario.replicas[1]).expect("replica b");
    assert_eq!(a.params, Some(OffsetRange::new(0, 4)));
    assert_eq!(b.params, a.params);
    assert_eq!(a.param_flows, Some(OffsetRange::new(4, 8)));
    assert_eq!(b.param_flows, Some(OffsetRange::new(8, 12)));

    let root = compiled.node_offsets(scenario.root).expect("root");
    assert_eq!(root.params, Some(OffsetRange::new(4, 12)));
    assert_eq!(root.param_flows, Some(OffsetRange::new(12, 20)));
    assert_eq!(compiled.num_sum_params(), 12);
    assert_eq!(compiled.num_sum_param_flows(), 20);

    let plan = &compiled.sum_fusion;
    assert_eq!(plan.buckets.len(), 1);
    assert_eq!(plan.num_jobs(), 1);
    let job = plan.buckets[0].job(0);
    assert_eq!(plan.buckets[0].cardinality, 2);
    assert_eq!(job.source, scenario.source);
    assert_eq!(job.target, 0);
    assert_eq!(job.block_size, 4);
    assert_eq!(job.replicas, &[4, 8]);
}

#[test]
fn inner_layers_alternate_products_and_sums() {
    let scenario = tied_scenario();
    let compiled = compile_default(&scenario.circuit);

    let kinds: Vec<(LayerKind, usize)> = compiled
        .inner_layers
        .iter()
        .map(|layer| (layer.kind, layer.depth))
        .collect();
    assert_eq!(
        kinds,
        vec![
            (LayerKind::Product, 1),
            (LayerKind::Sum, 1),
            (LayerKind::Product, 2),
            (LayerKind::Sum, 2),
        ]
    );
    assert_eq!(compiled.num_node_values(), 16);
    assert_eq!(compiled.root_values(), OffsetRange::new(14, 16));
    assert_eq!(compiled.num_edges(), 24);

    let tied_layer = &compiled.inner_layers[1];
    assert_eq!(tied_layer.partitions.len(), 1);
    let partition = &tied_layer.partitions[0];
    assert_eq!(partition.nids, vec![6, 8]);
    assert_eq!(partition.cids.row(0), &[4, 5]);
    assert_eq!(partition.pids.as_ref().expect("pids").row(1), &[0, 2]);
    assert_eq!(partition.u_cids, vec![4]);
    assert_eq!(partition.parids.row(0), &[6, 8]);
    assert_eq!(partition.parpids.as_ref().expect("parpids").row(0), &[0, 0]);

    let root_layer = &compiled.inner_layers[3];
    let partition = &root_layer.partitions[0];
    assert_eq!(partition.cids.row(0), &[10, 11, 12, 13]);
    assert_eq!(partition.pids.as_ref().expect("pids").row(0), &[4, 6, 8, 10]);
    assert_eq!(partition.u_cids, vec![10, 12]);
    assert_eq!(partition.parpids.as_ref().expect("parpids").row(1), &[8]);
}

#[test]
fn distinct_distributions_get_separate_input_layers() {
    let mut builder = CircuitBuilder::new(4);
    let x0 = builder.inputs(0u32, 2, Categorical::new(3)).expect("cat 0");
    let x1 = builder.inputs(1u32, 2, Gaussian::new(0.0, 1.0)).expect("gauss 1");
    let x2 = builder.inputs(2u32, 2, Bernoulli).expect("bern 2");
    let x3 = builder.inputs(3u32, 2, Categorical::new(3)).expect("cat 3");
    let left = builder.multiply(&[x0, x1]).expect("left");
    let right = builder.multiply(&[x2, x3]).expect("right");
    let left_sum = builder.summate(&[left], 2).expect("left sum");
    let right_sum = builder.summate(&[right], 2).expect("right sum");
    let top = builder.multiply(&[left_sum, right_sum]).expect("top");
    let root = builder.summate(&[top], 1).expect("root");
    let circuit = builder.finish(root).expect("circuit");
    let compiled = compile_default(&circuit);

    let signatures: Vec<String> = compiled
        .input_layers
        .iter()
        .map(|layer| layer.signature.to_string())
        .collect();
    assert_eq!(signatures, vec!["Categorical", "Gaussian", "Bernoulli"]);

    let categorical = &compiled.input_layers[0];
    assert_eq!(categorical.nodes, vec![x0, x3]);
    assert_eq!(categorical.num_parameters, 2 * 8 * 3);
    assert_eq!(categorical.node_values, OffsetRange::new(0, 16));

    let gaussian = &compiled.input_layers[1];
    assert_eq!(gaussian.num_parameters, 8 * 2);
    assert_eq!(gaussian.num_param_flows, 8 * 3);
    assert_eq!(gaussian.s_pfids[1], 3);
    assert_eq!(gaussian.node_values, OffsetRange::new(16, 24));

    let bernoulli = &compiled.input_layers[2];
    assert!(bernoulli.metadata.is_empty());
    assert_eq!(bernoulli.s_mids, vec![0; 8]);
}

#[test]
fn tied_inputs_share_parameters_across_scopes() {
    let mut builder = CircuitBuilder::new(2);
    let x0 = builder.inputs(0u32, 3, Categorical::new(5)).expect("x0");
    let x1 = builder
        .duplicate_inputs(x0, Some(Scope::single(1)), true)
        .expect("x1");
    let x2 = builder
        .duplicate_inputs(x1, Some(Scope::single(2)), true)
        .expect("x2");
    let product = builder.multiply(&[x0, x1, x2]).expect("product");
    let root = builder.summate(&[product], 1).expect("root");
    let circuit = builder.finish(root).expect("circuit");
    let compiled = compile_default(&circuit);

    let layer = &compiled.input_layers[0];
    assert_eq!(layer.num_parameters, 30);
    assert_eq!(layer.num_param_flows, 90);
    assert_eq!(layer.source_nids, (0..6).collect::<Vec<u32>>());
    assert!(layer.s_pids[..6].iter().eq(layer.s_pids[6..12].iter()));

    let offsets = |id| compiled.node_offsets(id).expect("offsets").param_flows;
    assert_eq!(offsets(x0), Some(OffsetRange::new(0, 30)));
    assert_eq!(offsets(x1), Some(OffsetRange::new(30, 60)));
    assert_eq!(offsets(x2), Some(OffsetRange::new(60, 90)));

    let bucket = &layer.fusion.buckets[0];
    assert_eq!(bucket.cardinality, 4);
    assert_eq!(bucket.job(0).replicas, &[0, 30, 60, PAD]);
    assert_eq!(bucket.job(0).num_replicas, 3);
    assert!(compiled.sum_fusion.is_empty());
}

#[test]
fn initial_parameters_are_normalized_per_owner() {
    let scenario = tied_scenario();
    let compiled = compile_default(&scenario.circuit);
    let mut rng = StdRng::seed_from_u64(17);

    let layer = &compiled.input_layers[0];
    let params = layer.init_parameters(&scenario.circuit, &compiled.offsets, 2.0, &mut rng);
    assert_eq!(params.len(), layer.num_parameters);
    for node in params.chunks(4) {
        let total: f32 = node.iter().sum();
        assert!((total - 1.0).abs() < 1e-5);
    }

    let sums = compiled.init_sum_params(&scenario.circuit, &mut rng);
    assert_eq!(sums.len(), compiled.num_sum_params());
    // Replica block [0, 4): two children, lanes interleaved.
    for lane in 0..2 {
        assert!((sums[lane] + sums[2 + lane] - 1.0).abs() < 1e-5);
    }
    // Root block [4, 12): four children.
    for lane in 0..2 {
        let total: f32 = (0..4).map(|child| sums[4 + child * 2 + lane]).sum();
        assert!((total - 1.0).abs() < 1e-5);
    }
}

#[test]
fn supplied_input_parameters_replace_random_ones() {
    let mut builder = CircuitBuilder::new(2);
    let a = builder.inputs(0u32, 1, Categorical::new(3)).expect("a");
    let copy = builder
        .duplicate_inputs(a, Some(Scope::single(1)), true)
        .expect("copy");
    let b = builder.inputs(2u32, 1, Categorical::new(3)).expect("b");
    builder
        .set_input_params(copy, vec![1.0, 1.0, 2.0, 3.0, 0.0, 1.0])
        .expect("params");
    let product = builder.multiply(&[a, copy, b]).expect("product");
    let root = builder.summate(&[product], 1).expect("root");
    let circuit = builder.finish(root).expect("circuit");

    let expected = [0.25, 0.25, 0.5, 0.75, 0.0, 0.25];
    assert_eq!(circuit.input_params(a), Some(&expected[..]));
    assert_eq!(circuit.input_params(copy), Some(&expected[..]));
    assert_eq!(circuit.input_params(b), None);

    let compiled = compile_default(&circuit);
    let layer = &compiled.input_layers[0];
    let mut rng = StdRng::seed_from_u64(3);
    let params = layer.init_parameters(&circuit, &compiled.offsets, 2.0, &mut rng);
    assert_eq!(params.len(), 12);

    let owned = compiled.offsets.of(a).params.expect("a params");
    assert_eq!(compiled.offsets.of(copy).params, Some(owned));
    assert_eq!(&params[owned.start as usize..owned.end as usize], &expected[..]);

    let drawn = compiled.offsets.of(b).params.expect("b params");
    for node in params[drawn.start as usize..drawn.end as usize].chunks(3) {
        let total: f32 = node.iter().sum();
        assert!((total - 1.0).abs() < 1e-5);
    }
}

#[test]
fn parent_index_only_covers_reachable_nodes() {
    let scenario = tied_scenario();
    let parents = scenario.circuit.parents();
    let product = scenario.circuit.node(scenario.replicas[0]).children[0];
    assert_eq!(parents[&product].as_slice(), &scenario.replicas);
    assert!(!parents.contains_key(&scenario.source));
    assert_eq!(scenario.circuit.reachable().len(), scenario.circuit.len() - 1);
}
