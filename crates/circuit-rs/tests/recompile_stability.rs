mod common;

use circuit_rs::{compile, CompileOptions};

use common::random_circuit;

#[test]
fn recompiling_yields_identical_plans() {
    for seed in 0..16 {
        let circuit = random_circuit(seed);
        let options = CompileOptions::default();
        let first = compile(&circuit, &options).expect("first compile");
        let second = compile(&circuit, &options).expect("second compile");
        assert_eq!(first, second, "seed {seed}");
        assert_eq!(
            first.fingerprint().expect("fingerprint"),
            second.fingerprint().expect("fingerprint")
        );
    }
}

#[test]
fn cloned_circuits_compile_identically() {
    let circuit = random_circuit(99);
    let copy = circuit.clone();
    let options = CompileOptions {
        layer_sparsity_tol: 0.5,
        max_num_partitions: Some(2),
        ..CompileOptions::default()
    };
    let original = compile(&circuit, &options).expect("original");
    let cloned = compile(&copy, &options).expect("clone");
    assert_eq!(
        original.fingerprint().expect("fingerprint"),
        cloned.fingerprint().expect("fingerprint")
    );
}

#[test]
fn options_change_the_fingerprint() {
    let circuit = random_circuit(5);
    let base = compile(&circuit, &CompileOptions::default()).expect("base");
    let tweaked = compile(
        &circuit,
        &CompileOptions {
            layer_sparsity_tol: 0.0,
            ..CompileOptions::default()
        },
    )
    .expect("tweaked");
    assert_ne!(
        base.fingerprint().expect("fingerprint"),
        tweaked.fingerprint().expect("fingerprint")
    );
}
