use anyhow::Result;
use circuit_rs::backend::{BackendError, CircuitBackend};
use circuit_rs::compile::LayerKind;
use circuit_rs::dist::{Bernoulli, Categorical};
use circuit_rs::{compile, Circuit, CircuitBuilder, CompileOptions};
use circuit_rs_backend_ref_cpu::CpuCircuitBackend;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn two_variable_mixture() -> Result<Circuit> {
    let mut builder = CircuitBuilder::new(2);
    let x0 = builder.inputs(0u32, 1, Categorical::new(2))?;
    let x1 = builder.inputs(1u32, 1, Categorical::new(2))?;
    let product = builder.multiply(&[x0, x1])?;
    let root = builder.summate(&[product], 1)?;
    Ok(builder.finish(root)?)
}

fn assert_close(actual: f32, expected: f32) {
    assert!(
        (actual - expected).abs() < 1e-5,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn products_add_and_sums_mix_in_log_space() -> Result<()> {
    let circuit = two_variable_mixture()?;
    let compiled = compile(&circuit, &CompileOptions::default())?;
    assert_eq!(compiled.inner_layers[0].kind, LayerKind::Product);

    let mut values = vec![0.0f32; compiled.num_node_values()];
    values[..4].copy_from_slice(&[0.5f32.ln(), 0.25f32.ln(), 0.2f32.ln(), 0.8f32.ln()]);
    // Parameter of child j for output lane i lives at 2 * j + i.
    let params = [0.3f32, 0.6, 0.7, 0.4];

    CpuCircuitBackend::new().forward(&compiled, &mut values, &params)?;

    assert_close(values[4], 0.1f32.ln());
    assert_close(values[5], 0.2f32.ln());
    let root = compiled.root_values();
    assert_close(values[root.start as usize], 0.17f32.ln());
    assert_close(values[root.start as usize + 1], 0.14f32.ln());
    Ok(())
}

#[test]
fn normalized_circuits_assign_zero_log_mass_to_certain_inputs() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..8 {
        let group_size = [1usize, 2, 4][rng.gen_range(0..3)];
        let groups = rng.gen_range(1..=3);
        let mut builder = CircuitBuilder::new(group_size);
        let a = builder.inputs(0u32, groups, Bernoulli)?;
        let b = builder.inputs(1u32, groups, Bernoulli)?;
        let c = builder.inputs(2u32, groups, Bernoulli)?;
        let ab = builder.multiply(&[a, b])?;
        let sum_ab = builder.summate(&[ab], groups)?;
        let tied = builder.duplicate_sum(sum_ab, None, true)?;
        let left = builder.multiply(&[sum_ab, c])?;
        let right = builder.multiply(&[tied, c])?;
        let root = builder.summate(&[left, right], 1)?;
        let circuit = builder.finish(root)?;

        let compiled = compile(&circuit, &CompileOptions::default())?;
        let params = compiled.init_sum_params(&circuit, &mut rng);
        let mut values = vec![0.0f32; compiled.num_node_values()];
        CpuCircuitBackend::new().forward(&compiled, &mut values, &params)?;
        for value in values {
            assert!(value.abs() < 1e-4, "log mass drifted to {value}");
        }
    }
    Ok(())
}

#[test]
fn short_buffers_are_rejected() -> Result<()> {
    let circuit = two_variable_mixture()?;
    let compiled = compile(&circuit, &CompileOptions::default())?;
    let mut values = vec![0.0f32; compiled.num_node_values() - 1];
    let err = CpuCircuitBackend::new()
        .forward(&compiled, &mut values, &[0.25; 4])
        .unwrap_err();
    assert_eq!(
        err,
        BackendError::BufferTooSmall {
            buffer: "node value",
            required: 8,
            actual: 7,
        }
    );

    let mut values = vec![0.0f32; compiled.num_node_values()];
    let err = CpuCircuitBackend::new()
        .forward_layer(&mut values, &[0.25; 2], &compiled.inner_layers[1])
        .unwrap_err();
    assert!(matches!(err, BackendError::OutOfBounds { buffer: "sum parameter", .. }));
    Ok(())
}
