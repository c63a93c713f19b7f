use circuit_rs::backend::registry::{get_backend, has_backend, list_backends};
use circuit_rs::backend::CircuitBackend;
use circuit_rs_backend_ref_cpu::register_cpu_backend;

#[test]
fn cpu_backend_is_registered_by_name() {
    register_cpu_backend();
    assert!(has_backend("cpu"));
    assert!(list_backends().iter().any(|name| name == "cpu"));
    let backend = get_backend("cpu").expect("cpu backend");
    assert_eq!(backend.backend_name(), "cpu");
    assert!(get_backend("does-not-exist").is_none());
}
