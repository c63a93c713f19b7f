pub mod cpu;

use std::sync::Arc;

pub use cpu::CpuCircuitBackend;

/// Register the CPU executor with the global backend registry.
///
/// This runs automatically when the library is loaded, but can also be called manually to
/// make sure the backend is available. The executor is registered as "cpu".
pub fn register_cpu_backend() {
    circuit_rs::backend::registry::register_backend("cpu", || {
        Arc::new(CpuCircuitBackend::new()) as Arc<dyn circuit_rs::backend::CircuitBackend>
    });
}

#[cfg(not(target_family = "wasm"))]
#[used]
#[link_section = ".init_array"]
static REGISTER_CPU_BACKEND: extern "C" fn() = {
    extern "C" fn register() {
        register_cpu_backend();
    }
    register
};
