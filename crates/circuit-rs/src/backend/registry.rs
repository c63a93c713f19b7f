//! Name-keyed registry of executor constructors.
//!
//! Backend crates register themselves at load time so callers can pick an executor by name
//! without depending on its crate.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use super::CircuitBackend;

pub type BackendConstructor = Box<dyn Fn() -> Arc<dyn CircuitBackend> + Send + Sync>;

struct BackendRegistry {
    backends: RwLock<HashMap<String, BackendConstructor>>,
}

impl BackendRegistry {
    fn new() -> Self {
        Self {
            backends: RwLock::new(HashMap::new()),
        }
    }

    fn register(&self, name: String, constructor: BackendConstructor) {
        self.backends
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, constructor);
    }

    fn create(&self, name: &str) -> Option<Arc<dyn CircuitBackend>> {
        let registry = self.backends.read().unwrap_or_else(PoisonError::into_inner);
        let constructor = registry.get(name)?;
        Some(constructor())
    }

    fn list_backends(&self) -> Vec<String> {
        let registry = self.backends.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = registry.keys().cloned().collect();
        names.sort();
        names
    }
}

static GLOBAL_REGISTRY: OnceLock<BackendRegistry> = OnceLock::new();

fn global_registry() -> &'static BackendRegistry {
    GLOBAL_REGISTRY.get_or_init(BackendRegistry::new)
}

/// Registers `constructor` under `name`, replacing any earlier registration.
pub fn register_backend<F>(name: impl Into<String>, constructor: F)
where
    F: Fn() -> Arc<dyn CircuitBackend> + Send + Sync + 'static,
{
    global_registry().register(name.into(), Box::new(constructor));
}

/// Creates a fresh backend instance, or `None` when `name` was never registered.
pub fn get_backend(name: &str) -> Option<Arc<dyn CircuitBackend>> {
    global_registry().create(name)
}

/// Registered backend names in ascending order.
pub fn list_backends() -> Vec<String> {
    global_registry().list_backends()
}

pub fn has_backend(name: &str) -> bool {
    global_registry()
        .backends
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .contains_key(name)
}
