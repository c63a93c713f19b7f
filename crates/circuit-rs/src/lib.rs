//! Compiler from probabilistic-circuit graphs to dense, partitioned execution plans.
//!
//! A [`Circuit`] is built once through [`CircuitBuilder`], then lowered by [`compile`] into
//! offset tables, partitioned index tensors for every product and sum layer, and fusion
//! plans that fold the parameter flows of tied node vectors back into their owners.
//! Numeric execution lives behind [`backend::CircuitBackend`].

pub mod backend;
pub mod compile;
pub mod config;
pub mod dist;
mod env;
pub mod fusion;
pub mod graph;
pub mod hashing;

pub use compile::{compile, CompileError, CompiledCircuit, CompiledLayer, InputLayer, PAD};
pub use config::{CompileOptions, FusionOptions};
pub use fusion::{FusionPlan, TiedSet};
pub use graph::{Circuit, CircuitBuilder, GraphError, NodeId, Scope};
