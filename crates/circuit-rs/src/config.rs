use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::compile::CompileError;
use crate::env;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionOptions {
    /// Flows reduced per job across all replicas; the tile width of a bucket of
    /// cardinality `G` is `block_size / G`.
    pub block_size: usize,
    /// Largest number of replicas one tied set may have.
    pub max_tied_groups: usize,
}

impl Default for FusionOptions {
    fn default() -> Self {
        Self {
            block_size: 2048,
            max_tied_groups: 2048,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Relative fan-in gap under which two node groups share a partition. 0 never merges,
    /// 1 merges every group of a layer.
    pub layer_sparsity_tol: f32,
    pub max_num_partitions: Option<usize>,
    pub fusion: FusionOptions,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            layer_sparsity_tol: 0.25,
            max_num_partitions: None,
            fusion: FusionOptions::default(),
        }
    }
}

impl CompileOptions {
    pub fn from_json(text: &str) -> Result<Self> {
        let options: Self =
            serde_json::from_str(text).context("failed to parse compile options")?;
        options.validate()?;
        Ok(options)
    }

    /// Applies `CIRCUIT_RS_*` environment overrides on top of `self`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(tol) = env::layer_sparsity_tol() {
            self.layer_sparsity_tol = tol;
        }
        if let Some(block_size) = env::fusion_block_size() {
            self.fusion.block_size = block_size;
        }
        if let Some(cap) = env::max_tied_groups() {
            self.fusion.max_tied_groups = cap;
        }
        self
    }

    pub fn validate(&self) -> Result<(), CompileError> {
        if !(0.0..=1.0).contains(&self.layer_sparsity_tol) {
            return Err(CompileError::InvalidOptions(format!(
                "layer_sparsity_tol must be within [0, 1], got {}",
                self.layer_sparsity_tol
            )));
        }
        if self.max_num_partitions == Some(0) {
            return Err(CompileError::InvalidOptions(
                "max_num_partitions must be positive".to_string(),
            ));
        }
        if self.fusion.block_size == 0 {
            return Err(CompileError::InvalidOptions(
                "fusion block_size must be positive".to_string(),
            ));
        }
        if self.fusion.max_tied_groups == 0 {
            return Err(CompileError::InvalidOptions(
                "fusion max_tied_groups must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
