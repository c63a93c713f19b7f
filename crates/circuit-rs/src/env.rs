use std::env;
use std::str::FromStr;
use std::sync::OnceLock;

static LAYER_SPARSITY_TOL: OnceLock<Option<f32>> = OnceLock::new();
static FUSION_BLOCK_SIZE: OnceLock<Option<usize>> = OnceLock::new();
static MAX_TIED_GROUPS: OnceLock<Option<usize>> = OnceLock::new();

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => match value.trim().parse() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                tracing::warn!(var = name, value = %value, "ignoring unparsable override");
                None
            }
        },
        _ => None,
    }
}

pub(crate) fn layer_sparsity_tol() -> Option<f32> {
    *LAYER_SPARSITY_TOL.get_or_init(|| parse_var("CIRCUIT_RS_LAYER_SPARSITY_TOL"))
}

pub(crate) fn fusion_block_size() -> Option<usize> {
    *FUSION_BLOCK_SIZE.get_or_init(|| parse_var("CIRCUIT_RS_FUSION_BLOCK_SIZE"))
}

pub(crate) fn max_tied_groups() -> Option<usize> {
    *MAX_TIED_GROUPS.get_or_init(|| parse_var("CIRCUIT_RS_MAX_TIED_GROUPS"))
}
