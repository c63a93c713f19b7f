use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Sorted, deduplicated set of variable ids a node depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    vars: SmallVec<[u32; 4]>,
}

impl Scope {
    pub fn new(vars: impl IntoIterator<Item = u32>) -> Self {
        let mut vars: SmallVec<[u32; 4]> = vars.into_iter().collect();
        vars.sort_unstable();
        vars.dedup();
        Self { vars }
    }

    pub fn single(var: u32) -> Self {
        let mut vars = SmallVec::new();
        vars.push(var);
        Self { vars }
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn vars(&self) -> &[u32] {
        &self.vars
    }

    pub fn contains(&self, var: u32) -> bool {
        self.vars.binary_search(&var).is_ok()
    }

    pub fn is_disjoint(&self, other: &Scope) -> bool {
        let (mut i, mut j) = (0, 0);
        while i < self.vars.len() && j < other.vars.len() {
            match self.vars[i].cmp(&other.vars[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => return false,
            }
        }
        true
    }

    pub fn union(&self, other: &Scope) -> Scope {
        Scope::new(self.vars.iter().chain(other.vars.iter()).copied())
    }
}

impl From<u32> for Scope {
    fn from(var: u32) -> Self {
        Scope::single(var)
    }
}

impl From<&[u32]> for Scope {
    fn from(vars: &[u32]) -> Self {
        Scope::new(vars.iter().copied())
    }
}

impl<const N: usize> From<[u32; N]> for Scope {
    fn from(vars: [u32; N]) -> Self {
        Scope::new(vars)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (idx, var) in self.vars.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{var}")?;
        }
        write!(f, "}}")
    }
}
