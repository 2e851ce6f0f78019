//! Execution model selection.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How an algorithm distributes its work.
///
/// Both variants produce identical results; `Parallel` uses the rayon
/// global thread pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Execution {
    /// Single thread, deterministic traversal.
    Sequential,
    /// Data-parallel over modules, grid bins, middle spacepoints or seeds.
    #[default]
    Parallel,
}

impl Execution {
    /// Returns true for the data-parallel model.
    #[inline]
    #[must_use]
    pub fn is_parallel(self) -> bool {
        matches!(self, Self::Parallel)
    }
}
