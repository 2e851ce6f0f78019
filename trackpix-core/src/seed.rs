//! Seed type.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A compatible spacepoint triplet, ordered from the innermost spacepoint.
///
/// Spacepoints are referenced by index into the event's spacepoint
/// collection.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Seed {
    /// Innermost spacepoint.
    pub bottom: usize,
    /// Middle spacepoint.
    pub middle: usize,
    /// Outermost spacepoint.
    pub top: usize,
    /// Quality score; higher is better.
    pub weight: f64,
    /// Longitudinal position of the seed at the beam axis (mm).
    pub z_vertex: f64,
}

impl Seed {
    /// Creates a new seed.
    #[must_use]
    pub fn new(bottom: usize, middle: usize, top: usize, weight: f64, z_vertex: f64) -> Self {
        Self {
            bottom,
            middle,
            top,
            weight,
            z_vertex,
        }
    }

    /// Spacepoint indices from bottom to top.
    #[inline]
    #[must_use]
    pub fn spacepoints(&self) -> [usize; 3] {
        [self.bottom, self.middle, self.top]
    }

    /// Returns true if the seed uses spacepoint `index`.
    #[inline]
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        self.bottom == index || self.middle == index || self.top == index
    }
}
