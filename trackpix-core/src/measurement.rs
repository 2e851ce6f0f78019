//! Calibrated local measurements.

use crate::cell::ModuleId;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Calibrated 2D local hit position derived from one cluster.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Measurement {
    /// Local position on the module surface (mm).
    pub local: [f64; 2],
    /// Variance of the local position (mm²).
    pub variance: [f64; 2],
    /// Module the cluster was found on.
    pub module: ModuleId,
    /// Number of cells in the cluster.
    pub cluster_size: u32,
    /// Sum of cell activations.
    pub total_activation: f64,
    /// Time of the most active cell (ns).
    pub time: f64,
    /// Number of measured coordinates (2 for pixels, 1 for strips).
    pub dimension: u8,
}

impl Measurement {
    /// Creates a two-dimensional measurement with a single-cell cluster.
    #[must_use]
    pub fn new(local: [f64; 2], variance: [f64; 2], module: ModuleId) -> Self {
        Self {
            local,
            variance,
            module,
            cluster_size: 1,
            total_activation: 0.0,
            time: 0.0,
            dimension: 2,
        }
    }

    /// Local x coordinate.
    #[inline]
    #[must_use]
    pub fn local_x(&self) -> f64 {
        self.local[0]
    }

    /// Local y coordinate.
    #[inline]
    #[must_use]
    pub fn local_y(&self) -> f64 {
        self.local[1]
    }

    /// Standard deviation along each local axis.
    #[inline]
    #[must_use]
    pub fn sigma(&self) -> [f64; 2] {
        [self.variance[0].sqrt(), self.variance[1].sqrt()]
    }

    /// Returns true for one-dimensional (strip) measurements.
    #[inline]
    #[must_use]
    pub fn is_one_dimensional(&self) -> bool {
        self.dimension == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measurement_accessors() {
        let m = Measurement::new([1.5, -2.0], [0.04, 0.09], ModuleId(3));
        assert!((m.local_x() - 1.5).abs() < f64::EPSILON);
        assert!((m.local_y() + 2.0).abs() < f64::EPSILON);
        let sigma = m.sigma();
        assert!((sigma[0] - 0.2).abs() < 1e-12);
        assert!((sigma[1] - 0.3).abs() < 1e-12);
        assert!(!m.is_one_dimensional());
        assert_eq!(m.cluster_size, 1);
    }
}
