//! Track parameter types.
//!
//! Free parameters are `(x, y, z, t, dir_x, dir_y, dir_z, q/p)`. Bound
//! parameters are `(loc0, loc1, phi, theta, q/p, t)` expressed in the
//! curvilinear frame at the free position, where `loc0`/`loc1` are zero by
//! construction.

use nalgebra::{SMatrix, SVector, Vector3};

use crate::seed::Seed;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Free parameter vector.
pub type FreeVector = SVector<f64, 8>;
/// Bound parameter vector.
pub type BoundVector = SVector<f64, 6>;
/// Bound covariance matrix.
pub type BoundSquareMatrix = SMatrix<f64, 6, 6>;

/// Indices into [`FreeVector`].
pub mod free_index {
    pub const POS0: usize = 0;
    pub const POS1: usize = 1;
    pub const POS2: usize = 2;
    pub const TIME: usize = 3;
    pub const DIR0: usize = 4;
    pub const DIR1: usize = 5;
    pub const DIR2: usize = 6;
    pub const QOVERP: usize = 7;
}

/// Indices into [`BoundVector`].
pub mod bound_index {
    pub const LOC0: usize = 0;
    pub const LOC1: usize = 1;
    pub const PHI: usize = 2;
    pub const THETA: usize = 3;
    pub const QOVERP: usize = 4;
    pub const TIME: usize = 5;
}

/// Curvilinear bound vector for a track with the given direction.
///
/// `direction` need not be normalised.
#[must_use]
pub fn free_to_curvilinear(time: f64, direction: &Vector3<f64>, q_over_p: f64) -> BoundVector {
    let dir = direction.normalize();
    let phi = dir.y.atan2(dir.x);
    let theta = dir.z.clamp(-1.0, 1.0).acos();
    BoundVector::from_column_slice(&[0.0, 0.0, phi, theta, q_over_p, time])
}

/// Unit vectors `(U, V)` spanning the curvilinear plane perpendicular to
/// `direction`.
///
/// `U` lies in the transverse plane; for tracks along the beam axis the
/// global x axis is used.
#[must_use]
pub fn curvilinear_axes(direction: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
    let dir = direction.normalize();
    let transverse = dir.x.hypot(dir.y);
    let u = if transverse < 1e-12 {
        Vector3::new(1.0, 0.0, 0.0)
    } else {
        Vector3::new(-dir.y / transverse, dir.x / transverse, 0.0)
    };
    let v = dir.cross(&u);
    (u, v)
}

/// Initial track parameter estimate built from one seed.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackParameters {
    /// Free parameters at the innermost spacepoint.
    pub free: FreeVector,
    /// Curvilinear bound parameters at the same point.
    pub bound: BoundVector,
    /// Covariance of the bound parameters.
    pub covariance: BoundSquareMatrix,
    /// Originating seed.
    pub seed: Seed,
    /// True if the curvature was too small to resolve and the momentum was
    /// set to the configured ceiling.
    pub momentum_at_ceiling: bool,
}

impl TrackParameters {
    /// Global position.
    #[must_use]
    pub fn position(&self) -> Vector3<f64> {
        Vector3::new(
            self.free[free_index::POS0],
            self.free[free_index::POS1],
            self.free[free_index::POS2],
        )
    }

    /// Unit direction.
    #[must_use]
    pub fn direction(&self) -> Vector3<f64> {
        Vector3::new(
            self.free[free_index::DIR0],
            self.free[free_index::DIR1],
            self.free[free_index::DIR2],
        )
    }

    /// Charge over momentum (1/GeV).
    #[must_use]
    pub fn q_over_p(&self) -> f64 {
        self.free[free_index::QOVERP]
    }

    /// Time (ns).
    #[must_use]
    pub fn time(&self) -> f64 {
        self.free[free_index::TIME]
    }

    /// Absolute momentum (GeV).
    #[must_use]
    pub fn momentum(&self) -> f64 {
        1.0 / self.q_over_p().abs()
    }

    /// Transverse momentum (GeV).
    #[must_use]
    pub fn transverse_momentum(&self) -> f64 {
        self.momentum() * self.bound[bound_index::THETA].sin()
    }

    /// Charge sign (+1 or -1).
    #[must_use]
    pub fn charge(&self) -> f64 {
        if self.q_over_p() < 0.0 {
            -1.0
        } else {
            1.0
        }
    }

    /// Azimuthal angle of the direction.
    #[must_use]
    pub fn phi(&self) -> f64 {
        self.bound[bound_index::PHI]
    }

    /// Polar angle of the direction.
    #[must_use]
    pub fn theta(&self) -> f64 {
        self.bound[bound_index::THETA]
    }

    /// Returns true if any parameter or covariance entry is NaN or infinite.
    #[must_use]
    pub fn has_non_finite(&self) -> bool {
        self.free.iter().any(|v| !v.is_finite())
            || self.bound.iter().any(|v| !v.is_finite())
            || self.covariance.iter().any(|v| !v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

    #[test]
    fn test_free_to_curvilinear() {
        let bound = free_to_curvilinear(1.5, &Vector3::new(0.0, 2.0, 2.0), -0.25);
        assert_relative_eq!(bound[bound_index::PHI], FRAC_PI_2);
        assert_relative_eq!(bound[bound_index::THETA], FRAC_PI_4, epsilon = 1e-12);
        assert_relative_eq!(bound[bound_index::QOVERP], -0.25);
        assert_relative_eq!(bound[bound_index::TIME], 1.5);
        assert_eq!(bound[bound_index::LOC0], 0.0);
    }

    #[test]
    fn test_curvilinear_axes_are_orthonormal() {
        let dir = Vector3::new(0.3, -0.4, 0.8);
        let (u, v) = curvilinear_axes(&dir);
        let d = dir.normalize();
        assert_relative_eq!(u.norm(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(v.norm(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(u.dot(&d), 0.0, epsilon = 1e-12);
        assert_relative_eq!(v.dot(&d), 0.0, epsilon = 1e-12);
        assert_relative_eq!(u.z, 0.0);
    }

    #[test]
    fn test_axes_along_beam() {
        let (u, v) = curvilinear_axes(&Vector3::new(0.0, 0.0, 1.0));
        assert_relative_eq!(u.x, 1.0);
        assert_relative_eq!(v.y, 1.0);
    }
}
