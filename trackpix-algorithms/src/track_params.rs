//! Initial track parameters from seeds.
//!
//! The estimate works in a frame centred on the bottom spacepoint with x
//! along the transverse bottom-to-middle chord and z along the field. In
//! that frame the conformal map `u = x / (x² + y²)`, `v = y / (x² + y²)`
//! turns the circle through the three spacepoints into the line
//! `v = A u + B`. The circle centre is `(-A / 2B, 1 / 2B)`, so the tangent
//! at the bottom spacepoint is `(1, A)` and the signed curvature is
//! `ρ = 2B / sqrt(1 + A²)`.
//!
//! The covariance propagates the spacepoint uncertainties through the same
//! closed form with a numerical Jacobian.

use std::f64::consts::PI;

use nalgebra::{SMatrix, Vector3};
use rayon::prelude::*;
use trackpix_core::error::{ensure_non_negative, ensure_positive};
use trackpix_core::track::{bound_index, curvilinear_axes, free_index, free_to_curvilinear};
use trackpix_core::units::PT_PER_TESLA_MM;
use trackpix_core::{
    BoundSquareMatrix, Error, Execution, FreeVector, Result, Seed, SeedingError, Spacepoint,
    TrackParameters,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Step (mm) of the central differences.
const JACOBIAN_STEP: f64 = 1e-3;

/// Track parameter estimation configuration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TrackParamsConfig {
    /// Field used by [`TrackParamsEstimation::estimate_all`] (T).
    pub b_field: f64,
    /// Transverse momentum assigned to unresolved curvature (GeV).
    pub pt_ceiling: f64,
    /// Smallest resolvable curvature (1/mm).
    pub rho_min: f64,
    /// Time resolution (ns).
    pub sigma_time: f64,
    /// Lower bounds of the bound parameter standard deviations, in bound
    /// parameter order.
    pub initial_sigmas: [f64; 6],
    /// Sequential or parallel estimation over seeds.
    pub execution: Execution,
}

impl Default for TrackParamsConfig {
    fn default() -> Self {
        Self {
            b_field: 2.0,
            pt_ceiling: 100.0,
            rho_min: 1e-6,
            sigma_time: 1.0,
            initial_sigmas: [0.01, 0.01, 1e-4, 1e-4, 1e-4, 0.1],
            execution: Execution::Parallel,
        }
    }
}

impl TrackParamsConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the magnetic field.
    #[must_use]
    pub fn with_b_field(mut self, b_field: f64) -> Self {
        self.b_field = b_field;
        self
    }

    /// Sets the execution model.
    #[must_use]
    pub fn with_execution(mut self, execution: Execution) -> Self {
        self.execution = execution;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] naming the first invalid parameter.
    pub fn validate(&self) -> Result<()> {
        if !self.b_field.is_finite() {
            return Err(Error::ConfigError("b_field must be finite".to_string()));
        }
        ensure_positive("pt_ceiling", self.pt_ceiling)?;
        ensure_non_negative("rho_min", self.rho_min)?;
        ensure_non_negative("sigma_time", self.sigma_time)?;
        for sigma in self.initial_sigmas {
            ensure_non_negative("initial_sigmas", sigma)?;
        }
        Ok(())
    }
}

/// Closed-form helix estimate.
#[derive(Debug, Clone, Copy)]
struct HelixEstimate {
    direction: Vector3<f64>,
    q_over_p: f64,
    at_ceiling: bool,
}

impl HelixEstimate {
    fn angles(&self) -> [f64; 3] {
        let phi = self.direction.y.atan2(self.direction.x);
        let theta = self.direction.z.clamp(-1.0, 1.0).acos();
        [phi, theta, self.q_over_p]
    }
}

/// Estimates track parameters from seeds.
#[derive(Debug, Clone, Default)]
pub struct TrackParamsEstimation {
    config: TrackParamsConfig,
}

impl TrackParamsEstimation {
    /// Creates an estimator.
    ///
    /// # Errors
    /// Returns a configuration error if `config` is invalid.
    pub fn new(config: TrackParamsConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> &TrackParamsConfig {
        &self.config
    }

    /// Estimates the parameters of one seed at its bottom spacepoint.
    ///
    /// # Errors
    /// Returns [`SeedingError::SpacepointOutOfRange`] if the seed references
    /// a spacepoint outside `spacepoints`.
    pub fn estimate(&self, seed: &Seed, spacepoints: &[Spacepoint], b_field: f64) -> Result<TrackParameters> {
        let fetch = |index: usize| {
            spacepoints.get(index).ok_or(SeedingError::SpacepointOutOfRange {
                index,
                len: spacepoints.len(),
            })
        };
        let triplet = [fetch(seed.bottom)?, fetch(seed.middle)?, fetch(seed.top)?];
        let positions = triplet.map(|sp| Vector3::from(sp.position()));

        let estimate = self.helix(&positions, b_field);
        let time = 0.0;

        let mut free = FreeVector::zeros();
        free[free_index::POS0] = positions[0].x;
        free[free_index::POS1] = positions[0].y;
        free[free_index::POS2] = positions[0].z;
        free[free_index::TIME] = time;
        free[free_index::DIR0] = estimate.direction.x;
        free[free_index::DIR1] = estimate.direction.y;
        free[free_index::DIR2] = estimate.direction.z;
        free[free_index::QOVERP] = estimate.q_over_p;

        let bound = free_to_curvilinear(time, &estimate.direction, estimate.q_over_p);
        let covariance = self.covariance(&triplet, &positions, &estimate, b_field);

        Ok(TrackParameters {
            free,
            bound,
            covariance,
            seed: *seed,
            momentum_at_ceiling: estimate.at_ceiling,
        })
    }

    /// Estimates the parameters of every seed with the configured field,
    /// keeping the seed order.
    ///
    /// # Errors
    /// Returns [`SeedingError::SpacepointOutOfRange`] if any seed references
    /// a spacepoint outside `spacepoints`.
    pub fn estimate_all(&self, seeds: &[Seed], spacepoints: &[Spacepoint]) -> Result<Vec<TrackParameters>> {
        let b_field = self.config.b_field;
        let params = if self.config.execution.is_parallel() {
            seeds
                .par_iter()
                .map(|seed| self.estimate(seed, spacepoints, b_field))
                .collect::<Result<Vec<_>>>()?
        } else {
            seeds
                .iter()
                .map(|seed| self.estimate(seed, spacepoints, b_field))
                .collect::<Result<Vec<_>>>()?
        };
        let at_ceiling = params.iter().filter(|p| p.momentum_at_ceiling).count();
        log::debug!(
            "estimated {} track parameters, {at_ceiling} at the momentum ceiling",
            params.len()
        );
        Ok(params)
    }

    fn helix(&self, positions: &[Vector3<f64>; 3], b_field: f64) -> HelixEstimate {
        let [bottom, middle, top] = positions;

        let chord = Vector3::new(middle.x - bottom.x, middle.y - bottom.y, 0.0);
        let x_axis = if chord.norm() > 1e-12 {
            chord.normalize()
        } else if bottom.x.hypot(bottom.y) > 1e-12 {
            Vector3::new(bottom.x, bottom.y, 0.0).normalize()
        } else {
            Vector3::x()
        };
        let y_axis = Vector3::new(-x_axis.y, x_axis.x, 0.0);
        let to_local = |p: &Vector3<f64>| {
            let d = p - bottom;
            [d.dot(&x_axis), d.dot(&y_axis), d.z]
        };
        let conformal = |l: [f64; 3]| {
            let r2 = l[0] * l[0] + l[1] * l[1];
            (l[0] / r2, l[1] / r2)
        };

        let local_middle = to_local(middle);
        let local_top = to_local(top);
        let (u1, v1) = conformal(local_middle);
        let (u2, v2) = conformal(local_top);

        let a = (v2 - v1) / (u2 - u1);
        let (a, rho) = if a.is_finite() {
            let b = v2 - a * u2;
            (a, 2.0 * b / a.mul_add(a, 1.0).sqrt())
        } else {
            (0.0, 0.0)
        };

        let degenerate = b_field == 0.0 || !rho.is_finite() || rho.abs() < self.config.rho_min;

        // Transverse path length from bottom to top along the circle
        let chord_top = local_top[0].hypot(local_top[1]);
        let arc = if degenerate {
            chord_top
        } else {
            let half_angle = (0.5 * chord_top * rho.abs()).min(1.0).asin();
            2.0 * half_angle / rho.abs()
        };
        let cot_theta = if arc > 0.0 { local_top[2] / arc } else { 0.0 };

        let (ta, tb) = if degenerate { (1.0, 0.0) } else { (1.0, a) };
        let norm = f64::hypot(ta, tb);
        let transverse = (x_axis * ta + y_axis * tb) / norm;
        let direction = Vector3::new(transverse.x, transverse.y, cot_theta).normalize();
        let sin_theta = 1.0 / cot_theta.mul_add(cot_theta, 1.0).sqrt();

        if degenerate {
            return HelixEstimate {
                direction,
                q_over_p: sin_theta / self.config.pt_ceiling,
                at_ceiling: true,
            };
        }

        // Resolved curvature above the ceiling keeps its charge but not its
        // momentum.
        let pt = PT_PER_TESLA_MM * b_field.abs() / rho.abs();
        let at_ceiling = pt >= self.config.pt_ceiling;
        let charge = -rho.signum() * b_field.signum();
        HelixEstimate {
            direction,
            q_over_p: charge * sin_theta / pt.min(self.config.pt_ceiling),
            at_ceiling,
        }
    }

    /// Bound covariance from the spacepoint uncertainties.
    fn covariance(
        &self,
        triplet: &[&Spacepoint; 3],
        positions: &[Vector3<f64>; 3],
        estimate: &HelixEstimate,
        b_field: f64,
    ) -> BoundSquareMatrix {
        // Input covariance of the nine coordinates, block diagonal
        let mut input = SMatrix::<f64, 9, 9>::zeros();
        for (k, sp) in triplet.iter().enumerate() {
            let r = sp.r();
            let radial = if r > 0.0 {
                Vector3::new(sp.x() / r, sp.y() / r, 0.0)
            } else {
                Vector3::zeros()
            };
            let block = radial * radial.transpose() * sp.variance_r()
                + Vector3::z() * Vector3::z().transpose() * sp.variance_z();
            input.fixed_view_mut::<3, 3>(3 * k, 3 * k).copy_from(&block);
        }

        // Rows: loc0, loc1, phi, theta, q/p
        let mut jacobian = SMatrix::<f64, 5, 9>::zeros();
        let (u_axis, v_axis) = curvilinear_axes(&estimate.direction);
        for c in 0..3 {
            jacobian[(0, c)] = u_axis[c];
            jacobian[(1, c)] = v_axis[c];
        }
        for column in 0..9 {
            let mut plus = *positions;
            let mut minus = *positions;
            plus[column / 3][column % 3] += JACOBIAN_STEP;
            minus[column / 3][column % 3] -= JACOBIAN_STEP;
            let high = self.helix(&plus, b_field).angles();
            let low = self.helix(&minus, b_field).angles();
            let d_phi = wrap_angle(high[0] - low[0]);
            jacobian[(2, column)] = d_phi / (2.0 * JACOBIAN_STEP);
            jacobian[(3, column)] = (high[1] - low[1]) / (2.0 * JACOBIAN_STEP);
            if !estimate.at_ceiling {
                jacobian[(4, column)] = (high[2] - low[2]) / (2.0 * JACOBIAN_STEP);
            }
        }

        let propagated = jacobian * input * jacobian.transpose();
        let mut covariance = BoundSquareMatrix::zeros();
        let rows = [
            bound_index::LOC0,
            bound_index::LOC1,
            bound_index::PHI,
            bound_index::THETA,
            bound_index::QOVERP,
        ];
        for (i, &bi) in rows.iter().enumerate() {
            for (j, &bj) in rows.iter().enumerate() {
                let value = propagated[(i, j)];
                covariance[(bi, bj)] = if value.is_finite() { value } else { 0.0 };
            }
        }
        covariance[(bound_index::TIME, bound_index::TIME)] = self.config.sigma_time * self.config.sigma_time;

        for (i, sigma) in self.config.initial_sigmas.iter().enumerate() {
            let floor = sigma * sigma;
            if covariance[(i, i)] < floor {
                covariance[(i, i)] = floor;
            }
        }
        covariance
    }
}

/// Wraps an angle difference into `[-π, π)`.
fn wrap_angle(angle: f64) -> f64 {
    (angle + PI).rem_euclid(2.0 * PI) - PI
}
