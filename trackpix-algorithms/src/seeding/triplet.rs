//! Triplet compatibility.
//!
//! For a fixed middle spacepoint every bottom/top doublet pair is tested
//! for a common helix. In the conformal frame of the middle spacepoint the
//! helix is the line `v = A u + B`, whose curvature is `B / sqrt(1 + A²)`.

use super::config::{CollinearPolicy, DerivedConfig, SeedFinderConfig};
use super::doublet::LinCircle;

/// Helix estimate of a compatible triplet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TripletEstimate {
    /// Signed inverse helix diameter (1/mm).
    pub curvature: f64,
    /// Transverse impact parameter (mm).
    pub impact: f64,
    /// Transverse momentum, clipped at the ceiling (GeV).
    pub pt: f64,
    /// Mean longitudinal slope of the two doublets.
    pub cot_theta: f64,
    /// z at the beam axis of the bottom doublet.
    pub z_vertex: f64,
}

/// Per-bottom quantities reused for every top.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BottomTerms {
    circle: LinCircle,
    i_sin_theta2: f64,
    scattering_in_region2: f64,
}

impl BottomTerms {
    pub fn new(config: &SeedFinderConfig, derived: &DerivedConfig, circle: LinCircle) -> Self {
        let i_sin_theta2 = 1.0 + circle.cot_theta * circle.cot_theta;
        Self {
            circle,
            i_sin_theta2,
            scattering_in_region2: derived.max_scattering_angle2
                * i_sin_theta2
                * config.sigma_scattering
                * config.sigma_scattering,
        }
    }
}

/// Tests one bottom/top pair around a middle spacepoint at radius
/// `middle_r` with variances `middle_var_r` and `middle_var_z`.
///
/// Returns `None` for incompatible pairs.
pub(crate) fn check_triplet(
    config: &SeedFinderConfig,
    derived: &DerivedConfig,
    middle: (f64, f64, f64),
    bottom: &BottomTerms,
    top: &LinCircle,
) -> Option<TripletEstimate> {
    let (middle_r, middle_var_r, middle_var_z) = middle;
    let lb = &bottom.circle;

    let error2 = top.er
        + lb.er
        + 2.0
            * (lb.cot_theta * top.cot_theta * middle_var_r + middle_var_z)
            * lb.i_delta_r
            * top.i_delta_r;
    let delta_cot = lb.cot_theta - top.cot_theta;
    let delta_cot2 = delta_cot * delta_cot;

    if delta_cot2.is_nan() || delta_cot2 > error2 + bottom.scattering_in_region2 {
        return None;
    }

    let du = top.u - lb.u;
    if du == 0.0 {
        return None;
    }
    let a = (top.v - lb.v) / du;
    if !a.is_finite() {
        return None;
    }
    let s2 = 1.0 + a * a;
    let b = lb.v - a * lb.u;
    let b2 = b * b;

    // pT = pT per mm * R, R = sqrt(S2 / B2) / 2
    let raw_pt = derived.pt_per_radius * (s2 / b2).sqrt() / 2.0;
    let pt = if derived.straight || !raw_pt.is_finite() {
        match config.collinear_policy {
            CollinearPolicy::AcceptAtCeiling => config.pt_ceiling,
            CollinearPolicy::Reject => return None,
        }
    } else {
        raw_pt.min(config.pt_ceiling)
    };
    if pt.is_nan() || pt < config.min_pt {
        return None;
    }

    let scattering = derived.highland / pt;
    let scattering2 = scattering
        * scattering
        * bottom.i_sin_theta2
        * config.sigma_scattering
        * config.sigma_scattering;
    if delta_cot2 > error2 + scattering2 {
        return None;
    }

    let impact = ((a - b * middle_r) * middle_r).abs();
    if impact.is_nan() || impact > config.impact_max {
        return None;
    }

    Some(TripletEstimate {
        curvature: b / s2.sqrt(),
        impact,
        pt,
        cot_theta: 0.5 * (lb.cot_theta + top.cot_theta),
        z_vertex: lb.z0,
    })
}
