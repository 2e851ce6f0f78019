//! Doublet search and the linear-circle transform.
//!
//! A doublet pairs the middle spacepoint with one bottom or top candidate.
//! The cuts run cheapest first and every one is written so that a NaN
//! fails it.

use trackpix_core::Spacepoint;

use super::config::{DerivedConfig, SeedFinderConfig};

/// Side of the middle spacepoint a doublet partner lies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoubletSide {
    /// Partner at smaller radius.
    Bottom,
    /// Partner at larger radius.
    Top,
}

/// Doublet expressed in the conformal frame of the middle spacepoint.
///
/// The frame is centred on the middle spacepoint with its x axis along the
/// middle spacepoint's radial direction. `u = x / (x² + y²)`,
/// `v = y / (x² + y²)`; circles through the middle spacepoint become the
/// lines `v = A u + B`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinCircle {
    /// z at the beam axis of the straight line through the doublet.
    pub z0: f64,
    /// Longitudinal slope, oriented from the inner to the outer spacepoint.
    pub cot_theta: f64,
    /// Inverse transverse distance between the two spacepoints.
    pub i_delta_r: f64,
    /// Squared error on `cot_theta`.
    pub er: f64,
    /// Conformal u.
    pub u: f64,
    /// Conformal v.
    pub v: f64,
}

/// Compatible partners of one middle spacepoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Doublets {
    /// Partner spacepoint indices, in candidate order.
    pub partners: Vec<usize>,
    /// Linear circles matching `partners`.
    pub circles: Vec<LinCircle>,
    /// Compatible partners dropped by the per-middle limit.
    pub truncated: usize,
}

impl Doublets {
    pub fn len(&self) -> usize {
        self.partners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partners.is_empty()
    }
}

/// Returns true if `other` forms a valid doublet with `middle`.
pub(crate) fn is_compatible(
    config: &SeedFinderConfig,
    derived: &DerivedConfig,
    middle: &Spacepoint,
    other: &Spacepoint,
    side: DoubletSide,
) -> bool {
    let (inner, outer) = match side {
        DoubletSide::Bottom => (other, middle),
        DoubletSide::Top => (middle, other),
    };

    let delta_r = outer.r() - inner.r();
    if !(config.delta_r_min..=config.delta_r_max).contains(&delta_r) {
        return false;
    }

    let cot_theta = (outer.z() - inner.z()) / delta_r;
    if cot_theta.is_nan() || cot_theta.abs() > config.cot_theta_max {
        return false;
    }

    let z_origin = middle.z() - middle.r() * cot_theta;
    if !(config.collision_region_min..=config.collision_region_max).contains(&z_origin) {
        return false;
    }

    let dx = outer.x() - inner.x();
    let dy = outer.y() - inner.y();
    let chord = dx.hypot(dy);
    let cross = inner.x() * outer.y() - outer.x() * inner.y();

    // Distance of the chord line to the beam axis, loosened by the sagitta
    // of the loosest allowed helix.
    let sagitta = if derived.min_helix_radius.is_finite() {
        inner.r() * outer.r() / (2.0 * derived.min_helix_radius)
    } else {
        0.0
    };
    let line_distance = cross.abs() / chord;
    if line_distance.is_nan() || line_distance > config.impact_max + sagitta {
        return false;
    }

    // Circle through the beam axis and both spacepoints:
    // R = |p1| |p2| |p1 - p2| / (2 |p1 x p2|).
    if derived.straight || cross == 0.0 {
        return true;
    }
    let min_radius = derived.min_helix_radius * config.doublet_pt_tolerance;
    2.0 * cross.abs() * min_radius <= inner.r() * outer.r() * chord
}

/// Conformal transform of `other` relative to `middle`.
#[must_use]
pub fn lin_circle(middle: &Spacepoint, other: &Spacepoint, side: DoubletSide) -> LinCircle {
    let cos_phi = middle.x() / middle.r();
    let sin_phi = middle.y() / middle.r();

    let dx = other.x() - middle.x();
    let dy = other.y() - middle.y();
    let dz = other.z() - middle.z();

    let x = dx * cos_phi + dy * sin_phi;
    let y = dy * cos_phi - dx * sin_phi;

    let i_delta_r2 = 1.0 / (dx * dx + dy * dy);
    let i_delta_r = i_delta_r2.sqrt();
    let orientation = match side {
        DoubletSide::Bottom => -1.0,
        DoubletSide::Top => 1.0,
    };
    let cot_theta = dz * i_delta_r * orientation;

    LinCircle {
        z0: middle.z() - middle.r() * cot_theta,
        cot_theta,
        i_delta_r,
        er: ((middle.variance_z() + other.variance_z())
            + cot_theta * cot_theta * (middle.variance_r() + other.variance_r()))
            * i_delta_r2,
        u: x * i_delta_r2,
        v: y * i_delta_r2,
    }
}

/// Compatible partners of `middle` among `candidates`, keeping at most
/// `max_compatible_per_middle` in candidate order.
pub(crate) fn find_doublets(
    config: &SeedFinderConfig,
    derived: &DerivedConfig,
    spacepoints: &[Spacepoint],
    middle: usize,
    candidates: &[usize],
    side: DoubletSide,
) -> Doublets {
    let sp_m = &spacepoints[middle];
    let mut doublets = Doublets::default();

    for &candidate in candidates {
        if candidate == middle {
            continue;
        }
        let other = &spacepoints[candidate];
        if !is_compatible(config, derived, sp_m, other, side) {
            continue;
        }
        if doublets.len() == config.max_compatible_per_middle {
            doublets.truncated += 1;
            continue;
        }
        doublets.partners.push(candidate);
        doublets.circles.push(lin_circle(sp_m, other, side));
    }

    doublets
}
