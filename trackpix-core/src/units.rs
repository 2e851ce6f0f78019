//! Unit conventions.
//!
//! Lengths are millimetres, momenta GeV, magnetic fields Tesla and times
//! nanoseconds.

/// Transverse momentum per unit field and helix radius, in GeV / (T mm).
///
/// `pT = PT_PER_TESLA_MM * B * R`.
pub const PT_PER_TESLA_MM: f64 = 0.299_792_458e-3;

/// Highland multiple-scattering constant in GeV.
pub const HIGHLAND_GEV: f64 = 13.6e-3;

/// Transverse momentum (GeV) of a unit-charge helix of radius `radius_mm`.
#[inline]
#[must_use]
pub fn pt_from_radius(b_field: f64, radius_mm: f64) -> f64 {
    PT_PER_TESLA_MM * b_field * radius_mm
}

/// Helix radius (mm) of a unit-charge particle with transverse momentum `pt`.
///
/// Returns infinity for a vanishing field.
#[inline]
#[must_use]
pub fn radius_from_pt(b_field: f64, pt: f64) -> f64 {
    let per_mm = PT_PER_TESLA_MM * b_field;
    if per_mm == 0.0 {
        f64::INFINITY
    } else {
        pt / per_mm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_radius_round_trip() {
        let r = radius_from_pt(2.0, 1.0);
        // 1 GeV in 2 T bends with ~1.67 m radius
        assert_relative_eq!(r, 1667.820, epsilon = 1e-3);
        assert_relative_eq!(pt_from_radius(2.0, r), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_field() {
        assert!(radius_from_pt(0.0, 1.0).is_infinite());
        assert_eq!(pt_from_radius(0.0, 100.0), 0.0);
    }
}
