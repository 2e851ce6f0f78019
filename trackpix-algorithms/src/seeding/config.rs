//! Seed finder and seed filter configuration.

use trackpix_core::error::{ensure_non_negative, ensure_positive, ensure_range};
use trackpix_core::units::{radius_from_pt, HIGHLAND_GEV, PT_PER_TESLA_MM};
use trackpix_core::{Error, Execution, Result};

use crate::grid::NeighborScope;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Treatment of triplets without measurable curvature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CollinearPolicy {
    /// Accept with the transverse momentum set to the ceiling.
    #[default]
    AcceptAtCeiling,
    /// Drop the triplet.
    Reject,
}

/// Seed finder configuration.
///
/// Lengths in mm, momenta in GeV, field in T.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SeedFinderConfig {
    /// Solenoid field along z.
    pub b_field: f64,
    /// Lowest radius of a middle spacepoint.
    pub r_min_middle: f64,
    /// Highest radius of a middle spacepoint.
    pub r_max_middle: f64,
    /// Lowest z of a middle spacepoint.
    pub z_min: f64,
    /// Highest z of a middle spacepoint.
    pub z_max: f64,
    /// Smallest radial distance between doublet spacepoints.
    pub delta_r_min: f64,
    /// Largest radial distance between doublet spacepoints.
    pub delta_r_max: f64,
    /// Lower end of the luminous region along z.
    pub collision_region_min: f64,
    /// Upper end of the luminous region along z.
    pub collision_region_max: f64,
    /// Minimum transverse momentum.
    pub min_pt: f64,
    /// Transverse momentum assigned to straight triplets, and the upper
    /// clip of every estimate.
    pub pt_ceiling: f64,
    /// Largest `|cot θ|`.
    pub cot_theta_max: f64,
    /// Largest transverse impact parameter.
    pub impact_max: f64,
    /// Number of standard deviations of multiple scattering allowed.
    pub sigma_scattering: f64,
    /// Material crossed by a seed, in radiation lengths.
    pub rad_length_per_seed: f64,
    /// Loosening of the doublet momentum cut, in `(0, 1]`.
    pub doublet_pt_tolerance: f64,
    /// Seeds kept per middle spacepoint.
    pub max_seeds_per_middle: usize,
    /// Compatible doublets kept per side and middle spacepoint.
    pub max_compatible_per_middle: usize,
    /// Grid neighbourhood searched for bottom spacepoints.
    pub bottom_scope: NeighborScope,
    /// Grid neighbourhood searched for top spacepoints.
    pub top_scope: NeighborScope,
    /// Treatment of straight triplets.
    pub collinear_policy: CollinearPolicy,
    /// Sequential or parallel search over middle spacepoints.
    pub execution: Execution,
}

impl Default for SeedFinderConfig {
    fn default() -> Self {
        Self {
            b_field: 2.0,
            r_min_middle: 20.0,
            r_max_middle: 200.0,
            z_min: -1000.0,
            z_max: 1000.0,
            delta_r_min: 5.0,
            delta_r_max: 270.0,
            collision_region_min: -150.0,
            collision_region_max: 150.0,
            min_pt: 0.5,
            pt_ceiling: 100.0,
            cot_theta_max: 7.406_27,
            impact_max: 10.0,
            sigma_scattering: 5.0,
            rad_length_per_seed: 0.05,
            doublet_pt_tolerance: 0.8,
            max_seeds_per_middle: 5,
            max_compatible_per_middle: 1000,
            bottom_scope: NeighborScope {
                r_below: 8,
                r_above: 0,
                phi: 1,
                z: 2,
            },
            top_scope: NeighborScope {
                r_below: 0,
                r_above: 8,
                phi: 1,
                z: 2,
            },
            collinear_policy: CollinearPolicy::AcceptAtCeiling,
            execution: Execution::Parallel,
        }
    }
}

impl SeedFinderConfig {
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

    /// Sets the minimum transverse momentum.
    #[must_use]
    pub fn with_min_pt(mut self, min_pt: f64) -> Self {
        self.min_pt = min_pt;
        self
    }

    /// Sets the treatment of straight triplets.
    #[must_use]
    pub fn with_collinear_policy(mut self, policy: CollinearPolicy) -> Self {
        self.collinear_policy = policy;
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
        ensure_range("middle radius", self.r_min_middle, self.r_max_middle)?;
        ensure_range("middle z", self.z_min, self.z_max)?;
        ensure_positive("delta_r_min", self.delta_r_min)?;
        ensure_range("delta r", self.delta_r_min, self.delta_r_max)?;
        ensure_range(
            "collision region",
            self.collision_region_min,
            self.collision_region_max,
        )?;
        ensure_positive("min_pt", self.min_pt)?;
        ensure_range("pt", self.min_pt, self.pt_ceiling)?;
        ensure_positive("cot_theta_max", self.cot_theta_max)?;
        ensure_non_negative("impact_max", self.impact_max)?;
        ensure_non_negative("sigma_scattering", self.sigma_scattering)?;
        ensure_positive("rad_length_per_seed", self.rad_length_per_seed)?;
        ensure_positive("doublet_pt_tolerance", self.doublet_pt_tolerance)?;
        if self.doublet_pt_tolerance > 1.0 {
            return Err(Error::ConfigError(format!(
                "doublet_pt_tolerance must not exceed 1, got {}",
                self.doublet_pt_tolerance
            )));
        }
        if self.max_seeds_per_middle == 0 || self.max_compatible_per_middle == 0 {
            return Err(Error::ConfigError(
                "max_seeds_per_middle and max_compatible_per_middle must be at least 1"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Quantities derived once from the configuration.
    #[must_use]
    pub fn derive(&self) -> DerivedConfig {
        let x0 = self.rad_length_per_seed;
        let highland = HIGHLAND_GEV * x0.sqrt() * (1.0 + 0.038 * x0.ln());
        let max_scattering_angle = highland / self.min_pt;
        DerivedConfig {
            pt_per_radius: PT_PER_TESLA_MM * self.b_field.abs(),
            min_helix_radius: radius_from_pt(self.b_field.abs(), self.min_pt),
            highland,
            max_scattering_angle2: max_scattering_angle * max_scattering_angle,
            straight: self.b_field == 0.0,
        }
    }
}

/// Quantities derived from a [`SeedFinderConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedConfig {
    /// Transverse momentum per mm of helix radius (GeV/mm).
    pub pt_per_radius: f64,
    /// Helix radius at `min_pt` (mm, infinite without field).
    pub min_helix_radius: f64,
    /// Highland scattering term for one seed (GeV).
    pub highland: f64,
    /// Squared scattering angle at `min_pt`.
    pub max_scattering_angle2: f64,
    /// True without magnetic field.
    pub straight: bool,
}

/// Seed filter configuration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SeedFilterConfig {
    /// Weight lost per mm of transverse impact parameter.
    pub impact_weight_factor: f64,
    /// Weight gained per compatible top spacepoint.
    pub compat_seed_weight: f64,
    /// Compatible top spacepoints counted at most.
    pub compat_seed_limit: usize,
    /// Curvature window (1/mm) for compatible tops and duplicate seeds.
    pub delta_inv_helix_diameter: f64,
    /// Radial separation (mm) between compatible top spacepoints.
    pub delta_r_min: f64,
    /// Weight gained at high transverse momentum, scaled by
    /// `1 - min_pt / pt`.
    pub pt_weight_factor: f64,
    /// Radius (mm) separating the inner and outer detector regions for the
    /// radius bonuses and the single-seed cut.
    pub seed_cut_r: f64,
    /// Bonus for a bottom spacepoint above `seed_cut_r`.
    pub bottom_radius_bonus: f64,
    /// Bonus for a top spacepoint below `seed_cut_r`.
    pub top_radius_bonus: f64,
    /// Minimum weight of a seed whose bottom lies above `seed_cut_r`.
    pub seed_cut_weight: f64,
    /// `|Δ cot θ|` below which two seeds of one middle sharing a bottom or
    /// top are duplicates; 0 disables the suppression.
    pub dedup_cot_theta: f64,
    /// Weight lost per spacepoint already used by a higher-ranked seed.
    pub used_spacepoint_penalty: f64,
    /// Seeds kept per event.
    pub max_seeds_per_event: usize,
}

impl Default for SeedFilterConfig {
    fn default() -> Self {
        Self {
            impact_weight_factor: 1.0,
            compat_seed_weight: 200.0,
            compat_seed_limit: 2,
            delta_inv_helix_diameter: 3e-5,
            delta_r_min: 5.0,
            pt_weight_factor: 1.0,
            seed_cut_r: 150.0,
            bottom_radius_bonus: 400.0,
            top_radius_bonus: 200.0,
            seed_cut_weight: 380.0,
            dedup_cot_theta: 2e-3,
            used_spacepoint_penalty: 10.0,
            max_seeds_per_event: 100_000,
        }
    }
}

impl SeedFilterConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the duplicate suppression window; 0 disables it.
    #[must_use]
    pub fn with_dedup_cot_theta(mut self, window: f64) -> Self {
        self.dedup_cot_theta = window;
        self
    }

    /// Sets the number of seeds kept per event.
    #[must_use]
    pub fn with_max_seeds_per_event(mut self, max: usize) -> Self {
        self.max_seeds_per_event = max;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] naming the first invalid parameter.
    pub fn validate(&self) -> Result<()> {
        ensure_non_negative("impact_weight_factor", self.impact_weight_factor)?;
        ensure_non_negative("compat_seed_weight", self.compat_seed_weight)?;
        ensure_non_negative("delta_inv_helix_diameter", self.delta_inv_helix_diameter)?;
        ensure_non_negative("delta_r_min", self.delta_r_min)?;
        ensure_non_negative("pt_weight_factor", self.pt_weight_factor)?;
        ensure_non_negative("dedup_cot_theta", self.dedup_cot_theta)?;
        ensure_non_negative("used_spacepoint_penalty", self.used_spacepoint_penalty)?;
        for (name, value) in [
            ("seed_cut_r", self.seed_cut_r),
            ("bottom_radius_bonus", self.bottom_radius_bonus),
            ("top_radius_bonus", self.top_radius_bonus),
            ("seed_cut_weight", self.seed_cut_weight),
        ] {
            if !value.is_finite() {
                return Err(Error::ConfigError(format!("{name} must be finite")));
            }
        }
        if self.max_seeds_per_event == 0 {
            return Err(Error::ConfigError(
                "max_seeds_per_event must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
