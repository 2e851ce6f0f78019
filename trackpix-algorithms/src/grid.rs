//! Spacepoint grid for efficient neighbour lookup.
//!
//! Spacepoints are binned in `(r, phi[, z])`. The phi axis is closed, so
//! neighbour queries wrap around; r and z queries are clamped at the axis
//! ends. The grid stores indices into the caller's spacepoint slice in one
//! flat arena, with each bin sorted by `(r, index)`.

use std::f64::consts::{PI, TAU};
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use trackpix_core::error::{ensure_non_negative, ensure_positive, ensure_range};
use trackpix_core::units::radius_from_pt;
use trackpix_core::{Error, Execution, Result, Spacepoint};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Binning of an open axis. Values outside the range fall into the first or
/// last bin.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Axis {
    /// `bins` equal bins over `[min, max]`.
    Equidistant {
        /// Lower edge.
        min: f64,
        /// Upper edge.
        max: f64,
        /// Number of bins.
        bins: usize,
    },
    /// Explicit, strictly increasing bin edges.
    Variable(Vec<f64>),
}

impl Axis {
    /// Number of bins.
    #[must_use]
    pub fn n_bins(&self) -> usize {
        match self {
            Self::Equidistant { bins, .. } => *bins,
            Self::Variable(edges) => edges.len().saturating_sub(1),
        }
    }

    /// Lower edge of the axis.
    #[must_use]
    pub fn min(&self) -> f64 {
        match self {
            Self::Equidistant { min, .. } => *min,
            Self::Variable(edges) => edges.first().copied().unwrap_or(0.0),
        }
    }

    /// Upper edge of the axis.
    #[must_use]
    pub fn max(&self) -> f64 {
        match self {
            Self::Equidistant { max, .. } => *max,
            Self::Variable(edges) => edges.last().copied().unwrap_or(0.0),
        }
    }

    /// Bin containing `value`, clamped into the axis.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn bin(&self, value: f64) -> usize {
        let last = self.n_bins().saturating_sub(1);
        match self {
            Self::Equidistant { min, max, bins } => {
                let x = ((value - min) / (max - min) * *bins as f64).floor();
                if x >= 0.0 {
                    (x as usize).min(last)
                } else {
                    0
                }
            }
            Self::Variable(edges) => edges
                .partition_point(|&e| e <= value)
                .saturating_sub(1)
                .min(last),
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        match self {
            Self::Equidistant { min, max, bins } => {
                ensure_range(name, *min, *max)?;
                if *bins == 0 {
                    return Err(Error::ConfigError(format!("{name} axis needs at least one bin")));
                }
            }
            Self::Variable(edges) => {
                if edges.len() < 2 {
                    return Err(Error::ConfigError(format!(
                        "{name} axis needs at least two edges"
                    )));
                }
                if edges.iter().any(|e| !e.is_finite()) || edges.windows(2).any(|w| w[0] >= w[1]) {
                    return Err(Error::ConfigError(format!(
                        "{name} axis edges must be finite and strictly increasing"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Grid configuration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct GridConfig {
    /// Radial axis (mm).
    pub r_axis: Axis,
    /// Longitudinal axis (mm); `None` disables z binning.
    pub z_axis: Option<Axis>,
    /// Explicit number of phi bins; derived from the helix deflection at
    /// `min_pt` when `None`.
    pub phi_bins: Option<usize>,
    /// Rotation of the phi axis (rad).
    pub phi_offset: f64,
    /// Magnetic field along z (T), for the phi bin derivation.
    pub b_field: f64,
    /// Minimum transverse momentum (GeV), for the phi bin derivation.
    pub min_pt: f64,
    /// Largest radial distance between seed spacepoints (mm), for the phi
    /// bin derivation.
    pub delta_r_max: f64,
    /// Upper bound on derived phi bins.
    pub max_phi_bins: usize,
    /// Phi bins used when no deflection can be derived (zero field, or a
    /// helix that never reaches the outer radius).
    pub default_phi_bins: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            r_axis: Axis::Equidistant {
                min: 0.0,
                max: 320.0,
                bins: 8,
            },
            z_axis: Some(Axis::Equidistant {
                min: -1100.0,
                max: 1100.0,
                bins: 11,
            }),
            phi_bins: None,
            phi_offset: 0.0,
            b_field: 2.0,
            min_pt: 0.5,
            delta_r_max: 270.0,
            max_phi_bins: 10_000,
            default_phi_bins: 64,
        }
    }
}

impl GridConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the radial axis.
    #[must_use]
    pub fn with_r_axis(mut self, axis: Axis) -> Self {
        self.r_axis = axis;
        self
    }

    /// Sets or disables the z axis.
    #[must_use]
    pub fn with_z_axis(mut self, axis: Option<Axis>) -> Self {
        self.z_axis = axis;
        self
    }

    /// Fixes the number of phi bins.
    #[must_use]
    pub fn with_phi_bins(mut self, bins: usize) -> Self {
        self.phi_bins = Some(bins);
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] for empty or unordered axes and zero
    /// phi bin counts.
    pub fn validate(&self) -> Result<()> {
        self.r_axis.validate("r")?;
        if let Some(z) = &self.z_axis {
            z.validate("z")?;
        }
        if self.phi_bins == Some(0) || self.default_phi_bins == 0 || self.max_phi_bins == 0 {
            return Err(Error::ConfigError("phi bin counts must be at least 1".to_string()));
        }
        if !self.phi_offset.is_finite() || !self.b_field.is_finite() {
            return Err(Error::ConfigError(
                "phi_offset and b_field must be finite".to_string(),
            ));
        }
        if self.phi_bins.is_none() {
            ensure_positive("min_pt", self.min_pt)?;
            ensure_non_negative("delta_r_max", self.delta_r_max)?;
        }
        Ok(())
    }

    /// Number of phi bins: explicit, or `floor(2π / Δφ)` where `Δφ` is the
    /// azimuth a minimum-pT helix sweeps between `r_max - delta_r_max` and
    /// `r_max`, clamped to `[1, max_phi_bins]`.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn phi_bin_count(&self) -> usize {
        if let Some(bins) = self.phi_bins {
            return bins;
        }
        let helix_radius = radius_from_pt(self.b_field.abs(), self.min_pt);
        let r_max = self.r_axis.max();
        if !helix_radius.is_finite() || r_max <= 0.0 || r_max >= 2.0 * helix_radius {
            return self.default_phi_bins;
        }

        let sweep = |r: f64| {
            if r <= 0.0 {
                return 0.0;
            }
            let x = r * r / (2.0 * helix_radius);
            let y = (r * r - x * x).sqrt();
            (x / y).atan()
        };
        let delta_phi = sweep(r_max) - sweep(r_max - self.delta_r_max);
        if delta_phi.is_nan() || delta_phi <= 0.0 {
            return self.default_phi_bins;
        }
        let bins = (TAU / delta_phi).floor();
        if bins >= self.max_phi_bins as f64 {
            self.max_phi_bins
        } else {
            (bins as usize).max(1)
        }
    }
}

/// Index of one grid bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BinIndex {
    /// Radial bin.
    pub r: usize,
    /// Azimuthal bin.
    pub phi: usize,
    /// Longitudinal bin (0 when z binning is disabled).
    pub z: usize,
}

impl BinIndex {
    /// Creates a bin index.
    #[must_use]
    pub fn new(r: usize, phi: usize, z: usize) -> Self {
        Self { r, phi, z }
    }
}

/// Extent of a neighbour query around a bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NeighborScope {
    /// Radial bins below the centre bin.
    pub r_below: usize,
    /// Radial bins above the centre bin.
    pub r_above: usize,
    /// Phi bins on each side (wrapping).
    pub phi: usize,
    /// Z bins on each side.
    pub z: usize,
}

impl NeighborScope {
    /// Only the bin itself.
    #[must_use]
    pub fn bin_only() -> Self {
        Self {
            r_below: 0,
            r_above: 0,
            phi: 0,
            z: 0,
        }
    }
}

/// Spacepoint indices binned in `(r, phi, z)`.
#[derive(Debug, Clone, PartialEq)]
pub struct SpacepointGrid {
    r_axis: Axis,
    z_axis: Option<Axis>,
    n_phi: usize,
    phi_offset: f64,
    /// `offsets[b]..offsets[b + 1]` is the arena range of flat bin `b`.
    offsets: Vec<usize>,
    arena: Vec<usize>,
}

impl SpacepointGrid {
    /// Bins `spacepoints`.
    ///
    /// The build counts spacepoints per bin, turns the counts into offsets
    /// and scatters indices into the arena. The parallel path reserves
    /// arena slots with atomic cursors; sorting every bin afterwards makes
    /// both paths identical.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] if `config` is invalid.
    pub fn build(config: &GridConfig, spacepoints: &[Spacepoint], execution: Execution) -> Result<Self> {
        config.validate()?;
        let mut grid = Self {
            r_axis: config.r_axis.clone(),
            z_axis: config.z_axis.clone(),
            n_phi: config.phi_bin_count(),
            phi_offset: config.phi_offset,
            offsets: Vec::new(),
            arena: Vec::new(),
        };
        let n_bins = grid.n_bins();

        if execution.is_parallel() {
            let bins: Vec<usize> = spacepoints
                .par_iter()
                .map(|sp| grid.flat(grid.bin_of(sp)))
                .collect();

            let counts: Vec<AtomicUsize> = (0..n_bins).map(|_| AtomicUsize::new(0)).collect();
            bins.par_iter().for_each(|&b| {
                counts[b].fetch_add(1, Ordering::Relaxed);
            });
            grid.offsets = exclusive_prefix_sum(counts.into_iter().map(AtomicUsize::into_inner));

            let cursors: Vec<AtomicUsize> = grid.offsets[..n_bins]
                .iter()
                .map(|&o| AtomicUsize::new(o))
                .collect();
            let arena: Vec<AtomicUsize> = (0..spacepoints.len()).map(|_| AtomicUsize::new(0)).collect();
            bins.par_iter().enumerate().for_each(|(index, &b)| {
                let slot = cursors[b].fetch_add(1, Ordering::Relaxed);
                arena[slot].store(index, Ordering::Relaxed);
            });
            grid.arena = arena.into_iter().map(AtomicUsize::into_inner).collect();

            let mut slices = Vec::with_capacity(n_bins);
            let mut rest = grid.arena.as_mut_slice();
            for b in 0..n_bins {
                let (head, tail) =
                    std::mem::take(&mut rest).split_at_mut(grid.offsets[b + 1] - grid.offsets[b]);
                slices.push(head);
                rest = tail;
            }
            slices
                .into_par_iter()
                .for_each(|bin| sort_bin(bin, spacepoints));
        } else {
            let bins: Vec<usize> = spacepoints.iter().map(|sp| grid.flat(grid.bin_of(sp))).collect();
            let mut counts = vec![0usize; n_bins];
            for &b in &bins {
                counts[b] += 1;
            }
            grid.offsets = exclusive_prefix_sum(counts);

            let mut cursors = grid.offsets[..n_bins].to_vec();
            grid.arena = vec![0; spacepoints.len()];
            for (index, &b) in bins.iter().enumerate() {
                grid.arena[cursors[b]] = index;
                cursors[b] += 1;
            }
            for b in 0..n_bins {
                let range = grid.offsets[b]..grid.offsets[b + 1];
                sort_bin(&mut grid.arena[range], spacepoints);
            }
        }

        Ok(grid)
    }

    /// Number of phi bins.
    #[must_use]
    pub fn n_phi_bins(&self) -> usize {
        self.n_phi
    }

    /// Number of radial bins.
    #[must_use]
    pub fn n_r_bins(&self) -> usize {
        self.r_axis.n_bins()
    }

    /// Number of z bins (1 when z binning is disabled).
    #[must_use]
    pub fn n_z_bins(&self) -> usize {
        self.z_axis.as_ref().map_or(1, Axis::n_bins)
    }

    /// Total number of bins.
    #[must_use]
    pub fn n_bins(&self) -> usize {
        self.n_r_bins() * self.n_phi * self.n_z_bins()
    }

    /// Total number of binned spacepoints.
    #[must_use]
    pub fn total_len(&self) -> usize {
        self.arena.len()
    }

    /// Bin of a spacepoint.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn bin_of(&self, sp: &Spacepoint) -> BinIndex {
        let shifted = wrap_phi(sp.phi() - self.phi_offset);
        let phi = ((shifted + PI) / TAU * self.n_phi as f64).floor();
        let phi = if phi >= 0.0 {
            (phi as usize).min(self.n_phi - 1)
        } else {
            0
        };
        BinIndex {
            r: self.r_axis.bin(sp.r()),
            phi,
            z: self.z_axis.as_ref().map_or(0, |axis| axis.bin(sp.z())),
        }
    }

    /// Spacepoint indices in `bin`, sorted by `(r, index)`.
    #[must_use]
    pub fn bin(&self, bin: BinIndex) -> &[usize] {
        if bin.r >= self.n_r_bins() || bin.phi >= self.n_phi || bin.z >= self.n_z_bins() {
            return &[];
        }
        let b = self.flat(bin);
        &self.arena[self.offsets[b]..self.offsets[b + 1]]
    }

    /// Bins within `scope` of `bin`, sorted and without duplicates.
    #[must_use]
    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    pub fn neighbors(&self, bin: BinIndex, scope: NeighborScope) -> Vec<BinIndex> {
        let r_lo = bin.r.saturating_sub(scope.r_below);
        let r_hi = (bin.r + scope.r_above).min(self.n_r_bins() - 1);
        let z_lo = bin.z.saturating_sub(scope.z);
        let z_hi = (bin.z + scope.z).min(self.n_z_bins() - 1);
        let n_phi = self.n_phi as isize;
        let reach = (scope.phi as isize).min(n_phi);

        let mut result = Vec::new();
        for r in r_lo..=r_hi {
            for dphi in -reach..=reach {
                let phi = (bin.phi as isize + dphi).rem_euclid(n_phi) as usize;
                for z in z_lo..=z_hi {
                    result.push(BinIndex { r, phi, z });
                }
            }
        }
        result.sort_unstable();
        result.dedup();
        result
    }

    /// Contents of all bins within `scope` of `bin`, in bin order.
    #[must_use]
    pub fn neighborhood(&self, bin: BinIndex, scope: NeighborScope) -> Vec<usize> {
        let mut result = Vec::new();
        for neighbor in self.neighbors(bin, scope) {
            result.extend_from_slice(self.bin(neighbor));
        }
        result
    }

    /// Iterates over all bins in flattened `(r, phi, z)` order.
    pub fn iter_bins(&self) -> impl Iterator<Item = (BinIndex, &[usize])> + '_ {
        (0..self.n_bins()).map(move |b| {
            (
                self.unflat(b),
                &self.arena[self.offsets[b]..self.offsets[b + 1]],
            )
        })
    }

    fn flat(&self, bin: BinIndex) -> usize {
        (bin.r * self.n_phi + bin.phi) * self.n_z_bins() + bin.z
    }

    fn unflat(&self, flat: usize) -> BinIndex {
        let n_z = self.n_z_bins();
        BinIndex {
            r: flat / (self.n_phi * n_z),
            phi: (flat / n_z) % self.n_phi,
            z: flat % n_z,
        }
    }
}

/// Wraps an angle into `[-π, π)`.
fn wrap_phi(phi: f64) -> f64 {
    (phi + PI).rem_euclid(TAU) - PI
}

fn exclusive_prefix_sum<I: IntoIterator<Item = usize>>(counts: I) -> Vec<usize> {
    let mut offsets = vec![0];
    let mut total = 0;
    for count in counts {
        total += count;
        offsets.push(total);
    }
    offsets
}

fn sort_bin(bin: &mut [usize], spacepoints: &[Spacepoint]) {
    bin.sort_unstable_by(|&a, &b| {
        spacepoints[a]
            .r()
            .total_cmp(&spacepoints[b].r())
            .then(a.cmp(&b))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use trackpix_core::MeasurementLink;

    fn sp(r: f64, phi: f64, z: f64) -> Spacepoint {
        Spacepoint::new([r * phi.cos(), r * phi.sin(), z], 0.01, 0.01, MeasurementLink::Single(0))
    }

    fn small_config() -> GridConfig {
        GridConfig::new()
            .with_r_axis(Axis::Equidistant {
                min: 0.0,
                max: 100.0,
                bins: 4,
            })
            .with_z_axis(Some(Axis::Variable(vec![-100.0, 0.0, 100.0])))
            .with_phi_bins(8)
    }

    #[test]
    fn test_axis_binning_clamps() {
        let axis = Axis::Equidistant {
            min: 0.0,
            max: 100.0,
            bins: 4,
        };
        assert_eq!(axis.bin(-5.0), 0);
        assert_eq!(axis.bin(30.0), 1);
        assert_eq!(axis.bin(100.0), 3);
        assert_eq!(axis.bin(1e9), 3);
        assert_eq!(axis.bin(f64::NAN), 0);

        let edges = Axis::Variable(vec![0.0, 10.0, 50.0]);
        assert_eq!(edges.bin(-1.0), 0);
        assert_eq!(edges.bin(10.0), 1);
        assert_eq!(edges.bin(60.0), 1);
    }

    #[test]
    fn test_every_spacepoint_in_one_bin() {
        let spacepoints: Vec<Spacepoint> = (0..200)
            .map(|i| {
                let f = f64::from(i);
                sp(5.0 + (f * 7.3) % 120.0, -3.0 + (f * 0.37) % 6.2, -150.0 + (f * 13.1) % 300.0)
            })
            .collect();
        let grid = SpacepointGrid::build(&small_config(), &spacepoints, Execution::Sequential).unwrap();
        assert_eq!(grid.total_len(), spacepoints.len());

        let mut seen = vec![0; spacepoints.len()];
        for (bin, contents) in grid.iter_bins() {
            for &i in contents {
                seen[i] += 1;
                assert_eq!(grid.bin_of(&spacepoints[i]), bin);
            }
            assert!(contents.windows(2).all(|w| spacepoints[w[0]].r() <= spacepoints[w[1]].r()));
        }
        assert!(seen.iter().all(|&n| n == 1));
    }

    #[test]
    fn test_parallel_build_matches_sequential() {
        let spacepoints: Vec<Spacepoint> = (0..500)
            .map(|i| {
                let f = f64::from(i);
                // Many duplicates of the same radius to exercise the index tie-break.
                sp(10.0 + f64::from(i % 7) * 12.0, (f * 0.91).sin() * 3.1, (f * 1.7).cos() * 90.0)
            })
            .collect();
        let sequential = SpacepointGrid::build(&small_config(), &spacepoints, Execution::Sequential).unwrap();
        let parallel = SpacepointGrid::build(&small_config(), &spacepoints, Execution::Parallel).unwrap();
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_phi_wraps_in_neighbors() {
        let grid = SpacepointGrid::build(&small_config(), &[], Execution::Sequential).unwrap();
        let scope = NeighborScope {
            r_below: 0,
            r_above: 0,
            phi: 1,
            z: 0,
        };
        let neighbors = grid.neighbors(BinIndex::new(0, 0, 0), scope);
        let phis: Vec<usize> = neighbors.iter().map(|b| b.phi).collect();
        assert_eq!(phis, vec![0, 1, 7]);

        let wide = NeighborScope { phi: 20, ..scope };
        assert_eq!(grid.neighbors(BinIndex::new(0, 3, 0), wide).len(), 8);
    }

    #[test]
    fn test_neighbors_clamp_r_and_z() {
        let grid = SpacepointGrid::build(&small_config(), &[], Execution::Sequential).unwrap();
        let scope = NeighborScope {
            r_below: 2,
            r_above: 2,
            phi: 0,
            z: 1,
        };
        let neighbors = grid.neighbors(BinIndex::new(3, 2, 1), scope);
        // r in 1..=3, z in 0..=1
        assert_eq!(neighbors.len(), 6);
        assert!(neighbors.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_phi_boundary_and_offset() {
        let config = small_config();
        let grid = SpacepointGrid::build(&config, &[], Execution::Sequential).unwrap();
        assert_eq!(grid.bin_of(&sp(50.0, -PI, 0.0)).phi, 0);
        assert_eq!(grid.bin_of(&sp(50.0, PI - 1e-9, 0.0)).phi, 7);

        let rotated = GridConfig {
            phi_offset: PI / 8.0,
            ..config
        };
        let grid = SpacepointGrid::build(&rotated, &[], Execution::Sequential).unwrap();
        // -pi + pi/8 is the start of bin 0 after the rotation.
        assert_eq!(grid.bin_of(&sp(50.0, -PI + PI / 8.0 + 1e-9, 0.0)).phi, 0);
        assert_eq!(grid.bin_of(&sp(50.0, -PI + 1e-9, 0.0)).phi, 7);
    }

    #[test]
    fn test_neighborhood_collects_contents() {
        let spacepoints = vec![sp(10.0, 0.1, 5.0), sp(60.0, 0.1, 5.0), sp(10.0, 3.0, 5.0)];
        let grid = SpacepointGrid::build(&small_config(), &spacepoints, Execution::Sequential).unwrap();
        let bin = grid.bin_of(&spacepoints[0]);
        let scope = NeighborScope {
            r_below: 0,
            r_above: 3,
            phi: 1,
            z: 1,
        };
        assert_eq!(grid.neighborhood(bin, scope), vec![0, 1]);
        assert_eq!(grid.bin(bin), &[0]);
        assert!(grid.bin(BinIndex::new(99, 0, 0)).is_empty());
    }

    #[test]
    fn test_derived_phi_bins() {
        let config = GridConfig::default();
        let bins = config.phi_bin_count();
        // 0.5 GeV in 2 T sweeps about 0.16 rad between r = 50 and r = 320 mm.
        assert!((35..=42).contains(&bins), "unexpected phi bins {bins}");

        let no_field = GridConfig {
            b_field: 0.0,
            ..GridConfig::default()
        };
        assert_eq!(no_field.phi_bin_count(), no_field.default_phi_bins);

        let capped = GridConfig {
            max_phi_bins: 10,
            ..GridConfig::default()
        };
        assert_eq!(capped.phi_bin_count(), 10);
    }

    #[test]
    fn test_invalid_config() {
        let config = GridConfig::new().with_r_axis(Axis::Variable(vec![5.0, 5.0]));
        assert!(config.validate().is_err());
        assert!(GridConfig::new().with_phi_bins(0).validate().is_err());
        assert!(SpacepointGrid::build(
            &GridConfig::new().with_z_axis(Some(Axis::Equidistant {
                min: 1.0,
                max: 0.0,
                bins: 3
            })),
            &[],
            Execution::Sequential
        )
        .is_err());
    }
}
