//! Seed weighting and selection.
//!
//! Weighting runs with two spacepoints fixed (middle and bottom) and scores
//! each top against the other tops of the same doublet. Selection runs with
//! one spacepoint fixed (the middle) and keeps the best non-duplicate seeds.

use std::cmp::Ordering;

use trackpix_core::{Seed, Spacepoint};

use super::config::{SeedFilterConfig, SeedFinderConfig};
use super::triplet::TripletEstimate;

/// A seed together with the quantities needed to rank and deduplicate it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeedCandidate {
    /// The seed.
    pub seed: Seed,
    /// Radius of the bottom spacepoint.
    pub bottom_r: f64,
    /// Mean longitudinal slope.
    pub cot_theta: f64,
    /// Signed inverse helix diameter.
    pub curvature: f64,
}

impl SeedCandidate {
    /// Total order used everywhere seeds are ranked: higher weight first,
    /// then lower bottom radius, then lower bottom, middle and top index.
    #[must_use]
    pub fn rank(&self, other: &Self) -> Ordering {
        other
            .seed
            .weight
            .total_cmp(&self.seed.weight)
            .then_with(|| self.bottom_r.total_cmp(&other.bottom_r))
            .then_with(|| self.seed.bottom.cmp(&other.seed.bottom))
            .then_with(|| self.seed.middle.cmp(&other.seed.middle))
            .then_with(|| self.seed.top.cmp(&other.seed.top))
    }
}

/// Sorts candidates by [`SeedCandidate::rank`].
pub fn sort_candidates(candidates: &mut [SeedCandidate]) {
    candidates.sort_unstable_by(SeedCandidate::rank);
}

/// Experiment-specific weight bonus from the radii of the outer
/// spacepoints.
fn radius_bonus(filter: &SeedFilterConfig, bottom_r: f64, top_r: f64) -> f64 {
    let mut bonus = 0.0;
    if bottom_r > filter.seed_cut_r {
        bonus += filter.bottom_radius_bonus;
    }
    if top_r < filter.seed_cut_r {
        bonus += filter.top_radius_bonus;
    }
    bonus
}

/// Rejects weak seeds that start outside the innermost layers.
fn passes_single_seed_cut(filter: &SeedFilterConfig, bottom_r: f64, weight: f64) -> bool {
    !(bottom_r > filter.seed_cut_r && weight < filter.seed_cut_weight)
}

/// Scores every top compatible with one (bottom, middle) doublet.
///
/// `tops` holds the top spacepoint index and triplet estimate of each
/// compatible top. Seeds failing the single-seed cut are not returned.
pub(crate) fn filter_two_fixed(
    finder: &SeedFinderConfig,
    filter: &SeedFilterConfig,
    spacepoints: &[Spacepoint],
    bottom: usize,
    middle: usize,
    tops: &[(usize, TripletEstimate)],
) -> Vec<SeedCandidate> {
    let bottom_r = spacepoints[bottom].r();
    let mut seeds = Vec::with_capacity(tops.len());
    let mut compatible_r: Vec<f64> = Vec::with_capacity(filter.compat_seed_limit);

    for (i, &(top, estimate)) in tops.iter().enumerate() {
        let top_r = spacepoints[top].r();
        let lower = estimate.curvature - filter.delta_inv_helix_diameter;
        let upper = estimate.curvature + filter.delta_inv_helix_diameter;

        compatible_r.clear();
        for (j, &(other, other_estimate)) in tops.iter().enumerate() {
            if compatible_r.len() >= filter.compat_seed_limit {
                break;
            }
            if i == j {
                continue;
            }
            let other_r = spacepoints[other].r();
            if (top_r - other_r).abs() < filter.delta_r_min {
                continue;
            }
            if other_estimate.curvature <= lower || other_estimate.curvature >= upper {
                continue;
            }
            // One compatible top per radius
            if compatible_r
                .iter()
                .all(|&previous| (previous - other_r).abs() >= filter.delta_r_min)
            {
                compatible_r.push(other_r);
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let n_compatible = compatible_r.len() as f64;
        let weight = -estimate.impact * filter.impact_weight_factor
            + filter.compat_seed_weight * n_compatible
            + filter.pt_weight_factor * (1.0 - finder.min_pt / estimate.pt)
            + radius_bonus(filter, bottom_r, top_r);

        if !passes_single_seed_cut(filter, bottom_r, weight) {
            continue;
        }

        seeds.push(SeedCandidate {
            seed: Seed::new(bottom, middle, top, weight, estimate.z_vertex),
            bottom_r,
            cot_theta: estimate.cot_theta,
            curvature: estimate.curvature,
        });
    }

    seeds
}

/// Keeps the best `max_seeds` non-duplicate candidates of one middle
/// spacepoint, in rank order.
pub(crate) fn select_one_fixed(
    filter: &SeedFilterConfig,
    mut candidates: Vec<SeedCandidate>,
    max_seeds: usize,
) -> Vec<SeedCandidate> {
    sort_candidates(&mut candidates);
    if filter.dedup_cot_theta <= 0.0 {
        candidates.truncate(max_seeds);
        return candidates;
    }

    let mut kept: Vec<SeedCandidate> = Vec::with_capacity(max_seeds.min(candidates.len()));
    for candidate in candidates {
        if kept.len() == max_seeds {
            break;
        }
        let duplicate = kept.iter().any(|seed| {
            (seed.seed.bottom == candidate.seed.bottom || seed.seed.top == candidate.seed.top)
                && (seed.cot_theta - candidate.cot_theta).abs() < filter.dedup_cot_theta
                && (seed.curvature - candidate.curvature).abs() < filter.delta_inv_helix_diameter
        });
        if !duplicate {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use trackpix_core::MeasurementLink;

    fn sp(r: f64) -> Spacepoint {
        Spacepoint::new([r, 0.0, 0.0], 0.01, 0.01, MeasurementLink::Single(0))
    }

    fn estimate(curvature: f64, impact: f64, pt: f64) -> TripletEstimate {
        TripletEstimate {
            curvature,
            impact,
            pt,
            cot_theta: 0.0,
            z_vertex: 0.0,
        }
    }

    fn candidate(bottom: usize, top: usize, weight: f64, bottom_r: f64) -> SeedCandidate {
        SeedCandidate {
            seed: Seed::new(bottom, 0, top, weight, 0.0),
            bottom_r,
            cot_theta: 0.0,
            curvature: 0.0,
        }
    }

    #[test]
    fn test_rank_order() {
        let mut seeds = vec![
            candidate(3, 9, 1.0, 30.0),
            candidate(2, 9, 5.0, 40.0),
            candidate(1, 9, 5.0, 30.0),
            candidate(1, 8, 5.0, 30.0),
        ];
        sort_candidates(&mut seeds);
        let order: Vec<(usize, usize)> = seeds.iter().map(|s| (s.seed.bottom, s.seed.top)).collect();
        assert_eq!(order, vec![(1, 8), (1, 9), (2, 9), (3, 9)]);
    }

    #[test]
    fn test_weight_terms() {
        let finder = SeedFinderConfig::default();
        let filter = SeedFilterConfig::default();
        // Spacepoints: bottom 30, middle 60, tops 90, 120, 122
        let spacepoints = vec![sp(30.0), sp(60.0), sp(90.0), sp(120.0), sp(122.0)];
        let tops = vec![
            (2, estimate(1e-4, 2.0, 1.0)),
            (3, estimate(1.1e-4, 0.0, 1.0)),
            (4, estimate(1.1e-4, 0.0, 1.0)),
        ];
        let seeds = filter_two_fixed(&finder, &filter, &spacepoints, 0, 1, &tops);
        assert_eq!(seeds.len(), 3);

        // Top 2: one compatible radius (120 and 122 are within delta_r_min)
        let expected = -2.0 + 200.0 + (1.0 - 0.5) + 200.0;
        assert!((seeds[0].seed.weight - expected).abs() < 1e-9);
        // Top 3: 122 too close in r, 90 compatible
        let expected = 200.0 + 0.5 + 200.0;
        assert!((seeds[1].seed.weight - expected).abs() < 1e-9);
    }

    #[test]
    fn test_single_seed_cut() {
        let finder = SeedFinderConfig::default();
        let filter = SeedFilterConfig::default();
        let spacepoints = vec![sp(160.0), sp(190.0), sp(220.0)];
        // Bottom beyond 150: +400 bonus, weight ~400 passes
        let seeds = filter_two_fixed(&finder, &filter, &spacepoints, 0, 1, &[(2, estimate(0.0, 0.0, 1.0))]);
        assert_eq!(seeds.len(), 1);
        // Large impact drops the weight below the cut
        let seeds = filter_two_fixed(&finder, &filter, &spacepoints, 0, 1, &[(2, estimate(0.0, 30.0, 1.0))]);
        assert!(seeds.is_empty());
    }

    #[test]
    fn test_selection_dedup_and_limit() {
        let filter = SeedFilterConfig::default();
        let seeds = vec![
            candidate(1, 5, 10.0, 30.0),
            // Shares bottom 1 with the same direction
            candidate(1, 6, 9.0, 30.0),
            candidate(2, 7, 8.0, 31.0),
            candidate(3, 8, 7.0, 32.0),
        ];
        let kept = select_one_fixed(&filter, seeds.clone(), 2);
        let tops: Vec<usize> = kept.iter().map(|s| s.seed.top).collect();
        assert_eq!(tops, vec![5, 7]);

        let no_dedup = filter.with_dedup_cot_theta(0.0);
        let kept = select_one_fixed(&no_dedup, seeds, 3);
        let tops: Vec<usize> = kept.iter().map(|s| s.seed.top).collect();
        assert_eq!(tops, vec![5, 6, 7]);
    }
}
