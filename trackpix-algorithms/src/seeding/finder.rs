//! Event-level seed finder.

use rayon::prelude::*;
use trackpix_core::{Result, Seed, SeedingError, Spacepoint};

use super::buffer::TripletBuffer;
use super::config::{DerivedConfig, SeedFilterConfig, SeedFinderConfig};
use super::doublet::{find_doublets, DoubletSide};
use super::filter::{filter_two_fixed, select_one_fixed, sort_candidates, SeedCandidate};
use super::triplet::{check_triplet, BottomTerms};
use crate::grid::{BinIndex, SpacepointGrid};

/// Seeding counters for one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SeedingStatistics {
    /// Middle spacepoints inside the middle window.
    pub middle_candidates: usize,
    /// Compatible bottom doublets.
    pub bottom_doublets: usize,
    /// Compatible top doublets.
    pub top_doublets: usize,
    /// Compatible triplets before filtering.
    pub triplets: usize,
    /// Seeds kept after per-middle selection.
    pub selected_seeds: usize,
    /// Compatible doublets dropped by `max_compatible_per_middle`.
    pub truncated_candidates: usize,
    /// Seeds dropped by `max_seeds_per_event`.
    pub truncated_seeds: usize,
}

impl SeedingStatistics {
    fn merge(&mut self, other: &Self) {
        self.middle_candidates += other.middle_candidates;
        self.bottom_doublets += other.bottom_doublets;
        self.top_doublets += other.top_doublets;
        self.triplets += other.triplets;
        self.selected_seeds += other.selected_seeds;
        self.truncated_candidates += other.truncated_candidates;
        self.truncated_seeds += other.truncated_seeds;
    }
}

/// Seeds of one event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeedingOutput {
    /// Seeds, best first.
    pub seeds: Vec<Seed>,
    /// Counters.
    pub stats: SeedingStatistics,
}

/// Triplet seed finder.
#[derive(Debug, Clone)]
pub struct SeedFinder {
    config: SeedFinderConfig,
    filter: SeedFilterConfig,
    derived: DerivedConfig,
}

struct MiddleResult {
    seeds: Vec<SeedCandidate>,
    stats: SeedingStatistics,
}

impl SeedFinder {
    /// Creates a seed finder.
    ///
    /// # Errors
    /// Returns a configuration error if either configuration is invalid.
    pub fn new(config: SeedFinderConfig, filter: SeedFilterConfig) -> Result<Self> {
        config.validate()?;
        filter.validate()?;
        let derived = config.derive();
        Ok(Self {
            config,
            filter,
            derived,
        })
    }

    /// Finder configuration.
    #[must_use]
    pub fn config(&self) -> &SeedFinderConfig {
        &self.config
    }

    /// Filter configuration.
    #[must_use]
    pub fn filter_config(&self) -> &SeedFilterConfig {
        &self.filter
    }

    /// Derived constants.
    #[must_use]
    pub fn derived(&self) -> &DerivedConfig {
        &self.derived
    }

    /// Finds the seeds of one event.
    ///
    /// `grid` must have been built from `spacepoints`. Both execution
    /// models return the same seeds in the same order.
    ///
    /// # Errors
    /// Returns [`SeedingError::SpacepointOutOfRange`] if the grid holds more
    /// spacepoints than `spacepoints`, and [`SeedingError::BufferOverflow`]
    /// if the per-middle results do not fit the output buffer.
    pub fn find_seeds(&self, spacepoints: &[Spacepoint], grid: &SpacepointGrid) -> Result<SeedingOutput> {
        if grid.total_len() > spacepoints.len() {
            return Err(SeedingError::SpacepointOutOfRange {
                index: grid.total_len() - 1,
                len: spacepoints.len(),
            }
            .into());
        }

        let middles: Vec<(BinIndex, usize)> = grid
            .iter_bins()
            .flat_map(|(bin, indices)| indices.iter().map(move |&i| (bin, i)))
            .filter(|&(_, i)| self.is_middle(&spacepoints[i]))
            .collect();

        let capacity = middles.len().saturating_mul(self.config.max_seeds_per_middle);
        let buffer = TripletBuffer::with_capacity(capacity);

        let run = |&(bin, middle): &(BinIndex, usize)| -> std::result::Result<SeedingStatistics, SeedingError> {
            let result = self.search_middle(spacepoints, grid, bin, middle);
            buffer.push_all(result.seeds)?;
            Ok(result.stats)
        };
        let per_middle: std::result::Result<Vec<SeedingStatistics>, SeedingError> =
            if self.config.execution.is_parallel() {
                middles.par_iter().map(run).collect()
            } else {
                middles.iter().map(run).collect()
            };
        let per_middle = per_middle.inspect_err(|err| log::warn!("{err}"))?;

        let mut stats = SeedingStatistics::default();
        for s in &per_middle {
            stats.merge(s);
        }
        if stats.truncated_candidates > 0 {
            log::warn!(
                "{} compatible doublets dropped by the per-middle limit of {}",
                stats.truncated_candidates,
                self.config.max_compatible_per_middle
            );
        }

        let mut candidates = buffer.into_vec();
        self.apply_usage_penalty(&mut candidates, spacepoints.len());

        if candidates.len() > self.filter.max_seeds_per_event {
            stats.truncated_seeds = candidates.len() - self.filter.max_seeds_per_event;
            log::warn!(
                "{} seeds dropped by the per-event limit of {}",
                stats.truncated_seeds,
                self.filter.max_seeds_per_event
            );
            candidates.truncate(self.filter.max_seeds_per_event);
        }

        let seeds: Vec<Seed> = candidates.into_iter().map(|c| c.seed).collect();
        log::debug!(
            "{} middle spacepoints, {} triplets, {} seeds",
            stats.middle_candidates,
            stats.triplets,
            seeds.len()
        );
        Ok(SeedingOutput { seeds, stats })
    }

    fn is_middle(&self, sp: &Spacepoint) -> bool {
        sp.r() > 0.0
            && (self.config.r_min_middle..=self.config.r_max_middle).contains(&sp.r())
            && (self.config.z_min..=self.config.z_max).contains(&sp.z())
    }

    /// Sorts candidates, lowers the weight of seeds reusing spacepoints of
    /// better seeds, then sorts again.
    fn apply_usage_penalty(&self, candidates: &mut [SeedCandidate], n_spacepoints: usize) {
        sort_candidates(candidates);
        if self.filter.used_spacepoint_penalty > 0.0 {
            let mut used = vec![false; n_spacepoints];
            for candidate in candidates.iter_mut() {
                let mut shared = 0u32;
                for index in candidate.seed.spacepoints() {
                    if used[index] {
                        shared += 1;
                    }
                    used[index] = true;
                }
                candidate.seed.weight -= self.filter.used_spacepoint_penalty * f64::from(shared);
            }
            sort_candidates(candidates);
        }
    }

    /// Searches all seeds with `middle` as middle spacepoint.
    fn search_middle(
        &self,
        spacepoints: &[Spacepoint],
        grid: &SpacepointGrid,
        bin: BinIndex,
        middle: usize,
    ) -> MiddleResult {
        let mut stats = SeedingStatistics {
            middle_candidates: 1,
            ..SeedingStatistics::default()
        };
        let empty = |stats| MiddleResult {
            seeds: Vec::new(),
            stats,
        };

        let bottom_candidates = grid.neighborhood(bin, self.config.bottom_scope);
        let bottoms = find_doublets(
            &self.config,
            &self.derived,
            spacepoints,
            middle,
            &bottom_candidates,
            DoubletSide::Bottom,
        );
        stats.bottom_doublets = bottoms.len();
        stats.truncated_candidates = bottoms.truncated;
        if bottoms.is_empty() {
            return empty(stats);
        }

        let top_candidates = grid.neighborhood(bin, self.config.top_scope);
        let tops = find_doublets(
            &self.config,
            &self.derived,
            spacepoints,
            middle,
            &top_candidates,
            DoubletSide::Top,
        );
        stats.top_doublets = tops.len();
        stats.truncated_candidates += tops.truncated;
        if tops.is_empty() {
            return empty(stats);
        }

        let sp_m = &spacepoints[middle];
        let middle_terms = (sp_m.r(), sp_m.variance_r(), sp_m.variance_z());
        let mut candidates = Vec::new();
        let mut compatible_tops = Vec::with_capacity(tops.len());

        for (&bottom, circle) in bottoms.partners.iter().zip(&bottoms.circles) {
            let terms = BottomTerms::new(&self.config, &self.derived, *circle);
            compatible_tops.clear();
            for (&top, top_circle) in tops.partners.iter().zip(&tops.circles) {
                if let Some(estimate) =
                    check_triplet(&self.config, &self.derived, middle_terms, &terms, top_circle)
                {
                    compatible_tops.push((top, estimate));
                }
            }
            stats.triplets += compatible_tops.len();
            if compatible_tops.is_empty() {
                continue;
            }
            candidates.extend(filter_two_fixed(
                &self.config,
                &self.filter,
                spacepoints,
                bottom,
                middle,
                &compatible_tops,
            ));
        }

        let seeds = select_one_fixed(&self.filter, candidates, self.config.max_seeds_per_middle);
        stats.selected_seeds = seeds.len();
        MiddleResult { seeds, stats }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridConfig;
    use trackpix_core::{Execution, MeasurementLink};

    fn sp(x: f64, y: f64, z: f64) -> Spacepoint {
        Spacepoint::new([x, y, z], 1e-4, 1e-4, MeasurementLink::Single(0))
    }

    /// Straight tracks from the origin through layers at 30, 60 and 90 mm.
    fn radial_tracks(n: usize) -> Vec<Spacepoint> {
        let mut spacepoints = Vec::new();
        for k in 0..n {
            #[allow(clippy::cast_precision_loss)]
            let phi = 0.3 + k as f64 * 0.9;
            for r in [30.0, 60.0, 90.0] {
                spacepoints.push(sp(r * phi.cos(), r * phi.sin(), 0.2 * r));
            }
        }
        spacepoints
    }

    fn find(spacepoints: &[Spacepoint], execution: Execution) -> SeedingOutput {
        let config = SeedFinderConfig::default().with_execution(execution);
        let grid = SpacepointGrid::build(&GridConfig::default(), spacepoints, execution).unwrap();
        SeedFinder::new(config, SeedFilterConfig::default())
            .unwrap()
            .find_seeds(spacepoints, &grid)
            .unwrap()
    }

    #[test]
    fn test_one_seed_per_track() {
        let spacepoints = radial_tracks(4);
        let output = find(&spacepoints, Execution::Sequential);
        assert_eq!(output.seeds.len(), 4);
        let mut triplets: Vec<[usize; 3]> = output.seeds.iter().map(Seed::spacepoints).collect();
        triplets.sort_unstable();
        assert_eq!(triplets, vec![[0, 1, 2], [3, 4, 5], [6, 7, 8], [9, 10, 11]]);
        assert_eq!(output.stats.triplets, 4);
        assert_eq!(output.stats.truncated_seeds, 0);
        for seed in &output.seeds {
            assert!(seed.z_vertex.abs() < 1e-6);
        }
    }

    #[test]
    fn test_execution_models_agree() {
        let spacepoints = radial_tracks(6);
        let sequential = find(&spacepoints, Execution::Sequential);
        let parallel = find(&spacepoints, Execution::Parallel);
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_empty_event() {
        let output = find(&[], Execution::Parallel);
        assert!(output.seeds.is_empty());
        assert_eq!(output.stats, SeedingStatistics::default());
    }

    #[test]
    fn test_event_limit() {
        let spacepoints = radial_tracks(4);
        let grid = SpacepointGrid::build(&GridConfig::default(), &spacepoints, Execution::Sequential).unwrap();
        let finder = SeedFinder::new(
            SeedFinderConfig::default(),
            SeedFilterConfig::default().with_max_seeds_per_event(3),
        )
        .unwrap();
        let output = finder.find_seeds(&spacepoints, &grid).unwrap();
        assert_eq!(output.seeds.len(), 3);
        assert_eq!(output.stats.truncated_seeds, 1);
    }

    #[test]
    fn test_usage_penalty_lowers_shared_seeds() {
        // Two tops share bottom and middle
        let spacepoints = vec![
            sp(30.0, 0.0, 0.0),
            sp(60.0, 0.0, 0.0),
            sp(90.0, 0.0, 0.0),
            sp(90.0, 0.5, 0.0),
        ];
        let output = find(&spacepoints, Execution::Sequential);
        assert_eq!(output.seeds.len(), 2);
        let penalty = SeedFilterConfig::default().used_spacepoint_penalty;
        assert!(output.seeds[0].weight - output.seeds[1].weight >= 2.0 * penalty - 1.0);
    }

    #[test]
    fn test_grid_from_other_collection() {
        let spacepoints = radial_tracks(2);
        let grid = SpacepointGrid::build(&GridConfig::default(), &spacepoints, Execution::Sequential).unwrap();
        let finder = SeedFinder::new(SeedFinderConfig::default(), SeedFilterConfig::default()).unwrap();
        let err = finder.find_seeds(&spacepoints[..3], &grid).unwrap_err();
        assert!(matches!(
            err,
            trackpix_core::Error::Seeding(SeedingError::SpacepointOutOfRange { index: 5, len: 3 })
        ));
    }

    #[test]
    fn test_invalid_config() {
        let config = SeedFinderConfig {
            max_seeds_per_middle: 0,
            ..SeedFinderConfig::default()
        };
        assert!(SeedFinder::new(config, SeedFilterConfig::default()).is_err());
    }
}
