//! High-level processing helpers that chain the reconstruction stages.
//!
//! One event runs clusterization, spacepoint formation, grid binning, seed
//! finding and track parameter estimation. Events are independent and can
//! be processed in parallel.

use std::sync::Mutex;

use rayon::prelude::*;
use trackpix_core::{
    CellBatch, ClusteringError, ClusteringStatistics, ClusterizationConfig, DigitizationLookup,
    Error, Execution, GeometryLookup, Measurement, Result, Seed, Spacepoint, TrackParameters,
};

use crate::clusterization::{ClusterizationOutput, Clusterizer};
use crate::grid::{GridConfig, SpacepointGrid};
use crate::seeding::{SeedFilterConfig, SeedFinder, SeedFinderConfig, SeedingStatistics};
use crate::spacepoint_formation::{
    SpacepointFormation, SpacepointFormationConfig, SpacepointOutput, SpacepointStatistics,
};
use crate::track_params::{TrackParamsConfig, TrackParamsEstimation};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration of every stage of the chain.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ChainConfig {
    /// Clusterization.
    pub clusterization: ClusterizationConfig,
    /// Spacepoint formation.
    pub spacepoints: SpacepointFormationConfig,
    /// Spacepoint grid.
    pub grid: GridConfig,
    /// Seed finder.
    pub finder: SeedFinderConfig,
    /// Seed filter.
    pub filter: SeedFilterConfig,
    /// Track parameter estimation.
    pub track_params: TrackParamsConfig,
}

impl ChainConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the magnetic field of every stage that uses it.
    #[must_use]
    pub fn with_b_field(mut self, b_field: f64) -> Self {
        self.grid.b_field = b_field;
        self.finder.b_field = b_field;
        self.track_params.b_field = b_field;
        self
    }

    /// Sets the minimum transverse momentum of the seed finder and of the
    /// grid's phi bin derivation.
    #[must_use]
    pub fn with_min_pt(mut self, min_pt: f64) -> Self {
        self.grid.min_pt = min_pt;
        self.finder.min_pt = min_pt;
        self
    }

    /// Sets the execution model of every stage.
    #[must_use]
    pub fn with_execution(mut self, execution: Execution) -> Self {
        self.clusterization.execution = execution;
        self.finder.execution = execution;
        self.track_params.execution = execution;
        self
    }

    /// Validates every stage and their consistency.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] for the first invalid stage, if the
    /// seed finder and the track parameter estimation disagree on the
    /// magnetic field, or if derived phi bins would be narrower than the
    /// finder's doublet search assumes.
    #[allow(clippy::float_cmp)]
    pub fn validate(&self) -> Result<()> {
        self.clusterization.validate()?;
        self.spacepoints.validate()?;
        self.grid.validate()?;
        self.finder.validate()?;
        self.filter.validate()?;
        self.track_params.validate()?;
        if self.finder.b_field != self.track_params.b_field {
            return Err(Error::ConfigError(format!(
                "seed finder field {} T differs from track parameter field {} T",
                self.finder.b_field, self.track_params.b_field
            )));
        }
        if self.grid.phi_bins.is_none() {
            let pairs = [
                ("b_field", self.grid.b_field, self.finder.b_field),
                ("min_pt", self.grid.min_pt, self.finder.min_pt),
                ("delta_r_max", self.grid.delta_r_max, self.finder.delta_r_max),
            ];
            for (name, grid, finder) in pairs {
                if grid != finder {
                    return Err(Error::ConfigError(format!(
                        "grid {name} {grid} differs from seed finder {name} {finder}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Per-stage counters of one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EventStatistics {
    /// Clusterization counters.
    pub clustering: ClusteringStatistics,
    /// Spacepoint formation counters.
    pub spacepoints: SpacepointStatistics,
    /// Seeding counters.
    pub seeding: SeedingStatistics,
    /// Bins of the spacepoint grid.
    pub grid_bins: usize,
    /// Track parameters estimated.
    pub track_params: usize,
    /// Track parameters with the momentum set to the ceiling.
    pub momentum_at_ceiling: usize,
}

/// Everything produced for one event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventOutput {
    /// Measurements.
    pub measurements: Vec<Measurement>,
    /// Modules whose cells were dropped.
    pub rejected_modules: Vec<ClusteringError>,
    /// Spacepoints.
    pub spacepoints: Vec<Spacepoint>,
    /// Seeds, best first.
    pub seeds: Vec<Seed>,
    /// Track parameters, one per seed in seed order.
    pub track_params: Vec<TrackParameters>,
    /// Counters.
    pub stats: EventStatistics,
}

/// Reusable per-event buffers.
///
/// Return the output of a finished event with [`BufferPool::recycle`] and
/// the next event processed with the pool reuses its allocations.
#[derive(Debug, Default)]
pub struct BufferPool {
    measurements: Mutex<Vec<Vec<Measurement>>>,
    spacepoints: Mutex<Vec<Vec<Spacepoint>>>,
}

impl BufferPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the buffers of `output` to the pool.
    pub fn recycle(&self, output: EventOutput) {
        let EventOutput {
            mut measurements,
            mut spacepoints,
            ..
        } = output;
        measurements.clear();
        spacepoints.clear();
        if let Ok(mut free) = self.measurements.lock() {
            free.push(measurements);
        }
        if let Ok(mut free) = self.spacepoints.lock() {
            free.push(spacepoints);
        }
    }

    /// Number of measurement buffers held.
    #[must_use]
    pub fn available(&self) -> usize {
        self.measurements.lock().map_or(0, |free| free.len())
    }

    fn take_measurements(&self) -> Vec<Measurement> {
        self.measurements
            .lock()
            .ok()
            .and_then(|mut free| free.pop())
            .unwrap_or_default()
    }

    fn take_spacepoints(&self) -> Vec<Spacepoint> {
        self.spacepoints
            .lock()
            .ok()
            .and_then(|mut free| free.pop())
            .unwrap_or_default()
    }
}

/// Cells-to-track-parameters reconstruction chain.
#[derive(Debug, Clone)]
pub struct SeedingChain {
    config: ChainConfig,
    clusterizer: Clusterizer,
    formation: SpacepointFormation,
    finder: SeedFinder,
    estimation: TrackParamsEstimation,
}

impl SeedingChain {
    /// Creates a chain.
    ///
    /// # Errors
    /// Returns a configuration error if any stage is misconfigured.
    pub fn new(config: ChainConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            clusterizer: Clusterizer::new(config.clusterization.clone())?,
            formation: SpacepointFormation::new(config.spacepoints)?,
            finder: SeedFinder::new(config.finder.clone(), config.filter.clone())?,
            estimation: TrackParamsEstimation::new(config.track_params.clone())?,
            config,
        })
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Reconstructs one event.
    ///
    /// # Errors
    /// Returns an error if the seed output buffer overflows.
    pub fn process_event<G, D>(&self, cells: &CellBatch, geometry: &G, digitization: &D) -> Result<EventOutput>
    where
        G: GeometryLookup + ?Sized,
        D: DigitizationLookup + ?Sized,
    {
        self.process_event_pooled(cells, geometry, digitization, None)
    }

    /// Reconstructs one event using buffers from `pool`.
    ///
    /// # Errors
    /// Returns an error if the seed output buffer overflows.
    pub fn process_event_with<G, D>(
        &self,
        cells: &CellBatch,
        geometry: &G,
        digitization: &D,
        pool: &BufferPool,
    ) -> Result<EventOutput>
    where
        G: GeometryLookup + ?Sized,
        D: DigitizationLookup + ?Sized,
    {
        self.process_event_pooled(cells, geometry, digitization, Some(pool))
    }

    fn process_event_pooled<G, D>(
        &self,
        cells: &CellBatch,
        geometry: &G,
        digitization: &D,
        pool: Option<&BufferPool>,
    ) -> Result<EventOutput>
    where
        G: GeometryLookup + ?Sized,
        D: DigitizationLookup + ?Sized,
    {
        let mut clusters = ClusterizationOutput {
            measurements: pool.map(BufferPool::take_measurements).unwrap_or_default(),
            ..ClusterizationOutput::default()
        };
        self.clusterizer
            .clusterize_into(cells, geometry, digitization, &mut clusters);

        let mut spacepoints = SpacepointOutput {
            spacepoints: pool.map(BufferPool::take_spacepoints).unwrap_or_default(),
            ..SpacepointOutput::default()
        };
        self.formation
            .build_into(&clusters.measurements, geometry, &mut spacepoints);

        let mut output = self.process_spacepoints(spacepoints.spacepoints)?;
        output.measurements = clusters.measurements;
        output.rejected_modules = clusters.rejected_modules;
        output.stats.clustering = clusters.stats;
        output.stats.spacepoints = spacepoints.stats;
        Ok(output)
    }

    /// Runs grid binning, seed finding and track parameter estimation on
    /// spacepoints owned by the caller.
    ///
    /// # Errors
    /// Returns an error if the seed output buffer overflows.
    pub fn process_spacepoints(&self, spacepoints: Vec<Spacepoint>) -> Result<EventOutput> {
        let grid = SpacepointGrid::build(&self.config.grid, &spacepoints, self.config.finder.execution)?;
        let seeding = self.finder.find_seeds(&spacepoints, &grid)?;
        let track_params = self.estimation.estimate_all(&seeding.seeds, &spacepoints)?;

        let stats = EventStatistics {
            seeding: seeding.stats,
            grid_bins: grid.n_bins(),
            track_params: track_params.len(),
            momentum_at_ceiling: track_params.iter().filter(|p| p.momentum_at_ceiling).count(),
            ..EventStatistics::default()
        };
        log::debug!(
            "{} spacepoints in {} bins, {} seeds",
            spacepoints.len(),
            stats.grid_bins,
            seeding.seeds.len()
        );

        Ok(EventOutput {
            spacepoints,
            seeds: seeding.seeds,
            track_params,
            stats,
            ..EventOutput::default()
        })
    }

    /// Reconstructs independent events in parallel, keeping their order.
    ///
    /// # Errors
    /// Returns the first error encountered.
    pub fn process_events<G, D>(&self, events: &[CellBatch], geometry: &G, digitization: &D) -> Result<Vec<EventOutput>>
    where
        G: GeometryLookup + ?Sized,
        D: DigitizationLookup + ?Sized,
    {
        events
            .par_iter()
            .map(|cells| self.process_event(cells, geometry, digitization))
            .collect()
    }
}
