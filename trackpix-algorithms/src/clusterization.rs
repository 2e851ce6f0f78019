//! Clusterization: cells to calibrated local measurements.
//!
//! Cells are grouped by module in order of first appearance. Each module is
//! labelled and measured independently, so modules can be processed in
//! parallel; results are concatenated in module order so both execution
//! models produce identical output.

use rayon::prelude::*;
use trackpix_core::{
    CellBatch, ChannelCoord, ClusteringError, ClusteringStatistics, ClusterizationConfig,
    DigitizationLookup, GeometryLookup, Measurement, ModuleCells, Result,
};

use crate::components::connected_components;
use crate::measurement::create_measurement;

/// Measurements of one event plus bookkeeping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterizationOutput {
    /// Measurements in module order, clusters in canonical order within a
    /// module.
    pub measurements: Vec<Measurement>,
    /// Modules whose cells were dropped, with the reason.
    pub rejected_modules: Vec<ClusteringError>,
    /// Counters.
    pub stats: ClusteringStatistics,
}

/// Turns the cells of an event into measurements.
#[derive(Debug, Clone, Default)]
pub struct Clusterizer {
    config: ClusterizationConfig,
}

/// Result of a single module.
struct ModuleResult {
    measurements: Vec<Measurement>,
    rejected: Option<ClusteringError>,
    stats: ClusteringStatistics,
}

impl Clusterizer {
    /// Creates a clusterizer.
    ///
    /// # Errors
    /// Returns a configuration error if `config` is invalid.
    pub fn new(config: ClusterizationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> &ClusterizationConfig {
        &self.config
    }

    /// Clusterizes all cells of one event.
    ///
    /// Modules missing from the geometry or without digitization are
    /// skipped and reported in [`ClusterizationOutput::rejected_modules`];
    /// the remaining modules are processed normally.
    pub fn clusterize<G, D>(&self, cells: &CellBatch, geometry: &G, digitization: &D) -> ClusterizationOutput
    where
        G: GeometryLookup + ?Sized,
        D: DigitizationLookup + ?Sized,
    {
        let mut output = ClusterizationOutput::default();
        self.clusterize_into(cells, geometry, digitization, &mut output);
        output
    }

    /// Like [`Clusterizer::clusterize`], reusing the allocations of
    /// `output`. Previous contents are discarded.
    pub fn clusterize_into<G, D>(
        &self,
        cells: &CellBatch,
        geometry: &G,
        digitization: &D,
        output: &mut ClusterizationOutput,
    ) where
        G: GeometryLookup + ?Sized,
        D: DigitizationLookup + ?Sized,
    {
        output.measurements.clear();
        output.rejected_modules.clear();
        output.stats = ClusteringStatistics::default();

        let groups = cells.group_by_module();

        let results: Vec<ModuleResult> = if self.config.execution.is_parallel() {
            groups
                .par_iter()
                .map(|group| self.clusterize_module(cells, group, geometry, digitization))
                .collect()
        } else {
            groups
                .iter()
                .map(|group| self.clusterize_module(cells, group, geometry, digitization))
                .collect()
        };

        output
            .measurements
            .reserve(results.iter().map(|r| r.measurements.len()).sum());
        for result in results {
            output.measurements.extend(result.measurements);
            output.stats.merge(&result.stats);
            if let Some(rejected) = result.rejected {
                log::warn!("skipping cells: {rejected}");
                output.rejected_modules.push(rejected);
            }
        }

        log::debug!(
            "clusterized {} cells on {} modules into {} measurements",
            output.stats.cells_processed,
            output.stats.modules_processed,
            output.measurements.len()
        );
    }

    fn clusterize_module<G, D>(
        &self,
        cells: &CellBatch,
        group: &ModuleCells,
        geometry: &G,
        digitization: &D,
    ) -> ModuleResult
    where
        G: GeometryLookup + ?Sized,
        D: DigitizationLookup + ?Sized,
    {
        let mut stats = ClusteringStatistics {
            cells_processed: group.indices.len(),
            ..ClusteringStatistics::default()
        };

        let rejected = |error: ClusteringError| ModuleResult {
            measurements: Vec::new(),
            rejected: Some(error),
            stats: ClusteringStatistics {
                modules_rejected: 1,
                ..stats
            },
        };

        let Some(descriptor) = geometry.module(group.module) else {
            return rejected(ClusteringError::UnknownModule(group.module));
        };
        let Some(params) = digitization.digitization(group.module, &descriptor.kind) else {
            return rejected(ClusteringError::MissingDigitization(group.module));
        };

        stats.modules_processed = 1;

        let coords: Vec<ChannelCoord> = group
            .indices
            .iter()
            .map(|&i| ChannelCoord::new(cells.channel0[i], cells.channel1[i]))
            .collect();
        let clusters = connected_components(&coords);
        stats.clusters_found = clusters.len();

        let mut measurements = Vec::with_capacity(clusters.len());
        for cluster in clusters {
            if !self.config.accepts_size(cluster.len()) {
                stats.clusters_filtered += 1;
                continue;
            }
            let batch_indices: Vec<usize> = cluster.iter().map(|&k| group.indices[k]).collect();
            measurements.push(create_measurement(
                cells,
                &batch_indices,
                group.module,
                &descriptor.kind,
                &params,
                self.config.min_variance,
            ));
        }

        ModuleResult {
            measurements,
            rejected: None,
            stats,
        }
    }
}
