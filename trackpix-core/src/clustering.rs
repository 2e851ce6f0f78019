//! Clusterization configuration and statistics.

use crate::error::{ensure_positive, Error, Result};
use crate::execution::Execution;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration for turning cells into measurements.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ClusterizationConfig {
    /// Lower bound applied to every measurement variance (mm²).
    pub min_variance: f64,
    /// Minimum number of cells to form a measurement.
    pub min_cluster_size: usize,
    /// Maximum number of cells in a cluster (for filtering large artifacts).
    pub max_cluster_size: Option<usize>,
    /// Sequential or module-parallel processing.
    pub execution: Execution,
}

impl Default for ClusterizationConfig {
    fn default() -> Self {
        Self {
            min_variance: 1e-6,
            min_cluster_size: 1,
            max_cluster_size: None,
            execution: Execution::Parallel,
        }
    }
}

impl ClusterizationConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the variance floor.
    #[must_use]
    pub fn with_min_variance(mut self, variance: f64) -> Self {
        self.min_variance = variance;
        self
    }

    /// Sets the minimum cluster size.
    #[must_use]
    pub fn with_min_cluster_size(mut self, size: usize) -> Self {
        self.min_cluster_size = size;
        self
    }

    /// Sets the maximum cluster size.
    #[must_use]
    pub fn with_max_cluster_size(mut self, size: usize) -> Self {
        self.max_cluster_size = Some(size);
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
    /// Returns [`Error::ConfigError`] for a non-positive variance floor, a
    /// zero minimum size, or a maximum below the minimum.
    pub fn validate(&self) -> Result<()> {
        ensure_positive("min_variance", self.min_variance)?;
        if self.min_cluster_size == 0 {
            return Err(Error::ConfigError(
                "min_cluster_size must be at least 1".to_string(),
            ));
        }
        if let Some(max) = self.max_cluster_size {
            if max < self.min_cluster_size {
                return Err(Error::ConfigError(format!(
                    "max_cluster_size {max} is below min_cluster_size {}",
                    self.min_cluster_size
                )));
            }
        }
        Ok(())
    }

    /// Returns true if a cluster of `size` cells passes the size filters.
    #[inline]
    #[must_use]
    pub fn accepts_size(&self, size: usize) -> bool {
        size >= self.min_cluster_size && self.max_cluster_size.is_none_or(|max| size <= max)
    }
}

/// Counters collected while clusterizing one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClusteringStatistics {
    /// Number of cells read.
    pub cells_processed: usize,
    /// Number of modules with at least one cell.
    pub modules_processed: usize,
    /// Number of connected components found.
    pub clusters_found: usize,
    /// Number of clusters removed by the size filters.
    pub clusters_filtered: usize,
    /// Number of modules rejected at lookup.
    pub modules_rejected: usize,
}

impl ClusteringStatistics {
    /// Adds the counters of another module or event.
    pub fn merge(&mut self, other: &Self) {
        self.cells_processed += other.cells_processed;
        self.modules_processed += other.modules_processed;
        self.clusters_found += other.clusters_found;
        self.clusters_filtered += other.clusters_filtered;
        self.modules_rejected += other.modules_rejected;
    }
}
