//! Error types for trackpix-core.

use crate::cell::ModuleId;
use thiserror::Error;

/// Result type alias for trackpix operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for trackpix operations.
///
/// Only configuration and ingestion problems are errors. Degenerate geometry
/// (collinear triplets, non-intersecting strips) and empty outputs are not.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration, detected before any event is processed.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Clustering error.
    #[error("clustering error: {0}")]
    Clustering(#[from] ClusteringError),

    /// Seeding error.
    #[error("seeding error: {0}")]
    Seeding(#[from] SeedingError),
}

/// Clustering-specific errors, reported per module.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClusteringError {
    /// Module has no geometry entry.
    #[error("module {0} not found in geometry")]
    UnknownModule(ModuleId),

    /// Module has no digitization entry.
    #[error("module {0} has no digitization parameters")]
    MissingDigitization(ModuleId),
}

/// Seeding-specific errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SeedingError {
    /// More triplets were reserved than the output buffer can hold.
    #[error("triplet buffer overflow: {requested} slots requested, capacity {capacity}")]
    BufferOverflow { capacity: usize, requested: usize },

    /// A seed references a spacepoint index outside the collection.
    #[error("seed references spacepoint {index}, collection has {len}")]
    SpacepointOutOfRange { index: usize, len: usize },
}

/// Returns a configuration error unless `value` is finite and strictly positive.
///
/// # Errors
/// Returns [`Error::ConfigError`] naming the offending parameter.
pub fn ensure_positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::ConfigError(format!(
            "{name} must be positive and finite, got {value}"
        )))
    }
}

/// Returns a configuration error unless `value` is finite and not negative.
///
/// # Errors
/// Returns [`Error::ConfigError`] naming the offending parameter.
pub fn ensure_non_negative(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(Error::ConfigError(format!(
            "{name} must be non-negative and finite, got {value}"
        )))
    }
}

/// Returns a configuration error unless `min < max`.
///
/// # Errors
/// Returns [`Error::ConfigError`] naming the offending range.
pub fn ensure_range(name: &str, min: f64, max: f64) -> Result<()> {
    if min.is_finite() && max.is_finite() && min < max {
        Ok(())
    } else {
        Err(Error::ConfigError(format!(
            "{name} range is empty or not finite: [{min}, {max}]"
        )))
    }
}
