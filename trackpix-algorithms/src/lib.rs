//! trackpix-algorithms: Reconstruction stages from cells to track seeds.
//!
//! This crate provides the stages of the seeding chain:
//! - **Clusterization** - connected cells to calibrated local measurements
//! - **Spacepoint formation** - pixel measurements and stereo strip pairs to
//!   global spacepoints
//! - **Spacepoint grid** - `(r, phi, z)` binning for neighbour queries
//! - **Seeding** - triplet search with helix, scattering and impact cuts
//! - **Track parameters** - closed-form helix estimate with covariance
//!
#![warn(missing_docs)]

mod clusterization;
mod components;
pub mod grid;
mod measurement;
mod processing;
pub mod seeding;
mod spacepoint_formation;
mod track_params;

pub use clusterization::{ClusterizationOutput, Clusterizer};
pub use grid::{Axis, BinIndex, GridConfig, NeighborScope, SpacepointGrid};
pub use processing::{BufferPool, ChainConfig, EventOutput, EventStatistics, SeedingChain};
pub use seeding::{
    CollinearPolicy, SeedFilterConfig, SeedFinder, SeedFinderConfig, SeedingOutput,
    SeedingStatistics, TripletBuffer,
};
pub use spacepoint_formation::{
    SpacepointFormation, SpacepointFormationConfig, SpacepointOutput, SpacepointStatistics,
};
pub use track_params::{TrackParamsConfig, TrackParamsEstimation};

// Re-export core clustering types
pub use trackpix_core::clustering::{ClusteringStatistics, ClusterizationConfig};
