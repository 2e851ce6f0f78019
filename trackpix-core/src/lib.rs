//! trackpix-core: Core types and traits for tracking-detector seed finding.
//!
//! This crate provides the foundational data model shared by the
//! clusterization, spacepoint formation, seeding and track parameter
//! estimation stages, together with the geometry lookup traits through
//! which the (external) detector description is consumed.
//!

pub mod cell;
pub mod clustering;
pub mod error;
pub mod execution;
pub mod geometry;
pub mod measurement;
pub mod seed;
pub mod soa;
pub mod spacepoint;
pub mod track;
pub mod units;

pub use cell::{Cell, ChannelCoord, ModuleId};
pub use clustering::{ClusterizationConfig, ClusteringStatistics};
pub use error::{ClusteringError, Error, Result, SeedingError};
pub use execution::Execution;
pub use geometry::{
    DigitizationLookup, DigitizationParams, GeometryLookup, ModuleDescriptor, ModuleKind,
    Transform3,
};
pub use measurement::Measurement;
pub use seed::Seed;
pub use soa::{CellBatch, ModuleCells};
pub use spacepoint::{MeasurementLink, Spacepoint};
pub use track::{BoundSquareMatrix, BoundVector, FreeVector, TrackParameters};
