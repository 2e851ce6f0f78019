//! Triplet seed finding.
//!
//! For every middle spacepoint the finder collects compatible bottom and
//! top doublets from the neighbouring grid bins, tests every bottom/top
//! pair for a common helix, weights the surviving triplets and keeps the
//! best few. Middle spacepoints are independent and may be searched in
//! parallel; the event-level gather sorts by a total order so the result
//! does not depend on scheduling.

pub mod buffer;
pub mod config;
pub mod doublet;
pub mod filter;
pub mod finder;
pub mod triplet;

pub use buffer::TripletBuffer;
pub use config::{CollinearPolicy, DerivedConfig, SeedFilterConfig, SeedFinderConfig};
pub use doublet::{lin_circle, DoubletSide, LinCircle};
pub use filter::{sort_candidates, SeedCandidate};
pub use finder::{SeedFinder, SeedingOutput, SeedingStatistics};
pub use triplet::TripletEstimate;
