//! Global three-dimensional spacepoints.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Measurements a spacepoint was built from (indices into the event's
/// measurement collection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MeasurementLink {
    /// Pixel spacepoint.
    Single(usize),
    /// Stereo strip spacepoint.
    Pair(usize, usize),
}

impl MeasurementLink {
    /// First (or only) measurement index.
    #[inline]
    #[must_use]
    pub fn first(&self) -> usize {
        match *self {
            Self::Single(i) | Self::Pair(i, _) => i,
        }
    }

    /// Second measurement index of a stereo spacepoint.
    #[inline]
    #[must_use]
    pub fn second(&self) -> Option<usize> {
        match *self {
            Self::Single(_) => None,
            Self::Pair(_, j) => Some(j),
        }
    }
}

/// Global hit position with its cylindrical projection.
///
/// `r`, `phi` and `z` are derived from the position whenever it is set and
/// cannot be modified on their own.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(from = "SpacepointRecord"))]
pub struct Spacepoint {
    position: [f64; 3],
    #[cfg_attr(feature = "serde", serde(skip_serializing))]
    r: f64,
    #[cfg_attr(feature = "serde", serde(skip_serializing))]
    phi: f64,
    variance_r: f64,
    variance_z: f64,
    link: MeasurementLink,
}

/// Serialized form of a [`Spacepoint`]; the projection is rebuilt on load.
#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct SpacepointRecord {
    position: [f64; 3],
    variance_r: f64,
    variance_z: f64,
    link: MeasurementLink,
}

#[cfg(feature = "serde")]
impl From<SpacepointRecord> for Spacepoint {
    fn from(record: SpacepointRecord) -> Self {
        Self::new(record.position, record.variance_r, record.variance_z, record.link)
    }
}

impl Spacepoint {
    /// Creates a spacepoint at `position` with radial and longitudinal
    /// variances.
    #[must_use]
    pub fn new(position: [f64; 3], variance_r: f64, variance_z: f64, link: MeasurementLink) -> Self {
        let mut sp = Self {
            position,
            r: 0.0,
            phi: 0.0,
            variance_r,
            variance_z,
            link,
        };
        sp.set_position(position);
        sp
    }

    /// Moves the spacepoint, recomputing its projection.
    pub fn set_position(&mut self, position: [f64; 3]) {
        self.position = position;
        self.r = position[0].hypot(position[1]);
        self.phi = position[1].atan2(position[0]);
    }

    /// Global position.
    #[inline]
    #[must_use]
    pub fn position(&self) -> [f64; 3] {
        self.position
    }

    /// Global x.
    #[inline]
    #[must_use]
    pub fn x(&self) -> f64 {
        self.position[0]
    }

    /// Global y.
    #[inline]
    #[must_use]
    pub fn y(&self) -> f64 {
        self.position[1]
    }

    /// Global z.
    #[inline]
    #[must_use]
    pub fn z(&self) -> f64 {
        self.position[2]
    }

    /// Transverse distance from the beam axis.
    #[inline]
    #[must_use]
    pub fn r(&self) -> f64 {
        self.r
    }

    /// Azimuth in `[-π, π]`.
    #[inline]
    #[must_use]
    pub fn phi(&self) -> f64 {
        self.phi
    }

    /// Variance of the radial coordinate (mm²).
    #[inline]
    #[must_use]
    pub fn variance_r(&self) -> f64 {
        self.variance_r
    }

    /// Variance of z (mm²).
    #[inline]
    #[must_use]
    pub fn variance_z(&self) -> f64 {
        self.variance_z
    }

    /// Provenance link to the source measurement(s).
    #[inline]
    #[must_use]
    pub fn link(&self) -> MeasurementLink {
        self.link
    }
}
