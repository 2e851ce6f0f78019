//! Spacepoint formation from local measurements.
//!
//! Pixel measurements map one-to-one onto spacepoints through the module
//! transform. Strip measurements are combined with the measurements on the
//! stereo partner module: the two strip lines are intersected (closest
//! approach) and the midpoint becomes the spacepoint.

use std::collections::HashMap;

use nalgebra::{Matrix3, Vector3};
use trackpix_core::error::ensure_non_negative;
use trackpix_core::{
    GeometryLookup, Measurement, MeasurementLink, ModuleDescriptor, ModuleId, ModuleKind, Result,
    Spacepoint,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Strip lines closer to parallel than this (|sin| of the stereo angle) do
/// not intersect.
const PARALLEL_TOLERANCE: f64 = 1e-9;

/// Configuration for strip pairing.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SpacepointFormationConfig {
    /// Relative tolerance on the strip half length when checking that the
    /// intersection lies on both strips.
    pub strip_length_tolerance: f64,
    /// Largest allowed distance between the closest points of two strips
    /// (mm).
    pub max_stereo_gap: f64,
}

impl Default for SpacepointFormationConfig {
    fn default() -> Self {
        Self {
            strip_length_tolerance: 0.01,
            max_stereo_gap: 10.0,
        }
    }
}

impl SpacepointFormationConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns a configuration error for negative or non-finite values.
    pub fn validate(&self) -> Result<()> {
        ensure_non_negative("strip_length_tolerance", self.strip_length_tolerance)?;
        ensure_non_negative("max_stereo_gap", self.max_stereo_gap)
    }
}

/// Counters collected while forming spacepoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpacepointStatistics {
    /// Spacepoints from pixel measurements.
    pub pixel_spacepoints: usize,
    /// Spacepoints from strip pairs.
    pub strip_spacepoints: usize,
    /// Strip pairs that did not intersect.
    pub rejected_pairs: usize,
    /// Measurements on unknown modules or on strips without a partner.
    pub skipped_measurements: usize,
}

/// Spacepoints of one event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpacepointOutput {
    /// Spacepoints in measurement order.
    pub spacepoints: Vec<Spacepoint>,
    /// Counters.
    pub stats: SpacepointStatistics,
}

/// Builds global spacepoints from measurements.
#[derive(Debug, Clone, Default)]
pub struct SpacepointFormation {
    config: SpacepointFormationConfig,
}

impl SpacepointFormation {
    /// Creates a builder.
    ///
    /// # Errors
    /// Returns a configuration error if `config` is invalid.
    pub fn new(config: SpacepointFormationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Builds the spacepoints of one event.
    ///
    /// A strip module pairs with its partner only from the side with the
    /// lower identifier; its pairs are emitted where its measurements occur.
    pub fn build<G>(&self, measurements: &[Measurement], geometry: &G) -> SpacepointOutput
    where
        G: GeometryLookup + ?Sized,
    {
        let mut output = SpacepointOutput::default();
        self.build_into(measurements, geometry, &mut output);
        output
    }

    /// Like [`SpacepointFormation::build`], reusing the allocations of
    /// `output`. Previous contents are discarded.
    pub fn build_into<G>(&self, measurements: &[Measurement], geometry: &G, output: &mut SpacepointOutput)
    where
        G: GeometryLookup + ?Sized,
    {
        output.spacepoints.clear();
        output.stats = SpacepointStatistics::default();

        let mut by_module: HashMap<ModuleId, Vec<usize>> = HashMap::new();
        for (i, m) in measurements.iter().enumerate() {
            by_module.entry(m.module).or_default().push(i);
        }

        for (i, m) in measurements.iter().enumerate() {
            let Some(module) = geometry.module(m.module) else {
                log::warn!("measurement {i} on unknown module {}", m.module);
                output.stats.skipped_measurements += 1;
                continue;
            };
            match module.kind {
                ModuleKind::Pixel => {
                    output.spacepoints.push(pixel_spacepoint(i, m, module));
                    output.stats.pixel_spacepoints += 1;
                }
                ModuleKind::Strip { partner, length } => {
                    let Some(other) = geometry.module(partner) else {
                        output.stats.skipped_measurements += 1;
                        continue;
                    };
                    let ModuleKind::Strip {
                        length: other_length,
                        ..
                    } = other.kind
                    else {
                        output.stats.skipped_measurements += 1;
                        continue;
                    };
                    if module.id > partner {
                        continue;
                    }
                    let Some(partners) = by_module.get(&partner) else {
                        continue;
                    };
                    let first = StripLine::new(m, module, length);
                    for &j in partners {
                        let second = StripLine::new(&measurements[j], other, other_length);
                        match self.intersect(&first, &second) {
                            Some((position, covariance)) => {
                                let (var_r, var_z) = project_covariance(&position, &covariance);
                                output.spacepoints.push(Spacepoint::new(
                                    [position.x, position.y, position.z],
                                    var_r,
                                    var_z,
                                    MeasurementLink::Pair(i, j),
                                ));
                                output.stats.strip_spacepoints += 1;
                            }
                            None => output.stats.rejected_pairs += 1,
                        }
                    }
                }
            }
        }

        log::debug!(
            "formed {} pixel and {} strip spacepoints ({} strip pairs rejected)",
            output.stats.pixel_spacepoints,
            output.stats.strip_spacepoints,
            output.stats.rejected_pairs
        );
    }

    /// Closest approach of two strip lines; returns the midpoint and its
    /// covariance.
    fn intersect(&self, a: &StripLine, b: &StripLine) -> Option<(Vector3<f64>, Matrix3<f64>)> {
        let cos = a.direction.dot(&b.direction);
        let denom = 1.0 - cos * cos;
        if denom < PARALLEL_TOLERANCE * PARALLEL_TOLERANCE {
            return None;
        }
        let w0 = a.center - b.center;
        let d = a.direction.dot(&w0);
        let e = b.direction.dot(&w0);
        let s = (cos * e - d) / denom;
        let t = (e - cos * d) / denom;

        let scale = 1.0 + self.config.strip_length_tolerance;
        if s.abs() > a.half_length * scale || t.abs() > b.half_length * scale {
            return None;
        }
        let pa = a.center + a.direction * s;
        let pb = b.center + b.direction * t;
        if (pa - pb).norm() > self.config.max_stereo_gap {
            return None;
        }

        // Error along each strip comes from the other strip's resolution.
        let along_a = a.direction.dot(&b.normal);
        let along_b = b.direction.dot(&a.normal);
        if along_a.abs() < PARALLEL_TOLERANCE || along_b.abs() < PARALLEL_TOLERANCE {
            return None;
        }
        let covariance = a.direction * a.direction.transpose() * (b.variance / (along_a * along_a))
            + b.direction * b.direction.transpose() * (a.variance / (along_b * along_b));

        Some(((pa + pb) * 0.5, covariance))
    }
}

/// A strip measurement as a global line segment.
struct StripLine {
    center: Vector3<f64>,
    direction: Vector3<f64>,
    normal: Vector3<f64>,
    half_length: f64,
    variance: f64,
}

impl StripLine {
    fn new(m: &Measurement, module: &ModuleDescriptor, length: f64) -> Self {
        let transform = &module.transform;
        Self {
            center: transform.surface_to_global([m.local[0], 0.0]).coords,
            direction: transform.vector_to_global(&Vector3::y()),
            normal: transform.vector_to_global(&Vector3::x()),
            half_length: 0.5 * length,
            variance: m.variance[0],
        }
    }
}

fn pixel_spacepoint(index: usize, m: &Measurement, module: &ModuleDescriptor) -> Spacepoint {
    let position = module.transform.surface_to_global(m.local).coords;
    let rotation = module.transform.rotation().matrix();
    let local = Matrix3::from_diagonal(&Vector3::new(m.variance[0], m.variance[1], 0.0));
    let covariance = rotation * local * rotation.transpose();
    let (var_r, var_z) = project_covariance(&position, &covariance);
    Spacepoint::new(
        [position.x, position.y, position.z],
        var_r,
        var_z,
        MeasurementLink::Single(index),
    )
}

/// Projects a global covariance on the radial direction and on z.
fn project_covariance(position: &Vector3<f64>, covariance: &Matrix3<f64>) -> (f64, f64) {
    let r = position.x.hypot(position.y);
    let radial = if r > 0.0 {
        Vector3::new(position.x / r, position.y / r, 0.0)
    } else {
        Vector3::x()
    };
    let var_r = radial.dot(&(covariance * radial));
    (var_r, covariance[(2, 2)])
}
