//! Module geometry and digitization lookups.
//!
//! The detector description itself lives outside the core; algorithms only
//! see it through [`GeometryLookup`] and [`DigitizationLookup`].

use std::collections::{BTreeMap, HashMap};

use nalgebra::{Matrix3, Point3, Rotation3, Vector3};

use crate::cell::ModuleId;
use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Sensor type of a module.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "snake_case"))]
pub enum ModuleKind {
    /// Two-dimensional pixel sensor; one measurement gives one spacepoint.
    Pixel,
    /// Strip sensor paired with a stereo partner on the neighbouring layer.
    Strip {
        /// Module carrying the other strip orientation.
        partner: ModuleId,
        /// Strip length along local y (mm).
        length: f64,
    },
}

impl ModuleKind {
    /// Returns true for pixel modules.
    #[inline]
    #[must_use]
    pub fn is_pixel(&self) -> bool {
        matches!(self, Self::Pixel)
    }

    /// Returns the stereo partner of a strip module.
    #[inline]
    #[must_use]
    pub fn partner(&self) -> Option<ModuleId> {
        match self {
            Self::Pixel => None,
            Self::Strip { partner, .. } => Some(*partner),
        }
    }

    /// Number of measured local coordinates.
    #[inline]
    #[must_use]
    pub fn dimension(&self) -> u8 {
        match self {
            Self::Pixel => 2,
            Self::Strip { .. } => 1,
        }
    }
}

/// Rigid local-to-global transform of a module.
///
/// Local `z` is the sensor normal; local `x`/`y` span the sensor plane.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Transform3 {
    rotation: Rotation3<f64>,
    translation: Vector3<f64>,
}

impl Default for Transform3 {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform3 {
    const ORTHONORMAL_TOLERANCE: f64 = 1e-6;

    /// Identity transform.
    #[must_use]
    pub fn identity() -> Self {
        Self {
            rotation: Rotation3::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Creates a transform from a rotation and a translation.
    #[must_use]
    pub fn new(rotation: Rotation3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Creates a transform from a rotation matrix given row by row.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] if the matrix is not a proper rotation.
    pub fn from_rows(rows: [[f64; 3]; 3], translation: [f64; 3]) -> Result<Self> {
        let m = Matrix3::from_row_slice(&[
            rows[0][0], rows[0][1], rows[0][2], rows[1][0], rows[1][1], rows[1][2], rows[2][0],
            rows[2][1], rows[2][2],
        ]);
        let deviation = (m.transpose() * m - Matrix3::identity()).abs().max();
        if !deviation.is_finite() || deviation > Self::ORTHONORMAL_TOLERANCE {
            return Err(Error::ConfigError(format!(
                "rotation matrix is not orthonormal (deviation {deviation:e})"
            )));
        }
        if m.determinant() < 0.0 {
            return Err(Error::ConfigError(
                "rotation matrix is a reflection (negative determinant)".to_string(),
            ));
        }
        Ok(Self {
            rotation: Rotation3::from_matrix_unchecked(m),
            translation: Vector3::from(translation),
        })
    }

    /// Creates a transform whose local x and y axes point along the given
    /// global directions, centred at `center`.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] if the axes are degenerate or not
    /// perpendicular.
    pub fn from_axes(local_x: [f64; 3], local_y: [f64; 3], center: [f64; 3]) -> Result<Self> {
        let x = Vector3::from(local_x);
        let y = Vector3::from(local_y);
        let (nx, ny) = (x.norm(), y.norm());
        if nx == 0.0 || ny == 0.0 || !nx.is_finite() || !ny.is_finite() {
            return Err(Error::ConfigError("module axes must be non-zero".to_string()));
        }
        let x = x / nx;
        let y = y / ny;
        if x.dot(&y).abs() > Self::ORTHONORMAL_TOLERANCE {
            return Err(Error::ConfigError(
                "module axes must be perpendicular".to_string(),
            ));
        }
        let z = x.cross(&y);
        let m = Matrix3::from_columns(&[x, y, z]);
        Ok(Self {
            rotation: Rotation3::from_matrix_unchecked(m),
            translation: Vector3::from(center),
        })
    }

    /// Rotation part of the transform.
    #[inline]
    #[must_use]
    pub fn rotation(&self) -> &Rotation3<f64> {
        &self.rotation
    }

    /// Translation part of the transform.
    #[inline]
    #[must_use]
    pub fn translation(&self) -> &Vector3<f64> {
        &self.translation
    }

    /// Maps a local point to global coordinates.
    #[inline]
    #[must_use]
    pub fn point_to_global(&self, local: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation * local.coords + self.translation)
    }

    /// Maps a point on the sensor plane (`z = 0`) to global coordinates.
    #[inline]
    #[must_use]
    pub fn surface_to_global(&self, local: [f64; 2]) -> Point3<f64> {
        self.point_to_global(&Point3::new(local[0], local[1], 0.0))
    }

    /// Maps a local direction to global coordinates.
    #[inline]
    #[must_use]
    pub fn vector_to_global(&self, local: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * local
    }

    /// Maps a global point to local coordinates.
    #[inline]
    #[must_use]
    pub fn point_to_local(&self, global: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation.inverse() * (global.coords - self.translation))
    }
}

/// Geometry of one detector module.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ModuleDescriptor {
    /// Module identifier.
    pub id: ModuleId,
    /// Sensor type.
    pub kind: ModuleKind,
    /// Local-to-global transform.
    pub transform: Transform3,
}

impl ModuleDescriptor {
    /// Creates a pixel module.
    #[must_use]
    pub fn pixel(id: ModuleId, transform: Transform3) -> Self {
        Self {
            id,
            kind: ModuleKind::Pixel,
            transform,
        }
    }

    /// Creates a strip module paired with `partner`.
    #[must_use]
    pub fn strip(id: ModuleId, partner: ModuleId, length: f64, transform: Transform3) -> Self {
        Self {
            id,
            kind: ModuleKind::Strip { partner, length },
            transform,
        }
    }
}

/// Digitization parameters of one module.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DigitizationParams {
    /// Cell pitch along local x and y (mm).
    pub pitch: [f64; 2],
    /// Additional Gaussian smearing along local x and y (mm).
    pub smearing: [f64; 2],
    /// Activations at or below this value carry no centroid weight.
    pub threshold: f32,
}

impl Default for DigitizationParams {
    fn default() -> Self {
        Self {
            pitch: [0.05, 0.05],
            smearing: [0.0, 0.0],
            threshold: 0.0,
        }
    }
}

impl DigitizationParams {
    /// Creates parameters with the given pitch and no smearing.
    #[must_use]
    pub fn with_pitch(pitch_x: f64, pitch_y: f64) -> Self {
        Self {
            pitch: [pitch_x, pitch_y],
            ..Self::default()
        }
    }

    /// Validates pitch and smearing.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] for non-positive pitch or negative
    /// smearing.
    pub fn validate(&self) -> Result<()> {
        crate::error::ensure_positive("pitch[0]", self.pitch[0])?;
        crate::error::ensure_positive("pitch[1]", self.pitch[1])?;
        crate::error::ensure_non_negative("smearing[0]", self.smearing[0])?;
        crate::error::ensure_non_negative("smearing[1]", self.smearing[1])?;
        if !self.threshold.is_finite() {
            return Err(Error::ConfigError("threshold must be finite".to_string()));
        }
        Ok(())
    }
}

/// Lookup from module identifier to module geometry.
pub trait GeometryLookup: Sync {
    /// Returns the descriptor of `id`, if known.
    fn module(&self, id: ModuleId) -> Option<&ModuleDescriptor>;

    /// Returns true if `id` is known.
    fn contains(&self, id: ModuleId) -> bool {
        self.module(id).is_some()
    }
}

/// Lookup from module identifier to digitization parameters.
pub trait DigitizationLookup: Sync {
    /// Returns the digitization of module `id` of the given kind.
    fn digitization(&self, id: ModuleId, kind: &ModuleKind) -> Option<DigitizationParams>;
}

impl GeometryLookup for HashMap<ModuleId, ModuleDescriptor> {
    fn module(&self, id: ModuleId) -> Option<&ModuleDescriptor> {
        self.get(&id)
    }
}

impl GeometryLookup for BTreeMap<ModuleId, ModuleDescriptor> {
    fn module(&self, id: ModuleId) -> Option<&ModuleDescriptor> {
        self.get(&id)
    }
}

/// Every module shares the same digitization.
impl DigitizationLookup for DigitizationParams {
    fn digitization(&self, _id: ModuleId, _kind: &ModuleKind) -> Option<DigitizationParams> {
        Some(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_from_axes_round_trip() {
        // Barrel module at phi = 90 deg, radius 50: local x tangential, local y along z.
        let t = Transform3::from_axes([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 50.0, 10.0])
            .unwrap();
        let global = t.surface_to_global([2.0, 3.0]);
        assert_relative_eq!(global.x, -2.0, epsilon = 1e-12);
        assert_relative_eq!(global.y, 50.0, epsilon = 1e-12);
        assert_relative_eq!(global.z, 13.0, epsilon = 1e-12);

        let local = t.point_to_local(&global);
        assert_relative_eq!(local.x, 2.0, epsilon = 1e-12);
        assert_relative_eq!(local.y, 3.0, epsilon = 1e-12);
        assert_relative_eq!(local.z, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_from_axes_rejects_skew_axes() {
        assert!(Transform3::from_axes([1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0; 3]).is_err());
        assert!(Transform3::from_axes([0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0; 3]).is_err());
    }

    #[test]
    fn test_from_rows_rejects_reflection() {
        let rows = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, -1.0]];
        assert!(Transform3::from_rows(rows, [0.0; 3]).is_err());

        let rows = [[0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]];
        let t = Transform3::from_rows(rows, [1.0, 2.0, 3.0]).unwrap();
        let v = t.vector_to_global(&Vector3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(v.y, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_module_kind() {
        let strip = ModuleKind::Strip {
            partner: ModuleId(4),
            length: 20.0,
        };
        assert_eq!(strip.partner(), Some(ModuleId(4)));
        assert_eq!(strip.dimension(), 1);
        assert!(ModuleKind::Pixel.is_pixel());
        assert_eq!(ModuleKind::Pixel.partner(), None);
    }

    #[test]
    fn test_map_lookup() {
        let mut modules = HashMap::new();
        modules.insert(
            ModuleId(1),
            ModuleDescriptor::pixel(ModuleId(1), Transform3::identity()),
        );
        assert!(modules.contains(ModuleId(1)));
        assert!(GeometryLookup::module(&modules, ModuleId(2)).is_none());
    }

    #[test]
    fn test_digitization_validation() {
        assert!(DigitizationParams::default().validate().is_ok());
        assert!(DigitizationParams::with_pitch(0.0, 0.1).validate().is_err());
    }
}
