//! Generic cylindrical barrel layout.
//!
//! Builds a polygonal barrel of flat modules: each layer is tiled with
//! `n_phi` modules around the beam axis and `n_z` modules along it. Strip
//! layers consist of two module sheets a small radial gap apart whose
//! strips are tilted by `±stereo_angle / 2`.
//!
//! Pixel modules have their local origin at a corner, so local positions
//! and channel numbers are non-negative. Strip modules have it on the edge
//! at half length, with strips running along local y.

use std::f64::consts::PI;

use trackpix_core::{GeometryLookup, ModuleDescriptor, ModuleId, Transform3};

use crate::error::{Error, Result};
use crate::geometry::Geometry;

/// Sensor technology of a barrel layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LayerKind {
    /// Single sheet of pixel modules.
    Pixel,
    /// Two sheets of strip modules forming stereo pairs.
    StripPair {
        /// Full angle between the strip directions of the pair (rad).
        stereo_angle: f64,
        /// Radial distance between the two sheets (mm).
        gap: f64,
    },
}

/// One barrel layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarrelLayer {
    /// Radius of the module centres (mm).
    pub radius: f64,
    /// Modules around the beam axis.
    pub n_phi: u32,
    /// Modules along the beam axis.
    pub n_z: u32,
    /// Half of the layer length along z (mm).
    pub half_length: f64,
    /// Sensor technology.
    pub kind: LayerKind,
}

impl BarrelLayer {
    /// Creates a pixel layer.
    #[must_use]
    pub fn pixel(radius: f64, n_phi: u32, n_z: u32, half_length: f64) -> Self {
        Self {
            radius,
            n_phi,
            n_z,
            half_length,
            kind: LayerKind::Pixel,
        }
    }

    /// Azimuthal extent of one module.
    #[must_use]
    pub fn phi_step(&self) -> f64 {
        2.0 * PI / f64::from(self.n_phi)
    }

    /// Width of one module along local x (mm).
    #[must_use]
    pub fn module_width(&self) -> f64 {
        2.0 * self.radius * (self.phi_step() / 2.0).tan()
    }

    /// Length of one module along z (mm).
    #[must_use]
    pub fn module_length(&self) -> f64 {
        2.0 * self.half_length / f64::from(self.n_z)
    }

    fn validate(&self, index: usize) -> Result<()> {
        let ok = self.radius.is_finite()
            && self.radius > 0.0
            && self.half_length.is_finite()
            && self.half_length > 0.0
            && self.n_phi >= 3
            && self.n_z >= 1;
        if !ok {
            return Err(Error::InvalidDescription(format!(
                "barrel layer {index} needs positive radius/length, n_phi >= 3 and n_z >= 1"
            )));
        }
        if let LayerKind::StripPair { stereo_angle, gap } = self.kind {
            if !(stereo_angle > 0.0 && stereo_angle < PI / 2.0 && gap > 0.0) {
                return Err(Error::InvalidDescription(format!(
                    "barrel layer {index} needs a stereo angle in (0, pi/2) and a positive gap"
                )));
            }
        }
        Ok(())
    }
}

/// Cylindrical barrel made of [`BarrelLayer`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericBarrel {
    /// Layers from the inside out.
    pub layers: Vec<BarrelLayer>,
}

impl Default for GenericBarrel {
    /// Four pixel layers and one stereo strip layer.
    fn default() -> Self {
        Self {
            layers: vec![
                BarrelLayer::pixel(32.0, 16, 14, 500.0),
                BarrelLayer::pixel(72.0, 32, 14, 500.0),
                BarrelLayer::pixel(116.0, 52, 14, 500.0),
                BarrelLayer::pixel(172.0, 78, 14, 500.0),
                BarrelLayer {
                    radius: 260.0,
                    n_phi: 40,
                    n_z: 21,
                    half_length: 1050.0,
                    kind: LayerKind::StripPair {
                        stereo_angle: 0.04,
                        gap: 2.0,
                    },
                },
            ],
        }
    }
}

impl GenericBarrel {
    /// Creates a barrel from layers.
    #[must_use]
    pub fn new(layers: Vec<BarrelLayer>) -> Self {
        Self { layers }
    }

    /// Identifier of a module slot; `sheet` is 0 for pixels and the inner
    /// strip sheet, 1 for the outer strip sheet.
    #[must_use]
    pub fn module_id(layer: usize, iz: u32, iphi: u32, sheet: u8) -> ModuleId {
        ModuleId(
            ((layer as u64) << 40)
                | (u64::from(sheet) << 32)
                | (u64::from(iz) << 16)
                | u64::from(iphi),
        )
    }

    /// Slot `(iz, iphi)` covering the azimuth and z of a point, if inside
    /// the layer.
    #[must_use]
    pub fn slot_at(&self, layer: usize, phi: f64, z: f64) -> Option<(u32, u32)> {
        let l = self.layers.get(layer)?;
        if !(z.is_finite() && phi.is_finite()) || z.abs() > l.half_length {
            return None;
        }
        let iz = ((z + l.half_length) / l.module_length()).floor();
        let iz = (iz.max(0.0) as u32).min(l.n_z - 1);
        let wrapped = (phi + PI).rem_euclid(2.0 * PI);
        let iphi = ((wrapped / l.phi_step()).floor() as u32).min(l.n_phi - 1);
        Some((iz, iphi))
    }

    /// Builds the module table.
    ///
    /// # Errors
    /// Returns [`Error::InvalidDescription`] for an invalid layer.
    pub fn build(&self) -> Result<Geometry> {
        let mut geometry = Geometry::new();
        for (index, layer) in self.layers.iter().enumerate() {
            layer.validate(index)?;
            for iz in 0..layer.n_z {
                let zc = -layer.half_length + (f64::from(iz) + 0.5) * layer.module_length();
                for iphi in 0..layer.n_phi {
                    let phi = -PI + (f64::from(iphi) + 0.5) * layer.phi_step();
                    let (s, c) = phi.sin_cos();
                    let tangent = [-s, c, 0.0];
                    match layer.kind {
                        LayerKind::Pixel => {
                            let half_width = 0.5 * layer.module_width();
                            let corner = [
                                layer.radius * c - half_width * tangent[0],
                                layer.radius * s - half_width * tangent[1],
                                zc - 0.5 * layer.module_length(),
                            ];
                            let transform = Transform3::from_axes(tangent, [0.0, 0.0, 1.0], corner)?;
                            geometry.insert(ModuleDescriptor::pixel(
                                Self::module_id(index, iz, iphi, 0),
                                transform,
                            ))?;
                        }
                        LayerKind::StripPair { stereo_angle, gap } => {
                            let inner = Self::module_id(index, iz, iphi, 0);
                            let outer = Self::module_id(index, iz, iphi, 1);
                            for (sheet, (id, partner)) in [(inner, outer), (outer, inner)].into_iter().enumerate() {
                                let radius = layer.radius + gap * sheet as f64;
                                let tilt = if sheet == 0 { 0.5 } else { -0.5 } * stereo_angle;
                                let (ts, tc) = tilt.sin_cos();
                                // Rotate the (tangent, z) frame about the sensor normal.
                                let local_x = [tc * tangent[0], tc * tangent[1], ts];
                                let local_y = [-ts * tangent[0], -ts * tangent[1], tc];
                                let half_width = 0.5 * layer.module_width();
                                let origin = [
                                    radius * c - half_width * local_x[0],
                                    radius * s - half_width * local_x[1],
                                    zc - half_width * local_x[2],
                                ];
                                let transform = Transform3::from_axes(local_x, local_y, origin)?;
                                geometry.insert(ModuleDescriptor::strip(
                                    id,
                                    partner,
                                    layer.module_length(),
                                    transform,
                                ))?;
                            }
                        }
                    }
                }
            }
        }
        geometry.validate()?;
        Ok(geometry)
    }

    /// Module of `layer` (inner sheet) containing the azimuth and z of
    /// `global`, and the point's local coordinates on it.
    #[must_use]
    pub fn locate(&self, geometry: &Geometry, layer: usize, global: [f64; 3]) -> Option<(ModuleId, [f64; 2])> {
        let phi = global[1].atan2(global[0]);
        let (iz, iphi) = self.slot_at(layer, phi, global[2])?;
        let id = Self::module_id(layer, iz, iphi, 0);
        let module = geometry.module(id)?;
        let local = module
            .transform
            .point_to_local(&nalgebra::Point3::new(global[0], global[1], global[2]));
        Some((id, [local.x, local.y]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use trackpix_core::ModuleKind;

    #[test]
    fn test_default_barrel_builds() {
        let barrel = GenericBarrel::default();
        let geometry = barrel.build().unwrap();
        let pixel_modules: u32 = barrel.layers[..4].iter().map(|l| l.n_phi * l.n_z).sum();
        let strip_modules = 2 * 40 * 21;
        assert_eq!(geometry.len(), (pixel_modules + strip_modules) as usize);
    }

    #[test]
    fn test_module_centres_lie_on_layer_radius() {
        let layer = BarrelLayer::pixel(50.0, 8, 2, 100.0);
        let geometry = GenericBarrel::new(vec![layer]).build().unwrap();
        let half = [0.5 * layer.module_width(), 0.5 * layer.module_length()];
        for module in geometry.iter() {
            let centre = module.transform.surface_to_global(half);
            assert_relative_eq!(centre.x.hypot(centre.y), 50.0, epsilon = 1e-9);
            assert!(module.kind.is_pixel());
        }
    }

    #[test]
    fn test_local_coordinates_are_non_negative() {
        let barrel = GenericBarrel::new(vec![BarrelLayer::pixel(50.0, 8, 2, 100.0)]);
        let geometry = barrel.build().unwrap();
        for (phi, z) in [(0.01_f64, -99.0), (0.38, -0.5), (-3.1, 99.0), (1.2, 0.5)] {
            let point = [50.0 * phi.cos(), 50.0 * phi.sin(), z];
            let (_, local) = barrel.locate(&geometry, 0, point).unwrap();
            assert!(local[0] >= -1e-9 && local[1] >= -1e-9, "{local:?}");
        }
    }

    #[test]
    fn test_locate_round_trip() {
        let barrel = GenericBarrel::new(vec![BarrelLayer::pixel(50.0, 8, 2, 100.0)]);
        let geometry = barrel.build().unwrap();
        let (id, local) = barrel.locate(&geometry, 0, [50.0, 3.0, 20.0]).unwrap();
        let module = geometry.module(id).unwrap();
        let back = module.transform.surface_to_global(local);
        assert_relative_eq!(back.y, 3.0, epsilon = 1e-9);
        assert_relative_eq!(back.z, 20.0, epsilon = 1e-9);
        assert!(barrel.locate(&geometry, 0, [50.0, 0.0, 150.0]).is_none());
    }

    #[test]
    fn test_strip_pairs_are_linked() {
        let barrel = GenericBarrel::new(vec![BarrelLayer {
            radius: 100.0,
            n_phi: 6,
            n_z: 1,
            half_length: 50.0,
            kind: LayerKind::StripPair {
                stereo_angle: 0.1,
                gap: 1.0,
            },
        }]);
        let geometry = barrel.build().unwrap();
        let inner = GenericBarrel::module_id(0, 0, 3, 0);
        let outer = GenericBarrel::module_id(0, 0, 3, 1);
        let ModuleKind::Strip { partner, length } = geometry.module(inner).unwrap().kind else {
            panic!("expected a strip module");
        };
        assert_eq!(partner, outer);
        assert_relative_eq!(length, 100.0);
    }

    #[test]
    fn test_invalid_layer() {
        let barrel = GenericBarrel::new(vec![BarrelLayer::pixel(50.0, 2, 1, 100.0)]);
        assert!(barrel.build().is_err());
    }
}
