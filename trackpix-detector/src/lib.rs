//! trackpix-detector: in-memory detector description.
//!
//! Holds the module table ([`Geometry`]) and per-module digitization
//! ([`DigitizationConfig`]) consumed by the algorithms through the
//! [`GeometryLookup`] and [`DigitizationLookup`] traits.
//!
//! # Key Components
//!
//! - [`Detector`] - Geometry plus digitization, loadable from JSON
//! - [`Geometry`] - Module table with strip pairing validation
//! - [`GenericBarrel`] - Cylindrical barrel layout generator

mod digitization;
mod error;
mod generic;
mod geometry;

pub use digitization::DigitizationConfig;
pub use error::{Error, Result};
pub use generic::{BarrelLayer, GenericBarrel, LayerKind};
pub use geometry::Geometry;

// Re-export core types for convenience
pub use trackpix_core::{DigitizationLookup, DigitizationParams, GeometryLookup};

use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use trackpix_core::{ModuleDescriptor, ModuleId, ModuleKind, Transform3};

/// Complete detector description.
#[derive(Debug, Clone, PartialEq)]
pub struct Detector {
    /// Module table.
    pub geometry: Geometry,
    /// Digitization per module.
    pub digitization: DigitizationConfig,
}

impl Default for Detector {
    /// The default generic barrel with default digitization.
    fn default() -> Self {
        Self {
            geometry: GenericBarrel::default()
                .build()
                .unwrap_or_default(),
            digitization: DigitizationConfig::default(),
        }
    }
}

// Intermediate structs for the JSON description
#[derive(Deserialize)]
struct JsonConfig {
    detector: JsonDetector,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct JsonDetector {
    modules: Option<Vec<JsonModule>>,
    barrel: Option<Vec<JsonBarrelLayer>>,
    digitization: JsonDigitization,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum JsonModuleKind {
    Pixel,
    Strip { partner: u64, length: f64 },
}

#[derive(Deserialize)]
struct JsonModule {
    id: u64,
    #[serde(flatten)]
    kind: JsonModuleKind,
    #[serde(default = "identity_rows")]
    rotation: [[f64; 3]; 3],
    #[serde(default)]
    translation: [f64; 3],
}

fn identity_rows() -> [[f64; 3]; 3] {
    [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]
}

#[derive(Deserialize)]
struct JsonBarrelLayer {
    radius: f64,
    n_phi: u32,
    n_z: u32,
    half_length: f64,
    #[serde(default)]
    stereo_angle: Option<f64>,
    #[serde(default = "default_strip_gap")]
    gap: f64,
}

fn default_strip_gap() -> f64 {
    2.0
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct JsonDigitization {
    pixel: Option<DigitizationParams>,
    strip: Option<DigitizationParams>,
    modules: Vec<JsonModuleDigitization>,
}

#[derive(Deserialize)]
struct JsonModuleDigitization {
    id: u64,
    #[serde(flatten)]
    params: DigitizationParams,
}

impl Detector {
    /// Creates a detector from its parts.
    #[must_use]
    pub fn new(geometry: Geometry, digitization: DigitizationConfig) -> Self {
        Self {
            geometry,
            digitization,
        }
    }

    /// Load a detector description from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// describes an inconsistent detector.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let json_config: JsonConfig = serde_json::from_reader(reader)?;
        Self::from_json_config(json_config)
    }

    /// Load a detector description from a JSON string.
    ///
    /// Missing sections fall back to defaults: without `modules` or
    /// `barrel` the default [`GenericBarrel`] is built.
    ///
    /// # Errors
    /// Returns an error if the string is not valid JSON or describes an
    /// inconsistent detector.
    pub fn from_json(json: &str) -> Result<Self> {
        let json_config: JsonConfig = serde_json::from_str(json)?;
        Self::from_json_config(json_config)
    }

    fn from_json_config(config: JsonConfig) -> Result<Self> {
        let detector = config.detector;

        let mut geometry = match detector.barrel {
            Some(layers) => GenericBarrel::new(
                layers
                    .into_iter()
                    .map(|l| BarrelLayer {
                        radius: l.radius,
                        n_phi: l.n_phi,
                        n_z: l.n_z,
                        half_length: l.half_length,
                        kind: match l.stereo_angle {
                            Some(stereo_angle) => LayerKind::StripPair {
                                stereo_angle,
                                gap: l.gap,
                            },
                            None => LayerKind::Pixel,
                        },
                    })
                    .collect(),
            )
            .build()?,
            None if detector.modules.is_none() => GenericBarrel::default().build()?,
            None => Geometry::new(),
        };

        for module in detector.modules.unwrap_or_default() {
            let id = ModuleId(module.id);
            let transform = Transform3::from_rows(module.rotation, module.translation)?;
            let kind = match module.kind {
                JsonModuleKind::Pixel => ModuleKind::Pixel,
                JsonModuleKind::Strip { partner, length } => ModuleKind::Strip {
                    partner: ModuleId(partner),
                    length,
                },
            };
            geometry.insert(ModuleDescriptor {
                id,
                kind,
                transform,
            })?;
        }

        let mut digitization = DigitizationConfig::default();
        if let Some(pixel) = detector.digitization.pixel {
            digitization.pixel = pixel;
        }
        if let Some(strip) = detector.digitization.strip {
            digitization.strip = strip;
        }
        for entry in detector.digitization.modules {
            digitization.set_module(ModuleId(entry.id), entry.params);
        }

        let detector = Self::new(geometry, digitization);
        // Validate once at load time
        detector.validate()?;
        Ok(detector)
    }

    /// Validates strip pairing, digitization parameters and that every
    /// digitization override names a known module.
    ///
    /// # Errors
    /// Returns the first inconsistency found.
    pub fn validate(&self) -> Result<()> {
        self.geometry.validate()?;
        self.digitization.validate()?;
        let mut unknown: Vec<ModuleId> = self
            .digitization
            .overrides
            .keys()
            .copied()
            .filter(|id| !self.geometry.contains(*id))
            .collect();
        unknown.sort_unstable();
        if let Some(id) = unknown.first() {
            return Err(Error::InvalidDescription(format!(
                "digitization override for unknown module {id}"
            )));
        }
        Ok(())
    }
}

impl GeometryLookup for Detector {
    fn module(&self, id: ModuleId) -> Option<&ModuleDescriptor> {
        self.geometry.module(id)
    }
}

impl DigitizationLookup for Detector {
    fn digitization(&self, id: ModuleId, kind: &ModuleKind) -> Option<DigitizationParams> {
        self.digitization.digitization(id, kind)
    }
}
