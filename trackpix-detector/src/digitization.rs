//! Per-module digitization configuration.

use std::collections::HashMap;

use trackpix_core::{DigitizationLookup, DigitizationParams, ModuleId, ModuleKind};

use crate::error::Result;

/// Digitization defaults per module type with per-module overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct DigitizationConfig {
    /// Parameters for pixel modules without an override.
    pub pixel: DigitizationParams,
    /// Parameters for strip modules without an override.
    pub strip: DigitizationParams,
    /// Module-specific parameters.
    pub overrides: HashMap<ModuleId, DigitizationParams>,
}

impl Default for DigitizationConfig {
    fn default() -> Self {
        Self {
            pixel: DigitizationParams::with_pitch(0.05, 0.05),
            strip: DigitizationParams::with_pitch(0.08, 1.0),
            overrides: HashMap::new(),
        }
    }
}

impl DigitizationConfig {
    /// Sets the module-specific parameters of `id`.
    pub fn set_module(&mut self, id: ModuleId, params: DigitizationParams) {
        self.overrides.insert(id, params);
    }

    /// Validates every parameter set.
    ///
    /// # Errors
    /// Returns the first validation failure.
    pub fn validate(&self) -> Result<()> {
        self.pixel.validate()?;
        self.strip.validate()?;
        for params in self.overrides.values() {
            params.validate()?;
        }
        Ok(())
    }
}

impl DigitizationLookup for DigitizationConfig {
    fn digitization(&self, id: ModuleId, kind: &ModuleKind) -> Option<DigitizationParams> {
        if let Some(params) = self.overrides.get(&id) {
            return Some(*params);
        }
        Some(match kind {
            ModuleKind::Pixel => self.pixel,
            ModuleKind::Strip { .. } => self.strip,
        })
    }
}
