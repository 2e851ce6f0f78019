//! In-memory module table.

use std::collections::BTreeMap;

use trackpix_core::{GeometryLookup, ModuleDescriptor, ModuleId, ModuleKind};

use crate::error::{Error, Result};

/// Module geometry keyed by module identifier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Geometry {
    modules: BTreeMap<ModuleId, ModuleDescriptor>,
}

impl Geometry {
    /// Creates an empty geometry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a module.
    ///
    /// # Errors
    /// Returns [`Error::DuplicateModule`] if the identifier is taken.
    pub fn insert(&mut self, module: ModuleDescriptor) -> Result<()> {
        if self.modules.contains_key(&module.id) {
            return Err(Error::DuplicateModule(module.id));
        }
        self.modules.insert(module.id, module);
        Ok(())
    }

    /// Number of modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Returns true if no module is defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Iterates over modules in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = &ModuleDescriptor> {
        self.modules.values()
    }

    /// Checks that every strip module names an existing strip partner that
    /// points back to it.
    ///
    /// # Errors
    /// Returns [`Error::InvalidDescription`] describing the first broken pair.
    pub fn validate(&self) -> Result<()> {
        for module in self.modules.values() {
            let ModuleKind::Strip { partner, length } = module.kind else {
                continue;
            };
            if !(length.is_finite() && length > 0.0) {
                return Err(Error::InvalidDescription(format!(
                    "strip module {} has non-positive length {length}",
                    module.id
                )));
            }
            if partner == module.id {
                return Err(Error::InvalidDescription(format!(
                    "strip module {} is paired with itself",
                    module.id
                )));
            }
            let Some(other) = self.modules.get(&partner) else {
                return Err(Error::InvalidDescription(format!(
                    "strip module {} references missing partner {partner}",
                    module.id
                )));
            };
            if other.kind.partner() != Some(module.id) {
                return Err(Error::InvalidDescription(format!(
                    "strip pairing {} -> {partner} is not reciprocal",
                    module.id
                )));
            }
        }
        Ok(())
    }
}

impl GeometryLookup for Geometry {
    fn module(&self, id: ModuleId) -> Option<&ModuleDescriptor> {
        self.modules.get(&id)
    }
}

impl FromIterator<ModuleDescriptor> for Geometry {
    /// Later duplicates replace earlier ones.
    fn from_iter<I: IntoIterator<Item = ModuleDescriptor>>(iter: I) -> Self {
        Self {
            modules: iter.into_iter().map(|m| (m.id, m)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trackpix_core::Transform3;

    #[test]
    fn test_insert_and_lookup() {
        let mut geometry = Geometry::new();
        geometry
            .insert(ModuleDescriptor::pixel(ModuleId(1), Transform3::identity()))
            .unwrap();
        assert_eq!(geometry.len(), 1);
        assert!(geometry.contains(ModuleId(1)));
        assert!(matches!(
            geometry.insert(ModuleDescriptor::pixel(ModuleId(1), Transform3::identity())),
            Err(Error::DuplicateModule(_))
        ));
    }

    #[test]
    fn test_strip_pairs_must_be_reciprocal() {
        let t = Transform3::identity();
        let geometry: Geometry = [
            ModuleDescriptor::strip(ModuleId(1), ModuleId(2), 10.0, t),
            ModuleDescriptor::strip(ModuleId(2), ModuleId(1), 10.0, t),
        ]
        .into_iter()
        .collect();
        assert!(geometry.validate().is_ok());

        let broken: Geometry = [
            ModuleDescriptor::strip(ModuleId(1), ModuleId(2), 10.0, t),
            ModuleDescriptor::pixel(ModuleId(2), t),
        ]
        .into_iter()
        .collect();
        let err = broken.validate().unwrap_err().to_string();
        assert!(err.contains("not reciprocal"), "unexpected: {err}");

        let orphan: Geometry = [ModuleDescriptor::strip(ModuleId(1), ModuleId(9), 10.0, t)]
            .into_iter()
            .collect();
        assert!(orphan.validate().is_err());
    }
}
