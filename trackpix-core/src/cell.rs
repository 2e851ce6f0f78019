//! Cell types for raw sensor readout.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identifier of a detector module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ModuleId(pub u64);

impl ModuleId {
    /// Creates a new module identifier.
    #[inline]
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw identifier.
    #[inline]
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Channel coordinate of a cell within its module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChannelCoord {
    /// First channel index (local x / strip number).
    pub channel0: u32,
    /// Second channel index (local y, zero for strips).
    pub channel1: u32,
}

impl ChannelCoord {
    /// Creates a new channel coordinate.
    #[inline]
    #[must_use]
    pub fn new(channel0: u32, channel1: u32) -> Self {
        Self { channel0, channel1 }
    }

    /// Checks if this coordinate touches another (8-connectivity).
    ///
    /// A coordinate is not adjacent to itself.
    #[inline]
    #[must_use]
    pub fn is_adjacent(&self, other: &Self) -> bool {
        let d0 = self.channel0.abs_diff(other.channel0);
        let d1 = self.channel1.abs_diff(other.channel1);
        d0 <= 1 && d1 <= 1 && (d0 != 0 || d1 != 0)
    }

    /// Checks if both coordinates address the same channel.
    #[inline]
    #[must_use]
    pub fn same_channel(&self, other: &Self) -> bool {
        self == other
    }
}

/// One activated sensor element.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Cell {
    /// Channel coordinate.
    pub coord: ChannelCoord,
    /// Activation (deposited charge proxy).
    pub activation: f32,
    /// Time stamp in nanoseconds.
    pub time: f32,
    /// Owning module.
    pub module: ModuleId,
}

impl Cell {
    /// Creates a new cell.
    #[inline]
    #[must_use]
    pub fn new(channel0: u32, channel1: u32, activation: f32, time: f32, module: ModuleId) -> Self {
        Self {
            coord: ChannelCoord::new(channel0, channel1),
            activation,
            time,
            module,
        }
    }

    /// Returns the first channel index.
    #[inline]
    #[must_use]
    pub fn channel0(&self) -> u32 {
        self.coord.channel0
    }

    /// Returns the second channel index.
    #[inline]
    #[must_use]
    pub fn channel1(&self) -> u32 {
        self.coord.channel1
    }

    /// Checks whether two cells are neighbours on the same module.
    #[inline]
    #[must_use]
    pub fn touches(&self, other: &Self) -> bool {
        self.module == other.module && self.coord.is_adjacent(&other.coord)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_adjacency() {
        let center = ChannelCoord::new(5, 5);

        assert!(center.is_adjacent(&ChannelCoord::new(4, 4)));
        assert!(center.is_adjacent(&ChannelCoord::new(5, 4)));
        assert!(center.is_adjacent(&ChannelCoord::new(6, 6)));

        assert!(!center.is_adjacent(&center));

        assert!(!center.is_adjacent(&ChannelCoord::new(7, 5)));
        assert!(!center.is_adjacent(&ChannelCoord::new(5, 7)));
    }

    #[test]
    fn test_adjacency_at_channel_zero() {
        let origin = ChannelCoord::new(0, 0);
        assert!(origin.is_adjacent(&ChannelCoord::new(1, 0)));
        assert!(origin.is_adjacent(&ChannelCoord::new(1, 1)));
        assert!(!origin.is_adjacent(&ChannelCoord::new(2, 0)));
    }

    #[test]
    fn test_cells_on_different_modules_never_touch() {
        let a = Cell::new(10, 10, 1.0, 0.0, ModuleId(1));
        let b = Cell::new(11, 10, 1.0, 0.0, ModuleId(2));
        let c = Cell::new(11, 10, 1.0, 0.0, ModuleId(1));
        assert!(!a.touches(&b));
        assert!(a.touches(&c));
    }

    #[test]
    fn test_module_id_display() {
        assert_eq!(ModuleId::new(255).to_string(), "0xff");
        assert_eq!(ModuleId(7).value(), 7);
    }
}
