//! Structure of Arrays (`SoA`) storage for event cells.
//!
//! `CellBatch` stores the cells of one event in parallel vectors rather
//! than an array of structs. Cells of many modules are interleaved in
//! readout order; [`CellBatch::group_by_module`] recovers the per-module
//! partition the clusterizer works on.

use std::collections::HashMap;

use crate::cell::{Cell, ChannelCoord, ModuleId};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The cells of one event stored in Structure of Arrays (`SoA`) format.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CellBatch {
    /// Columnar storage for the first channel index.
    pub channel0: Vec<u32>,
    /// Columnar storage for the second channel index.
    pub channel1: Vec<u32>,
    /// Columnar storage for activations.
    pub activation: Vec<f32>,
    /// Columnar storage for time stamps.
    pub time: Vec<f32>,
    /// Columnar storage for owning modules.
    pub module: Vec<ModuleId>,
}

/// Indices of the cells that belong to one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleCells {
    /// Module the cells belong to.
    pub module: ModuleId,
    /// Positions of the cells in the owning batch.
    pub indices: Vec<usize>,
}

impl CellBatch {
    /// Creates a new empty batch with specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channel0: Vec::with_capacity(capacity),
            channel1: Vec::with_capacity(capacity),
            activation: Vec::with_capacity(capacity),
            time: Vec::with_capacity(capacity),
            module: Vec::with_capacity(capacity),
        }
    }

    /// Returns the number of cells in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channel0.len()
    }

    /// Returns true if the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channel0.is_empty()
    }

    /// Clears all vectors in the batch.
    pub fn clear(&mut self) {
        self.channel0.clear();
        self.channel1.clear();
        self.activation.clear();
        self.time.clear();
        self.module.clear();
    }

    /// Appends all cells from another batch to this one.
    pub fn append(&mut self, other: &CellBatch) {
        self.channel0.extend_from_slice(&other.channel0);
        self.channel1.extend_from_slice(&other.channel1);
        self.activation.extend_from_slice(&other.activation);
        self.time.extend_from_slice(&other.time);
        self.module.extend_from_slice(&other.module);
    }

    /// Pushes a single cell into the batch.
    pub fn push(&mut self, channel0: u32, channel1: u32, activation: f32, time: f32, module: ModuleId) {
        self.channel0.push(channel0);
        self.channel1.push(channel1);
        self.activation.push(activation);
        self.time.push(time);
        self.module.push(module);
    }

    /// Pushes a [`Cell`] into the batch.
    pub fn push_cell(&mut self, cell: &Cell) {
        self.push(
            cell.coord.channel0,
            cell.coord.channel1,
            cell.activation,
            cell.time,
            cell.module,
        );
    }

    /// Returns the cell at `index`, or `None` when out of range.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Cell> {
        if index >= self.len() {
            return None;
        }
        Some(Cell {
            coord: ChannelCoord::new(self.channel0[index], self.channel1[index]),
            activation: self.activation[index],
            time: self.time[index],
            module: self.module[index],
        })
    }

    /// Iterates over the cells in storage order.
    pub fn iter(&self) -> impl Iterator<Item = Cell> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }

    /// Partitions the batch by module.
    ///
    /// Modules appear in order of their first cell; cell indices within a
    /// module keep storage order.
    #[must_use]
    pub fn group_by_module(&self) -> Vec<ModuleCells> {
        let mut slots: HashMap<ModuleId, usize> = HashMap::new();
        let mut groups: Vec<ModuleCells> = Vec::new();

        for (index, &module) in self.module.iter().enumerate() {
            let slot = *slots.entry(module).or_insert_with(|| {
                groups.push(ModuleCells {
                    module,
                    indices: Vec::new(),
                });
                groups.len() - 1
            });
            groups[slot].indices.push(index);
        }

        groups
    }
}

impl FromIterator<Cell> for CellBatch {
    fn from_iter<I: IntoIterator<Item = Cell>>(iter: I) -> Self {
        let mut batch = CellBatch::default();
        for cell in iter {
            batch.push_cell(&cell);
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_batch_operations() {
        let mut batch = CellBatch::with_capacity(10);
        assert!(batch.is_empty());

        batch.push(10, 20, 0.5, 1.0, ModuleId(3));
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.channel0[0], 10);
        assert_eq!(batch.get(0).map(|c| c.module), Some(ModuleId(3)));
        assert!(batch.get(1).is_none());

        batch.push(11, 21, 0.6, 1.0, ModuleId(3));
        assert_eq!(batch.len(), 2);

        batch.clear();
        assert!(batch.is_empty());
        assert_eq!(batch.len(), 0);
    }

    #[test]
    fn test_append_keeps_order() {
        let mut first = CellBatch::default();
        first.push(1, 2, 1.0, 0.5, ModuleId(4));
        let mut second = CellBatch::default();
        second.push(3, 4, 2.0, 1.5, ModuleId(9));
        second.push(5, 6, 3.0, 2.5, ModuleId(4));

        first.append(&second);
        assert_eq!(first.len(), 3);
        assert_eq!(first.channel0, vec![1, 3, 5]);
        assert_eq!(first.module, vec![ModuleId(4), ModuleId(9), ModuleId(4)]);
        assert_eq!(first.group_by_module()[0].indices, vec![0, 2]);
        assert_eq!(second.len(), 2);
    }

    #[test]
    fn test_group_by_module_first_appearance() {
        let batch: CellBatch = [
            Cell::new(0, 0, 1.0, 0.0, ModuleId(7)),
            Cell::new(1, 0, 1.0, 0.0, ModuleId(2)),
            Cell::new(2, 0, 1.0, 0.0, ModuleId(7)),
            Cell::new(3, 0, 1.0, 0.0, ModuleId(5)),
        ]
        .into_iter()
        .collect();

        let groups = batch.group_by_module();
        let modules: Vec<ModuleId> = groups.iter().map(|g| g.module).collect();
        assert_eq!(modules, vec![ModuleId(7), ModuleId(2), ModuleId(5)]);
        assert_eq!(groups[0].indices, vec![0, 2]);
        assert_eq!(groups[1].indices, vec![1]);
    }

    #[test]
    fn test_group_by_module_empty() {
        assert!(CellBatch::default().group_by_module().is_empty());
    }
}
