//! Bounded output buffer filled concurrently by the seed search.

use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use trackpix_core::SeedingError;

/// Fixed-capacity buffer with atomic slot reservation.
///
/// Writers reserve a contiguous range of slots and fill it without further
/// synchronisation. A reservation that does not fit is refused; the total
/// number of requested slots is still recorded so the overflow can be
/// reported.
#[derive(Debug)]
pub struct TripletBuffer<T> {
    slots: Vec<OnceLock<T>>,
    requested: AtomicUsize,
}

impl<T> TripletBuffer<T> {
    /// Creates a buffer holding at most `capacity` items.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| OnceLock::new()).collect(),
            requested: AtomicUsize::new(0),
        }
    }

    /// Maximum number of items.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots requested so far, including refused reservations.
    #[must_use]
    pub fn requested(&self) -> usize {
        self.requested.load(Ordering::Acquire)
    }

    /// Returns true if a reservation has been refused.
    #[must_use]
    pub fn overflowed(&self) -> bool {
        self.requested() > self.capacity()
    }

    /// Reserves `count` consecutive slots.
    ///
    /// # Errors
    /// Returns [`SeedingError::BufferOverflow`] if the slots do not fit.
    pub fn reserve(&self, count: usize) -> Result<Range<usize>, SeedingError> {
        let start = self.requested.fetch_add(count, Ordering::AcqRel);
        let end = start.saturating_add(count);
        if end > self.capacity() {
            return Err(SeedingError::BufferOverflow {
                capacity: self.capacity(),
                requested: end,
            });
        }
        Ok(start..end)
    }

    /// Reserves space for `items` and writes them.
    ///
    /// # Errors
    /// Returns [`SeedingError::BufferOverflow`] if the items do not fit;
    /// nothing is written in that case.
    pub fn push_all(&self, items: Vec<T>) -> Result<(), SeedingError> {
        if items.is_empty() {
            return Ok(());
        }
        let range = self.reserve(items.len())?;
        for (slot, item) in self.slots[range].iter().zip(items) {
            // Reserved ranges are disjoint, so every slot is set once.
            let _ = slot.set(item);
        }
        Ok(())
    }

    /// Number of filled slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.get().is_some()).count()
    }

    /// Returns true if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consumes the buffer, returning the written items in slot order.
    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        self.slots.into_iter().filter_map(OnceLock::into_inner).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn test_reserve_and_collect() {
        let buffer = TripletBuffer::with_capacity(5);
        buffer.push_all(vec![1, 2]).unwrap();
        buffer.push_all(Vec::new()).unwrap();
        buffer.push_all(vec![3]).unwrap();
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.requested(), 3);
        assert!(!buffer.overflowed());
        assert_eq!(buffer.into_vec(), vec![1, 2, 3]);
    }

    #[test]
    fn test_overflow_is_reported() {
        let buffer = TripletBuffer::with_capacity(3);
        buffer.push_all(vec![1, 2]).unwrap();
        let err = buffer.push_all(vec![3, 4]).unwrap_err();
        assert_eq!(
            err,
            SeedingError::BufferOverflow {
                capacity: 3,
                requested: 4
            }
        );
        assert!(buffer.overflowed());
        assert_eq!(buffer.into_vec(), vec![1, 2]);
    }

    #[test]
    fn test_concurrent_writers() {
        let buffer = TripletBuffer::with_capacity(400);
        (0..100usize).into_par_iter().for_each(|i| {
            buffer.push_all(vec![i * 4, i * 4 + 1, i * 4 + 2, i * 4 + 3]).unwrap();
        });
        let mut items = buffer.into_vec();
        items.sort_unstable();
        assert_eq!(items, (0..400).collect::<Vec<_>>());
    }

    #[test]
    fn test_zero_capacity() {
        let buffer: TripletBuffer<u8> = TripletBuffer::with_capacity(0);
        assert!(buffer.push_all(Vec::new()).is_ok());
        assert!(buffer.push_all(vec![1]).is_err());
        assert!(buffer.is_empty());
    }
}
