//! SlotStorage - Lowest-free-index storage
//!
//! Hands out the smallest unused index on every insertion so that the highest
//! occupied index (the watermark) stays as low as possible. Consumers that scan
//! a fixed-size GPU array only need to look at `0..=max_index()`.

use alloc::vec::Vec;

/// Fixed-capacity storage addressed by small integer slots
#[derive(Clone, Debug)]
pub struct SlotStorage<T> {
    /// Grows on demand up to `capacity`
    slots: Vec<Option<T>>,
    capacity: usize,
    len: usize,
    /// Highest occupied slot, None when empty
    max_index: Option<u32>,
}

impl<T> SlotStorage<T> {
    /// Create an empty storage that will never hand out a slot >= `capacity`
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            capacity,
            len: 0,
            max_index: None,
        }
    }

    /// Find the lowest free slot
    pub fn find_slot(&self) -> Option<u32> {
        self.find_consecutive_slots(1)
    }

    /// Find the lowest slot starting a run of `count` free slots
    pub fn find_consecutive_slots(&self, count: usize) -> Option<u32> {
        if count == 0 || count > self.capacity {
            return None;
        }

        let mut run_start = 0usize;
        let mut run_len = 0usize;

        for (i, slot) in self.slots.iter().enumerate() {
            if slot.is_some() {
                run_len = 0;
                run_start = i + 1;
                continue;
            }
            run_len += 1;
            if run_len == count {
                return Some(run_start as u32);
            }
        }

        // Slots past the end of the vector are free
        if run_start + count <= self.capacity {
            Some(run_start as u32)
        } else {
            None
        }
    }

    /// Store a value in a specific slot
    ///
    /// Returns false if the slot is out of range or already taken.
    pub fn reserve_slot(&mut self, slot: u32, value: T) -> bool {
        let index = slot as usize;
        if index >= self.capacity {
            return false;
        }
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, || None);
        }
        if self.slots[index].is_some() {
            return false;
        }

        self.slots[index] = Some(value);
        self.len += 1;
        self.max_index = Some(self.max_index.map_or(slot, |m| m.max(slot)));
        true
    }

    /// Store a value in the lowest free slot
    pub fn insert(&mut self, value: T) -> Option<u32> {
        let slot = self.find_slot()?;
        self.reserve_slot(slot, value);
        Some(slot)
    }

    /// Release a slot, returning its value
    pub fn free_slot(&mut self, slot: u32) -> Option<T> {
        let value = self.slots.get_mut(slot as usize)?.take()?;
        self.len -= 1;

        if self.max_index == Some(slot) {
            self.max_index = self.slots[..slot as usize]
                .iter()
                .rposition(Option::is_some)
                .map(|i| i as u32);
            self.slots.truncate(slot as usize);
        }

        Some(value)
    }

    /// Release `count` slots starting at `slot`
    pub fn free_consecutive_slots(&mut self, slot: u32, count: usize) -> Vec<T> {
        (0..count as u32)
            .filter_map(|offset| self.free_slot(slot + offset))
            .collect()
    }

    /// Get a value by slot
    pub fn get(&self, slot: u32) -> Option<&T> {
        self.slots.get(slot as usize)?.as_ref()
    }

    /// Get a mutable value by slot
    pub fn get_mut(&mut self, slot: u32) -> Option<&mut T> {
        self.slots.get_mut(slot as usize)?.as_mut()
    }

    /// Check if a slot is occupied
    pub fn contains(&self, slot: u32) -> bool {
        self.get(slot).is_some()
    }

    /// Highest occupied slot
    pub fn max_index(&self) -> Option<u32> {
        self.max_index
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Maximum number of slots
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate occupied slots in index order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|v| (i as u32, v)))
    }

    /// Iterate occupied slots mutably in index order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u32, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_mut().map(|v| (i as u32, v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowest_free_slot() {
        let mut storage = SlotStorage::new(8);

        assert_eq!(storage.insert("a"), Some(0));
        assert_eq!(storage.insert("b"), Some(1));
        assert_eq!(storage.insert("c"), Some(2));

        storage.free_slot(1);
        assert_eq!(storage.insert("d"), Some(1));
        assert_eq!(storage.get(1), Some(&"d"));
        assert_eq!(storage.len(), 3);
    }

    #[test]
    fn test_max_index_watermark() {
        let mut storage = SlotStorage::new(8);
        assert_eq!(storage.max_index(), None);

        storage.insert(10);
        storage.insert(11);
        storage.insert(12);
        assert_eq!(storage.max_index(), Some(2));

        // Freeing a hole does not move the watermark
        storage.free_slot(1);
        assert_eq!(storage.max_index(), Some(2));

        // Freeing the top walks down past holes
        storage.free_slot(2);
        assert_eq!(storage.max_index(), Some(0));

        storage.free_slot(0);
        assert_eq!(storage.max_index(), None);
        assert!(storage.is_empty());
    }

    #[test]
    fn test_consecutive_slots() {
        let mut storage = SlotStorage::new(16);
        storage.reserve_slot(0, 'a');
        storage.reserve_slot(3, 'b');

        // Gap 1..3 is too small for 3 slots
        assert_eq!(storage.find_consecutive_slots(2), Some(1));
        assert_eq!(storage.find_consecutive_slots(3), Some(4));
        assert_eq!(storage.find_consecutive_slots(6), Some(4));
    }

    #[test]
    fn test_capacity_limit() {
        let mut storage = SlotStorage::new(2);
        assert!(storage.insert(1).is_some());
        assert!(storage.insert(2).is_some());
        assert_eq!(storage.insert(3), None);
        assert_eq!(storage.find_consecutive_slots(3), None);
        assert!(!storage.reserve_slot(5, 4));
    }

    #[test]
    fn test_reserve_taken_slot() {
        let mut storage = SlotStorage::new(4);
        assert!(storage.reserve_slot(2, 'x'));
        assert!(!storage.reserve_slot(2, 'y'));
        assert_eq!(storage.get(2), Some(&'x'));
    }

    #[test]
    fn test_free_consecutive() {
        let mut storage = SlotStorage::new(8);
        for v in 0..6 {
            storage.insert(v);
        }

        let freed = storage.free_consecutive_slots(2, 3);
        assert_eq!(freed, vec![2, 3, 4]);
        assert_eq!(storage.len(), 3);
        assert_eq!(storage.find_consecutive_slots(3), Some(2));
    }

    #[test]
    fn test_iter_order() {
        let mut storage = SlotStorage::new(8);
        storage.reserve_slot(4, 'c');
        storage.reserve_slot(1, 'a');
        storage.reserve_slot(2, 'b');

        let slots: Vec<_> = storage.iter().map(|(slot, v)| (slot, *v)).collect();
        assert_eq!(slots, vec![(1, 'a'), (2, 'b'), (4, 'c')]);
    }
}
