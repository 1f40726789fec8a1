//! Fixed-capacity bitmap for slot tracking.

/// A bitmap tracking which slots of a fixed-capacity table are in use.
///
/// Each bit represents one slot: 0 = free, 1 = allocated. The bitmap is
/// owned by a single structure (a registry or a pool's descriptor table), so
/// plain words suffice; all mutation goes through `&mut self`.
///
/// # Performance
///
/// - `acquire_slot`: O(n/64) worst case, where n is number of slots
/// - `release_slot`: O(1)
#[derive(Debug, Clone)]
pub struct SlotBitmap {
    words: Box<[u64]>,
    /// Total number of slots (may be less than words.len() * 64).
    num_slots: usize,
    allocated: usize,
}

impl SlotBitmap {
    /// Create a new bitmap with all slots free.
    ///
    /// # Arguments
    ///
    /// * `num_slots` - Number of slots to track.
    pub fn new(num_slots: usize) -> Self {
        Self {
            words: vec![0u64; num_slots.div_ceil(64)].into_boxed_slice(),
            num_slots,
            allocated: 0,
        }
    }

    /// Acquire the lowest-numbered free slot.
    ///
    /// Returns the slot index, or `None` if every slot is allocated.
    pub fn acquire_slot(&mut self) -> Option<usize> {
        for (word_idx, word) in self.words.iter_mut().enumerate() {
            if *word == u64::MAX {
                continue;
            }
            let bit_idx = (!*word).trailing_zeros() as usize;
            let slot_idx = word_idx * 64 + bit_idx;
            if slot_idx >= self.num_slots {
                return None;
            }
            *word |= 1u64 << bit_idx;
            self.allocated += 1;
            return Some(slot_idx);
        }
        None
    }

    /// Release a previously acquired slot.
    ///
    /// Returns `false` if the slot was not allocated.
    ///
    /// # Panics
    ///
    /// Panics if `slot_idx` is out of bounds.
    pub fn release_slot(&mut self, slot_idx: usize) -> bool {
        assert!(slot_idx < self.num_slots, "slot index out of bounds");

        let mask = 1u64 << (slot_idx % 64);
        let word = &mut self.words[slot_idx / 64];
        if *word & mask == 0 {
            return false;
        }
        *word &= !mask;
        self.allocated -= 1;
        true
    }

    /// Check if a slot is currently allocated.
    ///
    /// Out-of-range indices report `false`.
    pub fn is_allocated(&self, slot_idx: usize) -> bool {
        if slot_idx >= self.num_slots {
            return false;
        }
        self.words[slot_idx / 64] & (1u64 << (slot_idx % 64)) != 0
    }

    /// Mark every slot free.
    pub fn clear(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
        self.allocated = 0;
    }

    /// Number of free slots.
    #[inline]
    pub fn count_free(&self) -> usize {
        self.num_slots - self.allocated
    }

    /// Number of allocated slots.
    #[inline]
    pub fn count_allocated(&self) -> usize {
        self.allocated
    }

    /// Get the total number of slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.num_slots
    }

    /// Iterate over allocated slot indices in ascending order.
    pub fn iter_allocated(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.num_slots).filter(|&i| self.is_allocated(i))
    }
}
