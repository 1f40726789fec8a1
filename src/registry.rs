//! Fixed-capacity record registries with typed handles.
//!
//! Frames and tiles live in [`SlotRegistry`] tables owned by the manager.
//! Callers hold small copyable handles ([`FrameId`], [`TileId`]) instead of
//! pointers. A handle remembers which registry issued it, so a handle from
//! one manager is rejected by another.

use crate::memory::SlotBitmap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, Ordering};

/// Global counter for generating unique registry IDs.
static REGISTRY_ID_COUNTER: AtomicU32 = AtomicU32::new(1);

fn next_registry_id() -> u32 {
    REGISTRY_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Position of a record inside a specific registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot {
    registry: u32,
    index: u16,
}

impl Slot {
    /// Index of the record within its registry.
    #[inline]
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

/// A typed handle wrapping a [`Slot`].
pub trait SlotHandle: Copy {
    /// Wrap a slot.
    fn from_slot(slot: Slot) -> Self;
    /// The wrapped slot.
    fn slot(self) -> Slot;
}

/// Handle to a frame record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(Slot);

/// Handle to a tile record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileId(Slot);

impl SlotHandle for FrameId {
    fn from_slot(slot: Slot) -> Self {
        FrameId(slot)
    }
    fn slot(self) -> Slot {
        self.0
    }
}

impl SlotHandle for TileId {
    fn from_slot(slot: Slot) -> Self {
        TileId(slot)
    }
    fn slot(self) -> Slot {
        self.0
    }
}

impl FrameId {
    /// Index of the frame within its registry.
    pub fn index(&self) -> usize {
        self.0.index()
    }
}

impl TileId {
    /// Index of the tile within its registry.
    pub fn index(&self) -> usize {
        self.0.index()
    }
}

/// A fixed-capacity table of records addressed by handle.
///
/// Records never move while allocated. Capacity is fixed at construction;
/// [`insert`](Self::insert) hands back the record when the table is full.
///
/// # Example
///
/// ```rust
/// use tiledma::registry::{SlotRegistry, TileId};
///
/// let mut reg: SlotRegistry<&str, TileId> = SlotRegistry::with_capacity(2);
/// let a = reg.insert("a").unwrap();
/// let _b = reg.insert("b").unwrap();
/// assert_eq!(reg.insert("c"), Err("c"));
///
/// assert_eq!(reg.remove(a), Some("a"));
/// assert!(reg.get(a).is_none());
/// ```
pub struct SlotRegistry<T, H> {
    records: Box<[Option<T>]>,
    used: SlotBitmap,
    id: u32,
    _handle: PhantomData<H>,
}

impl<T, H: SlotHandle> SlotRegistry<T, H> {
    /// Create an empty registry.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` exceeds [`MAX_REGISTRY_CAPACITY`](crate::defaults::MAX_REGISTRY_CAPACITY).
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(
            capacity <= crate::defaults::MAX_REGISTRY_CAPACITY,
            "registry capacity exceeds handle range"
        );
        Self {
            records: (0..capacity).map(|_| None).collect(),
            used: SlotBitmap::new(capacity),
            id: next_registry_id(),
            _handle: PhantomData,
        }
    }

    /// Store `record` in the lowest free slot.
    ///
    /// Returns the record back as `Err` when every slot is taken.
    pub fn insert(&mut self, record: T) -> Result<H, T> {
        let Some(index) = self.used.acquire_slot() else {
            return Err(record);
        };
        self.records[index] = Some(record);
        Ok(H::from_slot(Slot {
            registry: self.id,
            index: index as u16,
        }))
    }

    /// Release the slot behind `handle`, returning its record.
    ///
    /// Returns `None` for a handle that is unallocated, out of range, or
    /// issued by another registry.
    pub fn remove(&mut self, handle: H) -> Option<T> {
        let index = self.locate(handle)?;
        self.used.release_slot(index);
        self.records[index].take()
    }

    /// Release every slot.
    pub fn clear(&mut self) {
        self.records.iter_mut().for_each(|r| *r = None);
        self.used.clear();
    }

    fn locate(&self, handle: H) -> Option<usize> {
        let slot = handle.slot();
        (slot.registry == self.id && self.used.is_allocated(slot.index())).then_some(slot.index())
    }

    /// Check whether `handle` refers to a live record here.
    pub fn contains(&self, handle: H) -> bool {
        self.locate(handle).is_some()
    }

    /// Borrow the record behind `handle`.
    pub fn get(&self, handle: H) -> Option<&T> {
        self.locate(handle).and_then(|i| self.records[i].as_ref())
    }

    /// Mutably borrow the record behind `handle`.
    pub fn get_mut(&mut self, handle: H) -> Option<&mut T> {
        self.locate(handle).and_then(|i| self.records[i].as_mut())
    }

    /// Iterate over live records in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (H, &T)> + '_ {
        let id = self.id;
        self.records.iter().enumerate().filter_map(move |(i, r)| {
            r.as_ref().map(|r| {
                (
                    H::from_slot(Slot {
                        registry: id,
                        index: i as u16,
                    }),
                    r,
                )
            })
        })
    }

    /// Number of live records.
    #[inline]
    pub fn len(&self) -> usize {
        self.used.count_allocated()
    }

    /// Returns true if no records are live.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if every slot is taken.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.used.count_free() == 0
    }

    /// Total number of slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.used.capacity()
    }
}

impl<T: std::fmt::Debug, H: SlotHandle> std::fmt::Debug for SlotRegistry<T, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotRegistry")
            .field("id", &self.id)
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_until_full() {
        let mut reg: SlotRegistry<u32, FrameId> = SlotRegistry::with_capacity(3);
        let handles: Vec<_> = (0..3).map(|v| reg.insert(v).unwrap()).collect();
        assert!(reg.is_full());
        assert_eq!(reg.insert(99), Err(99));
        assert_eq!(handles[2].index(), 2);
        assert_eq!(reg.get(handles[1]), Some(&1));
    }

    #[test]
    fn test_remove_recycles_lowest_slot() {
        let mut reg: SlotRegistry<u32, TileId> = SlotRegistry::with_capacity(4);
        let a = reg.insert(10).unwrap();
        let b = reg.insert(20).unwrap();
        reg.insert(30).unwrap();

        assert_eq!(reg.remove(a), Some(10));
        assert_eq!(reg.remove(a), None, "double free is rejected");
        assert_eq!(reg.len(), 2);

        let d = reg.insert(40).unwrap();
        assert_eq!(d.index(), 0);
        *reg.get_mut(b).unwrap() += 1;
        assert_eq!(reg.get(b), Some(&21));
    }

    #[test]
    fn test_foreign_handles_rejected() {
        let mut one: SlotRegistry<u8, TileId> = SlotRegistry::with_capacity(2);
        let mut two: SlotRegistry<u8, TileId> = SlotRegistry::with_capacity(2);
        let h = one.insert(1).unwrap();
        two.insert(2).unwrap();

        assert!(one.contains(h));
        assert!(!two.contains(h));
        assert_eq!(two.remove(h), None);
        assert_eq!(two.len(), 1);
    }

    #[test]
    fn test_clear_and_iter() {
        let mut reg: SlotRegistry<char, FrameId> = SlotRegistry::with_capacity(4);
        let a = reg.insert('a').unwrap();
        reg.insert('b').unwrap();
        reg.insert('c').unwrap();
        reg.remove(a);

        let live: Vec<_> = reg.iter().map(|(h, v)| (h.index(), *v)).collect();
        assert_eq!(live, vec![(1, 'b'), (2, 'c')]);

        reg.clear();
        assert!(reg.is_empty());
        assert_eq!(reg.iter().count(), 0);
        assert_eq!(reg.capacity(), 4);
    }
}
