//! FIFO of outstanding tile transfers.

use crate::dma::TransferHandle;
use crate::registry::TileId;

/// One queued transfer: the tile it serves and the handle to wait on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueEntry {
    /// Tile the transfer fills or drains.
    pub tile: TileId,
    /// Handle of the last request issued; [`TransferHandle::NOOP`] when
    /// nothing was transferred.
    pub handle: TransferHandle,
    /// Tile whose data this transfer copies, released when it retires.
    pub previous: Option<TileId>,
}

/// Fixed-capacity ring of [`QueueEntry`]s in submission order.
///
/// Entries are retired strictly from the front, matching the completion
/// order of the transfer engine.
#[derive(Debug, Clone)]
pub struct TransferQueue {
    entries: Box<[Option<QueueEntry>]>,
    start: usize,
    len: usize,
}

impl TransferQueue {
    /// An empty queue holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: vec![None; capacity].into_boxed_slice(),
            start: 0,
            len: 0,
        }
    }

    /// Append an entry. Hands it back if the queue is full.
    pub fn push(&mut self, entry: QueueEntry) -> Result<(), QueueEntry> {
        if self.is_full() {
            return Err(entry);
        }
        let slot = (self.start + self.len) % self.entries.len();
        self.entries[slot] = Some(entry);
        self.len += 1;
        Ok(())
    }

    /// Oldest entry.
    pub fn front(&self) -> Option<&QueueEntry> {
        if self.len == 0 {
            return None;
        }
        self.entries[self.start].as_ref()
    }

    /// Remove and return the oldest entry.
    pub fn pop_front(&mut self) -> Option<QueueEntry> {
        if self.len == 0 {
            return None;
        }
        let entry = self.entries[self.start].take();
        self.start = (self.start + 1) % self.entries.len();
        self.len -= 1;
        entry
    }

    /// Entries oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &QueueEntry> + '_ {
        (0..self.len).filter_map(move |i| self.entries[(self.start + i) % self.entries.len()].as_ref())
    }

    /// Returns true if `tile` has an entry.
    pub fn contains(&self, tile: TileId) -> bool {
        self.iter().any(|e| e.tile == tile)
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.iter_mut().for_each(|e| *e = None);
        self.start = 0;
        self.len = 0;
    }

    /// Number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if there are no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns true if no more entries fit.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == self.entries.len()
    }

    /// Maximum number of entries.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SlotRegistry;

    fn tiles(n: usize) -> Vec<TileId> {
        let mut reg: SlotRegistry<(), TileId> = SlotRegistry::with_capacity(n);
        (0..n).map(|_| reg.insert(()).unwrap()).collect()
    }

    fn entry(tile: TileId, id: u32) -> QueueEntry {
        QueueEntry {
            tile,
            handle: TransferHandle::new(id),
            previous: None,
        }
    }

    #[test]
    fn test_fifo_order_and_wrap() {
        let ids = tiles(4);
        let mut q = TransferQueue::new(3);

        for (i, &t) in ids.iter().take(3).enumerate() {
            q.push(entry(t, i as u32)).unwrap();
        }
        assert!(q.is_full());
        assert_eq!(q.push(entry(ids[3], 9)), Err(entry(ids[3], 9)));

        assert_eq!(q.pop_front().unwrap().tile, ids[0]);
        q.push(entry(ids[3], 3)).unwrap();

        let order: Vec<_> = q.iter().map(|e| e.handle.id()).collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert!(q.contains(ids[3]));
        assert!(!q.contains(ids[0]));
    }

    #[test]
    fn test_drain_and_clear() {
        let ids = tiles(2);
        let mut q = TransferQueue::new(2);
        q.push(entry(ids[0], 0)).unwrap();
        q.push(entry(ids[1], 1)).unwrap();

        assert_eq!(q.front().map(|e| e.tile), Some(ids[0]));
        q.clear();
        assert!(q.is_empty());
        assert_eq!(q.front(), None);
        assert_eq!(q.pop_front(), None);
        assert_eq!(q.capacity(), 2);
    }
}
