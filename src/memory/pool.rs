//! Segregated-fit pool allocator over a fixed address range.

use super::SlotBitmap;
use crate::defaults;
use thiserror::Error;
use tracing::trace;

/// Errors reported by [`PoolAllocator`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// No free block can hold the request plus its alignment padding.
    #[error("out of memory: no free block holds {requested} bytes")]
    OutOfMemory {
        /// Bytes requested by the caller.
        requested: usize,
    },

    /// Splitting a block needs a descriptor and none is left.
    #[error("block descriptors exhausted")]
    DescriptorsExhausted,

    /// Alignment is zero or not a power of two.
    #[error("alignment {0} is not a power of two")]
    BadAlignment(usize),

    /// Zero-byte allocations are rejected.
    #[error("allocation size is zero")]
    ZeroSize,

    /// Pool parameters are unusable.
    #[error("invalid pool: {0}")]
    InvalidPool(&'static str),
}

/// Tunables for a [`PoolAllocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of block descriptors; caps how many blocks may exist at once.
    pub descriptors: usize,
    /// Leftovers of this many bytes or fewer are not split off.
    pub min_split: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            descriptors: defaults::BLOCK_DESCRIPTORS,
            min_split: defaults::MIN_SPLIT_SIZE,
        }
    }
}

/// Byte accounting for one pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Bytes in free blocks.
    pub free_bytes: usize,
    /// Bytes in allocated blocks, including alignment padding and slack.
    pub allocated_bytes: usize,
    /// Bytes lost in front of allocations to satisfy alignment.
    pub alignment_padding: usize,
    /// Number of live allocations.
    pub live_allocations: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct Block {
    start: usize,
    size: usize,
    /// Address handed to the caller; equals `start` for free blocks.
    aligned: usize,
    next: Option<usize>,
}

/// First-fit allocator managing one contiguous address range.
///
/// Works purely on addresses, so it can manage memory it never dereferences
/// (a device-local bank, or any caller-owned range).
///
/// # Design
///
/// - Block descriptors live in a fixed table outside the managed range, so
///   the full range is usable; there is no in-band header.
/// - Free blocks form a singly linked list sorted by address. Freeing merges
///   with both neighbours when they are contiguous.
/// - Allocated blocks form a second list, newest first.
/// - Every operation validates before it mutates, so a failed allocation
///   leaves the pool exactly as it was.
///
/// # Example
///
/// ```rust
/// use tiledma::memory::{PoolAllocator, PoolConfig};
///
/// let mut pool = PoolAllocator::new(0x1000, 1024, PoolConfig::default()).unwrap();
/// let a = pool.alloc(300, 1).unwrap();
/// let b = pool.alloc(200, 64).unwrap();
/// assert_eq!(b % 64, 0);
/// assert!(pool.free(a));
/// assert!(pool.free(b));
/// assert_eq!(pool.stats().free_bytes, 1024);
/// ```
#[derive(Debug, Clone)]
pub struct PoolAllocator {
    base: usize,
    size: usize,
    min_split: usize,
    blocks: Box<[Block]>,
    descriptors: SlotBitmap,
    free_head: Option<usize>,
    alloc_head: Option<usize>,
    stats: PoolStats,
}

#[inline]
fn align_up(addr: usize, align: usize) -> Option<usize> {
    addr.checked_add(align - 1).map(|v| v & !(align - 1))
}

impl PoolAllocator {
    /// Create an allocator over `[base, base + size)`.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::InvalidPool`] if the range is empty, wraps the
    /// address space, or the configuration has no descriptors.
    pub fn new(base: usize, size: usize, config: PoolConfig) -> Result<Self, AllocError> {
        if size == 0 {
            return Err(AllocError::InvalidPool("pool size is zero"));
        }
        if config.descriptors == 0 {
            return Err(AllocError::InvalidPool("pool needs at least one block descriptor"));
        }
        if base.checked_add(size).is_none() {
            return Err(AllocError::InvalidPool("pool range wraps the address space"));
        }

        let mut pool = Self {
            base,
            size,
            min_split: config.min_split,
            blocks: vec![Block::default(); config.descriptors].into_boxed_slice(),
            descriptors: SlotBitmap::new(config.descriptors),
            free_head: None,
            alloc_head: None,
            stats: PoolStats::default(),
        };
        pool.reset();
        Ok(pool)
    }

    /// Return the pool to a single free block spanning the whole range.
    ///
    /// Every outstanding allocation is forgotten.
    pub fn reset(&mut self) {
        self.descriptors.clear();
        // A fresh table always has slot 0.
        let idx = self.descriptors.acquire_slot().unwrap_or(0);
        self.blocks[idx] = Block {
            start: self.base,
            size: self.size,
            aligned: self.base,
            next: None,
        };
        self.free_head = Some(idx);
        self.alloc_head = None;
        self.stats = PoolStats {
            free_bytes: self.size,
            ..PoolStats::default()
        };
    }

    /// Allocate `size` bytes aligned to `align`.
    ///
    /// Takes the first free block, in address order, that holds the request
    /// plus alignment padding. The remainder is split off as a new free block
    /// when it exceeds the configured minimum split size.
    ///
    /// # Errors
    ///
    /// - [`AllocError::ZeroSize`] for a zero-byte request
    /// - [`AllocError::BadAlignment`] unless `align` is a power of two
    /// - [`AllocError::OutOfMemory`] if no free block fits
    /// - [`AllocError::DescriptorsExhausted`] if a split needs a descriptor
    pub fn alloc(&mut self, size: usize, align: usize) -> Result<usize, AllocError> {
        if size == 0 {
            return Err(AllocError::ZeroSize);
        }
        if !align.is_power_of_two() {
            return Err(AllocError::BadAlignment(align));
        }

        let mut prev: Option<usize> = None;
        let mut cursor = self.free_head;
        let (idx, aligned, needed) = loop {
            let Some(idx) = cursor else {
                trace!(size, align, free = self.stats.free_bytes, "no free block fits");
                return Err(AllocError::OutOfMemory { requested: size });
            };
            let block = self.blocks[idx];
            let fit = align_up(block.start, align).and_then(|aligned| {
                let needed = size.checked_add(aligned - block.start)?;
                (needed <= block.size).then_some((aligned, needed))
            });
            if let Some((aligned, needed)) = fit {
                break (idx, aligned, needed);
            }
            prev = Some(idx);
            cursor = block.next;
        };

        let block = self.blocks[idx];
        let leftover = block.size - needed;
        let successor = if leftover > self.min_split {
            let Some(rest) = self.descriptors.acquire_slot() else {
                trace!(size, "descriptor table full, cannot split");
                return Err(AllocError::DescriptorsExhausted);
            };
            self.blocks[rest] = Block {
                start: block.start + needed,
                size: leftover,
                aligned: block.start + needed,
                next: block.next,
            };
            self.blocks[idx].size = needed;
            Some(rest)
        } else {
            block.next
        };
        self.link_free(prev, successor);

        let taken = self.blocks[idx].size;
        self.blocks[idx].aligned = aligned;
        self.blocks[idx].next = self.alloc_head;
        self.alloc_head = Some(idx);

        self.stats.free_bytes -= taken;
        self.stats.allocated_bytes += taken;
        self.stats.alignment_padding += aligned - block.start;
        self.stats.live_allocations += 1;

        trace!(size, align, addr = aligned, block = taken, "allocated");
        Ok(aligned)
    }

    /// Release the allocation whose address is `addr`.
    ///
    /// Returns `false`, changing nothing, for a null address or an address
    /// this pool did not hand out.
    pub fn free(&mut self, addr: usize) -> bool {
        if addr == 0 {
            return false;
        }

        let mut prev: Option<usize> = None;
        let mut cursor = self.alloc_head;
        while let Some(idx) = cursor {
            let block = self.blocks[idx];
            if block.aligned == addr {
                match prev {
                    None => self.alloc_head = block.next,
                    Some(p) => self.blocks[p].next = block.next,
                }
                self.stats.free_bytes += block.size;
                self.stats.allocated_bytes -= block.size;
                self.stats.alignment_padding -= block.aligned - block.start;
                self.stats.live_allocations -= 1;
                self.insert_free(idx);
                trace!(addr, block = block.size, "freed");
                return true;
            }
            prev = Some(idx);
            cursor = block.next;
        }

        trace!(addr, "free of unknown address ignored");
        false
    }

    fn link_free(&mut self, prev: Option<usize>, next: Option<usize>) {
        match prev {
            None => self.free_head = next,
            Some(p) => self.blocks[p].next = next,
        }
    }

    /// Address-ordered insert, merging with contiguous neighbours.
    fn insert_free(&mut self, idx: usize) {
        let start = self.blocks[idx].start;
        self.blocks[idx].aligned = start;

        let mut prev: Option<usize> = None;
        let mut cursor = self.free_head;
        while let Some(c) = cursor {
            if self.blocks[c].start > start {
                break;
            }
            prev = Some(c);
            cursor = self.blocks[c].next;
        }
        let next = cursor;

        let current = match prev {
            Some(p) if self.blocks[p].start + self.blocks[p].size == start => {
                self.blocks[p].size += self.blocks[idx].size;
                self.descriptors.release_slot(idx);
                p
            }
            _ => {
                self.blocks[idx].next = next;
                self.link_free(prev, Some(idx));
                idx
            }
        };

        if let Some(n) = next {
            let cur = self.blocks[current];
            if cur.start + cur.size == self.blocks[n].start {
                self.blocks[current].size += self.blocks[n].size;
                self.blocks[current].next = self.blocks[n].next;
                self.descriptors.release_slot(n);
            }
        }
    }

    fn walk(&self, head: Option<usize>) -> impl Iterator<Item = &Block> + '_ {
        std::iter::successors(head.map(|i| &self.blocks[i]), move |b| {
            b.next.map(|i| &self.blocks[i])
        })
    }

    /// Free blocks as `(start, size)` in address order.
    pub fn free_blocks(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.walk(self.free_head).map(|b| (b.start, b.size))
    }

    /// Live allocations as `(address, block size)`, newest first.
    pub fn allocations(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.walk(self.alloc_head).map(|b| (b.aligned, b.size))
    }

    /// Size of the block backing the allocation at `addr`.
    ///
    /// Includes alignment padding and unsplit slack.
    pub fn block_size(&self, addr: usize) -> Option<usize> {
        self.walk(self.alloc_head)
            .find(|b| b.aligned == addr)
            .map(|b| b.size)
    }

    /// Size of the largest free block.
    pub fn largest_free_block(&self) -> usize {
        self.free_blocks().map(|(_, size)| size).max().unwrap_or(0)
    }

    /// Current byte accounting.
    #[inline]
    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    /// Number of block descriptors in use.
    #[inline]
    pub fn descriptors_in_use(&self) -> usize {
        self.descriptors.count_allocated()
    }

    /// First address of the managed range.
    #[inline]
    pub fn base(&self) -> usize {
        self.base
    }

    /// Length of the managed range in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Check whether `addr` falls inside the managed range.
    #[inline]
    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.base && addr - self.base < self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: usize = 0x1000;

    fn pool(size: usize) -> PoolAllocator {
        PoolAllocator::new(BASE, size, PoolConfig::default()).unwrap()
    }

    #[test]
    fn test_pool_creation() {
        let pool = pool(1024);
        assert_eq!(pool.base(), BASE);
        assert_eq!(pool.size(), 1024);
        assert_eq!(pool.stats().free_bytes, 1024);
        assert_eq!(pool.free_blocks().collect::<Vec<_>>(), vec![(BASE, 1024)]);
        assert_eq!(pool.descriptors_in_use(), 1);
    }

    #[test]
    fn test_pool_invalid_config() {
        assert!(matches!(
            PoolAllocator::new(BASE, 0, PoolConfig::default()),
            Err(AllocError::InvalidPool(_))
        ));
        let config = PoolConfig {
            descriptors: 0,
            ..PoolConfig::default()
        };
        assert!(PoolAllocator::new(BASE, 64, config).is_err());
        assert!(PoolAllocator::new(usize::MAX - 4, 64, PoolConfig::default()).is_err());
    }

    #[test]
    fn test_alloc_splits_first_fit() {
        let mut pool = pool(1024);
        let a = pool.alloc(300, 1).unwrap();
        let b = pool.alloc(300, 1).unwrap();
        assert_eq!(a, BASE);
        assert_eq!(b, BASE + 300);
        assert_eq!(pool.free_blocks().collect::<Vec<_>>(), vec![(BASE + 600, 424)]);
        assert_eq!(pool.stats().allocated_bytes, 600);
        assert_eq!(pool.stats().live_allocations, 2);
    }

    #[test]
    fn test_small_leftover_stays_with_allocation() {
        let mut pool = pool(1024);
        // Leftover of 24 bytes is below the minimum split.
        let a = pool.alloc(1000, 1).unwrap();
        assert_eq!(pool.block_size(a), Some(1024));
        assert_eq!(pool.free_blocks().count(), 0);
        assert_eq!(pool.stats().free_bytes, 0);

        assert!(pool.free(a));
        assert_eq!(pool.stats().free_bytes, 1024);
    }

    #[test]
    fn test_aligned_alloc_accounts_padding() {
        let mut pool = pool(1024);
        pool.alloc(10, 1).unwrap();
        let b = pool.alloc(100, 64).unwrap();
        assert_eq!(b % 64, 0);
        let stats = pool.stats();
        assert_eq!(stats.alignment_padding, b - (BASE + 10));
        assert_eq!(stats.free_bytes + stats.allocated_bytes, 1024);
    }

    #[test]
    fn test_alloc_errors_leave_pool_unchanged() {
        let mut pool = pool(256);
        let before = pool.stats();

        assert_eq!(pool.alloc(0, 1), Err(AllocError::ZeroSize));
        assert_eq!(pool.alloc(8, 3), Err(AllocError::BadAlignment(3)));
        assert_eq!(pool.alloc(8, 0), Err(AllocError::BadAlignment(0)));
        assert_eq!(
            pool.alloc(257, 1),
            Err(AllocError::OutOfMemory { requested: 257 })
        );
        assert_eq!(pool.stats(), before);
        assert_eq!(pool.free_blocks().collect::<Vec<_>>(), vec![(BASE, 256)]);
    }

    #[test]
    fn test_descriptor_exhaustion() {
        let config = PoolConfig {
            descriptors: 2,
            min_split: 8,
        };
        let mut pool = PoolAllocator::new(BASE, 1024, config).unwrap();
        pool.alloc(100, 1).unwrap();
        // The remainder now occupies the second descriptor; another split
        // has nowhere to go.
        assert_eq!(pool.alloc(100, 1), Err(AllocError::DescriptorsExhausted));
        assert_eq!(pool.stats().live_allocations, 1);
        assert_eq!(pool.stats().free_bytes, 924);
        // A request that consumes the remainder whole needs no split.
        assert!(pool.alloc(920, 1).is_ok());
    }

    #[test]
    fn test_free_merges_neighbours() {
        let mut pool = pool(1024);
        let a = pool.alloc(100, 1).unwrap();
        let b = pool.alloc(100, 1).unwrap();
        let c = pool.alloc(100, 1).unwrap();

        assert!(pool.free(a));
        assert!(pool.free(c));
        // c merges with the trailing free block
        assert_eq!(
            pool.free_blocks().collect::<Vec<_>>(),
            vec![(BASE, 100), (BASE + 200, 824)]
        );

        assert!(pool.free(b));
        assert_eq!(pool.free_blocks().collect::<Vec<_>>(), vec![(BASE, 1024)]);
        assert_eq!(pool.descriptors_in_use(), 1);
    }

    #[test]
    fn test_free_unknown_is_noop() {
        let mut pool = pool(512);
        let a = pool.alloc(64, 1).unwrap();
        let before = pool.stats();

        assert!(!pool.free(0));
        assert!(!pool.free(a + 1));
        assert!(!pool.free(0xdead_0000));
        assert_eq!(pool.stats(), before);

        assert!(pool.free(a));
        assert!(!pool.free(a), "double free must be ignored");
    }

    #[test]
    fn test_fragment_then_realign() {
        let mut pool = pool(1024);
        let a = pool.alloc(300, 1).unwrap();
        let b = pool.alloc(300, 1).unwrap();
        assert!(a + 300 <= b);

        assert!(pool.free(a));
        let c = pool.alloc(200, 64).unwrap();
        assert_eq!(c % 64, 0);
        assert!(c + 200 <= b || c >= b + 300);

        assert!(pool.free(b));
        assert!(pool.free(c));
        assert_eq!(pool.stats().free_bytes, 1024);
        assert_eq!(pool.alloc(1024, 1), Ok(BASE));
    }

    #[test]
    fn test_reset() {
        let mut pool = pool(1024);
        for _ in 0..5 {
            pool.alloc(64, 16).unwrap();
        }
        pool.reset();
        assert_eq!(pool.stats(), PoolStats {
            free_bytes: 1024,
            ..PoolStats::default()
        });
        assert_eq!(pool.allocations().count(), 0);
        assert_eq!(pool.largest_free_block(), 1024);
    }

    #[test]
    fn test_contains() {
        let pool = pool(64);
        assert!(pool.contains(BASE));
        assert!(pool.contains(BASE + 63));
        assert!(!pool.contains(BASE + 64));
        assert!(!pool.contains(BASE - 1));
    }
}
