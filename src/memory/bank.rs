//! Memory banks: segments paired with pool allocators.

use super::{MemorySegment, PoolAllocator, PoolConfig, PoolStats};
use crate::defaults::MAX_MEM_BANKS;
use crate::error::{Error, Result};
use std::ptr::NonNull;
use std::sync::Arc;
use tracing::{debug, trace};

/// Which bank an allocation may come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BankSelector {
    /// First bank, in index order, that can satisfy the request.
    #[default]
    Any,
    /// Only the bank with this index.
    Index(usize),
}

/// A block of bank memory handed out by [`MemoryBanks::allocate`].
///
/// This is a plain address range; it does not free itself on drop. Pass
/// [`PoolBuffer::as_ptr`] back to the manager to release it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolBuffer {
    ptr: NonNull<u8>,
    len: usize,
    bank: Option<usize>,
}

impl PoolBuffer {
    /// Wrap caller-owned memory so it can back a tile or array.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `len` bytes for as long as
    /// any tile or array built on this buffer is in use, and nothing else may
    /// access that memory while a transfer targets it.
    pub unsafe fn from_raw_parts(ptr: NonNull<u8>, len: usize) -> Self {
        Self {
            ptr,
            len,
            bank: None,
        }
    }

    /// Start of the buffer.
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Start of the buffer, mutable.
    #[inline]
    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the buffer has zero length.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Index of the bank this buffer came from, if any.
    #[inline]
    pub fn bank(&self) -> Option<usize> {
        self.bank
    }

    /// Pointer `offset` bytes into the buffer.
    ///
    /// Returns `None` if `offset + span` would run past the end.
    pub(crate) fn offset_ptr(&self, offset: usize, span: usize) -> Option<NonNull<u8>> {
        let end = offset.checked_add(span)?;
        if end > self.len {
            return None;
        }
        // SAFETY: offset <= len, so the result stays within (or one past)
        // the allocation and cannot be null.
        Some(unsafe { self.ptr.add(offset) })
    }

    /// View `len` bytes starting at `offset` as a mutable slice.
    ///
    /// # Safety
    ///
    /// The caller must hold exclusive access to that range for `'a`: no
    /// transfer may be reading or writing it, and no other slice over it may
    /// be live.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn slice_mut<'a>(&self, offset: usize, len: usize) -> Option<&'a mut [u8]> {
        let ptr = self.offset_ptr(offset, len)?;
        // SAFETY: range checked above; exclusivity is the caller's contract.
        Some(unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), len) })
    }
}

struct Bank {
    segment: Arc<dyn MemorySegment>,
    pool: PoolAllocator,
}

/// A fixed set of memory banks, each managed by its own [`PoolAllocator`].
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use tiledma::memory::{BankSelector, HeapSegment, MemoryBanks, MemorySegment, PoolConfig};
///
/// let segments: Vec<Arc<dyn MemorySegment>> = vec![
///     Arc::new(HeapSegment::local(4096).unwrap()),
///     Arc::new(HeapSegment::local(4096).unwrap()),
/// ];
/// let mut banks = MemoryBanks::new(segments, PoolConfig::default()).unwrap();
///
/// let buf = banks.allocate(1024, BankSelector::Index(1), 64).unwrap();
/// assert_eq!(buf.bank(), Some(1));
/// banks.free(buf.as_ptr()).unwrap();
/// ```
pub struct MemoryBanks {
    banks: Vec<Bank>,
}

impl MemoryBanks {
    /// Put each segment under its own pool allocator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadArgument`] for zero or more than
    /// [`MAX_MEM_BANKS`] segments, or for an empty or read-only segment.
    pub fn new(segments: Vec<Arc<dyn MemorySegment>>, config: PoolConfig) -> Result<Self> {
        if segments.is_empty() || segments.len() > MAX_MEM_BANKS {
            return Err(Error::bad_argument(format!(
                "bank count {} outside 1..={MAX_MEM_BANKS}",
                segments.len()
            )));
        }

        let mut banks = Vec::with_capacity(segments.len());
        for (index, segment) in segments.into_iter().enumerate() {
            let base = segment
                .as_mut_ptr()
                .ok_or_else(|| Error::bad_argument(format!("bank {index} is read-only")))?;
            let pool = PoolAllocator::new(base as usize, segment.len(), config)?;
            debug!(
                index,
                base = base as usize,
                len = segment.len(),
                memory = ?segment.memory_type(),
                "memory bank ready"
            );
            banks.push(Bank { segment, pool });
        }
        Ok(Self { banks })
    }

    /// Allocate `size` bytes aligned to `align` from the selected bank(s).
    ///
    /// # Errors
    ///
    /// - [`Error::BadArgument`] for size 0, a bad alignment, or an unknown
    ///   bank index
    /// - [`Error::AllocationFailed`] if no eligible bank has room
    pub fn allocate(&mut self, size: usize, selector: BankSelector, align: usize) -> Result<PoolBuffer> {
        if size == 0 {
            return Err(Error::bad_argument("buffer size is zero"));
        }
        if !align.is_power_of_two() {
            return Err(super::AllocError::BadAlignment(align).into());
        }

        let candidates = match selector {
            BankSelector::Any => 0..self.banks.len(),
            BankSelector::Index(i) if i < self.banks.len() => i..i + 1,
            BankSelector::Index(i) => {
                return Err(Error::bad_argument(format!(
                    "bank {i} does not exist ({} configured)",
                    self.banks.len()
                )));
            }
        };

        let mut last_err = None;
        for index in candidates {
            match self.banks[index].pool.alloc(size, align) {
                Ok(addr) => {
                    // Pool addresses come from a live segment's base pointer.
                    let ptr = NonNull::new(addr as *mut u8).ok_or(Error::NullBuffer)?;
                    trace!(index, size, align, addr, "bank allocation");
                    return Ok(PoolBuffer {
                        ptr,
                        len: size,
                        bank: Some(index),
                    });
                }
                Err(err) => last_err = Some(err),
            }
        }

        debug!(size, align, ?selector, "no bank could satisfy allocation");
        Err(Error::AllocationFailed(
            last_err.unwrap_or(super::AllocError::OutOfMemory { requested: size }),
        ))
    }

    /// Release a buffer previously returned by [`allocate`](Self::allocate).
    ///
    /// Pointers inside a bank that are not live allocations are ignored.
    ///
    /// # Errors
    ///
    /// - [`Error::NullBuffer`] for a null pointer
    /// - [`Error::BadArgument`] if the pointer is outside every bank
    pub fn free(&mut self, ptr: *const u8) -> Result<()> {
        if ptr.is_null() {
            return Err(Error::NullBuffer);
        }
        let addr = ptr as usize;
        let bank = self
            .banks
            .iter_mut()
            .find(|b| b.pool.contains(addr))
            .ok_or_else(|| Error::bad_argument(format!("{addr:#x} is not inside any memory bank")))?;
        bank.pool.free(addr);
        Ok(())
    }

    /// Release every allocation in every bank.
    pub fn free_all(&mut self) {
        for bank in &mut self.banks {
            bank.pool.reset();
        }
    }

    /// Number of banks.
    #[inline]
    pub fn len(&self) -> usize {
        self.banks.len()
    }

    /// Always false; a bank set has at least one bank.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.banks.is_empty()
    }

    /// Byte accounting for bank `index`.
    pub fn stats(&self, index: usize) -> Option<PoolStats> {
        self.banks.get(index).map(|b| b.pool.stats())
    }

    /// Allocator for bank `index`.
    pub fn pool(&self, index: usize) -> Option<&PoolAllocator> {
        self.banks.get(index).map(|b| &b.pool)
    }

    /// Segment backing bank `index`.
    pub fn segment(&self, index: usize) -> Option<&Arc<dyn MemorySegment>> {
        self.banks.get(index).map(|b| &b.segment)
    }
}

impl std::fmt::Debug for MemoryBanks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.banks.iter().map(|b| (b.segment.len(), b.pool.stats())))
            .finish()
    }
}
