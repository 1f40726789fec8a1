//! Memory segment trait and types.

/// Where the memory backing a segment lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MemoryType {
    /// Bulk system memory holding full frames.
    System,
    /// Fast local memory carved into banks for tile buffers.
    Local,
}

impl MemoryType {
    /// Is this memory suitable for backing a memory bank?
    #[inline]
    pub fn is_bank_memory(&self) -> bool {
        matches!(self, MemoryType::Local)
    }
}

/// Trait for memory segment backends.
///
/// A memory segment represents a contiguous region of memory the transfer
/// engine reads from or writes into: a frame buffer in system memory, or a
/// local memory bank subdivided by a pool allocator.
///
/// # Safety
///
/// Implementations must ensure that:
/// - Pointers remain valid for the lifetime of the segment
/// - Thread-safety requirements are met (Send + Sync)
/// - The address range `[as_ptr(), as_ptr() + len())` does not move
pub trait MemorySegment: Send + Sync {
    /// Get a raw pointer to the start of this segment.
    fn as_ptr(&self) -> *const u8;

    /// Get a mutable pointer to the start of this segment.
    ///
    /// Returns `None` if the segment is read-only.
    fn as_mut_ptr(&self) -> Option<*mut u8>;

    /// Total size of the segment in bytes.
    fn len(&self) -> usize;

    /// Returns true if the segment has zero length.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The type of memory backing this segment.
    fn memory_type(&self) -> MemoryType;

    /// Get the segment as a byte slice.
    ///
    /// # Safety
    ///
    /// The caller must ensure no mutable references exist to this memory and
    /// that no transfer is writing into it.
    unsafe fn as_slice(&self) -> &[u8] {
        // SAFETY: Caller guarantees no concurrent writers.
        unsafe { std::slice::from_raw_parts(self.as_ptr(), self.len()) }
    }

    /// Get the segment as a mutable byte slice.
    ///
    /// # Safety
    ///
    /// The caller must ensure exclusive access to this memory, including
    /// against in-flight transfers reading from or writing into it.
    #[allow(clippy::mut_from_ref)]
    unsafe fn as_mut_slice(&self) -> Option<&mut [u8]> {
        // SAFETY: Caller guarantees exclusive access.
        self.as_mut_ptr()
            .map(|ptr| unsafe { std::slice::from_raw_parts_mut(ptr, self.len()) })
    }
}

impl dyn MemorySegment {
    /// Check whether `addr` falls inside this segment.
    pub fn contains_addr(&self, addr: usize) -> bool {
        let base = self.as_ptr() as usize;
        addr >= base && addr - base < self.len()
    }
}
