//! Heap-backed memory segment.

use super::{AllocError, MemorySegment, MemoryType};
use crate::error::{Error, Result};
use std::alloc::{self, Layout};
use std::ptr::NonNull;

/// A memory segment backed by an aligned, zero-initialized heap allocation.
///
/// Used for frame buffers in system memory and, in hosted builds, to stand in
/// for the local memory banks a tile manager allocates from.
///
/// # Example
///
/// ```rust
/// use tiledma::memory::{HeapSegment, MemorySegment, MemoryType};
///
/// let segment = HeapSegment::new(1024).unwrap();
/// assert_eq!(segment.len(), 1024);
/// assert_eq!(segment.memory_type(), MemoryType::System);
/// ```
pub struct HeapSegment {
    ptr: NonNull<u8>,
    layout: Layout,
    memory_type: MemoryType,
}

// SAFETY: The allocation is exclusively owned by this segment and never
// reallocated. Access through the raw pointers is the caller's contract.
unsafe impl Send for HeapSegment {}
unsafe impl Sync for HeapSegment {}

impl HeapSegment {
    /// Create a new system-memory segment with the given size.
    ///
    /// # Errors
    ///
    /// Returns an error if size is 0 or allocation fails.
    pub fn new(size: usize) -> Result<Self> {
        Self::with_alignment(size, std::mem::align_of::<u64>(), MemoryType::System)
    }

    /// Create a segment intended to back a local memory bank.
    ///
    /// # Errors
    ///
    /// Returns an error if size is 0 or allocation fails.
    pub fn local(size: usize) -> Result<Self> {
        Self::with_alignment(size, crate::defaults::BANK_ALIGNMENT, MemoryType::Local)
    }

    /// Create a new heap segment with specific alignment.
    ///
    /// # Arguments
    ///
    /// * `size` - Size in bytes. Must be greater than 0.
    /// * `align` - Required alignment (must be a power of 2).
    /// * `memory_type` - What this segment is used for.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails or alignment is invalid.
    pub fn with_alignment(size: usize, align: usize, memory_type: MemoryType) -> Result<Self> {
        if size == 0 {
            return Err(Error::bad_argument("segment size must be greater than 0"));
        }
        if !align.is_power_of_two() {
            return Err(AllocError::BadAlignment(align).into());
        }
        let layout = Layout::from_size_align(size, align)
            .map_err(|_| Error::bad_argument("segment layout overflows"))?;

        // SAFETY: layout has non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw)
            .ok_or(Error::AllocationFailed(AllocError::OutOfMemory { requested: size }))?;

        Ok(Self {
            ptr,
            layout,
            memory_type,
        })
    }

    /// Alignment of the segment's base address.
    pub fn alignment(&self) -> usize {
        self.layout.align()
    }
}

impl MemorySegment for HeapSegment {
    fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    fn as_mut_ptr(&self) -> Option<*mut u8> {
        Some(self.ptr.as_ptr())
    }

    fn len(&self) -> usize {
        self.layout.size()
    }

    fn memory_type(&self) -> MemoryType {
        self.memory_type
    }
}

impl Drop for HeapSegment {
    fn drop(&mut self) {
        // SAFETY: ptr was returned by alloc_zeroed with this exact layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

impl std::fmt::Debug for HeapSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeapSegment")
            .field("ptr", &self.ptr)
            .field("len", &self.layout.size())
            .field("align", &self.layout.align())
            .field("memory_type", &self.memory_type)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_segment_basic() {
        let segment = HeapSegment::new(1024).unwrap();
        assert_eq!(segment.len(), 1024);
        assert!(!segment.is_empty());
        assert_eq!(segment.memory_type(), MemoryType::System);

        // SAFETY: freshly allocated, no other references.
        let slice = unsafe { segment.as_slice() };
        assert!(slice.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_heap_segment_write_read() {
        let segment = HeapSegment::new(64).unwrap();

        // SAFETY: exclusive access in this test.
        unsafe {
            let slice = segment.as_mut_slice().unwrap();
            slice[..5].copy_from_slice(b"hello");
        }

        // SAFETY: the mutable borrow above has ended.
        let slice = unsafe { segment.as_slice() };
        assert_eq!(&slice[..5], b"hello");
    }

    #[test]
    fn test_heap_segment_alignment() {
        let segment = HeapSegment::with_alignment(100, 256, MemoryType::Local).unwrap();
        assert_eq!(segment.as_ptr() as usize % 256, 0);
        assert_eq!(segment.alignment(), 256);
        assert!(segment.memory_type().is_bank_memory());

        let local = HeapSegment::local(128).unwrap();
        assert_eq!(local.as_ptr() as usize % crate::defaults::BANK_ALIGNMENT, 0);
    }

    #[test]
    fn test_heap_segment_rejects_bad_input() {
        assert!(HeapSegment::new(0).is_err());
        assert!(HeapSegment::with_alignment(64, 3, MemoryType::System).is_err());
    }

    #[test]
    fn test_contains_addr() {
        let segment: Box<dyn MemorySegment> = Box::new(HeapSegment::new(16).unwrap());
        let base = segment.as_ptr() as usize;
        assert!(segment.contains_addr(base));
        assert!(segment.contains_addr(base + 15));
        assert!(!segment.contains_addr(base + 16));
        assert!(!segment.contains_addr(base.wrapping_sub(1)));
    }
}
