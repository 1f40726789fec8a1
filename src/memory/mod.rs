//! Memory management for tiledma.
//!
//! Frames live in caller-provided [`MemorySegment`]s in system memory; tile
//! buffers are carved out of fast local memory banks by [`PoolAllocator`]s.
//!
//! # Architecture
//!
//! - [`MemorySegment`]: Trait for contiguous memory backends
//! - [`HeapSegment`]: Aligned heap allocation implementing the trait
//! - [`PoolAllocator`]: First-fit allocator with address-ordered coalescing
//! - [`MemoryBanks`]: Up to eight segments, each under its own pool
//! - [`SlotBitmap`]: Fixed-capacity slot tracking used by pools and registries
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tiledma::memory::{BankSelector, HeapSegment, MemoryBanks, MemorySegment, PoolConfig};
//!
//! let bank: Arc<dyn MemorySegment> = Arc::new(HeapSegment::local(16 * 1024).unwrap());
//! let mut banks = MemoryBanks::new(vec![bank], PoolConfig::default()).unwrap();
//!
//! let buf = banks.allocate(4096, BankSelector::Any, 64).unwrap();
//! assert_eq!(buf.as_ptr() as usize % 64, 0);
//! banks.free(buf.as_ptr()).unwrap();
//! ```

mod bank;
mod bitmap;
mod heap;
mod pool;
mod segment;

pub use bank::{BankSelector, MemoryBanks, PoolBuffer};
pub use bitmap::SlotBitmap;
pub use heap::HeapSegment;
pub use pool::{AllocError, PoolAllocator, PoolConfig, PoolStats};
pub use segment::{MemorySegment, MemoryType};
