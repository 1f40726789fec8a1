//! Manager configuration.
//!
//! Capacities default to the constants in [`defaults`](crate::defaults) and
//! are validated once, when the manager is built.

use crate::defaults;
use crate::error::{Error, Result};
use crate::memory::{HeapSegment, MemorySegment, PoolConfig};
use std::sync::Arc;

/// Memory for one bank.
#[derive(Clone)]
pub enum BankConfig {
    /// Allocate a heap segment of this many bytes.
    Heap(usize),
    /// Use caller-provided memory.
    Segment(Arc<dyn MemorySegment>),
}

impl BankConfig {
    pub(crate) fn into_segment(self) -> Result<Arc<dyn MemorySegment>> {
        match self {
            BankConfig::Heap(size) => Ok(Arc::new(HeapSegment::local(size)?)),
            BankConfig::Segment(segment) => Ok(segment),
        }
    }
}

impl std::fmt::Debug for BankConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BankConfig::Heap(size) => f.debug_tuple("Heap").field(size).finish(),
            BankConfig::Segment(seg) => f
                .debug_struct("Segment")
                .field("ptr", &seg.as_ptr())
                .field("len", &seg.len())
                .finish(),
        }
    }
}

/// Configuration for a [`TileManager`](crate::TileManager).
///
/// # Example
///
/// ```rust
/// use tiledma::ManagerConfig;
///
/// let config = ManagerConfig::default()
///     .with_heap_bank(32 * 1024)
///     .with_heap_bank(32 * 1024)
///     .with_queue_length(16);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Tile registry capacity.
    pub max_tiles: usize,
    /// Frame registry capacity.
    pub max_frames: usize,
    /// Transfer queue capacity.
    pub queue_length: usize,
    /// Allocator tunables applied to every bank.
    pub pool: PoolConfig,
    /// Memory banks, at most [`defaults::MAX_MEM_BANKS`].
    pub banks: Vec<BankConfig>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_tiles: defaults::MAX_TILES,
            max_frames: defaults::MAX_FRAMES,
            queue_length: defaults::TRANSFER_QUEUE_LENGTH,
            pool: PoolConfig::default(),
            banks: Vec::new(),
        }
    }
}

impl ManagerConfig {
    /// Set the tile registry capacity.
    pub fn with_max_tiles(mut self, n: usize) -> Self {
        self.max_tiles = n;
        self
    }

    /// Set the frame registry capacity.
    pub fn with_max_frames(mut self, n: usize) -> Self {
        self.max_frames = n;
        self
    }

    /// Set the transfer queue capacity.
    pub fn with_queue_length(mut self, n: usize) -> Self {
        self.queue_length = n;
        self
    }

    /// Set allocator tunables.
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Add a heap-backed bank of `size` bytes.
    pub fn with_heap_bank(mut self, size: usize) -> Self {
        self.banks.push(BankConfig::Heap(size));
        self
    }

    /// Add a bank backed by caller memory.
    pub fn with_bank_segment(mut self, segment: Arc<dyn MemorySegment>) -> Self {
        self.banks.push(BankConfig::Segment(segment));
        self
    }

    /// Check capacities against the hard limits.
    ///
    /// A configuration without banks is valid; such a manager cannot
    /// allocate tile buffers but can still run transfers into caller-provided
    /// buffers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadArgument`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let registry_range = 1..=defaults::MAX_REGISTRY_CAPACITY;
        if !registry_range.contains(&self.max_tiles) {
            return Err(Error::bad_argument(format!("max_tiles {} out of range", self.max_tiles)));
        }
        if !registry_range.contains(&self.max_frames) {
            return Err(Error::bad_argument(format!("max_frames {} out of range", self.max_frames)));
        }
        if self.queue_length == 0 {
            return Err(Error::bad_argument("queue_length must be non-zero"));
        }
        if self.banks.len() > defaults::MAX_MEM_BANKS {
            return Err(Error::bad_argument(format!(
                "{} banks configured, at most {} supported",
                self.banks.len(),
                defaults::MAX_MEM_BANKS
            )));
        }
        if self.pool.descriptors == 0 {
            return Err(Error::bad_argument("pool needs at least one block descriptor"));
        }
        Ok(())
    }
}
