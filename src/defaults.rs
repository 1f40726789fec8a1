//! Capacity ceilings and allocator tunables.
//!
//! Every structure in tiledma is sized once at construction and never grows.
//! These constants are the defaults used by [`ManagerConfig::default`] and the
//! hard ceilings the configuration is validated against.
//!
//! # Usage
//!
//! ```rust
//! use tiledma::{ManagerConfig, defaults};
//!
//! let config = ManagerConfig::default()
//!     .with_max_tiles(defaults::MAX_TILES / 2)
//!     .with_heap_bank(64 * 1024);
//! assert_eq!(config.max_tiles, 16);
//! ```
//!
//! [`ManagerConfig::default`]: crate::ManagerConfig

// =============================================================================
// Registry and Queue Capacities
// =============================================================================

/// Default number of tile records a manager can hold.
pub const MAX_TILES: usize = 32;

/// Default number of frame records a manager can hold.
pub const MAX_FRAMES: usize = 8;

/// Default number of outstanding queued transfers.
pub const TRANSFER_QUEUE_LENGTH: usize = 32;

/// Upper bound on any registry capacity (handles carry a 16-bit index).
pub const MAX_REGISTRY_CAPACITY: usize = 1 << 16;

// =============================================================================
// Memory Banks
// =============================================================================

/// Maximum number of memory banks a manager can serve allocations from.
pub const MAX_MEM_BANKS: usize = 8;

/// Default number of block descriptors per bank pool.
///
/// Bounds how fragmented one bank may become: every free or allocated block
/// consumes one descriptor.
pub const BLOCK_DESCRIPTORS: usize = 64;

/// Default minimum leftover, in bytes, worth splitting into its own free block.
///
/// Smaller remainders stay attached to the allocation as internal slack.
pub const MIN_SPLIT_SIZE: usize = 32;

// =============================================================================
// Alignment
// =============================================================================

/// Alignment used for tile buffers allocated by the manager.
pub const TILE_BUFFER_ALIGNMENT: usize = 64;

/// Alignment of heap segments backing memory banks.
pub const BANK_ALIGNMENT: usize = 64;
