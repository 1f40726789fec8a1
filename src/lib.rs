//! # tiledma
//!
//! Tile and frame transfer management for block-transfer (DMA) engines.
//!
//! Vision kernels on small processors work on tiles: rectangles of a large
//! image ("frame") copied into fast local memory. tiledma carves tiles out of
//! frames, moves them with an asynchronous block-transfer engine, reuses
//! data already resident in the previously fetched tile, synthesizes halo
//! padding where a tile reaches past the frame, and allocates tile buffers
//! from fixed memory banks without a general-purpose heap.
//!
//! ## Features
//!
//! - **Overlap reuse**: shared rows and columns are copied tile-to-tile
//! - **Edge padding**: zero, constant or replicate, applied on completion
//! - **In-order completion**: a FIFO queue retires transfers and their side
//!   effects in submission order
//! - **Bank allocator**: first-fit, coalescing, bounded metadata
//! - **Pluggable engines**: anything implementing [`dma::BlockTransfer`]
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use tiledma::prelude::*;
//! use tiledma::dma::{Completion, SoftTransfer};
//! use tiledma::memory::HeapSegment;
//!
//! let config = ManagerConfig::default().with_heap_bank(32 * 1024);
//! let mut tm = TileManager::new(SoftTransfer::new(Completion::Immediate), config)?;
//!
//! let spec = FrameSpec::new(128, 96, ElementType::U8).with_policy(PaddingPolicy::Replicate, 0);
//! let image = Arc::new(HeapSegment::new(spec.required_len())?);
//! let frame = tm.create_frame(spec.with_buffer(image))?;
//!
//! let a = tm.create_tile(TileSpec::new(frame, 32, 32, ElementType::U8).with_halo(2, 2))?;
//! let b = tm.create_tile(TileSpec::new(frame, 32, 32, ElementType::U8).with_halo(2, 2).at(32, 0))?;
//!
//! tm.transfer_in(a, None, false)?;
//! tm.transfer_in(b, Some(a), true)?;
//! tm.wait_for_tile(b, WaitMode::Spin)?;
//! assert!(tm.is_free(a)?);
//! # Ok::<(), tiledma::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod array;
pub mod config;
pub mod defaults;
pub mod dma;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod manager;
pub mod memory;
pub mod plan;
pub mod queue;
pub mod registry;
pub mod tile;
pub mod view;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::array::{Array, ArrayGeometry};
    pub use crate::config::{BankConfig, ManagerConfig};
    pub use crate::dma::{BlockTransfer, TransferHandle};
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::frame::{Border, FrameSpec, PaddingPolicy};
    pub use crate::manager::{TileManager, WaitMode};
    pub use crate::memory::{BankSelector, MemorySegment, PoolBuffer};
    pub use crate::registry::{FrameId, TileId};
    pub use crate::tile::{ElementType, TileAlignment, TileSpec, TileStatus};
}

pub use array::{Array, ArrayGeometry};
pub use config::{BankConfig, ManagerConfig};
pub use error::{Error, ErrorKind, Result};
pub use frame::{Border, Frame, FrameSpec, PaddingPolicy};
pub use manager::{TileManager, WaitMode};
pub use registry::{FrameId, TileId};
pub use tile::{ElementType, PadExtents, Tile, TileAlignment, TileSpec, TileStatus, TileStorage};
pub use view::{BorderFill, Surface};
