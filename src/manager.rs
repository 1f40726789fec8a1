//! The tile manager: buffers, frames, tiles and their transfers.
//!
//! [`TileManager`] owns the memory banks, the frame and tile registries and
//! the transfer queue, and drives a [`BlockTransfer`] engine. All operations
//! take `&mut self`; the manager is meant to be driven from one control
//! flow. The engine may report faults from elsewhere through the shared
//! [`ErrorChannel`].
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tiledma::prelude::*;
//! use tiledma::dma::{Completion, SoftTransfer};
//! use tiledma::memory::HeapSegment;
//!
//! let config = ManagerConfig::default().with_heap_bank(16 * 1024);
//! let mut tm = TileManager::new(SoftTransfer::new(Completion::Immediate), config).unwrap();
//!
//! let spec = FrameSpec::new(64, 64, ElementType::U8);
//! let image = Arc::new(HeapSegment::new(spec.required_len()).unwrap());
//! let frame = tm.create_frame(spec.with_buffer(image)).unwrap();
//!
//! let tile = tm
//!     .create_tile(TileSpec::new(frame, 16, 16, ElementType::U8).with_halo(2, 2).at(-8, 0))
//!     .unwrap();
//! tm.transfer_in(tile, None, true).unwrap();
//! tm.wait_for_tile(tile, WaitMode::Spin).unwrap();
//! assert!(tm.check_ready(tile).unwrap());
//! ```
//!
//! # Completion Order
//!
//! Queued transfers retire strictly in submission order. Polling a tile
//! retires every entry ahead of it, so side effects (padding, reuse
//! release) of earlier tiles always land before those of later ones.

use crate::array::ArrayGeometry;
use crate::config::ManagerConfig;
use crate::defaults;
use crate::dma::{BlockTransfer, ErrorChannel, TransferFault, TransferHandle, TransferRequest};
use crate::error::{Error, ErrorKind, Result};
use crate::frame::{Frame, FrameSpec, PaddingPolicy};
use crate::geometry::Rect;
use crate::memory::{BankSelector, MemoryBanks, MemorySegment, PoolBuffer, PoolStats};
use crate::plan::{self, Clamp, Segment, Source};
use crate::queue::{QueueEntry, TransferQueue};
use crate::registry::{FrameId, SlotRegistry, TileId};
use crate::tile::{ElementType, PadExtents, Tile, TileSpec, TileStatus, TileStorage};
use crate::view::{BorderFill, Surface};
use smallvec::SmallVec;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

/// How wait helpers pass time between polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitMode {
    /// Busy-poll, calling [`BlockTransfer::poll`] between checks.
    #[default]
    Spin,
    /// Park in [`BlockTransfer::wait_for_completion`] between polls.
    Sleep,
}

/// Manages tiles of frames and the transfers that fill and drain them.
pub struct TileManager<D: BlockTransfer> {
    engine: D,
    banks: Option<MemoryBanks>,
    frames: SlotRegistry<Frame, FrameId>,
    tiles: SlotRegistry<Tile, TileId>,
    queue: TransferQueue,
    errors: ErrorChannel,
    last_error: ErrorKind,
    last_submitted: Option<TransferHandle>,
    // Frame buffers dropped while transfers may still touch them.
    retained: Vec<Arc<dyn MemorySegment>>,
}

type Requests = SmallVec<[TransferRequest; 5]>;

impl<D: BlockTransfer> TileManager<D> {
    /// Build a manager around `engine`.
    ///
    /// Validates `config`, carves one allocator per configured bank,
    /// initializes the engine and attaches the manager's error channel to
    /// it.
    ///
    /// # Errors
    ///
    /// - [`Error::BadArgument`] if the configuration or a bank is invalid
    /// - [`Error::TransferInitFailed`] if the engine refuses to initialize
    pub fn new(mut engine: D, config: ManagerConfig) -> Result<Self> {
        config.validate()?;

        let banks = if config.banks.is_empty() {
            None
        } else {
            let segments = config
                .banks
                .into_iter()
                .map(|bank| bank.into_segment())
                .collect::<Result<Vec<_>>>()?;
            Some(MemoryBanks::new(segments, config.pool)?)
        };

        engine.init().map_err(|err| match err {
            Error::TransferInitFailed(_) => err,
            other => Error::TransferInitFailed(other.to_string()),
        })?;
        let errors = ErrorChannel::new();
        engine.attach_error_channel(errors.clone());

        debug!(
            banks = banks.as_ref().map_or(0, |b| b.len()),
            max_tiles = config.max_tiles,
            max_frames = config.max_frames,
            queue_length = config.queue_length,
            "tile manager created"
        );

        Ok(Self {
            engine,
            banks,
            frames: SlotRegistry::with_capacity(config.max_frames),
            tiles: SlotRegistry::with_capacity(config.max_tiles),
            queue: TransferQueue::new(config.queue_length),
            errors,
            last_error: ErrorKind::Success,
            last_submitted: None,
            retained: Vec::new(),
        })
    }

    /// Replace the error channel with one that also calls `callback` on
    /// every engine fault.
    ///
    /// Any fault already raised is forgotten.
    pub fn set_fault_callback(&mut self, callback: impl Fn(TransferFault) + Send + Sync + 'static) {
        self.errors = ErrorChannel::with_callback(callback);
        self.engine.attach_error_channel(self.errors.clone());
        self.last_error = ErrorKind::Success;
    }

    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        self.last_error = match &result {
            Ok(_) => ErrorKind::Success,
            Err(err) => err.kind(),
        };
        result
    }

    /// Free every buffer, frame and tile, drop queued transfers and clear
    /// both error states.
    pub fn reset(&mut self) {
        if !self.queue.is_empty() {
            warn!(pending = self.queue.len(), "reset drops queued transfers");
        }
        self.queue.clear();
        self.tiles.clear();
        self.retain_frame_buffers();
        self.frames.clear();
        if let Some(banks) = self.banks.as_mut() {
            banks.free_all();
        }
        self.errors.clear();
        self.last_error = ErrorKind::Success;
        debug!("tile manager reset");
    }

    /// Outcome of the most recent operation.
    #[inline]
    pub fn last_error(&self) -> ErrorKind {
        self.last_error
    }

    /// Log the outcome of the most recent operation and return it.
    pub fn error_info(&self) -> ErrorKind {
        let kind = self.last_error;
        if kind.is_success() {
            debug!(code = kind.code(), "no error");
        } else {
            error!(code = kind.code(), description = kind.describe(), "last tile manager error");
        }
        kind
    }

    /// The sticky engine fault, if one has been raised.
    pub fn transfer_fault(&self) -> Option<TransferFault> {
        self.errors.last_fault()
    }

    /// Reset the sticky engine fault.
    pub fn clear_transfer_fault(&mut self) {
        self.errors.clear();
    }

    /// The transfer engine.
    #[inline]
    pub fn engine(&self) -> &D {
        &self.engine
    }

    /// The transfer engine, mutably.
    #[inline]
    pub fn engine_mut(&mut self) -> &mut D {
        &mut self.engine
    }

    // -- buffers -------------------------------------------------------------

    /// Allocate `size` bytes aligned to `align` from the selected bank.
    ///
    /// # Errors
    ///
    /// - [`Error::NullManager`] if no banks are configured
    /// - [`Error::BadArgument`] for size 0, a bad alignment or bank index
    /// - [`Error::AllocationFailed`] if no eligible bank has room
    pub fn allocate_buffer(&mut self, size: usize, bank: BankSelector, align: usize) -> Result<PoolBuffer> {
        let result = match self.banks.as_mut() {
            Some(banks) => banks.allocate(size, bank, align),
            None => Err(Error::NullManager),
        };
        self.track(result)
    }

    /// Return a buffer to the bank that owns it.
    ///
    /// Addresses inside a bank that are not live allocations are ignored.
    ///
    /// # Errors
    ///
    /// - [`Error::NullBuffer`] for a null pointer
    /// - [`Error::BadArgument`] if no bank owns the address, or a live tile
    ///   still uses the buffer
    /// - [`Error::NullManager`] if no banks are configured
    pub fn free_buffer(&mut self, ptr: *const u8) -> Result<()> {
        let result = self.free_buffer_inner(ptr);
        self.track(result)
    }

    fn free_buffer_inner(&mut self, ptr: *const u8) -> Result<()> {
        if ptr.is_null() {
            return Err(Error::NullBuffer);
        }
        let in_use = self
            .tiles
            .iter()
            .any(|(_, t)| t.buffer().is_some_and(|b| b.as_ptr() == ptr));
        if in_use {
            return Err(Error::bad_argument("buffer still backs a live tile"));
        }
        self.banks.as_mut().ok_or(Error::NullManager)?.free(ptr)
    }

    /// Reinitialize every bank.
    ///
    /// # Errors
    ///
    /// - [`Error::NullManager`] if no banks are configured
    /// - [`Error::BadArgument`] while tiles are allocated
    pub fn free_all_buffers(&mut self) -> Result<()> {
        let result = if !self.tiles.is_empty() {
            Err(Error::bad_argument(format!(
                "{} tiles still allocated; free them first",
                self.tiles.len()
            )))
        } else {
            match self.banks.as_mut() {
                Some(banks) => {
                    banks.free_all();
                    Ok(())
                }
                None => Err(Error::NullManager),
            }
        };
        self.track(result)
    }

    /// Allocator counters for bank `index`.
    pub fn bank_stats(&self, index: usize) -> Option<PoolStats> {
        self.banks.as_ref().and_then(|b| b.stats(index))
    }

    /// Number of configured banks.
    pub fn bank_count(&self) -> usize {
        self.banks.as_ref().map_or(0, |b| b.len())
    }

    // -- frames --------------------------------------------------------------

    /// Validate `spec` and register the frame.
    ///
    /// # Errors
    ///
    /// - [`Error::BadArgument`] or [`Error::BufferOverflow`] from
    ///   [`Frame::new`]
    /// - [`Error::FrameRegistryFull`] if every frame slot is in use
    pub fn create_frame(&mut self, spec: FrameSpec) -> Result<FrameId> {
        let result = Frame::new(spec).and_then(|frame| {
            self.frames
                .insert(frame)
                .map_err(|_| Error::FrameRegistryFull)
        });
        if let Ok(id) = &result {
            trace!(frame = id.index(), "frame created");
        }
        self.track(result)
    }

    /// Release a frame slot.
    ///
    /// The frame's buffer is kept alive until the engine goes idle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadArgument`] if `frame` is not allocated here.
    pub fn free_frame(&mut self, frame: FrameId) -> Result<()> {
        self.release_retained();
        let result = match self.frames.remove(frame) {
            Some(record) => {
                if let Some(buffer) = record.buffer() {
                    self.retain(Arc::clone(buffer));
                }
                Ok(())
            }
            None => Err(Error::bad_argument("frame handle is not allocated")),
        };
        self.track(result)
    }

    /// Release every frame slot.
    pub fn free_all_frames(&mut self) {
        self.release_retained();
        self.retain_frame_buffers();
        self.frames.clear();
        self.last_error = ErrorKind::Success;
    }

    /// Frame record for `frame`.
    pub fn frame(&self, frame: FrameId) -> Option<&Frame> {
        self.frames.get(frame)
    }

    fn engine_idle(&mut self) -> bool {
        self.last_submitted.is_none_or(|h| self.engine.is_done(h))
    }

    fn retain(&mut self, buffer: Arc<dyn MemorySegment>) {
        if !self.engine_idle() {
            self.retained.push(buffer);
        }
    }

    fn retain_frame_buffers(&mut self) {
        if self.engine_idle() {
            return;
        }
        let buffers: Vec<_> = self
            .frames
            .iter()
            .filter_map(|(_, f)| f.buffer().cloned())
            .collect();
        self.retained.extend(buffers);
    }

    fn release_retained(&mut self) {
        if !self.retained.is_empty() && self.engine_idle() {
            trace!(count = self.retained.len(), "released retained frame buffers");
            self.retained.clear();
        }
    }

    // -- tiles ---------------------------------------------------------------

    /// Allocate a tile slot and, unless `spec` carries one, its buffer.
    ///
    /// Allocated buffers are aligned to
    /// [`TILE_BUFFER_ALIGNMENT`](defaults::TILE_BUFFER_ALIGNMENT) and
    /// released again if any later step fails.
    ///
    /// # Errors
    ///
    /// - [`Error::NullFrame`] if the frame is not allocated
    /// - [`Error::DimensionMismatch`] if the element sizes of tile and frame
    ///   differ
    /// - [`Error::TileRegistryFull`] if every tile slot is in use
    /// - allocation errors from [`allocate_buffer`](Self::allocate_buffer)
    /// - [`Error::BadArgument`] if the geometry does not fit the buffer
    pub fn create_tile(&mut self, spec: TileSpec) -> Result<TileId> {
        let result = self.create_tile_inner(spec);
        self.track(result)
    }

    fn create_tile_inner(&mut self, spec: TileSpec) -> Result<TileId> {
        let frame = self.frames.get(spec.frame).ok_or(Error::NullFrame)?;
        if !frame.element_type().same_layout(&spec.element) {
            return Err(layout_mismatch(spec.element, frame.element_type()));
        }
        if self.tiles.is_full() {
            return Err(Error::TileRegistryFull);
        }

        let (buffer, owned) = match spec.storage {
            TileStorage::Provided(buffer) => (buffer, false),
            TileStorage::Allocate { bank, size } => {
                let size = size.unwrap_or_else(|| spec.required_buffer_size());
                let banks = self.banks.as_mut().ok_or(Error::NullManager)?;
                (banks.allocate(size, bank, defaults::TILE_BUFFER_ALIGNMENT)?, true)
            }
        };

        let inserted = Tile::new(&spec, buffer).and_then(|mut tile| {
            tile.owns_buffer = owned;
            self.tiles.insert(tile).map_err(|_| Error::TileRegistryFull)
        });
        match inserted {
            Ok(id) => {
                trace!(tile = id.index(), size = buffer.len(), bank = ?buffer.bank(), "tile created");
                Ok(id)
            }
            Err(err) => {
                if owned {
                    if let Some(banks) = self.banks.as_mut() {
                        // Rollback of a buffer allocated just above.
                        let _ = banks.free(buffer.as_ptr());
                    }
                }
                Err(err)
            }
        }
    }

    /// Release a tile slot and the buffer allocated for it.
    ///
    /// # Errors
    ///
    /// - [`Error::NullTile`] if `tile` is not allocated
    /// - [`Error::BadArgument`] while the tile has transfers in flight or a
    ///   later tile is still copying from it
    pub fn free_tile(&mut self, tile: TileId) -> Result<()> {
        let result = self.free_tile_inner(tile);
        self.track(result)
    }

    fn free_tile_inner(&mut self, id: TileId) -> Result<()> {
        let tile = self.tiles.get(id).ok_or(Error::NullTile)?;
        if tile.queued > 0 || tile.is_transfer_pending() {
            return Err(Error::bad_argument("tile has transfers in flight"));
        }
        if !tile.is_free() {
            return Err(Error::bad_argument(format!(
                "tile is still read by {} pending transfers",
                tile.reuse_count
            )));
        }
        let Some(tile) = self.tiles.remove(id) else {
            return Err(Error::NullTile);
        };
        if tile.owns_buffer {
            if let (Some(banks), Some(buffer)) = (self.banks.as_mut(), tile.buffer()) {
                banks.free(buffer.as_ptr())?;
            }
        }
        trace!(tile = id.index(), "tile freed");
        Ok(())
    }

    /// Release every tile slot and drop queued transfers.
    ///
    /// Tile buffers stay allocated; use
    /// [`free_all_buffers`](Self::free_all_buffers) to reclaim them.
    pub fn free_all_tiles(&mut self) {
        if !self.queue.is_empty() {
            warn!(pending = self.queue.len(), "freeing all tiles drops queued transfers");
        }
        self.queue.clear();
        self.tiles.clear();
        self.last_error = ErrorKind::Success;
    }

    /// Tile record for `tile`.
    pub fn tile(&self, tile: TileId) -> Option<&Tile> {
        self.tiles.get(tile)
    }

    /// Check a tile's geometry against its buffer.
    ///
    /// # Errors
    ///
    /// [`Error::NullTile`] for an unknown handle, otherwise the errors of
    /// [`Tile::validate`].
    pub fn is_tile_ok(&mut self, tile: TileId) -> Result<()> {
        let result = self
            .tiles
            .get(tile)
            .ok_or(Error::NullTile)
            .and_then(|t| t.validate());
        self.track(result)
    }

    fn idle_tile_mut(&mut self, id: TileId) -> Result<&mut Tile> {
        let tile = self.tiles.get_mut(id).ok_or(Error::NullTile)?;
        if tile.queued > 0 || tile.status.contains(TileStatus::DMA_ONGOING) {
            return Err(Error::bad_argument("tile has transfers in flight"));
        }
        Ok(tile)
    }

    /// Move a tile to frame position `(x, y)`.
    ///
    /// The tile is left where it was if its footprint would not fit in frame
    /// coordinates.
    ///
    /// # Errors
    ///
    /// [`Error::NullTile`], or [`Error::BadArgument`] for an unrepresentable
    /// position or while transfers are in flight.
    pub fn set_tile_position(&mut self, tile: TileId, x: i32, y: i32) -> Result<()> {
        let result = self.idle_tile_mut(tile).and_then(|t| {
            let saved = (t.x(), t.y());
            t.set_position(x, y);
            t.validate().inspect_err(|_| t.set_position(saved.0, saved.1))
        });
        self.track(result)
    }

    /// Set the top and bottom halo to `edge` rows, growing or shrinking the
    /// core so the footprint stays put.
    ///
    /// # Errors
    ///
    /// [`Error::NullTile`], or [`Error::BadArgument`] if the halos are not
    /// symmetric, no core rows would remain, or transfers are in flight.
    pub fn update_tile_edge_height(&mut self, tile: TileId, edge: u16) -> Result<()> {
        let result = self.idle_tile_mut(tile).and_then(|t| t.set_edge_height(edge));
        self.track(result)
    }

    /// Set the left and right halo to `edge` columns, growing or shrinking
    /// the core so the footprint stays put.
    ///
    /// # Errors
    ///
    /// As for [`update_tile_edge_height`](Self::update_tile_edge_height).
    pub fn update_tile_edge_width(&mut self, tile: TileId, edge: u16) -> Result<()> {
        let result = self.idle_tile_mut(tile).and_then(|t| t.set_edge_width(edge));
        self.track(result)
    }

    /// Reposition and resize a tile within its existing buffer.
    ///
    /// The tile is left unchanged if the new geometry does not fit.
    ///
    /// # Errors
    ///
    /// [`Error::NullTile`], or [`Error::BadArgument`] for geometry that
    /// fails [`Tile::validate`] or while transfers are in flight.
    pub fn update_tile_dimensions(
        &mut self,
        tile: TileId,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        pitch: u32,
    ) -> Result<()> {
        let result = self.idle_tile_mut(tile).and_then(|t| {
            let saved = (t.x(), t.y(), t.width(), t.height(), t.pitch());
            t.set_dimensions(x, y, width, height, pitch);
            t.validate().inspect_err(|_| {
                t.set_dimensions(saved.0, saved.1, saved.2, saved.3, saved.4);
            })
        });
        self.track(result)
    }

    /// Mutable view of a tile's halo-inclusive footprint.
    ///
    /// Element `(0, 0)` of the view is the first core element.
    ///
    /// # Errors
    ///
    /// - [`Error::NullTile`] for an unknown handle
    /// - [`Error::BadArgument`] while a transfer into or out of the tile is
    ///   in flight
    pub fn tile_surface(&mut self, tile: TileId) -> Result<Surface<'_>> {
        if let Err(err) = self.idle_tile_mut(tile).and_then(|t| footprint_surface(t).map(drop)) {
            return self.track(Err(err));
        }
        self.last_error = ErrorKind::Success;
        let tile: &Tile = self.idle_tile_mut(tile)?;
        let halo = tile.halo();
        Ok(footprint_surface(tile)?.with_origin(halo.left as usize, halo.top as usize))
    }

    // -- transfers -----------------------------------------------------------

    /// Queue a 2D copy on the engine directly.
    ///
    /// # Safety
    ///
    /// `src` must stay readable and `dst` writable over
    /// `(rows - 1) * pitch + row_bytes` bytes each until the returned handle
    /// completes, and nothing else may write either region meanwhile.
    ///
    /// # Errors
    ///
    /// - [`Error::NullPointer`] if either pointer is null
    /// - [`Error::BadArgument`] for zero rows or zero row bytes
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn add_request(
        &mut self,
        dst: *mut u8,
        src: *const u8,
        row_bytes: usize,
        rows: usize,
        src_pitch: usize,
        dst_pitch: usize,
        notify: bool,
    ) -> Result<TransferHandle> {
        // SAFETY: forwarded from this function's contract.
        let request = unsafe { TransferRequest::new(src, dst, row_bytes, rows, src_pitch, dst_pitch, notify) };
        let result = request.map(|r| self.submit(&[r]));
        self.track(result)
    }

    fn submit(&mut self, requests: &[TransferRequest]) -> TransferHandle {
        let mut handle = TransferHandle::NOOP;
        for request in requests {
            handle = self.engine.submit(request);
            debug!(
                handle = handle.id(),
                row_bytes = request.row_bytes(),
                rows = request.rows(),
                src_pitch = request.src_pitch(),
                dst_pitch = request.dst_pitch(),
                notify = request.notify(),
                "transfer submitted"
            );
        }
        if !handle.is_noop() {
            self.last_submitted = Some(handle);
        }
        handle
    }

    /// Fetch a tile's footprint from its frame, reusing what `previous`
    /// already holds.
    ///
    /// The footprint is clamped to the frame plus its padding border; the
    /// clipped sides are synthesized when the transfer retires. Overlap
    /// with the area `previous` last fetched ([`Tile::fetched`]) is copied
    /// tile-to-tile instead of fetched; its synthesized padding never is.
    /// Reuse is skipped when `previous` is the tile itself, belongs to
    /// another frame or has a different element layout. Only the last
    /// request issued carries `notify`.
    ///
    /// # Errors
    ///
    /// - [`Error::BufferOverflow`] if the transfer queue is full
    /// - [`Error::NullTile`] if `tile` or `previous` is not allocated
    /// - [`Error::NullFrame`] if the frame is gone or has no buffer
    /// - [`Error::DimensionMismatch`] if tile and frame element sizes differ
    /// - [`Error::BadArgument`] if either tile fails [`Tile::validate`]
    pub fn transfer_in(&mut self, tile: TileId, previous: Option<TileId>, notify: bool) -> Result<()> {
        let result = self.transfer_in_inner(tile, previous, notify);
        self.track(result)
    }

    fn transfer_in_inner(&mut self, id: TileId, previous: Option<TileId>, notify: bool) -> Result<()> {
        if self.queue.is_full() {
            return Err(Error::BufferOverflow("transfer queue is full"));
        }
        let tile = self.tiles.get(id).ok_or(Error::NullTile)?;
        let frame = readable_frame(&self.frames, tile)?;
        let bounds = frame.padded_extent();
        let clamp = plan::clamp(tile.footprint(), bounds);

        let source = match previous.filter(|&p| p != id) {
            Some(p) => {
                let prev = self.tiles.get(p).ok_or(Error::NullTile)?;
                prev.validate()?;
                if prev.frame() == tile.frame() && prev.element_type().same_layout(&tile.element_type()) {
                    Some((p, prev))
                } else {
                    debug!(tile = id.index(), previous = p.index(), "previous tile not reusable");
                    None
                }
            }
            None => None,
        };

        let resident = source.and_then(|(_, prev)| prev.fetched());
        let segments = match clamp.region {
            Some(region) => plan::plan_fetch(region, resident),
            None => SmallVec::new(),
        };
        let reused = segments.iter().any(|s| s.source == Source::Previous);
        let requests = fetch_requests(tile, frame, source.map(|(_, prev)| prev), &segments, notify)?;
        let fill = border_fill(frame, clamp.region.is_some());
        let previous = source.filter(|_| reused).map(|(p, _)| p);

        let handle = self.submit(&requests);
        self.enqueue(id, handle, previous, Some((clamp, fill)));
        Ok(())
    }

    /// Write a tile's core back to its frame, clipped to the frame.
    ///
    /// A core entirely outside the frame queues a no-op.
    ///
    /// # Errors
    ///
    /// - [`Error::BufferOverflow`] if the transfer queue is full
    /// - [`Error::NullTile`] / [`Error::NullFrame`] for missing records
    /// - [`Error::DimensionMismatch`] if element sizes differ
    /// - [`Error::BadArgument`] if the frame buffer is read-only
    pub fn transfer_out(&mut self, tile: TileId, notify: bool) -> Result<()> {
        let result = self.transfer_out_inner(tile, notify);
        self.track(result)
    }

    fn transfer_out_inner(&mut self, id: TileId, notify: bool) -> Result<()> {
        if self.queue.is_full() {
            return Err(Error::BufferOverflow("transfer queue is full"));
        }
        let requests = self.store_requests(id, notify)?;
        let handle = self.submit(&requests);
        self.enqueue(id, handle, None, None);
        Ok(())
    }

    fn store_requests(&self, id: TileId, notify: bool) -> Result<Requests> {
        let tile = self.tiles.get(id).ok_or(Error::NullTile)?;
        let frame = readable_frame(&self.frames, tile)?;
        let mut requests = Requests::new();
        if let Some(area) = plan::plan_store(tile.core(), frame.extent()) {
            let (rows, row_bytes) = area_bytes(area, tile.element_size());
            let src = tile_ptr(tile, area, rows, row_bytes)?;
            let dst = frame_ptr_mut(frame, area, rows, row_bytes)?;
            // SAFETY: both ranges were bounds-checked above. The tile buffer
            // lives in a bank owned by this manager and the frame buffer is
            // retained until the engine is idle.
            let request = unsafe {
                TransferRequest::new(src, dst, row_bytes, rows, tile.pitch_bytes(), frame.pitch_bytes(), notify)
            }?;
            requests.push(request);
        }
        Ok(requests)
    }

    fn enqueue(
        &mut self,
        id: TileId,
        handle: TransferHandle,
        previous: Option<TileId>,
        fetch: Option<(Clamp, BorderFill)>,
    ) {
        if let Some(p) = previous {
            if let Some(prev) = self.tiles.get_mut(p) {
                prev.reuse_count += 1;
            }
        }
        let Some(tile) = self.tiles.get_mut(id) else {
            return;
        };
        tile.transfer = Some(handle);
        tile.queued += 1;
        tile.status.insert(TileStatus::DMA_ONGOING);
        match fetch {
            Some((clamp, fill)) => {
                tile.status.remove(TileStatus::EDGE_PADDING);
                tile.status.insert(clamp.pad.flags());
                tile.pad = clamp.pad;
                tile.fill = fill;
                tile.fetched = clamp.region;
                tile.previous = previous;
            }
            // Written back: the buffer may no longer match the frame.
            None => tile.fetched = None,
        }
        if self.queue.push(QueueEntry { tile: id, handle, previous }).is_err() {
            // Callers check for room before issuing.
            warn!(tile = id.index(), "transfer queue overflow");
        }
        trace!(tile = id.index(), handle = handle.id(), pending = self.queue.len(), "tile transfer queued");
    }

    /// Fetch a tile without reuse and without queueing.
    ///
    /// The footprint is clamped to the frame itself, ignoring its padding
    /// border. Completion is observed with
    /// [`check_tile_fast`](Self::check_tile_fast) or
    /// [`wait_for_tile_fast`](Self::wait_for_tile_fast); padding is then
    /// applied with [`pad_edges`](Self::pad_edges).
    ///
    /// # Errors
    ///
    /// As for [`transfer_in`](Self::transfer_in), except that the queue is
    /// never full.
    pub fn transfer_in_fast(&mut self, tile: TileId, notify: bool) -> Result<TransferHandle> {
        let result = self.transfer_in_fast_inner(tile, notify);
        self.track(result)
    }

    fn transfer_in_fast_inner(&mut self, id: TileId, notify: bool) -> Result<TransferHandle> {
        let tile = self.tiles.get(id).ok_or(Error::NullTile)?;
        let frame = readable_frame(&self.frames, tile)?;
        let clamp = plan::clamp(tile.footprint(), frame.extent());
        let segments = match clamp.region {
            Some(region) => plan::plan_fetch(region, None),
            None => SmallVec::new(),
        };
        let requests = fetch_requests(tile, frame, None, &segments, notify)?;
        let fill = border_fill(frame, clamp.region.is_some());

        let handle = self.submit(&requests);
        if let Some(tile) = self.tiles.get_mut(id) {
            tile.transfer = Some(handle);
            tile.status.remove(TileStatus::EDGE_PADDING);
            tile.status.insert(TileStatus::DMA_ONGOING | clamp.pad.flags());
            tile.pad = clamp.pad;
            tile.fill = fill;
            tile.fetched = clamp.region;
        }
        Ok(handle)
    }

    /// Write a tile's core back to its frame without queueing.
    ///
    /// # Errors
    ///
    /// As for [`transfer_out`](Self::transfer_out), except that the queue is
    /// never full.
    pub fn transfer_out_fast(&mut self, tile: TileId, notify: bool) -> Result<TransferHandle> {
        let result = self.store_requests(tile, notify).map(|requests| {
            let handle = self.submit(&requests);
            if let Some(t) = self.tiles.get_mut(tile) {
                t.transfer = Some(handle);
                t.status.insert(TileStatus::DMA_ONGOING);
                t.fetched = None;
            }
            handle
        });
        self.track(result)
    }

    // -- completion ----------------------------------------------------------

    /// Retire completed transfers up to `tile` and report whether the tile
    /// is ready.
    ///
    /// Walks the queue from the oldest entry, stopping at the first
    /// transfer still in flight or once the tile's last queued transfer has
    /// retired. Retiring an entry applies its padding and releases the
    /// tile it copied from. Never blocks.
    ///
    /// Returns true if the tile has no pending work.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NullTile`] if `tile` is not allocated.
    pub fn check_ready(&mut self, tile: TileId) -> Result<bool> {
        let result = self.check_ready_inner(tile);
        self.track(result)
    }

    fn check_ready_inner(&mut self, id: TileId) -> Result<bool> {
        let tile = self.tiles.get(id).ok_or(Error::NullTile)?;
        if !tile.status.contains(TileStatus::DMA_ONGOING) {
            return Ok(tile.status.is_empty());
        }
        if tile.queued == 0 {
            // Issued through a fast path; padding is left to `pad_edges`.
            let done = tile.transfer.is_none_or(|h| self.engine.is_done(h));
            if done {
                if let Some(tile) = self.tiles.get_mut(id) {
                    tile.status.remove(TileStatus::DMA_ONGOING);
                }
            }
            return Ok(done && self.tiles.get(id).is_some_and(|t| t.status.is_empty()));
        }

        while let Some(entry) = self.queue.front().copied() {
            if !entry.handle.is_noop() && !self.engine.is_done(entry.handle) {
                break;
            }
            self.queue.pop_front();
            self.retire(entry);
            if entry.tile == id && self.tiles.get(id).is_some_and(|t| t.queued == 0) {
                break;
            }
        }
        self.release_retained();
        Ok(self.tiles.get(id).is_some_and(|t| t.status.is_empty()))
    }

    fn retire(&mut self, entry: QueueEntry) {
        if let Some(prev) = entry.previous.and_then(|p| self.tiles.get_mut(p)) {
            prev.reuse_count = prev.reuse_count.saturating_sub(1);
        }
        let Some(tile) = self.tiles.get_mut(entry.tile) else {
            return;
        };
        tile.queued = tile.queued.saturating_sub(1);
        if entry.previous.is_some() && tile.previous == entry.previous {
            tile.previous = None;
        }
        if tile.queued == 0 {
            tile.status.remove(TileStatus::DMA_ONGOING);
            if let Err(err) = synthesize_padding(tile) {
                warn!(tile = entry.tile.index(), %err, "padding failed");
            }
        }
        trace!(
            tile = entry.tile.index(),
            handle = entry.handle.id(),
            status = ?tile.status,
            "transfer retired"
        );
    }

    /// Returns true once `handle` has completed.
    pub fn check_transfer(&mut self, handle: TransferHandle) -> bool {
        self.last_error = ErrorKind::Success;
        self.engine.is_done(handle)
    }

    /// Poll the last transfer issued for `tile` without touching the
    /// queue.
    ///
    /// Clears the in-flight flag of a fast-path transfer once it is done.
    /// Padding is not applied. Returns true if the transfer has completed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NullTile`] if `tile` is not allocated.
    pub fn check_tile_fast(&mut self, tile: TileId) -> Result<bool> {
        let result = self.check_tile_fast_inner(tile);
        self.track(result)
    }

    fn check_tile_fast_inner(&mut self, id: TileId) -> Result<bool> {
        let tile = self.tiles.get(id).ok_or(Error::NullTile)?;
        let (handle, queued) = (tile.transfer, tile.queued);
        let done = handle.is_none_or(|h| self.engine.is_done(h));
        if done && queued == 0 {
            if let Some(tile) = self.tiles.get_mut(id) {
                tile.status.remove(TileStatus::DMA_ONGOING);
            }
        }
        Ok(done)
    }

    /// Synthesize the halo edges a tile still owes.
    ///
    /// Applying padding twice has no further effect.
    ///
    /// # Errors
    ///
    /// - [`Error::NullTile`] if `tile` is not allocated
    /// - [`Error::BadArgument`] while a transfer is in flight
    pub fn pad_edges(&mut self, tile: TileId) -> Result<()> {
        let result = self.idle_tile_mut(tile).and_then(synthesize_padding);
        self.track(result)
    }

    /// Returns true if no queued transfer still copies from `tile`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NullTile`] if `tile` is not allocated.
    pub fn is_free(&mut self, tile: TileId) -> Result<bool> {
        let result = self.tiles.get(tile).map(Tile::is_free).ok_or(Error::NullTile);
        self.track(result)
    }

    /// Number of queued transfers not yet retired.
    pub fn pending_transfers(&self) -> usize {
        self.queue.len()
    }

    fn idle(&mut self, mode: WaitMode) {
        match mode {
            WaitMode::Spin => {
                self.engine.poll();
                std::hint::spin_loop();
            }
            WaitMode::Sleep => self.engine.wait_for_completion(),
        }
    }

    fn fault(&self) -> Option<Error> {
        if !self.errors.is_raised() {
            return None;
        }
        warn!(fault = ?self.errors.last_fault(), "wait abandoned on transfer fault");
        Some(Error::TransferFault)
    }

    /// Block until `tile`'s queued transfers have retired.
    ///
    /// # Errors
    ///
    /// - [`Error::NullTile`] if `tile` is not allocated
    /// - [`Error::TransferFault`] once the engine raises a fault
    pub fn wait_for_tile(&mut self, tile: TileId, mode: WaitMode) -> Result<()> {
        let result = self.wait_for_tile_inner(tile, mode);
        self.track(result)
    }

    fn wait_for_tile_inner(&mut self, id: TileId, mode: WaitMode) -> Result<()> {
        loop {
            let ready = self.check_ready_inner(id)?;
            let in_flight = self
                .tiles
                .get(id)
                .is_some_and(|t| t.status.contains(TileStatus::DMA_ONGOING));
            if ready || !in_flight {
                return Ok(());
            }
            if let Some(err) = self.fault() {
                return Err(err);
            }
            self.idle(mode);
        }
    }

    /// Block until `tile`'s last transfer completes, then clear its
    /// in-flight flag. Padding is not applied.
    ///
    /// # Errors
    ///
    /// As for [`wait_for_tile`](Self::wait_for_tile).
    pub fn wait_for_tile_fast(&mut self, tile: TileId, mode: WaitMode) -> Result<()> {
        let result = self.wait_for_tile_fast_inner(tile, mode);
        self.track(result)
    }

    fn wait_for_tile_fast_inner(&mut self, id: TileId, mode: WaitMode) -> Result<()> {
        while !self.check_tile_fast_inner(id)? {
            if let Some(err) = self.fault() {
                return Err(err);
            }
            self.idle(mode);
        }
        Ok(())
    }

    /// Block until `handle` completes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransferFault`] once the engine raises a fault.
    pub fn wait_for_transfer(&mut self, handle: TransferHandle, mode: WaitMode) -> Result<()> {
        let result = loop {
            if self.engine.is_done(handle) {
                break Ok(());
            }
            if let Some(err) = self.fault() {
                break Err(err);
            }
            self.idle(mode);
        };
        self.track(result)
    }
}

impl<D: BlockTransfer + std::fmt::Debug> std::fmt::Debug for TileManager<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileManager")
            .field("engine", &self.engine)
            .field("banks", &self.banks)
            .field("frames", &self.frames.len())
            .field("tiles", &self.tiles.len())
            .field("pending", &self.queue.len())
            .field("last_error", &self.last_error)
            .field("errors", &self.errors)
            .finish()
    }
}

fn readable_frame<'a>(frames: &'a SlotRegistry<Frame, FrameId>, tile: &Tile) -> Result<&'a Frame> {
    let frame = frames.get(tile.frame()).ok_or(Error::NullFrame)?;
    if frame.is_virtual() {
        return Err(Error::NullFrame);
    }
    if !frame.element_type().same_layout(&tile.element_type()) {
        return Err(layout_mismatch(tile.element_type(), frame.element_type()));
    }
    tile.validate()?;
    Ok(frame)
}

fn layout_mismatch(tile: ElementType, frame: ElementType) -> Error {
    Error::DimensionMismatch(format!(
        "tile element is {}x{} bytes, frame element is {}x{}",
        tile.channels(),
        tile.depth(),
        frame.channels(),
        frame.depth()
    ))
}

fn border_fill(frame: &Frame, readable: bool) -> BorderFill {
    match frame.policy() {
        PaddingPolicy::Zero => BorderFill::Constant(0),
        PaddingPolicy::Constant => BorderFill::Constant(frame.padding_value()),
        PaddingPolicy::Replicate if readable => BorderFill::Replicate,
        // Nothing was fetched to replicate from.
        PaddingPolicy::Replicate => BorderFill::Constant(frame.padding_value()),
    }
}

fn area_bytes(area: Rect, element_size: usize) -> (usize, usize) {
    (area.height() as usize, area.width() as usize * element_size)
}

fn span(rows: usize, row_bytes: usize, pitch: usize) -> usize {
    (rows - 1) * pitch + row_bytes
}

fn tile_ptr(tile: &Tile, area: Rect, rows: usize, row_bytes: usize) -> Result<*mut u8> {
    let buffer = tile.buffer().ok_or(Error::NullBuffer)?;
    tile.offset_of(area.x.start, area.y.start)
        .and_then(|offset| buffer.offset_ptr(offset, span(rows, row_bytes, tile.pitch_bytes())))
        .map(|p| p.as_ptr())
        .ok_or(Error::BufferOverflow("transfer leaves the tile buffer"))
}

fn frame_offset(frame: &Frame, area: Rect, rows: usize, row_bytes: usize) -> Result<usize> {
    let len = frame.buffer().map_or(0, |b| b.len());
    frame
        .offset_of(area.x.start, area.y.start)
        .filter(|offset| {
            offset
                .checked_add(span(rows, row_bytes, frame.pitch_bytes()))
                .is_some_and(|end| end <= len)
        })
        .ok_or(Error::BufferOverflow("transfer leaves the frame buffer"))
}

fn frame_ptr(frame: &Frame, area: Rect, rows: usize, row_bytes: usize) -> Result<*const u8> {
    let buffer = frame.buffer().ok_or(Error::NullFrame)?;
    let offset = frame_offset(frame, area, rows, row_bytes)?;
    // SAFETY: offset + span <= len was checked by `frame_offset`.
    Ok(unsafe { buffer.as_ptr().add(offset) })
}

fn frame_ptr_mut(frame: &Frame, area: Rect, rows: usize, row_bytes: usize) -> Result<*mut u8> {
    let buffer = frame.buffer().ok_or(Error::NullFrame)?;
    let base = buffer
        .as_mut_ptr()
        .ok_or_else(|| Error::bad_argument("frame buffer is read-only"))?;
    let offset = frame_offset(frame, area, rows, row_bytes)?;
    // SAFETY: as in `frame_ptr`.
    Ok(unsafe { base.add(offset) })
}

fn fetch_requests(
    tile: &Tile,
    frame: &Frame,
    previous: Option<&Tile>,
    segments: &[Segment],
    notify: bool,
) -> Result<Requests> {
    let es = tile.element_size();
    let last = segments.len().saturating_sub(1);
    let mut requests = Requests::new();
    for (i, segment) in segments.iter().enumerate() {
        let (rows, row_bytes) = area_bytes(segment.area, es);
        let dst = tile_ptr(tile, segment.area, rows, row_bytes)?;
        let (src, src_pitch) = match (segment.source, previous) {
            (Source::Previous, Some(prev)) => (
                tile_ptr(prev, segment.area, rows, row_bytes)? as *const u8,
                prev.pitch_bytes(),
            ),
            _ => (frame_ptr(frame, segment.area, rows, row_bytes)?, frame.pitch_bytes()),
        };
        // SAFETY: every range was bounds-checked against its buffer above.
        // Tile buffers live in banks owned by the manager and frame buffers
        // are retained until the engine goes idle.
        let request = unsafe {
            TransferRequest::new(src, dst, row_bytes, rows, src_pitch, tile.pitch_bytes(), notify && i == last)
        }?;
        requests.push(request);
    }
    Ok(requests)
}

fn footprint_surface(tile: &Tile) -> Result<Surface<'_>> {
    let buffer = tile.buffer().ok_or(Error::NullBuffer)?;
    let edge = tile
        .edge_offset()
        .ok_or_else(|| Error::bad_argument("tile data origin leaves no room for the halo"))?;
    // SAFETY: the caller holds the tile exclusively and no transfer writes
    // it. Transfers reading it as a reuse source only touch fetched
    // elements, which a surface over an idle tile does not race with
    // inside this single control flow.
    let data = unsafe { buffer.slice_mut(edge, tile.footprint_bytes()) };
    data.and_then(|d| {
        Surface::new(
            d,
            tile.footprint_cols(),
            tile.footprint_rows(),
            tile.pitch_bytes(),
            tile.element_size(),
        )
    })
    .ok_or(Error::BufferOverflow("tile footprint exceeds its buffer"))
}

fn synthesize_padding(tile: &mut Tile) -> Result<()> {
    let flags = tile.status & TileStatus::EDGE_PADDING;
    if flags.is_empty() {
        return Ok(());
    }
    let pad = tile.pad;
    let owed = PadExtents {
        left: if flags.contains(TileStatus::LEFT_PAD) { pad.left } else { 0 },
        top: if flags.contains(TileStatus::TOP_PAD) { pad.top } else { 0 },
        right: if flags.contains(TileStatus::RIGHT_PAD) { pad.right } else { 0 },
        bottom: if flags.contains(TileStatus::BOTTOM_PAD) { pad.bottom } else { 0 },
    };
    let fill = tile.fill;
    footprint_surface(tile)?.synthesize_border(owed, fill);
    tile.status.remove(TileStatus::EDGE_PADDING);
    trace!(?owed, ?fill, "tile edges padded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dma::{Completion, SoftTransfer};
    use crate::memory::HeapSegment;

    fn manager(completion: Completion) -> TileManager<SoftTransfer> {
        let config = ManagerConfig::default().with_heap_bank(64 * 1024);
        TileManager::new(SoftTransfer::new(completion).with_history(true), config).unwrap()
    }

    fn gradient_frame(tm: &mut TileManager<SoftTransfer>, spec: FrameSpec) -> FrameId {
        let segment = HeapSegment::new(spec.required_len()).unwrap();
        // SAFETY: the segment is not shared yet.
        let bytes = unsafe { segment.as_mut_slice() }.unwrap();
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = (i % 251) as u8 + 1;
        }
        tm.create_frame(spec.with_buffer(Arc::new(segment))).unwrap()
    }

    #[test]
    fn test_new_rejects_bad_config() {
        let err = TileManager::new(SoftTransfer::new(Completion::Immediate), ManagerConfig::default().with_queue_length(0));
        assert!(matches!(err, Err(Error::BadArgument(_))));

        let err = TileManager::new(SoftTransfer::with_capacity(Completion::Immediate, 0), ManagerConfig::default());
        assert!(matches!(err, Err(Error::TransferInitFailed(_))));
    }

    #[test]
    fn test_last_error_tracks_each_call() {
        let mut tm = manager(Completion::Immediate);
        assert!(tm.allocate_buffer(0, BankSelector::Any, 8).is_err());
        assert_eq!(tm.last_error(), ErrorKind::BadArgument);
        assert_eq!(tm.error_info(), ErrorKind::BadArgument);

        tm.allocate_buffer(64, BankSelector::Any, 8).unwrap();
        assert_eq!(tm.last_error(), ErrorKind::Success);
    }

    #[test]
    fn test_create_tile_rolls_back_buffer() {
        let mut tm = manager(Completion::Immediate);
        let frame = gradient_frame(&mut tm, FrameSpec::new(32, 32, ElementType::U8));
        let before = tm.bank_stats(0).unwrap();

        // Pitch narrower than the halo-inclusive width fails after allocation.
        let spec = TileSpec::new(frame, 8, 8, ElementType::U8).with_halo(2, 2).with_pitch(10);
        assert!(matches!(tm.create_tile(spec), Err(Error::BadArgument(_))));
        assert_eq!(tm.bank_stats(0).unwrap().allocated_bytes, before.allocated_bytes);

        let spec = TileSpec::new(frame, 8, 8, ElementType::U16);
        assert!(matches!(tm.create_tile(spec), Err(Error::DimensionMismatch(_))));
    }

    #[test]
    fn test_transfer_in_copies_core() {
        let mut tm = manager(Completion::Immediate);
        let frame = gradient_frame(&mut tm, FrameSpec::new(32, 32, ElementType::U8));
        let tile = tm.create_tile(TileSpec::new(frame, 4, 4, ElementType::U8).at(3, 5)).unwrap();

        tm.transfer_in(tile, None, false).unwrap();
        assert!(tm.check_ready(tile).unwrap());
        assert_eq!(tm.pending_transfers(), 0);

        let expected = (5 * 32 + 3) % 251 + 1;
        let surface = tm.tile_surface(tile).unwrap();
        assert_eq!(surface.element(0, 0), Some(&[expected as u8][..]));
    }

    #[test]
    fn test_reuse_splits_requests() {
        let mut tm = manager(Completion::Immediate);
        let frame = gradient_frame(&mut tm, FrameSpec::new(64, 64, ElementType::U8));
        let t1 = tm.create_tile(TileSpec::new(frame, 16, 16, ElementType::U8)).unwrap();
        let t2 = tm.create_tile(TileSpec::new(frame, 16, 16, ElementType::U8).at(8, 0)).unwrap();

        tm.transfer_in(t1, None, false).unwrap();
        tm.engine_mut().clear_history();
        tm.transfer_in(t2, Some(t1), true).unwrap();

        let history = tm.engine().history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].row_bytes(), 8);
        assert!(!history[0].notify());
        assert!(history[1].notify());
        assert_eq!(tm.tile(t1).unwrap().reuse_count(), 1);
        assert_eq!(tm.tile(t2).unwrap().previous(), Some(t1));

        assert!(tm.check_ready(t2).unwrap());
        assert_eq!(tm.tile(t1).unwrap().reuse_count(), 0);
        assert_eq!(tm.tile(t2).unwrap().previous(), None);
    }

    #[test]
    fn test_free_tile_refused_while_queued() {
        let mut tm = manager(Completion::Deferred);
        let frame = gradient_frame(&mut tm, FrameSpec::new(16, 16, ElementType::U8));
        let tile = tm.create_tile(TileSpec::new(frame, 4, 4, ElementType::U8)).unwrap();
        tm.transfer_in(tile, None, false).unwrap();

        assert!(matches!(tm.free_tile(tile), Err(Error::BadArgument(_))));
        tm.wait_for_tile(tile, WaitMode::Sleep).unwrap();
        tm.free_tile(tile).unwrap();
        assert!(tm.tile(tile).is_none());
        assert_eq!(tm.bank_stats(0).unwrap().live_allocations, 0);
    }

    #[test]
    fn test_queue_full() {
        let config = ManagerConfig::default().with_heap_bank(4096).with_queue_length(1);
        let mut tm = TileManager::new(SoftTransfer::new(Completion::Deferred), config).unwrap();
        let frame = gradient_frame(&mut tm, FrameSpec::new(16, 16, ElementType::U8));
        let tile = tm.create_tile(TileSpec::new(frame, 4, 4, ElementType::U8)).unwrap();

        tm.transfer_in(tile, None, false).unwrap();
        assert_eq!(
            tm.transfer_out(tile, false),
            Err(Error::BufferOverflow("transfer queue is full"))
        );
        assert_eq!(tm.last_error(), ErrorKind::BufferOverflow);
        assert_eq!(tm.tile(tile).unwrap().queued, 1);
    }

    #[test]
    fn test_edge_updates_refused_while_in_flight() {
        let mut tm = manager(Completion::Deferred);
        let frame = gradient_frame(&mut tm, FrameSpec::new(32, 32, ElementType::U8));
        let tile = tm
            .create_tile(TileSpec::new(frame, 8, 8, ElementType::U8).with_halo(2, 2))
            .unwrap();
        tm.transfer_in(tile, None, false).unwrap();
        assert!(tm.update_tile_edge_height(tile, 1).is_err());
        tm.wait_for_tile(tile, WaitMode::Sleep).unwrap();

        tm.update_tile_edge_height(tile, 1).unwrap();
        assert_eq!(tm.tile(tile).unwrap().height(), 10);
        assert!(tm.update_tile_dimensions(tile, 0, 0, 64, 8, 12).is_err());
        assert_eq!(tm.tile(tile).unwrap().width(), 8);
    }

    #[test]
    fn test_free_frame_retains_buffer_until_idle() {
        let mut tm = manager(Completion::Deferred);
        let frame = gradient_frame(&mut tm, FrameSpec::new(16, 16, ElementType::U8));
        let tile = tm.create_tile(TileSpec::new(frame, 4, 4, ElementType::U8)).unwrap();
        tm.transfer_in(tile, None, false).unwrap();

        tm.free_frame(frame).unwrap();
        assert_eq!(tm.retained.len(), 1);
        assert!(matches!(tm.free_frame(frame), Err(Error::BadArgument(_))));

        tm.wait_for_tile(tile, WaitMode::Sleep).unwrap();
        assert!(tm.retained.is_empty());
    }
}
