//! Tile records: frame sub-regions resident in bank memory.
//!
//! A tile covers `width`×`height` elements of its frame starting at `(x, y)`,
//! plus a halo border on each side. The buffer holds the whole halo-inclusive
//! footprint; the data origin points at the first core element.
//!
//! ```text
//!  edge origin
//!  v
//!  ┌─────────────── pitch ──────────────┐
//!  │          halo.top rows             │
//!  │ halo.left │ core  │ halo.right     │
//!  │          halo.bottom rows          │
//!  └────────────────────────────────────┘
//! ```

use crate::array::ArrayGeometry;
use crate::dma::TransferHandle;
use crate::error::{Error, Result};
use crate::frame::Border;
use crate::geometry::Rect;
use crate::memory::{BankSelector, PoolBuffer};
use crate::registry::{FrameId, TileId};
use crate::view::BorderFill;

/// Layout of one element: sample depth, channel count, signedness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementType {
    depth: u8,
    channels: u8,
    signed: bool,
    is_tile: bool,
}

const SIZE_MASK: u16 = 0x03ff;
const CHANNEL_SHIFT: u16 = 10;
const TILE_BIT: u16 = 1 << 14;
const SIGNED_BIT: u16 = 1 << 15;

impl ElementType {
    /// Unsigned 8-bit, one channel.
    pub const U8: Self = Self::new(1, 1, false);
    /// Signed 8-bit, one channel.
    pub const S8: Self = Self::new(1, 1, true);
    /// Unsigned 16-bit, one channel.
    pub const U16: Self = Self::new(2, 1, false);
    /// Signed 16-bit, one channel.
    pub const S16: Self = Self::new(2, 1, true);
    /// Unsigned 32-bit, one channel.
    pub const U32: Self = Self::new(4, 1, false);
    /// Signed 32-bit, one channel.
    pub const S32: Self = Self::new(4, 1, true);

    /// Element of `channels` samples, each `depth` bytes.
    pub const fn new(depth: u8, channels: u8, signed: bool) -> Self {
        Self {
            depth,
            channels,
            signed,
            is_tile: false,
        }
    }

    /// Same layout with `channels` samples.
    pub const fn with_channels(self, channels: u8) -> Self {
        Self { channels, ..self }
    }

    /// Same layout, marked as belonging to a tile.
    pub const fn as_tile(self) -> Self {
        Self {
            is_tile: true,
            ..self
        }
    }

    /// Bytes per sample.
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth as usize
    }

    /// Samples per element.
    #[inline]
    pub fn channels(&self) -> usize {
        self.channels as usize
    }

    /// Bytes per element.
    #[inline]
    pub fn element_size(&self) -> usize {
        self.depth() * self.channels()
    }

    /// Signed samples.
    #[inline]
    pub fn is_signed(&self) -> bool {
        self.signed
    }

    /// Marked as a tile element type.
    #[inline]
    pub fn is_tile(&self) -> bool {
        self.is_tile
    }

    /// Returns true if the layout can be encoded: 1–4 channels and a
    /// non-zero element size below 1024 bytes.
    pub fn is_valid(&self) -> bool {
        (1..=4).contains(&self.channels)
            && self.depth > 0
            && self.element_size() <= SIZE_MASK as usize
    }

    /// Pack into 16 bits: element size in bits 0–9, channels − 1 in bits
    /// 10–11, tile flag in bit 14, signed flag in bit 15.
    pub fn to_bits(&self) -> u16 {
        let mut bits = self.element_size() as u16 & SIZE_MASK;
        bits |= ((self.channels.saturating_sub(1) as u16) & 0x3) << CHANNEL_SHIFT;
        if self.is_tile {
            bits |= TILE_BIT;
        }
        if self.signed {
            bits |= SIGNED_BIT;
        }
        bits
    }

    /// Unpack from [`to_bits`](Self::to_bits) form.
    ///
    /// Returns `None` if the size is zero or not a multiple of the channel
    /// count.
    pub fn from_bits(bits: u16) -> Option<Self> {
        let size = bits & SIZE_MASK;
        let channels = ((bits >> CHANNEL_SHIFT) & 0x3) as u8 + 1;
        if size == 0 || size % channels as u16 != 0 {
            return None;
        }
        let depth = u8::try_from(size / channels as u16).ok()?;
        Some(Self {
            depth,
            channels,
            signed: bits & SIGNED_BIT != 0,
            is_tile: bits & TILE_BIT != 0,
        })
    }

    /// Same depth and channel count, regardless of signedness and tile
    /// marking.
    #[inline]
    pub fn same_layout(&self, other: &ElementType) -> bool {
        self.depth == other.depth && self.channels == other.channels
    }
}

bitflags::bitflags! {
    /// Pending work on a tile.
    ///
    /// Empty means the tile's data is complete and usable.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TileStatus: u8 {
        /// A transfer into or out of the tile is in flight.
        const DMA_ONGOING = 1 << 0;
        /// Left halo columns must be synthesized.
        const LEFT_PAD = 1 << 1;
        /// Right halo columns must be synthesized.
        const RIGHT_PAD = 1 << 2;
        /// Top halo rows must be synthesized.
        const TOP_PAD = 1 << 3;
        /// Bottom halo rows must be synthesized.
        const BOTTOM_PAD = 1 << 4;
        /// Any edge needs padding.
        const EDGE_PADDING = Self::LEFT_PAD.bits()
            | Self::RIGHT_PAD.bits()
            | Self::TOP_PAD.bits()
            | Self::BOTTOM_PAD.bits();
    }
}

/// Where a tile's data origin is placed within its buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TileAlignment {
    /// Halo-inclusive footprint starts at the buffer start.
    #[default]
    Unaligned,
    /// Footprint start aligned to 32 bytes.
    EdgeAligned32,
    /// First core element aligned to 32 bytes.
    DataAligned32,
    /// Footprint start aligned to 64 bytes.
    EdgeAligned64,
    /// First core element aligned to 64 bytes.
    DataAligned64,
}

impl TileAlignment {
    fn bytes(self) -> usize {
        match self {
            TileAlignment::Unaligned => 1,
            TileAlignment::EdgeAligned32 | TileAlignment::DataAligned32 => 32,
            TileAlignment::EdgeAligned64 | TileAlignment::DataAligned64 => 64,
        }
    }

    /// Worst-case bytes lost in front of the footprint.
    pub fn slack(self) -> usize {
        self.bytes() - 1
    }
}

/// Halo rows and columns that a completed transfer left unfilled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PadExtents {
    /// Columns on the left.
    pub left: u32,
    /// Rows on top.
    pub top: u32,
    /// Columns on the right.
    pub right: u32,
    /// Rows at the bottom.
    pub bottom: u32,
}

impl PadExtents {
    /// Status flags for the non-zero sides.
    pub fn flags(&self) -> TileStatus {
        let mut flags = TileStatus::empty();
        flags.set(TileStatus::LEFT_PAD, self.left > 0);
        flags.set(TileStatus::RIGHT_PAD, self.right > 0);
        flags.set(TileStatus::TOP_PAD, self.top > 0);
        flags.set(TileStatus::BOTTOM_PAD, self.bottom > 0);
        flags
    }
}

/// Where a new tile's buffer comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileStorage {
    /// Allocate from the manager's banks. `size` defaults to
    /// [`TileSpec::required_buffer_size`].
    Allocate {
        /// Bank to allocate from.
        bank: BankSelector,
        /// Explicit buffer size in bytes.
        size: Option<usize>,
    },
    /// Use a buffer the caller already holds.
    Provided(PoolBuffer),
}

/// Parameters for [`TileManager::create_tile`](crate::TileManager::create_tile).
///
/// # Example
///
/// ```rust,ignore
/// let spec = TileSpec::new(frame, 64, 32, ElementType::U8)
///     .with_halo(2, 2)
///     .at(128, 64)
///     .with_alignment(TileAlignment::DataAligned64);
/// let tile = manager.create_tile(spec)?;
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TileSpec {
    pub(crate) frame: FrameId,
    pub(crate) x: i32,
    pub(crate) y: i32,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) pitch: Option<u32>,
    pub(crate) halo: Border,
    pub(crate) element: ElementType,
    pub(crate) alignment: TileAlignment,
    pub(crate) storage: TileStorage,
}

impl TileSpec {
    /// A `width`×`height` tile of `frame` at the origin, with no halo.
    pub fn new(frame: FrameId, width: u32, height: u32, element: ElementType) -> Self {
        Self {
            frame,
            x: 0,
            y: 0,
            width,
            height,
            pitch: None,
            halo: Border::none(),
            element: element.as_tile(),
            alignment: TileAlignment::Unaligned,
            storage: TileStorage::Allocate {
                bank: BankSelector::Any,
                size: None,
            },
        }
    }

    /// Frame position of the first core element.
    pub fn at(mut self, x: i32, y: i32) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    /// Symmetric halo.
    pub fn with_halo(mut self, width: u16, height: u16) -> Self {
        self.halo = Border::uniform(width, height);
        self
    }

    /// Halo with independent sides.
    pub fn with_border(mut self, halo: Border) -> Self {
        self.halo = halo;
        self
    }

    /// Row stride in elements. Defaults to the halo-inclusive width.
    pub fn with_pitch(mut self, pitch: u32) -> Self {
        self.pitch = Some(pitch);
        self
    }

    /// Placement of the data origin.
    pub fn with_alignment(mut self, alignment: TileAlignment) -> Self {
        self.alignment = alignment;
        self
    }

    /// Allocate from `bank`.
    pub fn in_bank(mut self, bank: BankSelector) -> Self {
        self.storage = match self.storage {
            TileStorage::Allocate { size, .. } => TileStorage::Allocate { bank, size },
            TileStorage::Provided(_) => TileStorage::Allocate { bank, size: None },
        };
        self
    }

    /// Allocate exactly `size` bytes.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        let bank = match self.storage {
            TileStorage::Allocate { bank, .. } => bank,
            TileStorage::Provided(_) => BankSelector::Any,
        };
        self.storage = TileStorage::Allocate {
            bank,
            size: Some(size),
        };
        self
    }

    /// Use `buffer` instead of allocating.
    pub fn with_buffer(mut self, buffer: PoolBuffer) -> Self {
        self.storage = TileStorage::Provided(buffer);
        self
    }

    /// Effective row stride in elements.
    pub fn pitch(&self) -> u32 {
        self.pitch
            .unwrap_or(self.width + self.halo.left as u32 + self.halo.right as u32)
    }

    /// Bytes needed for the halo-inclusive footprint plus alignment slack.
    pub fn required_buffer_size(&self) -> usize {
        footprint_bytes(
            self.width,
            self.height,
            self.pitch(),
            self.halo,
            self.element.element_size(),
        ) + self.alignment.slack()
    }
}

fn footprint_bytes(width: u32, height: u32, pitch: u32, halo: Border, es: usize) -> usize {
    let rows = halo.top as usize + height as usize + halo.bottom as usize;
    let cols = halo.left as usize + width as usize + halo.right as usize;
    if rows == 0 || cols == 0 {
        return 0;
    }
    ((rows - 1) * pitch as usize + cols) * es
}

/// A tile record.
#[derive(Debug, Clone)]
pub struct Tile {
    buffer: Option<PoolBuffer>,
    data_offset: usize,
    frame: FrameId,
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    pitch: u32,
    halo: Border,
    element: ElementType,
    pub(crate) status: TileStatus,
    pub(crate) transfer: Option<TransferHandle>,
    pub(crate) queued: u16,
    pub(crate) reuse_count: u32,
    pub(crate) previous: Option<TileId>,
    pub(crate) pad: PadExtents,
    pub(crate) fill: BorderFill,
    pub(crate) fetched: Option<Rect>,
    pub(crate) owns_buffer: bool,
}

impl Tile {
    /// Lay out `spec` inside `buffer`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadArgument`] if the laid-out tile does not satisfy
    /// [`validate`](Self::validate).
    pub(crate) fn new(spec: &TileSpec, buffer: PoolBuffer) -> Result<Self> {
        let es = spec.element.element_size();
        let pitch = spec.pitch();
        let halo_offset = (spec.halo.top as usize * pitch as usize + spec.halo.left as usize) * es;
        let base = buffer.as_ptr() as usize;
        let align_up = |addr: usize, a: usize| (addr + a - 1) & !(a - 1);

        let edge = match spec.alignment {
            TileAlignment::EdgeAligned32 | TileAlignment::EdgeAligned64 => {
                align_up(base, spec.alignment.bytes()) - base
            }
            _ => 0,
        };
        let data_offset = match spec.alignment {
            TileAlignment::DataAligned32 | TileAlignment::DataAligned64 => {
                align_up(base + edge + halo_offset, spec.alignment.bytes()) - base
            }
            _ => edge + halo_offset,
        };

        let tile = Self {
            buffer: Some(buffer),
            data_offset,
            frame: spec.frame,
            x: spec.x,
            y: spec.y,
            width: spec.width,
            height: spec.height,
            pitch,
            halo: spec.halo,
            element: spec.element,
            status: TileStatus::empty(),
            transfer: None,
            queued: 0,
            reuse_count: 0,
            previous: None,
            pad: PadExtents::default(),
            fill: BorderFill::Constant(0),
            fetched: None,
            owns_buffer: false,
        };
        tile.validate()?;
        Ok(tile)
    }

    /// Check that the geometry fits the buffer.
    ///
    /// # Errors
    ///
    /// - [`Error::NullBuffer`] if the tile has no buffer
    /// - [`Error::BadArgument`] for zero dimensions, an invalid element
    ///   type, a pitch narrower than the halo-inclusive width, or a
    ///   footprint that leaves the buffer
    pub fn validate(&self) -> Result<()> {
        let buffer = self.buffer.as_ref().ok_or(Error::NullBuffer)?;
        if self.width == 0 || self.height == 0 {
            return Err(Error::bad_argument(format!(
                "tile dimensions {}x{} must be non-zero",
                self.width, self.height
            )));
        }
        if !self.element.is_valid() {
            return Err(Error::bad_argument(format!("invalid element type {:?}", self.element)));
        }
        let padded = self.width as u64 + self.halo.left as u64 + self.halo.right as u64;
        if (self.pitch as u64) < padded {
            return Err(Error::bad_argument(format!(
                "tile pitch {} narrower than halo-inclusive width {padded}",
                self.pitch
            )));
        }
        if self.checked_footprint().is_none() {
            return Err(Error::bad_argument(format!(
                "tile footprint at ({}, {}) does not fit in frame coordinates",
                self.x, self.y
            )));
        }
        let edge = self
            .edge_offset()
            .ok_or_else(|| Error::bad_argument("tile data origin leaves no room for the halo"))?;
        let end = edge + self.footprint_bytes();
        if end > buffer.len() {
            return Err(Error::bad_argument(format!(
                "tile footprint needs {end} bytes, buffer holds {}",
                buffer.len()
            )));
        }
        Ok(())
    }

    /// Frame this tile belongs to.
    #[inline]
    pub fn frame(&self) -> FrameId {
        self.frame
    }

    /// Frame column of the first core element.
    #[inline]
    pub fn x(&self) -> i32 {
        self.x
    }

    /// Frame row of the first core element.
    #[inline]
    pub fn y(&self) -> i32 {
        self.y
    }

    /// Halo widths.
    #[inline]
    pub fn halo(&self) -> Border {
        self.halo
    }

    /// Handle of the last transfer issued for this tile.
    #[inline]
    pub fn transfer(&self) -> Option<TransferHandle> {
        self.transfer
    }

    /// Number of later tiles currently copying from this one.
    #[inline]
    pub fn reuse_count(&self) -> u32 {
        self.reuse_count
    }

    /// Tile this one is copying from, while that copy is outstanding.
    #[inline]
    pub fn previous(&self) -> Option<TileId> {
        self.previous
    }

    /// Frame area the last inbound transfer read into the buffer, in frame
    /// coordinates.
    ///
    /// Cleared when the tile moves, changes shape or is written back. Only
    /// this area is copied when the tile is passed as `previous`.
    #[inline]
    pub fn fetched(&self) -> Option<Rect> {
        self.fetched
    }

    /// Halo extents the last inbound transfer left for padding.
    #[inline]
    pub fn pad_extents(&self) -> PadExtents {
        self.pad
    }

    /// Fill applied to [`pad_extents`](Self::pad_extents), fixed when the
    /// transfer was issued.
    #[inline]
    pub fn border_fill(&self) -> BorderFill {
        self.fill
    }

    /// Returns true if no later tile is reading from this one.
    #[inline]
    pub fn is_free(&self) -> bool {
        self.reuse_count == 0
    }

    /// Byte offset of the halo-inclusive footprint from the buffer start.
    pub fn edge_offset(&self) -> Option<usize> {
        let halo_offset = (self.halo.top as usize * self.pitch as usize + self.halo.left as usize)
            * self.element.element_size();
        self.data_offset.checked_sub(halo_offset)
    }

    /// Bytes spanned by the halo-inclusive footprint.
    pub fn footprint_bytes(&self) -> usize {
        footprint_bytes(
            self.width,
            self.height,
            self.pitch,
            self.halo,
            self.element.element_size(),
        )
    }

    /// Rows in the halo-inclusive footprint.
    #[inline]
    pub fn footprint_rows(&self) -> usize {
        self.halo.top as usize + self.height as usize + self.halo.bottom as usize
    }

    /// Columns in the halo-inclusive footprint.
    #[inline]
    pub fn footprint_cols(&self) -> usize {
        self.halo.left as usize + self.width as usize + self.halo.right as usize
    }

    /// Core elements in frame coordinates.
    pub fn core(&self) -> Rect {
        Rect::from_origin(self.x, self.y, self.width, self.height)
    }

    /// Halo-inclusive footprint in frame coordinates.
    pub fn footprint(&self) -> Rect {
        self.halo.expand(self.core())
    }

    fn checked_footprint(&self) -> Option<Rect> {
        Rect::checked_from_origin(self.x, self.y, self.width, self.height)
            .and_then(|core| self.halo.checked_expand(core))
    }

    /// Byte offset, from the buffer start, of frame position `(x, y)`.
    ///
    /// The position must lie inside [`footprint`](Self::footprint).
    pub(crate) fn offset_of(&self, x: i32, y: i32) -> Option<usize> {
        let fp = self.footprint();
        let col = usize::try_from(x as i64 - fp.x.start as i64).ok()?;
        let row = usize::try_from(y as i64 - fp.y.start as i64).ok()?;
        Some(self.edge_offset()? + (row * self.pitch as usize + col) * self.element.element_size())
    }

    pub(crate) fn set_position(&mut self, x: i32, y: i32) {
        self.x = x;
        self.y = y;
        self.fetched = None;
    }

    /// Move rows between a symmetric vertical halo and the core, keeping
    /// the footprint in both buffer and frame.
    pub(crate) fn set_edge_height(&mut self, edge: u16) -> Result<()> {
        if self.halo.top != self.halo.bottom {
            return Err(Error::bad_argument("edge height update needs equal top and bottom halos"));
        }
        let current = self.halo.top as i64;
        let height = self.height as i64 + 2 * (current - edge as i64);
        if height <= 0 {
            return Err(Error::bad_argument(format!(
                "edge height {edge} leaves no core rows"
            )));
        }
        let shift = (edge as i64 - current) * self.pitch as i64 * self.element.element_size() as i64;
        self.data_offset = (self.data_offset as i64 + shift) as usize;
        self.y = (self.y as i64 + edge as i64 - current) as i32;
        self.height = height as u32;
        self.halo.top = edge;
        self.halo.bottom = edge;
        self.fetched = None;
        Ok(())
    }

    /// Move columns between a symmetric horizontal halo and the core.
    pub(crate) fn set_edge_width(&mut self, edge: u16) -> Result<()> {
        if self.halo.left != self.halo.right {
            return Err(Error::bad_argument("edge width update needs equal left and right halos"));
        }
        let current = self.halo.left as i64;
        let width = self.width as i64 + 2 * (current - edge as i64);
        if width <= 0 {
            return Err(Error::bad_argument(format!(
                "edge width {edge} leaves no core columns"
            )));
        }
        let shift = (edge as i64 - current) * self.element.element_size() as i64;
        self.data_offset = (self.data_offset as i64 + shift) as usize;
        self.x = (self.x as i64 + edge as i64 - current) as i32;
        self.width = width as u32;
        self.halo.left = edge;
        self.halo.right = edge;
        self.fetched = None;
        Ok(())
    }

    pub(crate) fn set_dimensions(&mut self, x: i32, y: i32, width: u32, height: u32, pitch: u32) {
        self.fetched = None;
        self.x = x;
        self.y = y;
        self.width = width;
        self.height = height;
        self.pitch = pitch;
    }
}

impl ArrayGeometry for Tile {
    fn buffer(&self) -> Option<&PoolBuffer> {
        self.buffer.as_ref()
    }

    fn data_offset(&self) -> usize {
        self.data_offset
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn pitch(&self) -> u32 {
        self.pitch
    }

    fn element_type(&self) -> ElementType {
        self.element
    }

    fn status(&self) -> TileStatus {
        self.status
    }
}
