//! Frame records: full images in system memory.
//!
//! A frame describes a 2D image with an optional border of padding around
//! it. The padding is logical: when a tile's halo reaches past the frame
//! border, the transfer engine synthesizes those elements according to the
//! frame's [`PaddingPolicy`] instead of reading them.
//!
//! # Memory Layout
//!
//! ```text
//!  buffer start
//!  v
//!  ┌──────────────── pitch ───────────────┐
//!  │        pad_top rows                  │
//!  │ pad_left │ width × height │ pad_right │
//!  │        pad_bottom rows               │
//!  └──────────────────────────────────────┘
//! ```
//!
//! Element `(0, 0)` sits `(pad_top * pitch + pad_left) * element_size` bytes
//! past the buffer start. Pitch is counted in elements.

use crate::error::{Error, Result};
use crate::geometry::{Rect, Span};
use crate::memory::MemorySegment;
use crate::tile::ElementType;
use std::sync::Arc;

/// How halo elements outside a frame are synthesized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaddingPolicy {
    /// Fill with zero bytes.
    #[default]
    Zero,
    /// Fill with the frame's padding value.
    Constant,
    /// Copy the nearest valid row or column outward.
    Replicate,
}

impl PaddingPolicy {
    /// Numeric code: 0 zero, 1 constant, 2 replicate.
    pub fn code(self) -> u8 {
        match self {
            PaddingPolicy::Zero => 0,
            PaddingPolicy::Constant => 1,
            PaddingPolicy::Replicate => 2,
        }
    }

    /// Look up a policy by numeric code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(PaddingPolicy::Zero),
            1 => Some(PaddingPolicy::Constant),
            2 => Some(PaddingPolicy::Replicate),
            _ => None,
        }
    }
}

/// Border widths around a frame or tile, in elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Border {
    /// Columns to the left.
    pub left: u16,
    /// Rows above.
    pub top: u16,
    /// Columns to the right.
    pub right: u16,
    /// Rows below.
    pub bottom: u16,
}

impl Border {
    /// `width` columns on both sides and `height` rows above and below.
    pub const fn uniform(width: u16, height: u16) -> Self {
        Self {
            left: width,
            top: height,
            right: width,
            bottom: height,
        }
    }

    /// No border.
    pub const fn none() -> Self {
        Self::uniform(0, 0)
    }

    /// Grow `rect` outward by this border, saturating at the `i32` range.
    pub(crate) fn expand(&self, rect: Rect) -> Rect {
        Rect::new(
            Span::new(
                rect.x.start.saturating_sub(self.left as i32),
                rect.x.end.saturating_add(self.right as i32),
            ),
            Span::new(
                rect.y.start.saturating_sub(self.top as i32),
                rect.y.end.saturating_add(self.bottom as i32),
            ),
        )
    }

    /// Grow `rect` outward by this border, or `None` if an edge leaves the
    /// `i32` range.
    pub(crate) fn checked_expand(&self, rect: Rect) -> Option<Rect> {
        Some(Rect::new(
            Span::new(
                rect.x.start.checked_sub(self.left as i32)?,
                rect.x.end.checked_add(self.right as i32)?,
            ),
            Span::new(
                rect.y.start.checked_sub(self.top as i32)?,
                rect.y.end.checked_add(self.bottom as i32)?,
            ),
        ))
    }
}

/// Parameters for [`TileManager::create_frame`](crate::TileManager::create_frame).
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use tiledma::{ElementType, FrameSpec, PaddingPolicy};
/// use tiledma::memory::HeapSegment;
///
/// let spec = FrameSpec::new(640, 480, ElementType::U8)
///     .with_padding(4, 4)
///     .with_policy(PaddingPolicy::Constant, 0x80);
/// let buffer = Arc::new(HeapSegment::new(spec.required_len()).unwrap());
/// let spec = spec.with_buffer(buffer);
/// assert_eq!(spec.pitch(), 648);
/// ```
#[derive(Clone)]
pub struct FrameSpec {
    buffer: Option<Arc<dyn MemorySegment>>,
    width: u32,
    height: u32,
    pitch: Option<u32>,
    element: ElementType,
    padding: Border,
    policy: PaddingPolicy,
    padding_value: u8,
}

impl FrameSpec {
    /// A frame of `width`×`height` elements with no buffer and no padding.
    pub fn new(width: u32, height: u32, element: ElementType) -> Self {
        Self {
            buffer: None,
            width,
            height,
            pitch: None,
            element,
            padding: Border::none(),
            policy: PaddingPolicy::Zero,
            padding_value: 0,
        }
    }

    /// Attach the backing buffer. Frames without one are descriptors only
    /// and cannot be transferred.
    pub fn with_buffer(mut self, buffer: Arc<dyn MemorySegment>) -> Self {
        self.buffer = Some(buffer);
        self
    }

    /// Row stride in elements. Defaults to the padded width.
    pub fn with_pitch(mut self, pitch: u32) -> Self {
        self.pitch = Some(pitch);
        self
    }

    /// Symmetric padding border.
    pub fn with_padding(mut self, width: u16, height: u16) -> Self {
        self.padding = Border::uniform(width, height);
        self
    }

    /// Padding border with independent sides.
    pub fn with_border(mut self, border: Border) -> Self {
        self.padding = border;
        self
    }

    /// Padding policy and the byte used by [`PaddingPolicy::Constant`].
    pub fn with_policy(mut self, policy: PaddingPolicy, value: u8) -> Self {
        self.policy = policy;
        self.padding_value = value;
        self
    }

    /// Effective row stride in elements.
    pub fn pitch(&self) -> u32 {
        self.pitch.unwrap_or_else(|| {
            self.width
                .saturating_add(self.padding.left as u32)
                .saturating_add(self.padding.right as u32)
        })
    }

    /// Smallest buffer, in bytes, that holds this frame and its padding.
    pub fn required_len(&self) -> usize {
        let rows = self.padding.top as usize + self.height as usize + self.padding.bottom as usize;
        let cols = self.padding.left as usize + self.width as usize + self.padding.right as usize;
        if rows == 0 || cols == 0 {
            return 0;
        }
        ((rows - 1) * self.pitch() as usize + cols) * self.element.element_size()
    }
}

impl std::fmt::Debug for FrameSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSpec")
            .field("buffer_len", &self.buffer.as_ref().map(|b| b.len()))
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pitch", &self.pitch())
            .field("element", &self.element)
            .field("padding", &self.padding)
            .field("policy", &self.policy)
            .finish()
    }
}

/// A validated frame record.
#[derive(Clone)]
pub struct Frame {
    buffer: Option<Arc<dyn MemorySegment>>,
    width: u32,
    height: u32,
    pitch: u32,
    element: ElementType,
    padding: Border,
    policy: PaddingPolicy,
    padding_value: u8,
}

impl Frame {
    /// Validate `spec` and build a frame record.
    ///
    /// # Errors
    ///
    /// - [`Error::BadArgument`] for zero dimensions or a pitch narrower than
    ///   the padded width
    /// - [`Error::BufferOverflow`] if the buffer is smaller than the geometry
    pub fn new(spec: FrameSpec) -> Result<Self> {
        if spec.width == 0 || spec.height == 0 {
            return Err(Error::bad_argument(format!(
                "frame dimensions {}x{} must be non-zero",
                spec.width, spec.height
            )));
        }
        let padded_width = spec.width as u64 + spec.padding.left as u64 + spec.padding.right as u64;
        if (spec.pitch() as u64) < padded_width {
            return Err(Error::bad_argument(format!(
                "frame pitch {} is narrower than padded width {padded_width}",
                spec.pitch()
            )));
        }
        Rect::checked_from_origin(0, 0, spec.width, spec.height)
            .and_then(|extent| spec.padding.checked_expand(extent))
            .ok_or_else(|| Error::bad_argument("padded frame does not fit in frame coordinates"))?;
        if let Some(buffer) = &spec.buffer {
            if buffer.len() < spec.required_len() {
                return Err(Error::BufferOverflow("frame buffer smaller than its geometry"));
            }
        }

        Ok(Self {
            pitch: spec.pitch(),
            buffer: spec.buffer,
            width: spec.width,
            height: spec.height,
            element: spec.element,
            padding: spec.padding,
            policy: spec.policy,
            padding_value: spec.padding_value,
        })
    }

    /// Backing buffer, if any.
    #[inline]
    pub fn buffer(&self) -> Option<&Arc<dyn MemorySegment>> {
        self.buffer.as_ref()
    }

    /// Width in elements, excluding padding.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in rows, excluding padding.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row stride in elements.
    #[inline]
    pub fn pitch(&self) -> u32 {
        self.pitch
    }

    /// Row stride in bytes.
    #[inline]
    pub fn pitch_bytes(&self) -> usize {
        self.pitch as usize * self.element.element_size()
    }

    /// Element layout.
    #[inline]
    pub fn element_type(&self) -> ElementType {
        self.element
    }

    /// Padding border.
    #[inline]
    pub fn padding(&self) -> Border {
        self.padding
    }

    /// Padding policy.
    #[inline]
    pub fn policy(&self) -> PaddingPolicy {
        self.policy
    }

    /// Byte written by constant padding.
    #[inline]
    pub fn padding_value(&self) -> u8 {
        self.padding_value
    }

    /// Byte offset of element `(0, 0)` from the buffer start.
    #[inline]
    pub fn data_offset(&self) -> usize {
        (self.padding.top as usize * self.pitch as usize + self.padding.left as usize)
            * self.element.element_size()
    }

    /// Byte offset of element `(x, y)`, which may lie in the padding border.
    ///
    /// Returns `None` if the position falls before the buffer start.
    pub fn offset_of(&self, x: i32, y: i32) -> Option<usize> {
        let es = self.element.element_size() as i64;
        let offset = self.data_offset() as i64 + (y as i64 * self.pitch as i64 + x as i64) * es;
        usize::try_from(offset).ok()
    }

    /// The frame's own elements.
    pub fn extent(&self) -> Rect {
        Rect::from_origin(0, 0, self.width, self.height)
    }

    /// The frame's elements plus its padding border.
    pub fn padded_extent(&self) -> Rect {
        self.padding.expand(self.extent())
    }

    /// Returns true if the frame has no buffer.
    #[inline]
    pub fn is_virtual(&self) -> bool {
        self.buffer.is_none()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("buffer", &self.buffer.as_ref().map(|b| b.as_ptr()))
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pitch", &self.pitch)
            .field("element", &self.element)
            .field("padding", &self.padding)
            .field("policy", &self.policy)
            .field("padding_value", &self.padding_value)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::HeapSegment;

    #[test]
    fn test_padding_codes() {
        for code in 0..3 {
            assert_eq!(PaddingPolicy::from_code(code).unwrap().code(), code);
        }
        assert_eq!(PaddingPolicy::from_code(3), None);
    }

    #[test]
    fn test_frame_layout() {
        let spec = FrameSpec::new(10, 4, ElementType::U16).with_padding(2, 1);
        assert_eq!(spec.pitch(), 14);
        // rows 0..=5, last row holds 14 elements of 2 bytes
        assert_eq!(spec.required_len(), (5 * 14 + 14) * 2);

        let buffer = Arc::new(HeapSegment::new(spec.required_len()).unwrap());
        let frame = Frame::new(spec.with_buffer(buffer)).unwrap();
        assert_eq!(frame.data_offset(), (14 + 2) * 2);
        assert_eq!(frame.offset_of(-2, -1), Some(0));
        assert_eq!(frame.offset_of(-3, -1), None);
        assert_eq!(frame.offset_of(1, 1), Some(frame.data_offset() + (14 + 1) * 2));
        assert_eq!(frame.padded_extent(), Rect::new(Span::new(-2, 11), Span::new(-1, 4)));
        assert!(!frame.is_virtual());
    }

    #[test]
    fn test_frame_validation() {
        assert!(matches!(
            Frame::new(FrameSpec::new(0, 4, ElementType::U8)),
            Err(Error::BadArgument(_))
        ));
        assert!(matches!(
            Frame::new(FrameSpec::new(8, 4, ElementType::U8).with_padding(1, 0).with_pitch(9)),
            Err(Error::BadArgument(_))
        ));

        let small = Arc::new(HeapSegment::new(8 * 4 - 1).unwrap());
        assert_eq!(
            Frame::new(FrameSpec::new(8, 4, ElementType::U8).with_buffer(small)).unwrap_err(),
            Error::BufferOverflow("frame buffer smaller than its geometry")
        );
    }

    #[test]
    fn test_border_expand_near_limits() {
        let border = Border::uniform(2, 1);
        let rect = Rect::from_origin(0, 0, 4, 4);
        assert_eq!(border.checked_expand(rect), Some(border.expand(rect)));
        assert_eq!(border.expand(rect), Rect::new(Span::new(-2, 5), Span::new(-1, 4)));

        let edge = Rect::new(Span::new(i32::MIN, 0), Span::new(0, i32::MAX));
        assert_eq!(border.checked_expand(edge), None);
        assert_eq!(
            border.expand(edge),
            Rect::new(Span::new(i32::MIN, 2), Span::new(-1, i32::MAX))
        );
    }

    #[test]
    fn test_frame_must_fit_coordinates() {
        let wide = i32::MAX as u32;
        assert!(Frame::new(FrameSpec::new(wide, 1, ElementType::U8).with_padding(1, 0)).is_ok());
        assert!(matches!(
            Frame::new(FrameSpec::new(wide, 1, ElementType::U8).with_padding(2, 0)),
            Err(Error::BadArgument(_))
        ));
        assert!(matches!(
            Frame::new(FrameSpec::new(u32::MAX, 1, ElementType::U8)),
            Err(Error::BadArgument(_))
        ));
        assert!(matches!(
            Frame::new(FrameSpec::new(u32::MAX, 1, ElementType::U8).with_padding(1, 0)),
            Err(Error::BadArgument(_))
        ));
    }

    #[test]
    fn test_virtual_frame() {
        let frame = Frame::new(FrameSpec::new(16, 16, ElementType::U8)).unwrap();
        assert!(frame.is_virtual());
        assert!(frame.buffer().is_none());
    }
}
