//! Closed-interval geometry for frame-space regions.
//!
//! All coordinates are in frame elements and may be negative (the padding
//! border sits at negative coordinates). Intervals are closed: `[start, end]`
//! contains both ends and is empty when `end < start`.

use smallvec::SmallVec;

/// A closed integer interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// First coordinate.
    pub start: i32,
    /// Last coordinate, inclusive.
    pub end: i32,
}

impl Span {
    /// Interval from `start` to `end` inclusive.
    #[inline]
    pub const fn new(start: i32, end: i32) -> Self {
        Self { start, end }
    }

    /// Interval of `len` coordinates beginning at `start`.
    ///
    /// The end saturates at the `i32` range; use
    /// [`checked_with_len`](Self::checked_with_len) for untrusted input.
    pub fn with_len(start: i32, len: u32) -> Self {
        let end = (start as i64 + len as i64 - 1).clamp(i32::MIN as i64, i32::MAX as i64);
        Self::new(start, end as i32)
    }

    /// Interval of `len` coordinates beginning at `start`, or `None` if
    /// its last coordinate falls outside `i32`.
    pub fn checked_with_len(start: i32, len: u32) -> Option<Self> {
        let end = i32::try_from(start as i64 + len as i64 - 1).ok()?;
        Some(Self::new(start, end))
    }

    /// Returns true if the interval holds no coordinates.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    /// Number of coordinates covered.
    #[inline]
    pub fn len(&self) -> u32 {
        if self.is_empty() {
            0
        } else {
            (self.end as i64 - self.start as i64 + 1) as u32
        }
    }

    /// Coordinates common to both intervals.
    #[inline]
    pub fn intersect(&self, other: Span) -> Span {
        Span::new(self.start.max(other.start), self.end.min(other.end))
    }

    /// Returns true if the intervals share a coordinate.
    #[inline]
    pub fn overlaps(&self, other: Span) -> bool {
        !self.intersect(other).is_empty()
    }

    /// Part of `self` strictly before `other` begins.
    #[inline]
    pub fn before(&self, other: Span) -> Span {
        Span::new(self.start, self.end.min(other.start.saturating_sub(1)))
    }

    /// Part of `self` strictly after `other` ends.
    #[inline]
    pub fn after(&self, other: Span) -> Span {
        Span::new(self.start.max(other.end.saturating_add(1)), self.end)
    }

    /// How far `self` sticks out before `bound` starts.
    #[inline]
    pub fn overhang_before(&self, bound: Span) -> u32 {
        (bound.start as i64 - self.start as i64).max(0) as u32
    }

    /// How far `self` sticks out after `bound` ends.
    #[inline]
    pub fn overhang_after(&self, bound: Span) -> u32 {
        (self.end as i64 - bound.end as i64).max(0) as u32
    }
}

/// One piece of a [`partition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Band {
    /// Coordinates of this piece.
    pub span: Span,
    /// True if the piece lies inside the reference interval.
    pub shared: bool,
}

/// Split `span` into up to three ordered, non-empty pieces: before `other`,
/// inside `other`, and after `other`.
///
/// The pieces are disjoint and their union is exactly `span`.
pub fn partition(span: Span, other: Span) -> SmallVec<[Band; 3]> {
    [
        Band {
            span: span.before(other),
            shared: false,
        },
        Band {
            span: span.intersect(other),
            shared: true,
        },
        Band {
            span: span.after(other),
            shared: false,
        },
    ]
    .into_iter()
    .filter(|b| !b.span.is_empty())
    .collect()
}

/// An axis-aligned rectangle in frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    /// Columns.
    pub x: Span,
    /// Rows.
    pub y: Span,
}

impl Rect {
    /// Rectangle from column and row intervals.
    #[inline]
    pub const fn new(x: Span, y: Span) -> Self {
        Self { x, y }
    }

    /// Rectangle of `width`×`height` with its top-left corner at `(x, y)`.
    pub fn from_origin(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self::new(Span::with_len(x, width), Span::with_len(y, height))
    }

    /// As [`from_origin`](Self::from_origin), or `None` if an edge falls
    /// outside `i32`.
    pub fn checked_from_origin(x: i32, y: i32, width: u32, height: u32) -> Option<Self> {
        Some(Self::new(Span::checked_with_len(x, width)?, Span::checked_with_len(y, height)?))
    }

    /// Returns true if either axis is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty() || self.y.is_empty()
    }

    /// Common area of both rectangles.
    #[inline]
    pub fn intersect(&self, other: Rect) -> Rect {
        Rect::new(self.x.intersect(other.x), self.y.intersect(other.y))
    }

    /// Returns true if the rectangles share any element.
    #[inline]
    pub fn overlaps(&self, other: Rect) -> bool {
        !self.intersect(other).is_empty()
    }

    /// Columns covered.
    #[inline]
    pub fn width(&self) -> u32 {
        self.x.len()
    }

    /// Rows covered.
    #[inline]
    pub fn height(&self) -> u32 {
        self.y.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spans(bands: &[Band]) -> Vec<(i32, i32, bool)> {
        bands.iter().map(|b| (b.span.start, b.span.end, b.shared)).collect()
    }

    #[test]
    fn test_span_basics() {
        let s = Span::with_len(-5, 10);
        assert_eq!(s, Span::new(-5, 4));
        assert_eq!(s.len(), 10);
        assert!(Span::with_len(3, 0).is_empty());
        assert_eq!(Span::new(4, 3).len(), 0);
        assert_eq!(s.intersect(Span::new(0, 99)), Span::new(0, 4));
        assert!(!Span::new(0, 4).overlaps(Span::new(5, 9)));
    }

    #[test]
    fn test_overhang() {
        let bound = Span::new(0, 99);
        assert_eq!(Span::new(-5, 4).overhang_before(bound), 5);
        assert_eq!(Span::new(-5, 4).overhang_after(bound), 0);
        assert_eq!(Span::new(95, 104).overhang_after(bound), 5);
        assert_eq!(Span::new(10, 20).overhang_before(bound), 0);
    }

    #[test]
    fn test_partition_overlap_cases() {
        let prev = Span::new(10, 19);
        // Shifted right: shared head, fresh tail
        assert_eq!(
            spans(&partition(Span::new(15, 24), prev)),
            vec![(15, 19, true), (20, 24, false)]
        );
        // Shifted left: fresh head, shared tail
        assert_eq!(
            spans(&partition(Span::new(5, 14), prev)),
            vec![(5, 9, false), (10, 14, true)]
        );
        // Enclosing: fresh on both sides
        assert_eq!(
            spans(&partition(Span::new(5, 24), prev)),
            vec![(5, 9, false), (10, 19, true), (20, 24, false)]
        );
        // Enclosed: entirely shared
        assert_eq!(spans(&partition(Span::new(12, 15), prev)), vec![(12, 15, true)]);
        // Disjoint: entirely fresh
        assert_eq!(spans(&partition(Span::new(30, 40), prev)), vec![(30, 40, false)]);
        assert_eq!(spans(&partition(Span::new(0, 5), prev)), vec![(0, 5, false)]);
    }

    #[test]
    fn test_partition_covers_span_exactly() {
        for start in -4..24 {
            for len in 1..20u32 {
                let span = Span::with_len(start, len);
                let bands = partition(span, Span::new(5, 12));
                let total: u32 = bands.iter().map(|b| b.span.len()).sum();
                assert_eq!(total, span.len());
                assert_eq!(bands[0].span.start, span.start);
                assert_eq!(bands[bands.len() - 1].span.end, span.end);
                for pair in bands.windows(2) {
                    assert_eq!(pair[0].span.end + 1, pair[1].span.start);
                }
            }
        }
    }

    #[test]
    fn test_rect() {
        let r = Rect::from_origin(8, 0, 16, 16);
        assert_eq!(r.width(), 16);
        assert_eq!(r.x, Span::new(8, 23));
        let frame = Rect::from_origin(0, 0, 20, 10);
        let clipped = r.intersect(frame);
        assert_eq!((clipped.width(), clipped.height()), (12, 10));
        assert!(!Rect::from_origin(20, 0, 4, 4).overlaps(frame));
    }

    #[test]
    fn test_checked_construction() {
        assert_eq!(Span::checked_with_len(-5, 10), Some(Span::new(-5, 4)));
        assert_eq!(Span::checked_with_len(i32::MAX, 1), Some(Span::new(i32::MAX, i32::MAX)));
        assert_eq!(Span::checked_with_len(i32::MAX, 2), None);
        assert_eq!(Span::checked_with_len(i32::MIN, 0), None);
        assert_eq!(Span::checked_with_len(0, u32::MAX), None);
        // Saturating form stays ordered
        let s = Span::with_len(i32::MAX - 1, 8);
        assert!(s.start <= s.end);

        assert!(Rect::checked_from_origin(i32::MAX - 3, 0, 4, 4).is_some());
        assert!(Rect::checked_from_origin(0, i32::MAX - 3, 4, 5).is_none());
    }
}
