//! Transfer planning.
//!
//! Pure geometry: given a tile's footprint, the frame bounds and optionally
//! the area already resident in a previous tile, decide which rectangles to
//! fetch from the frame, which to copy tile-to-tile, and which halo edges
//! must be synthesized afterwards.
//!
//! # Reuse Layout
//!
//! ```text
//!         prev.x
//!      ┌─────────┐
//!      │  fresh  │               rows before the previous tile
//!  ────┼─────────┼──────
//!      │ fresh │ reuse │ fresh   rows shared with the previous tile
//!  ────┼─────────┼──────
//!      │  fresh  │               rows after the previous tile
//!      └─────────┘
//! ```
//!
//! Rows are split first; only the shared row band is split on columns, so a
//! plan never has more than five segments.

use crate::geometry::{Rect, partition};
use crate::tile::PadExtents;
use smallvec::SmallVec;

/// Outcome of clamping a footprint to the frame bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clamp {
    /// Part of the footprint that can be read, or `None` when the footprint
    /// lies wholly outside the bounds.
    pub region: Option<Rect>,
    /// Halo rows and columns left for padding.
    pub pad: PadExtents,
}

/// Clamp `footprint` to `bounds`.
///
/// Sides that stick out are recorded in [`Clamp::pad`]. A footprint with no
/// readable part pads every side over its full size.
pub fn clamp(footprint: Rect, bounds: Rect) -> Clamp {
    let region = footprint.intersect(bounds);
    if region.is_empty() {
        let (w, h) = (footprint.width(), footprint.height());
        return Clamp {
            region: None,
            pad: PadExtents {
                left: w,
                top: h,
                right: w,
                bottom: h,
            },
        };
    }
    Clamp {
        region: Some(region),
        pad: PadExtents {
            left: footprint.x.overhang_before(bounds.x),
            top: footprint.y.overhang_before(bounds.y),
            right: footprint.x.overhang_after(bounds.x),
            bottom: footprint.y.overhang_after(bounds.y),
        },
    }
}

/// Where a segment's data comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Fetched from the frame buffer.
    Frame,
    /// Copied from the previous tile's buffer.
    Previous,
}

/// One rectangle of a transfer plan, in frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Data source.
    pub source: Source,
    /// Elements covered.
    pub area: Rect,
}

/// Split `region` into frame fetches and reuse copies.
///
/// `resident` is the area the previous tile already holds. Without it, or
/// when it does not intersect `region`, the plan is a single frame fetch.
/// Segments are disjoint, non-empty, and cover `region` exactly, in row
/// order.
pub fn plan_fetch(region: Rect, resident: Option<Rect>) -> SmallVec<[Segment; 5]> {
    let mut plan = SmallVec::new();
    let resident = match resident {
        Some(r) if r.overlaps(region) => r,
        _ => {
            plan.push(Segment {
                source: Source::Frame,
                area: region,
            });
            return plan;
        }
    };

    for rows in partition(region.y, resident.y) {
        if !rows.shared {
            plan.push(Segment {
                source: Source::Frame,
                area: Rect::new(region.x, rows.span),
            });
            continue;
        }
        for cols in partition(region.x, resident.x) {
            plan.push(Segment {
                source: if cols.shared {
                    Source::Previous
                } else {
                    Source::Frame
                },
                area: Rect::new(cols.span, rows.span),
            });
        }
    }
    plan
}

/// Part of a tile's core written back to the frame, or `None` if the core
/// lies outside the frame.
pub fn plan_store(core: Rect, frame: Rect) -> Option<Rect> {
    let area = core.intersect(frame);
    (!area.is_empty()).then_some(area)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Span;

    fn areas(plan: &[Segment]) -> Vec<(Source, i32, i32, i32, i32)> {
        plan.iter()
            .map(|s| (s.source, s.area.x.start, s.area.x.end, s.area.y.start, s.area.y.end))
            .collect()
    }

    #[test]
    fn test_clamp_left_overhang() {
        let frame = Rect::from_origin(0, 0, 100, 100);
        let c = clamp(Rect::from_origin(-5, 0, 10, 10), frame);
        assert_eq!(c.region, Some(Rect::from_origin(0, 0, 5, 10)));
        assert_eq!(
            c.pad,
            PadExtents {
                left: 5,
                top: 0,
                right: 0,
                bottom: 0
            }
        );
    }

    #[test]
    fn test_clamp_corner_and_outside() {
        let frame = Rect::from_origin(0, 0, 20, 20);
        let c = clamp(Rect::from_origin(16, -2, 8, 8), frame);
        assert_eq!(c.region, Some(Rect::new(Span::new(16, 19), Span::new(0, 5))));
        assert_eq!((c.pad.top, c.pad.right, c.pad.left, c.pad.bottom), (2, 4, 0, 0));

        let c = clamp(Rect::from_origin(40, 40, 4, 3), frame);
        assert_eq!(c.region, None);
        assert_eq!(
            c.pad,
            PadExtents {
                left: 4,
                top: 3,
                right: 4,
                bottom: 3
            }
        );
    }

    #[test]
    fn test_plan_without_overlap() {
        let region = Rect::from_origin(0, 0, 16, 16);
        assert_eq!(areas(&plan_fetch(region, None)), vec![(Source::Frame, 0, 15, 0, 15)]);
        let far = Rect::from_origin(32, 0, 16, 16);
        assert_eq!(plan_fetch(region, Some(far)).len(), 1);
    }

    #[test]
    fn test_plan_horizontal_step() {
        let prev = Rect::from_origin(0, 0, 16, 16);
        let next = Rect::from_origin(8, 0, 16, 16);
        assert_eq!(
            areas(&plan_fetch(next, Some(prev))),
            vec![(Source::Previous, 8, 15, 0, 15), (Source::Frame, 16, 23, 0, 15)]
        );
    }

    #[test]
    fn test_plan_diagonal_step() {
        let prev = Rect::from_origin(0, 0, 16, 16);
        let next = Rect::from_origin(8, 8, 16, 16);
        assert_eq!(
            areas(&plan_fetch(next, Some(prev))),
            vec![
                (Source::Previous, 8, 15, 8, 15),
                (Source::Frame, 16, 23, 8, 15),
                (Source::Frame, 8, 23, 16, 23),
            ]
        );
    }

    #[test]
    fn test_plan_enclosing_has_five_segments() {
        let prev = Rect::from_origin(4, 4, 4, 4);
        let next = Rect::from_origin(0, 0, 12, 12);
        let plan = plan_fetch(next, Some(prev));
        assert_eq!(plan.len(), 5);
        let covered: u32 = plan.iter().map(|s| s.area.width() * s.area.height()).sum();
        assert_eq!(covered, 144);
        assert_eq!(plan.iter().filter(|s| s.source == Source::Previous).count(), 1);
    }

    #[test]
    fn test_plan_store_clips() {
        let frame = Rect::from_origin(0, 0, 100, 100);
        assert_eq!(
            plan_store(Rect::from_origin(95, -3, 10, 10), frame),
            Some(Rect::new(Span::new(95, 99), Span::new(0, 6)))
        );
        assert_eq!(plan_store(Rect::from_origin(100, 0, 4, 4), frame), None);
    }
}
