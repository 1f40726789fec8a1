//! Safe 2D views over tile and array memory.
//!
//! A [`Surface`] borrows a strided byte region and exposes row, column and
//! element access without pointer arithmetic. Halo-relative addressing is
//! expressed through the surface origin: element `(0, 0)` is the first core
//! element, and halo elements sit at negative coordinates.

use crate::tile::PadExtents;
use std::ops::Range;

/// How [`Surface::synthesize_border`] fills padded edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorderFill {
    /// Every byte set to this value.
    Constant(u8),
    /// Nearest valid row or column copied outward.
    Replicate,
}

/// A mutable strided 2D view.
#[derive(Debug)]
pub struct Surface<'a> {
    data: &'a mut [u8],
    width: usize,
    rows: usize,
    pitch: usize,
    element_size: usize,
    origin: (usize, usize),
}

impl<'a> Surface<'a> {
    /// View `rows` rows of `width` elements, `pitch` bytes apart.
    ///
    /// Returns `None` if `data` is too short or a row is wider than the
    /// pitch.
    pub fn new(
        data: &'a mut [u8],
        width: usize,
        rows: usize,
        pitch: usize,
        element_size: usize,
    ) -> Option<Self> {
        let row_bytes = width.checked_mul(element_size)?;
        if width == 0 || rows == 0 || element_size == 0 || (rows > 1 && pitch < row_bytes) {
            return None;
        }
        let span = (rows - 1).checked_mul(pitch)?.checked_add(row_bytes)?;
        if data.len() < span {
            return None;
        }
        Some(Self {
            data,
            width,
            rows,
            pitch,
            element_size,
            origin: (0, 0),
        })
    }

    /// Place element `(0, 0)` at column `x`, row `y` of the view.
    pub fn with_origin(mut self, x: usize, y: usize) -> Self {
        self.origin = (x, y);
        self
    }

    /// Columns in the view.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Rows in the view.
    #[inline]
    pub fn height(&self) -> usize {
        self.rows
    }

    /// Bytes per element.
    #[inline]
    pub fn element_size(&self) -> usize {
        self.element_size
    }

    /// Column and row of element `(0, 0)`.
    #[inline]
    pub fn origin(&self) -> (usize, usize) {
        self.origin
    }

    #[inline]
    fn row_bytes(&self) -> usize {
        self.width * self.element_size
    }

    /// Row `y` of the view, counted from the top edge.
    ///
    /// # Panics
    ///
    /// Panics if `y` is out of range.
    pub fn row(&self, y: usize) -> &[u8] {
        assert!(y < self.rows, "row out of range");
        let start = y * self.pitch;
        &self.data[start..start + self.row_bytes()]
    }

    /// Mutable row `y` of the view.
    ///
    /// # Panics
    ///
    /// Panics if `y` is out of range.
    pub fn row_mut(&mut self, y: usize) -> &mut [u8] {
        assert!(y < self.rows, "row out of range");
        let start = y * self.pitch;
        let len = self.row_bytes();
        &mut self.data[start..start + len]
    }

    fn locate(&self, x: i32, y: i32) -> Option<usize> {
        let col = usize::try_from(self.origin.0 as i64 + x as i64).ok()?;
        let row = usize::try_from(self.origin.1 as i64 + y as i64).ok()?;
        (col < self.width && row < self.rows).then(|| row * self.pitch + col * self.element_size)
    }

    /// Bytes of the element at `(x, y)` relative to the origin.
    pub fn element(&self, x: i32, y: i32) -> Option<&[u8]> {
        let at = self.locate(x, y)?;
        Some(&self.data[at..at + self.element_size])
    }

    /// Mutable bytes of the element at `(x, y)` relative to the origin.
    pub fn element_mut(&mut self, x: i32, y: i32) -> Option<&mut [u8]> {
        let at = self.locate(x, y)?;
        let es = self.element_size;
        Some(&mut self.data[at..at + es])
    }

    /// Set every byte of every row.
    pub fn fill(&mut self, value: u8) {
        self.fill_rows(0..self.rows, value);
    }

    /// Set every byte of `rows`.
    pub fn fill_rows(&mut self, rows: Range<usize>, value: u8) {
        for y in rows {
            self.row_mut(y).fill(value);
        }
    }

    /// Set every byte of columns `cols` in every row.
    pub fn fill_columns(&mut self, cols: Range<usize>, value: u8) {
        let es = self.element_size;
        for y in 0..self.rows {
            self.row_mut(y)[cols.start * es..cols.end * es].fill(value);
        }
    }

    /// Copy row `src` over each row in `rows`.
    pub fn replicate_row(&mut self, src: usize, rows: Range<usize>) {
        let len = self.row_bytes();
        let from = src * self.pitch;
        for y in rows {
            self.data.copy_within(from..from + len, y * self.pitch);
        }
    }

    /// Copy column `src` over each column in `cols`, in every row.
    pub fn replicate_column(&mut self, src: usize, cols: Range<usize>) {
        let es = self.element_size;
        for y in 0..self.rows {
            let row = self.row_mut(y);
            let from = src * es;
            for x in cols.clone() {
                row.copy_within(from..from + es, x * es);
            }
        }
    }

    /// Synthesize the padded edges described by `pad`.
    ///
    /// Edges are processed top, bottom, left, right. Left and right run over
    /// every row, so corners take the horizontal neighbour of the already
    /// padded top and bottom rows.
    pub fn synthesize_border(&mut self, pad: PadExtents, fill: BorderFill) {
        let rows = self.rows;
        let cols = self.width;
        let top = (pad.top as usize).min(rows);
        let bottom = (pad.bottom as usize).min(rows - top);
        let left = (pad.left as usize).min(cols);
        let right = (pad.right as usize).min(cols - left);

        if top > 0 {
            match fill {
                BorderFill::Replicate if top < rows => self.replicate_row(top, 0..top),
                BorderFill::Replicate => {}
                BorderFill::Constant(v) => self.fill_rows(0..top, v),
            }
        }
        if bottom > 0 {
            let first = rows - bottom;
            match fill {
                BorderFill::Replicate if first > 0 => self.replicate_row(first - 1, first..rows),
                BorderFill::Replicate => {}
                BorderFill::Constant(v) => self.fill_rows(first..rows, v),
            }
        }
        if left > 0 {
            match fill {
                BorderFill::Replicate if left < cols => self.replicate_column(left, 0..left),
                BorderFill::Replicate => {}
                BorderFill::Constant(v) => self.fill_columns(0..left, v),
            }
        }
        if right > 0 {
            let first = cols - right;
            match fill {
                BorderFill::Replicate if first > 0 => self.replicate_column(first - 1, first..cols),
                BorderFill::Replicate => {}
                BorderFill::Constant(v) => self.fill_columns(first..cols, v),
            }
        }
    }
}
