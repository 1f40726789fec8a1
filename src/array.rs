//! Geometry shared by tiles and plain 2D arrays.

use crate::error::{Error, Result};
use crate::memory::PoolBuffer;
use crate::tile::{ElementType, TileStatus};
use crate::view::Surface;

/// Common geometry and status accessors for 2D buffers.
///
/// Implemented by [`Tile`](crate::Tile) and [`Array`]; kernels that only
/// need the data layout can be written against this trait.
pub trait ArrayGeometry {
    /// Backing buffer.
    fn buffer(&self) -> Option<&PoolBuffer>;

    /// Byte offset of the first core element from the buffer start.
    fn data_offset(&self) -> usize;

    /// Core width in elements.
    fn width(&self) -> u32;

    /// Core height in rows.
    fn height(&self) -> u32;

    /// Row stride in elements.
    fn pitch(&self) -> u32;

    /// Element layout.
    fn element_type(&self) -> ElementType;

    /// Pending work. Plain arrays never have any.
    fn status(&self) -> TileStatus {
        TileStatus::empty()
    }

    /// Bytes per element.
    fn element_size(&self) -> usize {
        self.element_type().element_size()
    }

    /// Bytes in one core row.
    fn row_bytes(&self) -> usize {
        self.width() as usize * self.element_size()
    }

    /// Row stride in bytes.
    fn pitch_bytes(&self) -> usize {
        self.pitch() as usize * self.element_size()
    }

    /// Address of the first core element.
    fn data_ptr(&self) -> Option<*mut u8> {
        self.buffer()
            .and_then(|b| b.offset_ptr(self.data_offset(), 0))
            .map(|p| p.as_ptr())
    }

    /// Returns true while a transfer is in flight.
    fn is_transfer_pending(&self) -> bool {
        self.status().contains(TileStatus::DMA_ONGOING)
    }

    /// Returns true if halo padding is still owed.
    fn needs_padding(&self) -> bool {
        self.status().intersects(TileStatus::EDGE_PADDING)
    }
}

/// A plain 2D array in bank memory, without frame or halo.
#[derive(Debug)]
pub struct Array {
    buffer: PoolBuffer,
    data_offset: usize,
    width: u32,
    height: u32,
    pitch: u32,
    element: ElementType,
}

impl Array {
    /// Describe a `width`×`height` array starting `data_offset` bytes into
    /// `buffer`.
    ///
    /// # Safety
    ///
    /// The array must be the only user of the buffer range it covers for its
    /// whole lifetime; [`surface`](Self::surface) hands out mutable views of
    /// that memory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadArgument`] if the geometry is empty, the pitch is
    /// narrower than a row, or the array does not fit the buffer.
    pub unsafe fn new(
        buffer: PoolBuffer,
        data_offset: usize,
        width: u32,
        height: u32,
        pitch: u32,
        element: ElementType,
    ) -> Result<Self> {
        if width == 0 || height == 0 || !element.is_valid() {
            return Err(Error::bad_argument(format!(
                "array {width}x{height} of {element:?} is empty or invalid"
            )));
        }
        if pitch < width {
            return Err(Error::bad_argument(format!("array pitch {pitch} < width {width}")));
        }
        let es = element.element_size();
        let span = ((height as usize - 1) * pitch as usize + width as usize) * es;
        if buffer.offset_ptr(data_offset, span).is_none() {
            return Err(Error::bad_argument(format!(
                "array needs {span} bytes at offset {data_offset}, buffer holds {}",
                buffer.len()
            )));
        }
        Ok(Self {
            buffer,
            data_offset,
            width,
            height,
            pitch,
            element,
        })
    }

    /// Mutable view of the array's elements.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BufferOverflow`] if the geometry no longer fits the
    /// buffer.
    pub fn surface(&mut self) -> Result<Surface<'_>> {
        let span = (self.height as usize - 1) * self.pitch_bytes() + self.row_bytes();
        // SAFETY: `new` checked the range and its caller granted exclusive
        // use; `&mut self` keeps this the only live view.
        let data = unsafe { self.buffer.slice_mut(self.data_offset, span) };
        data.and_then(|d| {
            Surface::new(
                d,
                self.width as usize,
                self.height as usize,
                self.pitch_bytes(),
                self.element_size(),
            )
        })
        .ok_or(Error::BufferOverflow("array view exceeds its buffer"))
    }
}

impl ArrayGeometry for Array {
    fn buffer(&self) -> Option<&PoolBuffer> {
        Some(&self.buffer)
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr::NonNull;

    fn buffer(storage: &mut [u8]) -> PoolBuffer {
        // SAFETY: storage outlives the arrays in each test.
        unsafe { PoolBuffer::from_raw_parts(NonNull::new(storage.as_mut_ptr()).unwrap(), storage.len()) }
    }

    #[test]
    fn test_array_geometry() {
        let mut storage = vec![0u8; 64];
        // SAFETY: sole user of `storage`.
        let array = unsafe { Array::new(buffer(&mut storage), 4, 3, 2, 5, ElementType::U16) }.unwrap();
        assert_eq!(array.row_bytes(), 6);
        assert_eq!(array.pitch_bytes(), 10);
        assert_eq!(array.data_ptr(), Some(storage[4..].as_mut_ptr()));
        assert!(!array.is_transfer_pending());
        assert!(!array.needs_padding());
    }

    #[test]
    fn test_array_rejects_overrun() {
        let mut storage = vec![0u8; 16];
        // SAFETY: construction fails before any access.
        let result = unsafe { Array::new(buffer(&mut storage), 0, 4, 4, 4, ElementType::U8) };
        assert!(result.is_ok());
        // SAFETY: as above.
        let result = unsafe { Array::new(buffer(&mut storage), 1, 4, 4, 4, ElementType::U8) };
        assert!(matches!(result, Err(Error::BadArgument(_))));
        // SAFETY: as above.
        let result = unsafe { Array::new(buffer(&mut storage), 0, 4, 2, 3, ElementType::U8) };
        assert!(result.is_err());
    }

    #[test]
    fn test_array_surface_writes_through() {
        let mut storage = vec![0u8; 32];
        let buf = buffer(&mut storage);
        // SAFETY: sole user of `storage` until dropped below.
        let mut array = unsafe { Array::new(buf, 0, 2, 2, 4, ElementType::U8) }.unwrap();
        {
            let mut view = array.surface().unwrap();
            view.fill(0x5a);
        }
        drop(array);
        assert_eq!(&storage[..6], &[0x5a, 0x5a, 0, 0, 0x5a, 0x5a]);
    }
}
