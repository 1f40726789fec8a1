//! Error types for tiledma.
//!
//! Every fallible operation returns [`Result`]. Each [`Error`] variant maps to
//! a stable numeric [`ErrorKind`] so the manager can keep a "last error" code
//! that callers poll after a sequence of operations, the way driver code
//! usually inspects a status register.

use crate::memory::AllocError;
use thiserror::Error;

/// Result type alias using tiledma's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for tiledma operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The manager has no memory banks to serve the request.
    #[error("tile manager has no memory banks configured")]
    NullManager,

    /// A required pointer argument was null.
    #[error("null pointer: {0}")]
    NullPointer(&'static str),

    /// Frame handle is stale, or the frame has no backing buffer.
    #[error("frame is missing or has no buffer")]
    NullFrame,

    /// Tile handle is stale or belongs to another manager.
    #[error("tile is missing or not allocated")]
    NullTile,

    /// A tile or array has no data buffer.
    #[error("buffer is missing")]
    NullBuffer,

    /// No memory bank could satisfy the allocation.
    #[error("allocation failed: {0}")]
    AllocationFailed(AllocError),

    /// Every frame slot is in use.
    #[error("frame registry full: no slots available")]
    FrameRegistryFull,

    /// Every tile slot is in use.
    #[error("tile registry full: no slots available")]
    TileRegistryFull,

    /// Element layouts of a tile and its frame disagree.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// A fixed-capacity structure or buffer would be overrun.
    #[error("buffer overflow: {0}")]
    BufferOverflow(&'static str),

    /// Argument out of range or inconsistent.
    #[error("bad argument: {0}")]
    BadArgument(String),

    /// The block-transfer collaborator refused to initialize.
    #[error("transfer engine initialization failed: {0}")]
    TransferInitFailed(String),

    /// The block-transfer collaborator raised its error signal.
    #[error("transfer engine reported a fault")]
    TransferFault,
}

impl Error {
    /// Numeric category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NullManager => ErrorKind::NullManager,
            Error::NullPointer(_) => ErrorKind::NullPointer,
            Error::NullFrame => ErrorKind::NullFrame,
            Error::NullTile => ErrorKind::NullTile,
            Error::NullBuffer => ErrorKind::NullBuffer,
            Error::AllocationFailed(_) => ErrorKind::AllocationFailed,
            Error::FrameRegistryFull => ErrorKind::FrameRegistryFull,
            Error::TileRegistryFull => ErrorKind::TileRegistryFull,
            Error::DimensionMismatch(_) => ErrorKind::DimensionMismatch,
            Error::BufferOverflow(_) => ErrorKind::BufferOverflow,
            Error::BadArgument(_) => ErrorKind::BadArgument,
            Error::TransferInitFailed(_) => ErrorKind::TransferInitFailed,
            Error::TransferFault => ErrorKind::TransferFault,
        }
    }

    pub(crate) fn bad_argument(msg: impl Into<String>) -> Self {
        Error::BadArgument(msg.into())
    }
}

impl From<AllocError> for Error {
    fn from(err: AllocError) -> Self {
        match err {
            AllocError::BadAlignment(align) => {
                Error::BadArgument(format!("alignment {align} is not a power of two"))
            }
            AllocError::InvalidPool(msg) => Error::BadArgument(msg.to_string()),
            AllocError::ZeroSize => Error::bad_argument("allocation size is zero"),
            other => Error::AllocationFailed(other),
        }
    }
}

/// Stable numeric error categories.
///
/// Codes 12 and 14 are reserved for file-loading and pool-initialization
/// failures that have no counterpart in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum ErrorKind {
    /// No error.
    #[default]
    Success = 0,
    /// See [`Error::NullManager`].
    NullManager = 1,
    /// See [`Error::NullPointer`].
    NullPointer = 2,
    /// See [`Error::NullFrame`].
    NullFrame = 3,
    /// See [`Error::NullTile`].
    NullTile = 4,
    /// See [`Error::NullBuffer`].
    NullBuffer = 5,
    /// See [`Error::AllocationFailed`].
    AllocationFailed = 6,
    /// See [`Error::FrameRegistryFull`].
    FrameRegistryFull = 7,
    /// See [`Error::TileRegistryFull`].
    TileRegistryFull = 8,
    /// See [`Error::DimensionMismatch`].
    DimensionMismatch = 9,
    /// See [`Error::BufferOverflow`].
    BufferOverflow = 10,
    /// See [`Error::BadArgument`].
    BadArgument = 11,
    /// See [`Error::TransferInitFailed`].
    TransferInitFailed = 13,
    /// See [`Error::TransferFault`].
    TransferFault = 15,
}

impl ErrorKind {
    /// Numeric code of this category.
    #[inline]
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Look up a category by numeric code.
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => ErrorKind::Success,
            1 => ErrorKind::NullManager,
            2 => ErrorKind::NullPointer,
            3 => ErrorKind::NullFrame,
            4 => ErrorKind::NullTile,
            5 => ErrorKind::NullBuffer,
            6 => ErrorKind::AllocationFailed,
            7 => ErrorKind::FrameRegistryFull,
            8 => ErrorKind::TileRegistryFull,
            9 => ErrorKind::DimensionMismatch,
            10 => ErrorKind::BufferOverflow,
            11 => ErrorKind::BadArgument,
            13 => ErrorKind::TransferInitFailed,
            15 => ErrorKind::TransferFault,
            _ => return None,
        })
    }

    /// Human-readable description used by the diagnostic dump.
    pub fn describe(self) -> &'static str {
        match self {
            ErrorKind::Success => "no error",
            ErrorKind::NullManager => "tile manager has no memory banks",
            ErrorKind::NullPointer => "null pointer argument",
            ErrorKind::NullFrame => "frame missing or has no buffer",
            ErrorKind::NullTile => "tile missing or not allocated",
            ErrorKind::NullBuffer => "data buffer missing",
            ErrorKind::AllocationFailed => "buffer allocation failed",
            ErrorKind::FrameRegistryFull => "no frame slot available",
            ErrorKind::TileRegistryFull => "no tile slot available",
            ErrorKind::DimensionMismatch => "tile and frame element layouts differ",
            ErrorKind::BufferOverflow => "fixed-capacity buffer would overflow",
            ErrorKind::BadArgument => "invalid argument",
            ErrorKind::TransferInitFailed => "transfer engine failed to initialize",
            ErrorKind::TransferFault => "transfer engine reported a fault",
        }
    }

    /// True for [`ErrorKind::Success`].
    #[inline]
    pub fn is_success(self) -> bool {
        self == ErrorKind::Success
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.describe(), self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip() {
        for code in 0..=15 {
            if let Some(kind) = ErrorKind::from_code(code) {
                assert_eq!(kind.code(), code);
            }
        }
        assert_eq!(ErrorKind::from_code(12), None);
        assert_eq!(ErrorKind::from_code(14), None);
        assert_eq!(ErrorKind::from_code(16), None);
    }

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(Error::NullTile.kind().code(), 4);
        assert_eq!(Error::BufferOverflow("queue").kind().code(), 10);
        assert_eq!(Error::bad_argument("x").kind(), ErrorKind::BadArgument);
        assert_eq!(Error::TransferFault.kind().code(), 15);
    }

    #[test]
    fn test_alloc_error_conversion() {
        let err: Error = AllocError::OutOfMemory { requested: 64 }.into();
        assert_eq!(err.kind(), ErrorKind::AllocationFailed);

        let err: Error = AllocError::BadAlignment(3).into();
        assert_eq!(err.kind(), ErrorKind::BadArgument);
    }
}
