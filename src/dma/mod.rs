//! Block-transfer engine interface.
//!
//! The manager never copies tile data itself; it describes 2D copies as
//! [`TransferRequest`]s and hands them to a [`BlockTransfer`] implementation
//! (a DMA controller driver, or [`SoftTransfer`] in hosted builds).
//!
//! # Contract
//!
//! - Requests complete in submission order.
//! - Completion of a handle implies completion of every earlier handle.
//! - Faults are reported out of band through an [`ErrorChannel`] the manager
//!   attaches at construction.

mod soft;

pub use soft::{Completion, SoftTransfer, SoftTransferStats};

use crate::error::{Error, Result};
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tracing::warn;

/// Identifies one submitted transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferHandle(u32);

impl TransferHandle {
    /// Placeholder for "nothing was transferred". Always complete.
    pub const NOOP: Self = Self(u32::MAX);

    /// Wrap an engine-assigned id. `u32::MAX` is reserved for [`Self::NOOP`].
    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Engine-assigned id.
    #[inline]
    pub fn id(self) -> u32 {
        self.0
    }

    /// Returns true for the no-op placeholder.
    #[inline]
    pub fn is_noop(self) -> bool {
        self == Self::NOOP
    }
}

/// A 2D strided copy: `rows` rows of `row_bytes` bytes each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferRequest {
    src: NonNull<u8>,
    dst: NonNull<u8>,
    row_bytes: usize,
    rows: usize,
    src_pitch: usize,
    dst_pitch: usize,
    notify: bool,
}

impl TransferRequest {
    /// Describe a 2D copy.
    ///
    /// A source pitch of 0 repeats the first source row into every
    /// destination row.
    ///
    /// # Safety
    ///
    /// Until the transfer completes (or, for requests never submitted, until
    /// they are dropped), `src` must be valid for reads and `dst` valid for
    /// writes over `(rows - 1) * pitch + row_bytes` bytes each, and no other
    /// code may write either region.
    ///
    /// # Errors
    ///
    /// - [`Error::NullPointer`] if either pointer is null
    /// - [`Error::BadArgument`] for zero rows or zero row bytes
    pub unsafe fn new(
        src: *const u8,
        dst: *mut u8,
        row_bytes: usize,
        rows: usize,
        src_pitch: usize,
        dst_pitch: usize,
        notify: bool,
    ) -> Result<Self> {
        let src = NonNull::new(src as *mut u8).ok_or(Error::NullPointer("transfer source"))?;
        let dst = NonNull::new(dst).ok_or(Error::NullPointer("transfer destination"))?;
        if row_bytes == 0 || rows == 0 {
            return Err(Error::bad_argument(format!(
                "empty transfer: {rows} rows of {row_bytes} bytes"
            )));
        }
        Ok(Self {
            src,
            dst,
            row_bytes,
            rows,
            src_pitch,
            dst_pitch,
            notify,
        })
    }

    /// Source address.
    #[inline]
    pub fn src(&self) -> *const u8 {
        self.src.as_ptr()
    }

    /// Destination address.
    #[inline]
    pub fn dst(&self) -> *mut u8 {
        self.dst.as_ptr()
    }

    /// Bytes per row.
    #[inline]
    pub fn row_bytes(&self) -> usize {
        self.row_bytes
    }

    /// Number of rows.
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Source row stride in bytes.
    #[inline]
    pub fn src_pitch(&self) -> usize {
        self.src_pitch
    }

    /// Destination row stride in bytes.
    #[inline]
    pub fn dst_pitch(&self) -> usize {
        self.dst_pitch
    }

    /// Whether the engine should raise a completion notification.
    #[inline]
    pub fn notify(&self) -> bool {
        self.notify
    }

    /// Total payload in bytes.
    #[inline]
    pub fn payload_bytes(&self) -> usize {
        self.row_bytes * self.rows
    }

    /// Perform the copy synchronously, row by row.
    ///
    /// # Safety
    ///
    /// The memory contract of [`TransferRequest::new`] must still hold.
    pub unsafe fn execute(&self) {
        for row in 0..self.rows {
            // SAFETY: Both rows lie inside the regions the constructor's
            // caller vouched for. `copy` tolerates overlap.
            unsafe {
                std::ptr::copy(
                    self.src.as_ptr().add(row * self.src_pitch),
                    self.dst.as_ptr().add(row * self.dst_pitch),
                    self.row_bytes,
                );
            }
        }
    }
}

/// Details of a fault raised by a transfer engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferFault {
    /// Transfer that failed, when the engine knows it.
    pub handle: Option<TransferHandle>,
    /// Engine-specific error code.
    pub code: u32,
}

#[derive(Debug, Default)]
struct FaultState {
    raised: AtomicBool,
    code: AtomicU32,
    handle: AtomicU32,
}

type FaultCallback = Arc<dyn Fn(TransferFault) + Send + Sync>;

/// Sticky fault flag shared between a manager and its transfer engine.
///
/// Engines call [`raise`](Self::raise), possibly from another thread or an
/// interrupt handler; the manager's wait helpers poll
/// [`is_raised`](Self::is_raised) and give up once it is set. The flag
/// stays set until [`clear`](Self::clear).
#[derive(Clone, Default)]
pub struct ErrorChannel {
    state: Arc<FaultState>,
    callback: Option<FaultCallback>,
}

impl ErrorChannel {
    /// A channel with no callback.
    pub fn new() -> Self {
        Self::default()
    }

    /// A channel that also invokes `callback` on every fault.
    pub fn with_callback(callback: impl Fn(TransferFault) + Send + Sync + 'static) -> Self {
        Self {
            state: Arc::default(),
            callback: Some(Arc::new(callback)),
        }
    }

    /// Record a fault and invoke the callback.
    pub fn raise(&self, fault: TransferFault) {
        let handle = fault.handle.unwrap_or(TransferHandle::NOOP);
        self.state.code.store(fault.code, Ordering::Relaxed);
        self.state.handle.store(handle.id(), Ordering::Relaxed);
        self.state.raised.store(true, Ordering::Release);
        warn!(code = fault.code, handle = ?fault.handle, "transfer engine fault");
        if let Some(callback) = &self.callback {
            callback(fault);
        }
    }

    /// Returns true once a fault has been raised and not cleared.
    #[inline]
    pub fn is_raised(&self) -> bool {
        self.state.raised.load(Ordering::Acquire)
    }

    /// The most recent fault, if the flag is set.
    pub fn last_fault(&self) -> Option<TransferFault> {
        if !self.is_raised() {
            return None;
        }
        let handle = TransferHandle::new(self.state.handle.load(Ordering::Relaxed));
        Some(TransferFault {
            handle: (!handle.is_noop()).then_some(handle),
            code: self.state.code.load(Ordering::Relaxed),
        })
    }

    /// Reset the sticky flag.
    pub fn clear(&self) {
        self.state.raised.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for ErrorChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorChannel")
            .field("fault", &self.last_fault())
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

/// An engine that performs 2D block copies asynchronously.
///
/// # Safety of submitted requests
///
/// A [`TransferRequest`] can only be built through its `unsafe` constructor,
/// whose caller vouches for the memory. Implementations may therefore
/// dereference request pointers until the transfer is reported done.
pub trait BlockTransfer {
    /// Prepare the engine. Called once by the manager before any submit.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be used.
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    /// Queue a copy and return its handle.
    fn submit(&mut self, request: &TransferRequest) -> TransferHandle;

    /// Returns true once `handle` (and everything before it) has completed.
    ///
    /// [`TransferHandle::NOOP`] is always complete.
    fn is_done(&mut self, handle: TransferHandle) -> bool;

    /// Route faults to `channel`.
    fn attach_error_channel(&mut self, channel: ErrorChannel);

    /// Park the caller until the engine may have made progress.
    ///
    /// Used by sleeping waits. The default just yields the thread.
    fn wait_for_completion(&mut self) {
        std::thread::yield_now();
    }

    /// Let an engine that only progresses when called do some work.
    ///
    /// Called on every iteration of a spinning wait. Hardware engines run
    /// on their own and keep the default, which does nothing.
    fn poll(&mut self) {}
}

impl<T: BlockTransfer + ?Sized> BlockTransfer for Box<T> {
    fn init(&mut self) -> Result<()> {
        (**self).init()
    }

    fn submit(&mut self, request: &TransferRequest) -> TransferHandle {
        (**self).submit(request)
    }

    fn is_done(&mut self, handle: TransferHandle) -> bool {
        (**self).is_done(handle)
    }

    fn attach_error_channel(&mut self, channel: ErrorChannel) {
        (**self).attach_error_channel(channel)
    }

    fn wait_for_completion(&mut self) {
        (**self).wait_for_completion()
    }

    fn poll(&mut self) {
        (**self).poll()
    }
}
