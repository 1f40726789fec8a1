//! Software block-transfer engine.

use super::{BlockTransfer, ErrorChannel, TransferFault, TransferHandle, TransferRequest};
use crate::error::{Error, Result};
use std::collections::VecDeque;
use tracing::{debug, trace};

/// When a [`SoftTransfer`] performs submitted copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Completion {
    /// Copy during `submit`; every handle is done on return.
    #[default]
    Immediate,
    /// Queue copies until [`SoftTransfer::advance`] or a manager wait runs
    /// them, one per spin or sleep, modelling an engine that works in the
    /// background.
    Deferred,
}

/// Counters kept by a [`SoftTransfer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SoftTransferStats {
    /// Requests accepted by `submit`.
    pub submitted: u64,
    /// Requests whose copy has run.
    pub executed: u64,
    /// Payload bytes copied.
    pub bytes: u64,
}

/// A [`BlockTransfer`] that copies with the CPU.
///
/// Completes strictly in submission order. At most `max_outstanding`
/// requests wait at once; submitting past that runs the oldest first, the
/// way a hardware engine stalls when its descriptor ring is full.
///
/// [`inject_fault`](Self::inject_fault) halts the engine and raises the
/// attached error channel, for exercising fault handling.
///
/// # Example
///
/// ```rust
/// use tiledma::dma::{BlockTransfer, Completion, SoftTransfer, TransferRequest};
///
/// let src = [1u8, 2, 3, 4];
/// let mut dst = [0u8; 4];
/// let mut engine = SoftTransfer::new(Completion::Deferred);
///
/// // SAFETY: both arrays outlive the transfer.
/// let req = unsafe { TransferRequest::new(src.as_ptr(), dst.as_mut_ptr(), 4, 1, 4, 4, true) }.unwrap();
/// let handle = engine.submit(&req);
/// assert!(!engine.is_done(handle));
///
/// engine.complete_all();
/// assert!(engine.is_done(handle));
/// assert_eq!(dst, src);
/// ```
#[derive(Debug)]
pub struct SoftTransfer {
    completion: Completion,
    max_outstanding: usize,
    pending: VecDeque<(TransferHandle, TransferRequest)>,
    next_id: u32,
    halted: bool,
    channel: Option<ErrorChannel>,
    history: Option<Vec<TransferRequest>>,
    stats: SoftTransferStats,
}

impl SoftTransfer {
    /// Engine with the default outstanding-request limit.
    pub fn new(completion: Completion) -> Self {
        Self::with_capacity(completion, crate::defaults::TRANSFER_QUEUE_LENGTH * 4)
    }

    /// Engine that holds at most `max_outstanding` unfinished requests.
    ///
    /// A limit of zero makes [`init`](BlockTransfer::init) fail.
    pub fn with_capacity(completion: Completion, max_outstanding: usize) -> Self {
        Self {
            completion,
            max_outstanding,
            pending: VecDeque::with_capacity(max_outstanding),
            next_id: 0,
            halted: false,
            channel: None,
            history: None,
            stats: SoftTransferStats::default(),
        }
    }

    /// Run up to `n` pending copies. Returns how many ran.
    ///
    /// Does nothing while halted.
    pub fn advance(&mut self, n: usize) -> usize {
        let mut ran = 0;
        while ran < n && self.run_oldest() {
            ran += 1;
        }
        ran
    }

    /// Run every pending copy. Returns how many ran.
    pub fn complete_all(&mut self) -> usize {
        self.advance(usize::MAX)
    }

    fn run_oldest(&mut self) -> bool {
        if self.halted {
            return false;
        }
        let Some((handle, request)) = self.pending.pop_front() else {
            return false;
        };
        // SAFETY: The request's constructor contract keeps both regions
        // valid until this handle reports done, which happens only now.
        unsafe { request.execute() };
        self.stats.executed += 1;
        self.stats.bytes += request.payload_bytes() as u64;
        trace!(
            handle = handle.id(),
            rows = request.rows(),
            row_bytes = request.row_bytes(),
            "soft transfer executed"
        );
        true
    }

    /// Halt the engine and report a fault against the oldest pending
    /// request.
    ///
    /// Pending copies stay queued but will not run until
    /// [`resume`](Self::resume).
    pub fn inject_fault(&mut self, code: u32) {
        self.halted = true;
        let fault = TransferFault {
            handle: self.pending.front().map(|(h, _)| *h),
            code,
        };
        debug!(code, handle = ?fault.handle, "soft transfer halted by injected fault");
        if let Some(channel) = &self.channel {
            channel.raise(fault);
        }
    }

    /// Clear a halt; queued copies may run again.
    pub fn resume(&mut self) {
        self.halted = false;
    }

    /// Returns true while halted by a fault.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Number of submitted requests not yet executed.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Record every submitted request for [`history`](Self::history).
    ///
    /// Off by default; the record grows until
    /// [`clear_history`](Self::clear_history).
    pub fn with_history(mut self, enabled: bool) -> Self {
        self.history = enabled.then(Vec::new);
        self
    }

    /// Requests submitted since the last [`clear_history`](Self::clear_history).
    ///
    /// Empty unless recording was enabled with
    /// [`with_history`](Self::with_history).
    pub fn history(&self) -> &[TransferRequest] {
        self.history.as_deref().unwrap_or_default()
    }

    /// Forget the submission history.
    pub fn clear_history(&mut self) {
        if let Some(history) = self.history.as_mut() {
            history.clear();
        }
    }

    /// Counters.
    pub fn stats(&self) -> SoftTransferStats {
        self.stats
    }
}

impl BlockTransfer for SoftTransfer {
    fn init(&mut self) -> Result<()> {
        if self.max_outstanding == 0 {
            return Err(Error::TransferInitFailed(
                "soft transfer needs room for at least one request".into(),
            ));
        }
        Ok(())
    }

    fn submit(&mut self, request: &TransferRequest) -> TransferHandle {
        let handle = TransferHandle::new(self.next_id);
        // Skip the reserved no-op id on wrap.
        self.next_id = self.next_id.wrapping_add(1) % TransferHandle::NOOP.id();
        self.stats.submitted += 1;
        if let Some(history) = self.history.as_mut() {
            history.push(*request);
        }

        if self.pending.len() >= self.max_outstanding {
            self.run_oldest();
        }
        self.pending.push_back((handle, *request));
        if self.completion == Completion::Immediate {
            self.complete_all();
        }
        handle
    }

    fn is_done(&mut self, handle: TransferHandle) -> bool {
        if handle.is_noop() {
            return true;
        }
        !self.pending.iter().any(|(h, _)| *h == handle)
    }

    fn attach_error_channel(&mut self, channel: ErrorChannel) {
        self.channel = Some(channel);
    }

    fn wait_for_completion(&mut self) {
        if self.advance(1) == 0 {
            std::thread::yield_now();
        }
    }

    fn poll(&mut self) {
        self.advance(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(src: &[u8], dst: &mut [u8]) -> TransferRequest {
        // SAFETY: each test keeps both buffers alive until the engine drains.
        unsafe { TransferRequest::new(src.as_ptr(), dst.as_mut_ptr(), src.len(), 1, 0, 0, false) }.unwrap()
    }

    #[test]
    fn test_immediate_completes_on_submit() {
        let src = [9u8; 8];
        let mut dst = [0u8; 8];
        let mut engine = SoftTransfer::new(Completion::Immediate);
        engine.init().unwrap();

        let h = engine.submit(&request(&src, &mut dst));
        assert!(engine.is_done(h));
        assert_eq!(engine.pending(), 0);
        assert_eq!(dst, src);
        assert_eq!(engine.stats().bytes, 8);
    }

    #[test]
    fn test_deferred_completes_in_order() {
        let src = [[1u8; 4], [2u8; 4], [3u8; 4]];
        let mut dst = [[0u8; 4]; 3];
        let mut engine = SoftTransfer::new(Completion::Deferred);

        let handles: Vec<_> = src
            .iter()
            .zip(dst.iter_mut())
            .map(|(s, d)| engine.submit(&request(s, d)))
            .collect();
        assert!(handles.iter().all(|&h| !engine.is_done(h)));

        assert_eq!(engine.advance(1), 1);
        assert!(engine.is_done(handles[0]));
        assert!(!engine.is_done(handles[1]));

        assert_eq!(engine.complete_all(), 2);
        assert!(handles.iter().all(|&h| engine.is_done(h)));
        assert_eq!(dst, src);
    }

    #[test]
    fn test_capacity_forces_oldest() {
        let src = [5u8; 2];
        let mut a = [0u8; 2];
        let mut b = [0u8; 2];
        let mut engine = SoftTransfer::with_capacity(Completion::Deferred, 1);

        let ha = engine.submit(&request(&src, &mut a));
        let hb = engine.submit(&request(&src, &mut b));
        assert!(engine.is_done(ha));
        assert!(!engine.is_done(hb));
        assert_eq!(engine.pending(), 1);
    }

    #[test]
    fn test_zero_capacity_fails_init() {
        let mut engine = SoftTransfer::with_capacity(Completion::Immediate, 0);
        assert!(matches!(engine.init(), Err(Error::TransferInitFailed(_))));
    }

    #[test]
    fn test_fault_halts_and_raises() {
        let src = [1u8; 4];
        let mut dst = [0u8; 4];
        let channel = ErrorChannel::new();
        let mut engine = SoftTransfer::new(Completion::Deferred);
        engine.attach_error_channel(channel.clone());

        let h = engine.submit(&request(&src, &mut dst));
        engine.inject_fault(7);
        assert!(channel.is_raised());
        assert_eq!(channel.last_fault().unwrap().handle, Some(h));
        assert_eq!(engine.complete_all(), 0);
        assert!(!engine.is_done(h));

        engine.resume();
        engine.wait_for_completion();
        assert!(engine.is_done(h));
        assert_eq!(dst, src);
    }

    #[test]
    fn test_history_and_noop() {
        let src = [1u8; 4];
        let mut dst = [0u8; 4];
        let mut engine = SoftTransfer::new(Completion::Immediate).with_history(true);
        assert!(engine.is_done(TransferHandle::NOOP));

        engine.submit(&request(&src, &mut dst));
        assert_eq!(engine.history().len(), 1);
        assert_eq!(engine.history()[0].row_bytes(), 4);
        engine.clear_history();
        assert!(engine.history().is_empty());
    }

    #[test]
    fn test_history_is_off_by_default() {
        let src = [1u8; 4];
        let mut dst = [0u8; 4];
        let mut engine = SoftTransfer::new(Completion::Immediate);
        for _ in 0..8 {
            engine.submit(&request(&src, &mut dst));
        }
        assert!(engine.history().is_empty());
        assert_eq!(engine.stats().submitted, 8);

        let mut engine = engine.with_history(true);
        engine.submit(&request(&src, &mut dst));
        assert_eq!(engine.history().len(), 1);
    }

    #[test]
    fn test_poll_runs_one_copy() {
        let src = [3u8; 4];
        let mut a = [0u8; 4];
        let mut b = [0u8; 4];
        let mut engine = SoftTransfer::new(Completion::Deferred);
        let first = engine.submit(&request(&src, &mut a));
        let second = engine.submit(&request(&src, &mut b));

        engine.poll();
        assert!(engine.is_done(first));
        assert!(!engine.is_done(second));
        engine.poll();
        assert!(engine.is_done(second));
        assert_eq!((a, b), (src, src));
    }
}
