//! Keep-latest frame handoff between a frame source and the detection worker.
//!
//! The slot holds at most one pending frame. A frame offered while another is
//! pending replaces it; the superseded frame is released immediately. Together
//! with the single frame the worker has in flight, at most two frames are ever
//! alive inside the pipeline.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use crate::frame::Frame;

#[derive(Default)]
struct SlotInner {
    pending: Option<Frame>,
    closed: bool,
}

pub(crate) struct LatestFrameSlot {
    inner: Mutex<SlotInner>,
    ready: Condvar,
}

/// What happened to an offered frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Offer {
    Accepted,
    /// Accepted, and an older pending frame was dropped.
    Replaced,
    /// Slot closed; the frame was released without processing.
    Closed,
}

impl LatestFrameSlot {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(SlotInner::default()),
            ready: Condvar::new(),
        }
    }

    /// Offer a frame, numbering it with `next_sequence` under the slot lock so
    /// sequence order matches the order frames enter the slot, whichever
    /// producer thread they come from.
    pub(crate) fn offer<F>(&self, frame: Frame, next_sequence: F) -> Offer
    where
        F: FnOnce() -> u64,
    {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let frame = frame.with_sequence(next_sequence());
        if inner.closed {
            drop(inner);
            drop(frame);
            return Offer::Closed;
        }
        let superseded = inner.pending.replace(frame);
        drop(inner);
        self.ready.notify_one();
        // Release outside the lock: hooks call back into the capture layer.
        match superseded {
            Some(old) => {
                drop(old);
                Offer::Replaced
            }
            None => Offer::Accepted,
        }
    }

    /// Block until a frame is pending or the slot is closed.
    pub(crate) fn take(&self) -> Option<Frame> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if inner.closed {
                return None;
            }
            if let Some(frame) = inner.pending.take() {
                return Some(frame);
            }
            inner = self
                .ready
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Close the slot and release any pending frame.
    pub(crate) fn close(&self) {
        let pending = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.closed = true;
            inner.pending.take()
        };
        self.ready.notify_all();
        drop(pending);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .closed
    }
}

// ----------------------------------------------------------------------------
// Stats
// ----------------------------------------------------------------------------

/// Pipeline counters, shared between the sink, the worker and the owner.
#[derive(Debug, Default)]
pub(crate) struct PipelineStats {
    received: AtomicU64,
    dropped: AtomicU64,
    rejected: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    discarded: AtomicU64,
}

/// Point-in-time copy of the pipeline counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Frames delivered by the source.
    pub frames_received: u64,
    /// Frames superseded by a newer frame before the worker picked them up.
    pub frames_dropped: u64,
    /// Frames delivered while the pipeline was not active.
    pub frames_rejected: u64,
    /// Detection cycles that produced a result.
    pub frames_processed: u64,
    /// Detection cycles that ended in an error.
    pub frames_failed: u64,
    /// Outcomes that completed after a pause and were not shown.
    pub results_discarded: u64,
}

impl PipelineStats {
    pub(crate) fn record_received(&self) -> u64 {
        self.received.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn record_offer(&self, offer: Offer) {
        match offer {
            Offer::Accepted => {}
            Offer::Replaced => {
                self.dropped.fetch_add(1, Ordering::SeqCst);
            }
            Offer::Closed => {
                self.rejected.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    pub(crate) fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_discarded(&self) {
        self.discarded.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_received: self.received.load(Ordering::SeqCst),
            frames_dropped: self.dropped.load(Ordering::SeqCst),
            frames_rejected: self.rejected.load(Ordering::SeqCst),
            frames_processed: self.processed.load(Ordering::SeqCst),
            frames_failed: self.failed.load(Ordering::SeqCst),
            results_discarded: self.discarded.load(Ordering::SeqCst),
        }
    }
}

// ----------------------------------------------------------------------------
// FrameSink
// ----------------------------------------------------------------------------

/// Push handle given to a `FrameSource` when the pipeline binds it.
///
/// Cloneable and callable from any capture thread. Frames are numbered in
/// arrival order as they enter the pipeline.
#[derive(Clone)]
pub struct FrameSink {
    slot: Arc<LatestFrameSlot>,
    stats: Arc<PipelineStats>,
}

impl FrameSink {
    pub(crate) fn new(slot: Arc<LatestFrameSlot>, stats: Arc<PipelineStats>) -> Self {
        Self { slot, stats }
    }

    /// Hand a frame to the pipeline. Returns false when the pipeline is no
    /// longer accepting frames; the frame has been released in that case.
    pub fn push(&self, frame: Frame) -> bool {
        let offer = self.slot.offer(frame, || self.stats.record_received());
        self.stats.record_offer(offer);
        if offer == Offer::Replaced {
            log::trace!("pending frame superseded");
        }
        offer != Offer::Closed
    }

    /// True once the owning activation has been paused.
    pub fn is_closed(&self) -> bool {
        self.slot.is_closed()
    }
}
