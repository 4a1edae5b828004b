//! Pool bookkeeping: peak usage and rental ownership.
//!
//! `PeakTracker` records how many bytes a pool had lent out at its busiest. `TrackingPool` wraps any
//! pool and checks that every rented array comes back exactly once; it is meant
//! for tests and debugging builds, not production traffic.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use spool_core::pool::BytePool;

use crate::pool::SharedBytePool;

/// High-water mark of the bytes a pool has lent out at once.
///
/// The pool calls `observe` after every rental with its new outstanding total;
/// returns never lower the mark.
#[derive(Debug, Default)]
pub struct PeakTracker {
    peak_outstanding: AtomicUsize,
}

impl PeakTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold an outstanding-bytes sample into the mark and return the mark.
    pub fn observe(&self, outstanding_bytes: usize) -> usize {
        let previous = self
            .peak_outstanding
            .fetch_max(outstanding_bytes, Ordering::AcqRel);
        let peak = previous.max(outstanding_bytes);
        #[cfg(feature = "tracing")]
        if outstanding_bytes > previous {
            tracing::trace!(peak_outstanding = peak, "pool reached a new peak");
        }
        peak
    }

    pub fn peak(&self) -> usize {
        self.peak_outstanding.load(Ordering::Acquire)
    }
}

/// Pool wrapper that detects double returns and leaks.
///
/// Arrays are identified by their heap address, so the wrapped pool must hand
/// out non-empty arrays (every pool in this crate does).
pub struct TrackingPool<P: BytePool = SharedBytePool> {
    inner: P,
    live: Mutex<HashSet<usize>>,
    rented: AtomicUsize,
    returned: AtomicUsize,
}

impl<P: BytePool> TrackingPool<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            live: Mutex::new(HashSet::new()),
            rented: AtomicUsize::new(0),
            returned: AtomicUsize::new(0),
        }
    }

    /// Number of `rent` calls served.
    pub fn rented(&self) -> usize {
        self.rented.load(Ordering::Relaxed)
    }

    /// Number of arrays given back.
    pub fn returned(&self) -> usize {
        self.returned.load(Ordering::Relaxed)
    }

    /// Arrays rented and not yet given back.
    pub fn outstanding(&self) -> usize {
        self.live.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl Default for TrackingPool<SharedBytePool> {
    fn default() -> Self {
        Self::new(SharedBytePool::new())
    }
}

impl<P: BytePool> BytePool for TrackingPool<P> {
    fn rent(&self, min_len: usize) -> Vec<u8> {
        let buf = self.inner.rent(min_len);
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(buf.as_ptr() as usize);
        self.rented.fetch_add(1, Ordering::Relaxed);
        buf
    }

    /// # Panics
    ///
    /// Panics when `buf` is not currently rented from this pool, i.e. it was
    /// already given back or never came from here.
    fn give_back(&self, buf: Vec<u8>) {
        let known = self
            .live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(buf.as_ptr() as usize));
        assert!(known, "array returned to pool twice or never rented from it");
        self.returned.fetch_add(1, Ordering::Relaxed);
        self.inner.give_back(buf);
    }

    fn name(&self) -> &'static str {
        "tracking"
    }
}
