//! Process-wide byte pool with power-of-two size classes.
//!
//! Small spill thresholds rent their memory tier from here so that short-lived
//! streams (one per request body, typically) reuse arrays instead of hitting
//! the allocator every time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use once_cell::sync::Lazy;
use spool_core::pool::BytePool;

use crate::tracking::PeakTracker;

/// Smallest size class (bytes).
pub const MIN_CLASS: usize = 16;
/// Largest pooled size class (bytes). Bigger rentals are plain allocations.
pub const MAX_CLASS: usize = 1024 * 1024;
/// Default number of idle arrays retained per size class.
pub const DEFAULT_ARRAYS_PER_CLASS: usize = 32;

const NUM_CLASSES: usize = (MAX_CLASS.trailing_zeros() - MIN_CLASS.trailing_zeros() + 1) as usize;

static SHARED: Lazy<Arc<SharedBytePool>> = Lazy::new(|| Arc::new(SharedBytePool::new()));

/// The process-wide pool used when a stream is not given one explicitly.
pub fn shared() -> Arc<dyn BytePool> {
    SHARED.clone()
}

fn class_index(len: usize) -> Option<usize> {
    let size = len.max(MIN_CLASS).checked_next_power_of_two()?;
    if size > MAX_CLASS {
        return None;
    }
    Some((size.trailing_zeros() - MIN_CLASS.trailing_zeros()) as usize)
}

fn class_size(idx: usize) -> usize {
    MIN_CLASS << idx
}

pub struct SharedBytePool {
    classes: Vec<Mutex<Vec<Vec<u8>>>>,
    per_class: usize,
    outstanding_bytes: AtomicUsize,
    peak: PeakTracker,
}

impl SharedBytePool {
    pub fn new() -> Self {
        Self::with_arrays_per_class(DEFAULT_ARRAYS_PER_CLASS)
    }

    pub fn with_arrays_per_class(per_class: usize) -> Self {
        Self {
            classes: (0..NUM_CLASSES).map(|_| Mutex::new(Vec::new())).collect(),
            per_class,
            outstanding_bytes: AtomicUsize::new(0),
            peak: PeakTracker::new(),
        }
    }

    /// Bytes currently rented out (advisory).
    pub fn outstanding_bytes(&self) -> usize {
        self.outstanding_bytes.load(Ordering::Relaxed)
    }

    /// Highest value `outstanding_bytes` has reached.
    pub fn peak_outstanding_bytes(&self) -> usize {
        self.peak.peak()
    }

    /// Idle arrays retained for the size class that serves `len`.
    pub fn idle_arrays(&self, len: usize) -> usize {
        class_index(len).map_or(0, |idx| {
            self.classes[idx]
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len()
        })
    }
}

impl Default for SharedBytePool {
    fn default() -> Self {
        Self::new()
    }
}

impl BytePool for SharedBytePool {
    fn rent(&self, min_len: usize) -> Vec<u8> {
        let buf = match class_index(min_len) {
            Some(idx) => {
                let reused = self.classes[idx]
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .pop();
                reused.unwrap_or_else(|| {
                    #[cfg(feature = "tracing")]
                    tracing::trace!(class = class_size(idx), "pool miss");
                    vec![0u8; class_size(idx)]
                })
            }
            None => vec![0u8; min_len],
        };
        let used = self.outstanding_bytes.fetch_add(buf.len(), Ordering::AcqRel) + buf.len();
        self.peak.observe(used);
        buf
    }

    fn give_back(&self, buf: Vec<u8>) {
        let len = buf.len();
        let _ = self
            .outstanding_bytes
            .fetch_update(Ordering::AcqRel, Ordering::Relaxed, |cur| {
                Some(cur.saturating_sub(len))
            });
        // Only arrays that exactly match a size class are retained.
        let Some(idx) = class_index(buf.len()) else {
            return;
        };
        if class_size(idx) != buf.len() {
            return;
        }
        let mut idle = self.classes[idx]
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.per_class {
            idle.push(buf);
        }
    }

    fn name(&self) -> &'static str {
        "shared"
    }
}
