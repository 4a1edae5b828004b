//! Tier/completion state shared by the blocking and async streams.
//!
//! Every decision lives here: whether a read is a replay or hits the live
//! edge, when to promote, how the extent advances and which seeks are legal.
//! The bindings only perform the I/O those decisions call for.

use std::io::{self, SeekFrom};

use spool_mem::MemoryRegion;

use crate::error::{Result, StreamError, NOT_FULLY_BUFFERED};

/// Which medium currently holds the buffered bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Memory,
    Disk,
}

/// Where the next read is served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Route {
    /// Serve up to this many bytes from the buffer; the inner source is untouched.
    Replay(usize),
    /// The cursor sits on the live edge; pull from the inner source.
    Live,
}

/// Backing store of a stream. `F` is the binding's file type.
#[derive(Debug)]
pub(crate) enum Buffer<F> {
    Memory(MemoryRegion),
    Disk(F),
    Released,
}

impl<F> Buffer<F> {
    /// Memory -> Disk, the only tier transition. The memory region hands its
    /// pooled array back here. If the buffer is not on the memory tier the
    /// file is returned untouched.
    pub(crate) fn promote(&mut self, disk: F) -> Option<F> {
        match self {
            Buffer::Memory(region) => {
                region.release();
                *self = Buffer::Disk(disk);
                None
            }
            Buffer::Disk(_) | Buffer::Released => Some(disk),
        }
    }

    /// Take the backing store out, leaving `Released` behind.
    pub(crate) fn take(&mut self) -> Buffer<F> {
        std::mem::replace(self, Buffer::Released)
    }
}

#[derive(Debug)]
pub(crate) struct SpoolState {
    threshold: u64,
    extent: u64,
    position: u64,
    tier: Tier,
    fully_buffered: bool,
    closed: bool,
}

impl SpoolState {
    pub(crate) fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold as u64,
            extent: 0,
            position: 0,
            tier: Tier::Memory,
            fully_buffered: false,
            closed: false,
        }
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(StreamError::ObjectDisposed)
        } else {
            Ok(())
        }
    }

    pub(crate) fn threshold(&self) -> u64 {
        self.threshold
    }

    pub(crate) fn extent(&self) -> u64 {
        self.extent
    }

    pub(crate) fn position(&self) -> u64 {
        self.position
    }

    pub(crate) fn tier(&self) -> Tier {
        self.tier
    }

    pub(crate) fn is_fully_buffered(&self) -> bool {
        self.fully_buffered
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn route(&self, requested: usize) -> Route {
        if self.position < self.extent || self.fully_buffered {
            let available = self.extent.saturating_sub(self.position);
            let len = usize::try_from(available).unwrap_or(usize::MAX).min(requested);
            Route::Replay(len)
        } else {
            Route::Live
        }
    }

    /// Whether appending `read` fresh bytes must first move the buffer to disk.
    pub(crate) fn needs_promotion(&self, read: usize) -> bool {
        self.tier == Tier::Memory && self.extent + read as u64 > self.threshold
    }

    pub(crate) fn mark_promoted(&mut self) {
        debug_assert_eq!(self.tier, Tier::Memory, "promoted twice");
        self.tier = Tier::Disk;
    }

    /// Account for an inner read whose bytes are already mirrored into the
    /// buffer. Zero means the inner source is exhausted. The cursor is not
    /// moved; callers `advance` by what they hand out.
    pub(crate) fn record_inner_read(&mut self, read: usize) {
        if read == 0 {
            self.fully_buffered = true;
            #[cfg(feature = "tracing")]
            tracing::trace!(extent = self.extent, tier = ?self.tier, "source fully buffered");
        } else {
            self.extent += read as u64;
        }
    }

    pub(crate) fn advance(&mut self, n: usize) {
        self.position += n as u64;
    }

    /// Move the cursor to an offset known to be inside the buffer.
    pub(crate) fn place(&mut self, pos: u64) {
        debug_assert!(pos <= self.extent || self.fully_buffered);
        self.position = pos;
    }

    /// Validate and apply a seek; returns the new position.
    pub(crate) fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => i128::from(n),
            SeekFrom::Current(delta) => i128::from(self.position) + i128::from(delta),
            SeekFrom::End(delta) => {
                if !self.fully_buffered {
                    return Err(StreamError::Unsupported(NOT_FULLY_BUFFERED));
                }
                i128::from(self.extent) + i128::from(delta)
            }
        };
        if target < 0 {
            return Err(StreamError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative position",
            )));
        }
        if !self.fully_buffered && target > i128::from(self.extent) {
            return Err(StreamError::Unsupported(NOT_FULLY_BUFFERED));
        }
        let target = u64::try_from(target).map_err(|_| {
            StreamError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek position overflows u64",
            ))
        })?;
        self.position = target;
        Ok(target)
    }

    /// Mark closed. Returns `true` only for the first call.
    pub(crate) fn close(&mut self) -> bool {
        !std::mem::replace(&mut self.closed, true)
    }
}
