//! Blocking rewindable stream.

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use crate::builder::{Parts, SpoolBuilder};
use crate::error::{Result, StreamError, READ_ONLY};
use crate::spill::SpillFile;
use crate::state::{Buffer, Route, SpoolState, Tier};
use crate::tempdir::TempDir;

const DRAIN_CHUNK: usize = 8 * 1024;

/// A read-only, seekable view over a forward-only `Read` source.
///
/// Every byte pulled from the source is mirrored into a buffer before it is
/// handed out, so the stream can be rewound and read again. The buffer starts
/// in memory and moves to a temporary file once more than `memory_threshold`
/// bytes have been read. Seeking is restricted to the part already buffered
/// until the source reports end-of-data.
///
/// Dropping the stream releases the pooled memory and deletes the temporary
/// file. Use [`close`](Self::close) to observe errors from that cleanup.
pub struct BufferingReadStream<R> {
    inner: R,
    state: SpoolState,
    buffer: Buffer<SpillFile>,
    temp_dir: TempDir,
    file_prefix: String,
}

impl<R: Read> BufferingReadStream<R> {
    /// Wrap `inner` with the default configuration, the shared pool and the
    /// system temp directory.
    pub fn new(inner: R, memory_threshold: usize) -> Self {
        let config = spool_core::SpoolConfig {
            memory_threshold,
            ..Default::default()
        };
        Self::from_parts(
            inner,
            Parts::new(
                &config,
                crate::tempdir::TempDirProvider::System,
                spool_mem::shared(),
            ),
        )
    }

    pub fn builder(inner: R) -> SpoolBuilder<R> {
        SpoolBuilder::new(inner)
    }

    pub(crate) fn from_parts(inner: R, parts: Parts) -> Self {
        Self {
            inner,
            state: parts.state,
            buffer: Buffer::Memory(parts.region),
            temp_dir: parts.temp_dir,
            file_prefix: parts.file_prefix,
        }
    }

    /// Pull the rest of the source into the buffer without moving the cursor.
    /// Returns the total length.
    pub fn buffer_to_end(&mut self) -> io::Result<u64> {
        self.state.ensure_open()?;
        let saved = self.state.position();
        let mut sink = [0u8; DRAIN_CHUNK];
        while !self.state.is_fully_buffered() {
            self.state.place(self.state.extent());
            self.read_live(&mut sink)?;
        }
        self.state.place(saved);
        Ok(self.state.extent())
    }

    fn read_buffered(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let pos = self.state.position();
        let n = match &mut self.buffer {
            Buffer::Memory(region) => region.read_at(pos, out),
            Buffer::Disk(spill) => spill.read_at(pos, out)?,
            Buffer::Released => return Err(StreamError::ObjectDisposed.into()),
        };
        self.state.advance(n);
        Ok(n)
    }

    fn read_live(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        if self.state.needs_promotion(read) {
            self.promote()?;
        }
        if read > 0 {
            self.mirror(&buf[..read])?;
        }
        self.state.record_inner_read(read);
        self.state.advance(read);
        Ok(read)
    }

    /// Copy the memory tier into a fresh spill file and switch to it. On
    /// failure the memory tier stays active and the half-written file is
    /// deleted.
    fn promote(&mut self) -> io::Result<()> {
        let dir = self.temp_dir.resolve()?;
        let mut spill = SpillFile::create(dir, &self.file_prefix)?;
        match &self.buffer {
            Buffer::Memory(region) => spill.write_all_at(0, region.as_slice())?,
            _ => return Err(StreamError::ObjectDisposed.into()),
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(
            extent = self.state.extent(),
            threshold = self.state.threshold(),
            path = %spill.path().display(),
            "promoting buffer to disk"
        );
        if self.buffer.promote(spill).is_none() {
            self.state.mark_promoted();
        }
        Ok(())
    }

    fn mirror(&mut self, bytes: &[u8]) -> io::Result<()> {
        let extent = self.state.extent();
        match &mut self.buffer {
            Buffer::Memory(region) => region.append(bytes).map_err(StreamError::from)?,
            Buffer::Disk(spill) => spill.write_all_at(extent, bytes)?,
            Buffer::Released => return Err(StreamError::ObjectDisposed.into()),
        }
        Ok(())
    }
}

impl<R> BufferingReadStream<R> {
    /// Release the pooled array and delete the spill file. Idempotent; later
    /// reads and seeks fail with `ObjectDisposed`.
    pub fn close(&mut self) -> io::Result<()> {
        if !self.state.close() {
            return Ok(());
        }
        #[cfg(feature = "tracing")]
        tracing::trace!(extent = self.state.extent(), tier = ?self.state.tier(), "closing stream");
        match self.buffer.take() {
            Buffer::Memory(mut region) => {
                region.release();
                Ok(())
            }
            Buffer::Disk(spill) => spill.close(),
            Buffer::Released => Ok(()),
        }
    }

    /// Current cursor.
    pub fn position(&self) -> u64 {
        self.state.position()
    }

    pub fn memory_threshold(&self) -> u64 {
        self.state.threshold()
    }

    /// Bytes mirrored into the buffer so far.
    pub fn buffered_len(&self) -> u64 {
        self.state.extent()
    }

    /// Length of the buffer; the total length once fully buffered.
    pub fn len(&self) -> u64 {
        self.state.extent()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tier(&self) -> Tier {
        self.state.tier()
    }

    pub fn is_in_memory(&self) -> bool {
        self.state.tier() == Tier::Memory
    }

    pub fn is_fully_buffered(&self) -> bool {
        self.state.is_fully_buffered()
    }

    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    /// Path of the spill file while the buffer lives on disk.
    pub fn spill_path(&self) -> Option<&Path> {
        match &self.buffer {
            Buffer::Disk(spill) => Some(spill.path()),
            _ => None,
        }
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Mutable access to the source. Reading through it bypasses the buffer
    /// and breaks replay.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn write(&mut self, _buf: &[u8]) -> Result<usize> {
        Err(StreamError::Unsupported(READ_ONLY))
    }

    pub fn flush(&mut self) -> Result<()> {
        Err(StreamError::Unsupported(READ_ONLY))
    }

    pub fn set_len(&mut self, _len: u64) -> Result<()> {
        Err(StreamError::Unsupported(READ_ONLY))
    }
}

impl<R: Read> Read for BufferingReadStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.state.ensure_open()?;
        if buf.is_empty() {
            return Ok(0);
        }
        match self.state.route(buf.len()) {
            Route::Replay(len) => self.read_buffered(&mut buf[..len]),
            Route::Live => self.read_live(buf),
        }
    }
}

impl<R: Read> Seek for BufferingReadStream<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.state.ensure_open()?;
        Ok(self.state.seek(pos)?)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        self.state.ensure_open()?;
        Ok(self.state.position())
    }
}

impl<R> Drop for BufferingReadStream<R> {
    fn drop(&mut self) {
        // Errors are only observable through `close`.
        let _ = self.close();
    }
}

impl<R> fmt::Debug for BufferingReadStream<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferingReadStream")
            .field("state", &self.state)
            .field("spill_path", &self.spill_path())
            .finish_non_exhaustive()
    }
}
