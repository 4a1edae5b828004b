//! Async rewindable stream on top of tokio's `AsyncRead`/`AsyncSeek`.
//!
//! Same contract as [`BufferingReadStream`](crate::BufferingReadStream). The
//! difference is how a live read survives suspension: bytes pulled from the
//! source are owned by the stream (`Live`) until they are mirrored and
//! flushed, and only then counted in the extent and handed out. A caller that
//! stops polling mid-write loses nothing; the next read or seek finishes the
//! pending mirror first.

use std::fmt;
use std::future::poll_fn;
use std::io::{self, SeekFrom};
use std::path::Path;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};

use crate::builder::{Parts, SpoolBuilder};
use crate::error::{Result, StreamError, READ_ONLY};
use crate::spill::AsyncSpillFile;
use crate::state::{Buffer, Route, SpoolState, Tier};
use crate::tempdir::{TempDir, TempDirProvider};

const DRAIN_CHUNK: usize = 8 * 1024;

/// A live read that has left the source but is not yet committed.
#[derive(Debug)]
enum Live {
    Idle,
    /// Copying the memory tier into `spill`; `chunk` is appended afterwards.
    Promoting {
        chunk: Vec<u8>,
        spill: AsyncSpillFile,
        copied: usize,
    },
    Mirroring {
        chunk: Vec<u8>,
        written: usize,
    },
}

pub struct AsyncBufferingReadStream<R> {
    inner: R,
    state: SpoolState,
    buffer: Buffer<AsyncSpillFile>,
    temp_dir: TempDir,
    file_prefix: String,
    live: Live,
    scratch: Vec<u8>,
    pending_seek: Option<SeekFrom>,
    /// Cursor to put back after `buffer_to_end`, kept here so that a drain
    /// dropped mid-way still restores it on the next read or seek.
    resume_at: Option<u64>,
}

impl<R: AsyncRead + Unpin> AsyncBufferingReadStream<R> {
    pub fn new(inner: R, memory_threshold: usize) -> Self {
        let config = spool_core::SpoolConfig {
            memory_threshold,
            ..Default::default()
        };
        Self::from_parts(
            inner,
            Parts::new(&config, TempDirProvider::System, spool_mem::shared()),
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
            live: Live::Idle,
            scratch: Vec::new(),
            pending_seek: None,
            resume_at: None,
        }
    }

    /// Pull the rest of the source into the buffer without moving the cursor.
    /// Returns the total length.
    ///
    /// Dropping the future part-way keeps whatever was already buffered, and
    /// the cursor is back where it was by the next read or seek.
    pub async fn buffer_to_end(&mut self) -> io::Result<u64> {
        self.state.ensure_open()?;
        self.restore_cursor();
        poll_fn(|cx| self.poll_settle(cx)).await?;
        self.resume_at = Some(self.state.position());
        let mut sink = vec![0u8; DRAIN_CHUNK];
        while !self.state.is_fully_buffered() {
            self.state.place(self.state.extent());
            poll_fn(|cx| {
                let mut window = ReadBuf::new(&mut sink);
                self.poll_read_at_cursor(cx, &mut window)
            })
            .await?;
        }
        self.restore_cursor();
        Ok(self.state.extent())
    }

    fn restore_cursor(&mut self) {
        if let Some(pos) = self.resume_at.take() {
            self.state.place(pos);
        }
    }

    fn create_spill(&mut self) -> io::Result<AsyncSpillFile> {
        let dir = self.temp_dir.resolve()?;
        AsyncSpillFile::create(dir, &self.file_prefix)
    }

    /// Drive an in-flight live read to its commit. Returns the committed
    /// chunk, or `None` when nothing was in flight.
    fn poll_settle(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<Option<Vec<u8>>>> {
        loop {
            match std::mem::replace(&mut self.live, Live::Idle) {
                Live::Idle => return Poll::Ready(Ok(None)),
                Live::Promoting {
                    chunk,
                    mut spill,
                    mut copied,
                } => {
                    let Buffer::Memory(region) = &self.buffer else {
                        return Poll::Ready(Err(StreamError::ObjectDisposed.into()));
                    };
                    match spill.poll_write_all_at(cx, 0, region.as_slice(), &mut copied) {
                        Poll::Pending => {
                            self.live = Live::Promoting {
                                chunk,
                                spill,
                                copied,
                            };
                            return Poll::Pending;
                        }
                        Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                        Poll::Ready(Ok(())) => {}
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
                    self.live = Live::Mirroring { chunk, written: 0 };
                }
                Live::Mirroring { chunk, mut written } => {
                    let extent = self.state.extent();
                    match &mut self.buffer {
                        Buffer::Memory(region) => {
                            region.append(&chunk).map_err(StreamError::from)?;
                        }
                        Buffer::Disk(spill) => {
                            match spill.poll_write_all_at(cx, extent, &chunk, &mut written) {
                                Poll::Pending => {
                                    self.live = Live::Mirroring { chunk, written };
                                    return Poll::Pending;
                                }
                                Poll::Ready(res) => res?,
                            }
                        }
                        Buffer::Released => {
                            return Poll::Ready(Err(StreamError::ObjectDisposed.into()));
                        }
                    }
                    self.state.record_inner_read(chunk.len());
                    return Poll::Ready(Ok(Some(chunk)));
                }
            }
        }
    }

    /// Hand a freshly committed chunk to the caller. The cursor still sits
    /// where the chunk starts; whatever does not fit is replayed later.
    fn deliver(&mut self, chunk: Vec<u8>, buf: &mut ReadBuf<'_>) {
        let n = chunk.len().min(buf.remaining());
        buf.put_slice(&chunk[..n]);
        self.state.advance(n);
        self.scratch = chunk;
    }

    fn poll_replay(
        &mut self,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
        len: usize,
    ) -> Poll<io::Result<()>> {
        if len == 0 {
            return Poll::Ready(Ok(()));
        }
        let pos = self.state.position();
        let n = match &mut self.buffer {
            Buffer::Memory(region) => {
                let dst = buf.initialize_unfilled_to(len);
                let n = region.read_at(pos, dst);
                buf.advance(n);
                n
            }
            Buffer::Disk(spill) => ready!(spill.poll_read_at(cx, pos, buf, len))?,
            Buffer::Released => return Poll::Ready(Err(StreamError::ObjectDisposed.into())),
        };
        self.state.advance(n);
        Poll::Ready(Ok(()))
    }

    fn poll_read_inner(
        &mut self,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.state.ensure_open()?;
        self.restore_cursor();
        self.poll_read_at_cursor(cx, buf)
    }

    fn poll_read_at_cursor(
        &mut self,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if let Some(chunk) = ready!(self.poll_settle(cx))? {
            // Only hand it out if the cursor still sits where the chunk starts;
            // otherwise it is served from the buffer like any other replay.
            let start = self.state.extent() - chunk.len() as u64;
            if self.state.position() == start {
                self.deliver(chunk, buf);
                return Poll::Ready(Ok(()));
            }
            self.scratch = chunk;
        }
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }
        if let Route::Replay(len) = self.state.route(buf.remaining()) {
            return self.poll_replay(cx, buf, len);
        }

        let mut chunk = std::mem::take(&mut self.scratch);
        chunk.resize(buf.remaining(), 0);
        let mut window = ReadBuf::new(&mut chunk);
        let polled = Pin::new(&mut self.inner).poll_read(cx, &mut window);
        let read = window.filled().len();
        match polled {
            Poll::Ready(Ok(())) => {}
            Poll::Ready(Err(e)) => {
                self.scratch = chunk;
                return Poll::Ready(Err(e));
            }
            Poll::Pending => {
                self.scratch = chunk;
                return Poll::Pending;
            }
        }
        chunk.truncate(read);
        if read == 0 {
            self.state.record_inner_read(0);
            self.scratch = chunk;
            return Poll::Ready(Ok(()));
        }

        self.live = if self.state.needs_promotion(read) {
            Live::Promoting {
                chunk,
                spill: self.create_spill()?,
                copied: 0,
            }
        } else {
            Live::Mirroring { chunk, written: 0 }
        };
        if let Some(chunk) = ready!(self.poll_settle(cx))? {
            self.deliver(chunk, buf);
        }
        Poll::Ready(Ok(()))
    }
}

impl<R> AsyncBufferingReadStream<R> {
    /// Release the pooled array and delete the spill file. Idempotent. A live
    /// read still in flight is abandoned.
    pub fn close(&mut self) -> io::Result<()> {
        if !self.state.close() {
            return Ok(());
        }
        #[cfg(feature = "tracing")]
        tracing::trace!(extent = self.state.extent(), tier = ?self.state.tier(), "closing stream");
        self.live = Live::Idle;
        self.pending_seek = None;
        self.resume_at = None;
        match self.buffer.take() {
            Buffer::Memory(mut region) => {
                region.release();
                Ok(())
            }
            Buffer::Disk(spill) => spill.close(),
            Buffer::Released => Ok(()),
        }
    }

    pub fn position(&self) -> u64 {
        self.resume_at.unwrap_or_else(|| self.state.position())
    }

    pub fn memory_threshold(&self) -> u64 {
        self.state.threshold()
    }

    pub fn buffered_len(&self) -> u64 {
        self.state.extent()
    }

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

    pub fn spill_path(&self) -> Option<&Path> {
        match &self.buffer {
            Buffer::Disk(spill) => Some(spill.path()),
            _ => None,
        }
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

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

impl<R: AsyncRead + Unpin> AsyncRead for AsyncBufferingReadStream<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.get_mut().poll_read_inner(cx, buf)
    }
}

impl<R: AsyncRead + Unpin> AsyncSeek for AsyncBufferingReadStream<R> {
    fn start_seek(self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        let this = self.get_mut();
        this.state.ensure_open()?;
        if this.pending_seek.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "other seek operation is pending, call poll_complete before start_seek",
            ));
        }
        this.pending_seek = Some(position);
        Ok(())
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        let this = self.get_mut();
        this.state.ensure_open()?;
        this.restore_cursor();
        // A committed chunk that nobody received stays in the buffer and is
        // replayed from there.
        if let Err(e) = ready!(this.poll_settle(cx)) {
            this.pending_seek = None;
            return Poll::Ready(Err(e));
        }
        match this.pending_seek.take() {
            Some(pos) => Poll::Ready(this.state.seek(pos).map_err(io::Error::from)),
            None => Poll::Ready(Ok(this.state.position())),
        }
    }
}

impl<R> Drop for AsyncBufferingReadStream<R> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl<R> fmt::Debug for AsyncBufferingReadStream<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncBufferingReadStream")
            .field("state", &self.state)
            .field("live", &self.live)
            .field("resume_at", &self.resume_at)
            .field("spill_path", &self.spill_path())
            .finish_non_exhaustive()
    }
}
