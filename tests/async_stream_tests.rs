//! Async stream tests: the blocking guarantees, over tokio's AsyncRead/AsyncSeek

#![cfg(feature = "tokio")]

use spool_io::{AsyncBufferingReadStream, AsyncReadRewindExt, StreamError, Tier};
use spool_mem::TrackingPool;
use std::collections::VecDeque;
use std::future::Future;
use std::io::{self, SeekFrom};
use std::path::PathBuf;
use std::pin::{pin, Pin};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, ReadBuf};

/// Async source that yields one chunk per ready poll and, when `stall` is set,
/// returns `Pending` before every chunk.
struct Chunked {
    chunks: VecDeque<Vec<u8>>,
    stall: bool,
    stalled: bool,
    reads: usize,
}

impl Chunked {
    fn new(chunks: &[&[u8]]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_vec()).collect(),
            stall: false,
            stalled: false,
            reads: 0,
        }
    }

    fn stalling(chunks: &[&[u8]]) -> Self {
        Self {
            stall: true,
            ..Self::new(chunks)
        }
    }
}

impl AsyncRead for Chunked {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.stall && !this.stalled {
            this.stalled = true;
            cx.waker().wake_by_ref();
            return Poll::Pending;
        }
        this.stalled = false;
        this.reads += 1;
        if let Some(front) = this.chunks.front_mut() {
            let n = front.len().min(buf.remaining());
            buf.put_slice(&front[..n]);
            front.drain(..n);
            if front.is_empty() {
                this.chunks.pop_front();
            }
        }
        Poll::Ready(Ok(()))
    }
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Waker for polling a future by hand; nothing is rescheduled.
struct NoopWake;

impl Wake for NoopWake {
    fn wake(self: Arc<Self>) {}
}

fn noop_waker() -> Waker {
    Waker::from(Arc::new(NoopWake))
}

#[tokio::test]
async fn test_async_replay_matches_first_pass() {
    let data = pattern(3000);
    let chunks: Vec<&[u8]> = data.chunks(700).collect();
    let mut stream = AsyncBufferingReadStream::new(Chunked::stalling(&chunks), 1024 * 1024);

    let mut first = Vec::new();
    stream.read_to_end(&mut first).await.expect("first pass");
    stream.seek(SeekFrom::Start(0)).await.expect("rewind");
    let mut second = Vec::new();
    stream.read_to_end(&mut second).await.expect("second pass");

    assert_eq!(first, data);
    assert_eq!(second, data);
    assert!(stream.is_in_memory());
    assert!(stream.is_fully_buffered());
}

#[tokio::test]
async fn test_async_threshold_crossing_moves_to_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut stream = AsyncBufferingReadStream::builder(Chunked::new(&[b"0123456789", b"ABCDE"]))
        .memory_threshold(10)
        .temp_dir(dir.path())
        .build_async()
        .expect("build");

    let mut buf = [0u8; 64];
    assert_eq!(stream.read(&mut buf).await.expect("read 1"), 10);
    assert_eq!(stream.tier(), Tier::Memory);
    assert_eq!(stream.read(&mut buf).await.expect("read 2"), 5);
    assert_eq!(stream.tier(), Tier::Disk);
    assert_eq!(stream.read(&mut buf).await.expect("read 3"), 0);

    assert_eq!(stream.buffered_len(), 15);
    assert!(stream.is_fully_buffered());
    assert_eq!(stream.get_ref().reads, 3);

    stream.seek(SeekFrom::Start(0)).await.expect("seek");
    let mut replay = String::new();
    stream.read_to_string(&mut replay).await.expect("replay");
    assert_eq!(replay, "0123456789ABCDE");
    assert_eq!(stream.get_ref().reads, 3);
}

#[tokio::test]
async fn test_async_reads_spanning_the_threshold_with_stalls() {
    let dir = tempfile::tempdir().expect("tempdir");
    let data = pattern(200);
    let chunks: Vec<&[u8]> = data.chunks(9).collect();
    let mut stream = AsyncBufferingReadStream::builder(Chunked::stalling(&chunks))
        .memory_threshold(32)
        .temp_dir(dir.path())
        .build_async()
        .expect("build");

    let mut got = Vec::new();
    let mut buf = [0u8; 4];
    loop {
        let n = stream.read(&mut buf).await.expect("read");
        if n == 0 {
            break;
        }
        got.extend_from_slice(&buf[..n]);
    }
    assert_eq!(got, data);
    assert_eq!(stream.tier(), Tier::Disk);

    stream.seek(SeekFrom::Start(31)).await.expect("seek");
    let mut tail = Vec::new();
    stream.read_to_end(&mut tail).await.expect("tail");
    assert_eq!(tail, &data[31..]);
}

#[tokio::test]
async fn test_async_seek_ahead_is_rejected_until_complete() {
    let data = pattern(10);
    let mut stream = (&data[..]).rewindable_async(64);
    let mut head = [0u8; 5];
    stream.read_exact(&mut head).await.expect("head");

    let err = stream.seek(SeekFrom::Start(8)).await.expect_err("ahead");
    assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    let err = stream.seek(SeekFrom::End(0)).await.expect_err("end");
    assert!(StreamError::from_io(&err).expect("stream error").is_unsupported());
    assert_eq!(stream.position(), 5);

    assert_eq!(stream.buffer_to_end().await.expect("buffer"), 10);
    assert_eq!(stream.position(), 5);
    assert_eq!(stream.seek(SeekFrom::Start(8)).await.expect("seek"), 8);
    assert_eq!(stream.seek(SeekFrom::End(-10)).await.expect("seek end"), 0);
    let err = stream.seek(SeekFrom::Current(-1)).await.expect_err("negative");
    assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
}

#[tokio::test]
async fn test_async_pool_array_returned_once() {
    let pool = Arc::new(TrackingPool::default());
    let dir = tempfile::tempdir().expect("tempdir");
    let data = pattern(100);

    let mut spilled = AsyncBufferingReadStream::builder(&data[..])
        .memory_threshold(10)
        .temp_dir(dir.path())
        .pool(pool.clone())
        .build_async()
        .expect("build");
    let mut sink = Vec::new();
    spilled.read_to_end(&mut sink).await.expect("read");
    assert_eq!(pool.returned(), 1);
    spilled.close().expect("close");
    drop(spilled);
    assert_eq!(pool.returned(), 1);

    let mut kept = AsyncBufferingReadStream::builder(&data[..20])
        .memory_threshold(64)
        .pool(pool.clone())
        .build_async()
        .expect("build");
    kept.read_to_end(&mut sink).await.expect("read");
    assert!(kept.is_in_memory());
    drop(kept);

    assert_eq!(pool.rented(), 2);
    assert_eq!(pool.returned(), 2);
    assert_eq!(pool.outstanding(), 0);
}

#[tokio::test]
async fn test_async_failed_promotion_keeps_memory_tier() {
    let pool = Arc::new(TrackingPool::default());
    let dir = tempfile::tempdir().expect("tempdir");
    let data = pattern(32);
    let mut stream = AsyncBufferingReadStream::builder(&data[..])
        .memory_threshold(10)
        .temp_dir(dir.path().join("does-not-exist"))
        .pool(pool.clone())
        .build_async()
        .expect("build");

    let mut buf = [0u8; 8];
    assert_eq!(stream.read(&mut buf).await.expect("under threshold"), 8);
    let err = stream.read(&mut buf).await.expect_err("promotion fails");
    assert_eq!(err.kind(), io::ErrorKind::NotFound);
    assert_eq!(stream.tier(), Tier::Memory);
    assert_eq!(stream.buffered_len(), 8);

    drop(stream);
    assert_eq!(pool.outstanding(), 0);
    assert_eq!(pool.returned(), 1);
}

#[tokio::test]
async fn test_async_spill_file_deleted_and_provider_called_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let spill_dir: PathBuf = dir.path().to_path_buf();
    let data = pattern(256);

    let mut stream = AsyncBufferingReadStream::builder(&data[..])
        .memory_threshold(16)
        .temp_dir_with(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, io::Error>(spill_dir)
        })
        .build_async()
        .expect("build");

    assert_eq!(stream.buffer_to_end().await.expect("buffer"), 256);
    let path = stream.spill_path().expect("spilled").to_path_buf();
    assert!(path.exists());
    assert_eq!(path.parent(), Some(dir.path()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let mut replay = Vec::new();
    stream.read_to_end(&mut replay).await.expect("replay");
    assert_eq!(replay, data);

    stream.close().expect("close");
    assert!(!path.exists());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_async_closed_stream_is_disposed() {
    let mut stream = AsyncBufferingReadStream::new(&b"abc"[..], 16);
    stream.close().expect("close");
    stream.close().expect("close is idempotent");
    assert!(stream.is_closed());

    let mut buf = [0u8; 3];
    let err = stream.read(&mut buf).await.expect_err("read after close");
    assert!(StreamError::from_io(&err).expect("stream error").is_disposed());
    let err = stream.seek(SeekFrom::Start(0)).await.expect_err("seek after close");
    assert!(StreamError::from_io(&err).expect("stream error").is_disposed());
}

#[tokio::test]
async fn test_async_dropped_reads_lose_no_bytes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let data = pattern(5000);
    let mut stream = AsyncBufferingReadStream::builder(&data[..])
        .memory_threshold(10)
        .temp_dir(dir.path())
        .build_async()
        .expect("build");

    let waker = noop_waker();
    let mut cx = Context::from_waker(&waker);
    let mut got = Vec::new();
    let mut abandoned = 0;
    loop {
        let mut buf = [0u8; 97];
        // Poll the read exactly once and drop it if it is not done.
        let polled = {
            let mut read = pin!(stream.read(&mut buf));
            read.as_mut().poll(&mut cx)
        };
        match polled {
            Poll::Ready(res) => {
                let n = res.expect("read");
                if n == 0 {
                    break;
                }
                got.extend_from_slice(&buf[..n]);
            }
            Poll::Pending => {
                abandoned += 1;
                let pos = stream.stream_position().await.expect("settle");
                // The abandoned chunk is committed but not handed out.
                assert_eq!(pos, got.len() as u64);
                assert!(stream.buffered_len() >= pos);
            }
        }
    }

    assert!(abandoned > 0, "disk writes never suspended");
    assert_eq!(got, data);
    assert_eq!(stream.tier(), Tier::Disk);
    assert_eq!(stream.buffered_len(), 5000);

    stream.rewind().await.expect("rewind");
    let mut replay = Vec::new();
    stream.read_to_end(&mut replay).await.expect("replay");
    assert_eq!(replay, data);
}

#[tokio::test]
async fn test_async_dropped_buffer_to_end_restores_cursor() {
    let dir = tempfile::tempdir().expect("tempdir");
    let data = pattern(5000);
    let mut stream = AsyncBufferingReadStream::builder(&data[..])
        .memory_threshold(10)
        .temp_dir(dir.path())
        .build_async()
        .expect("build");

    let mut head = [0u8; 5];
    stream.read_exact(&mut head).await.expect("head");
    stream.seek(SeekFrom::Start(2)).await.expect("seek back");

    let waker = noop_waker();
    let mut cx = Context::from_waker(&waker);
    let polled = {
        let mut drain = pin!(stream.buffer_to_end());
        drain.as_mut().poll(&mut cx)
    };
    if let Poll::Ready(res) = polled {
        assert_eq!(res.expect("buffer"), 5000);
    }
    assert_eq!(stream.position(), 2);

    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).await.expect("rest");
    assert_eq!(rest, &data[2..]);
    assert!(stream.is_fully_buffered());
    assert_eq!(stream.tier(), Tier::Disk);
    assert_eq!(stream.stream_position().await.expect("position"), 5000);
}
