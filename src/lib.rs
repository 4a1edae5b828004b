//! spoolstream: rewindable read streams for forward-only sources.
//!
//! This crate re-exports the workspace members under one roof:
//!
//! - [`core`]: `BytePool`, `SpoolConfig` and shared errors;
//! - [`mem`]: the shared pool, pooled arrays and the in-memory tier;
//! - [`io`]: `BufferingReadStream` and, with the `tokio` feature,
//!   `AsyncBufferingReadStream`.

pub use spool_core as core;
pub use spool_io as io;
pub use spool_mem as mem;

pub use spool_core::{BytePool, SpoolConfig};
pub use spool_io::{
    BufferingReadStream, ReadRewindExt, SpoolBuilder, StreamError, TempDirProvider, Tier,
};

#[cfg(feature = "tokio")]
pub use spool_io::{AsyncBufferingReadStream, AsyncReadRewindExt};
