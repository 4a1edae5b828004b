#![forbid(unsafe_code)]
//! spool-io: rewindable read streams that spill from memory to disk.
//!
//! [`BufferingReadStream`] wraps a forward-only `Read` (a request body, a
//! pipe, a socket) and mirrors every byte it hands out, first into a pooled
//! memory region and, past the configured threshold, into a temporary file.
//! Callers can seek back and read again; seeking ahead of what has been read
//! is refused until the source is exhausted.
//!
//! With the `tokio` feature, [`AsyncBufferingReadStream`] offers the same
//! contract over `AsyncRead`/`AsyncSeek`.

pub mod builder;
pub mod error;
pub mod ext;
mod spill;
pub mod state;
pub mod stream;
pub mod tempdir;

#[cfg(feature = "tokio")]
pub mod async_stream;

pub use builder::SpoolBuilder;
pub use error::{StreamError, NOT_FULLY_BUFFERED};
pub use ext::ReadRewindExt;
pub use state::Tier;
pub use stream::BufferingReadStream;
pub use tempdir::TempDirProvider;

#[cfg(feature = "tokio")]
pub use async_stream::AsyncBufferingReadStream;
#[cfg(feature = "tokio")]
pub use ext::AsyncReadRewindExt;
