//! Error taxonomy for the spooling streams.
//!
//! The streams implement `std::io::Read`/`Seek` (and the tokio equivalents),
//! so every `StreamError` is eventually carried inside an `io::Error`. The
//! original variant stays reachable through `StreamError::from_io`.

use std::io;

use thiserror::Error;

/// Message used whenever a seek needs bytes the inner source has not produced.
pub const NOT_FULLY_BUFFERED: &str = "the content has not been fully buffered yet";

/// Message used by the write-side operations.
pub const READ_ONLY: &str = "the stream is read-only";

pub type Result<T> = std::result::Result<T, StreamError>;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("cannot access a closed stream")]
    ObjectDisposed,

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl StreamError {
    /// Recover the `StreamError` carried by an `io::Error` produced by a
    /// stream, if there is one.
    pub fn from_io(err: &io::Error) -> Option<&StreamError> {
        err.get_ref().and_then(|e| e.downcast_ref::<StreamError>())
    }

    pub fn is_disposed(&self) -> bool {
        matches!(self, StreamError::ObjectDisposed)
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, StreamError::Unsupported(_))
    }
}

impl From<StreamError> for io::Error {
    fn from(e: StreamError) -> Self {
        match e {
            StreamError::Io(inner) => inner,
            StreamError::Unsupported(_) => io::Error::new(io::ErrorKind::Unsupported, e),
            StreamError::InvalidArgument(_) => io::Error::new(io::ErrorKind::InvalidInput, e),
            StreamError::ObjectDisposed => io::Error::new(io::ErrorKind::Other, e),
        }
    }
}

impl From<spool_core::Error> for StreamError {
    fn from(e: spool_core::Error) -> Self {
        match e {
            spool_core::Error::InvalidArgument(msg) => StreamError::InvalidArgument(msg),
            spool_core::Error::Config(msg) => StreamError::InvalidArgument(msg),
        }
    }
}

impl From<spool_mem::error::Error> for StreamError {
    fn from(e: spool_mem::error::Error) -> Self {
        StreamError::Io(io::Error::new(io::ErrorKind::Other, e))
    }
}
