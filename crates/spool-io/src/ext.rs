//! `rewindable()` adapters for any reader.

use std::io::Read;

use crate::stream::BufferingReadStream;

pub trait ReadRewindExt: Read + Sized {
    /// Wrap this reader so it can be read more than once.
    ///
    /// ```
    /// use std::io::{Read, Seek};
    /// use spool_io::ReadRewindExt;
    ///
    /// let mut body = (&b"a=1&b=2"[..]).rewindable(1024);
    /// let mut once = String::new();
    /// body.read_to_string(&mut once).unwrap();
    /// body.rewind().unwrap();
    /// let mut twice = String::new();
    /// body.read_to_string(&mut twice).unwrap();
    /// assert_eq!(once, twice);
    /// ```
    fn rewindable(self, memory_threshold: usize) -> BufferingReadStream<Self> {
        BufferingReadStream::new(self, memory_threshold)
    }
}

impl<R: Read> ReadRewindExt for R {}

#[cfg(feature = "tokio")]
pub use self::nonblocking::AsyncReadRewindExt;

#[cfg(feature = "tokio")]
mod nonblocking {
    use tokio::io::AsyncRead;

    use crate::async_stream::AsyncBufferingReadStream;

    pub trait AsyncReadRewindExt: AsyncRead + Unpin + Sized {
        fn rewindable_async(self, memory_threshold: usize) -> AsyncBufferingReadStream<Self> {
            AsyncBufferingReadStream::new(self, memory_threshold)
        }
    }

    impl<R: AsyncRead + Unpin> AsyncReadRewindExt for R {}
}
