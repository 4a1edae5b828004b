//! Construction of spooling streams.

use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use spool_core::config::SpoolConfig;
use spool_core::pool::BytePool;
use spool_mem::MemoryRegion;

use crate::error::{Result, StreamError};
use crate::state::SpoolState;
use crate::stream::BufferingReadStream;
use crate::tempdir::{TempDir, TempDirProvider};

/// Everything a binding needs besides the inner source.
#[derive(Debug)]
pub(crate) struct Parts {
    pub(crate) state: SpoolState,
    pub(crate) region: MemoryRegion,
    pub(crate) temp_dir: TempDir,
    pub(crate) file_prefix: String,
}

impl Parts {
    pub(crate) fn new(
        config: &SpoolConfig,
        provider: TempDirProvider,
        pool: Arc<dyn BytePool>,
    ) -> Self {
        Self {
            state: SpoolState::new(config.memory_threshold),
            region: MemoryRegion::for_threshold(
                pool,
                config.memory_threshold,
                config.max_rented_buffer_size,
            ),
            temp_dir: TempDir::new(provider),
            file_prefix: config.file_prefix.clone(),
        }
    }
}

/// Builder for `BufferingReadStream` (and, with the `tokio` feature,
/// `AsyncBufferingReadStream`).
///
/// ```no_run
/// use std::io::{Read, Seek, SeekFrom};
/// use spool_io::BufferingReadStream;
///
/// let body: &[u8] = b"name=value";
/// let mut stream = BufferingReadStream::builder(body)
///     .memory_threshold(64 * 1024)
///     .temp_dir("/var/tmp")
///     .build()?;
/// let mut first = String::new();
/// stream.read_to_string(&mut first)?;
/// stream.seek(SeekFrom::Start(0))?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct SpoolBuilder<R> {
    inner: R,
    config: SpoolConfig,
    provider: Option<TempDirProvider>,
    pool: Option<Arc<dyn BytePool>>,
}

impl<R> SpoolBuilder<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            config: SpoolConfig::default(),
            provider: None,
            pool: None,
        }
    }

    /// Replace the whole configuration. A `temp_dir` in the config is used
    /// unless `temp_dir`/`temp_dir_with` is called afterwards.
    pub fn config(mut self, config: &SpoolConfig) -> Self {
        self.config = config.clone();
        self
    }

    pub fn memory_threshold(mut self, bytes: usize) -> Self {
        self.config.memory_threshold = bytes;
        self
    }

    pub fn file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.file_prefix = prefix.into();
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.provider = Some(TempDirProvider::Fixed(dir.into()));
        self
    }

    /// Resolve the spill directory with `f`, called at most once and only if
    /// the stream actually spills.
    pub fn temp_dir_with<F>(mut self, f: F) -> Self
    where
        F: FnOnce() -> io::Result<PathBuf> + Send + 'static,
    {
        self.provider = Some(TempDirProvider::deferred(f));
        self
    }

    pub fn pool(mut self, pool: Arc<dyn BytePool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub(crate) fn into_parts(self) -> Result<(R, Parts)> {
        self.config.validate()?;
        let provider = match self.provider {
            Some(TempDirProvider::Fixed(dir)) if dir.as_os_str().is_empty() => {
                return Err(StreamError::InvalidArgument(
                    "temp directory must not be empty".into(),
                ));
            }
            Some(provider) => provider,
            None => match &self.config.temp_dir {
                Some(dir) => TempDirProvider::Fixed(dir.clone()),
                None => TempDirProvider::System,
            },
        };
        let pool = self.pool.unwrap_or_else(spool_mem::shared);
        let parts = Parts::new(&self.config, provider, pool);
        Ok((self.inner, parts))
    }
}

impl<R: Read> SpoolBuilder<R> {
    pub fn build(self) -> Result<BufferingReadStream<R>> {
        let (inner, parts) = self.into_parts()?;
        Ok(BufferingReadStream::from_parts(inner, parts))
    }
}

#[cfg(feature = "tokio")]
impl<R: tokio::io::AsyncRead + Unpin> SpoolBuilder<R> {
    pub fn build_async(self) -> Result<crate::async_stream::AsyncBufferingReadStream<R>> {
        let (inner, parts) = self.into_parts()?;
        Ok(crate::async_stream::AsyncBufferingReadStream::from_parts(
            inner, parts,
        ))
    }
}
