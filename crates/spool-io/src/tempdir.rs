//! Lazy resolution of the directory that hosts spill files.
//!
//! A stream that never crosses its memory threshold never asks for a
//! directory, so the provider runs at most once and only on the first spill.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use once_cell::unsync::OnceCell;

/// Environment variable consulted by `TempDirProvider::System`.
pub const TEMP_DIR_ENV: &str = "SPOOL_TEMP_DIR";

type DirFn = Box<dyn FnOnce() -> io::Result<PathBuf> + Send>;

pub enum TempDirProvider {
    /// `$SPOOL_TEMP_DIR` if set and non-empty, otherwise `std::env::temp_dir()`.
    System,
    Fixed(PathBuf),
    Deferred(DirFn),
}

impl TempDirProvider {
    pub fn deferred<F>(f: F) -> Self
    where
        F: FnOnce() -> io::Result<PathBuf> + Send + 'static,
    {
        TempDirProvider::Deferred(Box::new(f))
    }

    fn resolve(self) -> io::Result<PathBuf> {
        let dir = match self {
            TempDirProvider::System => match std::env::var_os(TEMP_DIR_ENV) {
                Some(dir) if !dir.is_empty() => PathBuf::from(dir),
                _ => std::env::temp_dir(),
            },
            TempDirProvider::Fixed(dir) => dir,
            TempDirProvider::Deferred(f) => f()?,
        };
        if dir.as_os_str().is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "temp directory provider returned an empty path",
            ));
        }
        Ok(dir)
    }
}

impl fmt::Debug for TempDirProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TempDirProvider::System => f.write_str("System"),
            TempDirProvider::Fixed(dir) => f.debug_tuple("Fixed").field(dir).finish(),
            TempDirProvider::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// Memoized provider: resolved on first use, then cached.
#[derive(Debug)]
pub(crate) struct TempDir {
    provider: Option<TempDirProvider>,
    resolved: OnceCell<PathBuf>,
}

impl TempDir {
    pub(crate) fn new(provider: TempDirProvider) -> Self {
        Self {
            provider: Some(provider),
            resolved: OnceCell::new(),
        }
    }

    pub(crate) fn resolve(&mut self) -> io::Result<&Path> {
        let provider = &mut self.provider;
        let dir = self.resolved.get_or_try_init(|| match provider.take() {
            Some(p) => p.resolve(),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                "temp directory provider already failed",
            )),
        })?;
        Ok(dir.as_path())
    }

    #[cfg(test)]
    pub(crate) fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }
}
