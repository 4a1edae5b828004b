//! Temporary spill files backing the disk tier.
//!
//! Files are created with `create_new` semantics under the resolved temp
//! directory and named `<prefix><random>.tmp`. Each file is owned by a
//! `TempPath`, which deletes it when closed or dropped, so a spill file never
//! outlives its stream, including when a promotion fails halfway through the
//! copy.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use tempfile::TempPath;

/// Create a fresh, uniquely named spill file in `dir`.
pub(crate) fn create(dir: &Path, prefix: &str) -> io::Result<(File, TempPath)> {
    let named = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(".tmp")
        .tempfile_in(dir)?;
    #[cfg(feature = "tracing")]
    tracing::debug!(path = %named.path().display(), "created spill file");
    Ok(named.into_parts())
}

/// Blocking spill file. Tracks its own cursor so that repeated reads at the
/// replay position do not issue a seek each time.
#[derive(Debug)]
pub(crate) struct SpillFile {
    file: File,
    path: TempPath,
    /// `None` after a failed operation left the OS cursor unknown.
    cursor: Option<u64>,
}

impl SpillFile {
    pub(crate) fn create(dir: &Path, prefix: &str) -> io::Result<Self> {
        let (file, path) = create(dir, prefix)?;
        Ok(Self {
            file,
            path,
            cursor: Some(0),
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    fn seek_to(&mut self, pos: u64) -> io::Result<()> {
        if self.cursor != Some(pos) {
            self.cursor = None;
            self.file.seek(SeekFrom::Start(pos))?;
            self.cursor = Some(pos);
        }
        Ok(())
    }

    pub(crate) fn read_at(&mut self, pos: u64, out: &mut [u8]) -> io::Result<usize> {
        self.seek_to(pos)?;
        self.cursor = None;
        let n = self.file.read(out)?;
        self.cursor = Some(pos + n as u64);
        Ok(n)
    }

    /// Write all of `bytes` at `pos`. Returns only once every byte reached the file.
    pub(crate) fn write_all_at(&mut self, pos: u64, bytes: &[u8]) -> io::Result<()> {
        self.seek_to(pos)?;
        self.cursor = None;
        self.file.write_all(bytes)?;
        self.cursor = Some(pos + bytes.len() as u64);
        Ok(())
    }

    /// Close the handle and delete the file.
    pub(crate) fn close(self) -> io::Result<()> {
        drop(self.file);
        self.path.close()
    }
}

#[cfg(feature = "tokio")]
pub(crate) use self::nonblocking::AsyncSpillFile;

#[cfg(feature = "tokio")]
mod nonblocking {
    use std::io::{self, SeekFrom};
    use std::path::Path;
    use std::pin::Pin;
    use std::task::{ready, Context, Poll};

    use tempfile::TempPath;
    use tokio::io::{AsyncRead, AsyncSeek, AsyncWrite, ReadBuf};

    /// Spill file driven through tokio's blocking-pool backed `fs::File`.
    #[derive(Debug)]
    pub(crate) struct AsyncSpillFile {
        file: tokio::fs::File,
        path: TempPath,
        cursor: Option<u64>,
        seeking: bool,
    }

    impl AsyncSpillFile {
        pub(crate) fn create(dir: &Path, prefix: &str) -> io::Result<Self> {
            let (file, path) = super::create(dir, prefix)?;
            Ok(Self {
                file: tokio::fs::File::from_std(file),
                path,
                cursor: Some(0),
                seeking: false,
            })
        }

        pub(crate) fn path(&self) -> &Path {
            &self.path
        }

        fn poll_seek_to(&mut self, cx: &mut Context<'_>, target: u64) -> Poll<io::Result<()>> {
            loop {
                if self.seeking {
                    let res = ready!(Pin::new(&mut self.file).poll_complete(cx));
                    self.seeking = false;
                    self.cursor = res.as_ref().ok().copied();
                    res?;
                }
                if self.cursor == Some(target) {
                    return Poll::Ready(Ok(()));
                }
                // Drain any in-flight write before starting a new seek.
                ready!(Pin::new(&mut self.file).poll_complete(cx))?;
                self.cursor = None;
                Pin::new(&mut self.file).start_seek(SeekFrom::Start(target))?;
                self.seeking = true;
            }
        }

        /// Read up to `len` bytes at `pos` into `out`.
        pub(crate) fn poll_read_at(
            &mut self,
            cx: &mut Context<'_>,
            pos: u64,
            out: &mut ReadBuf<'_>,
            len: usize,
        ) -> Poll<io::Result<usize>> {
            ready!(self.poll_seek_to(cx, pos))?;
            let dst = out.initialize_unfilled_to(len);
            let mut window = ReadBuf::new(dst);
            match Pin::new(&mut self.file).poll_read(cx, &mut window) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(Err(e)) => {
                    self.cursor = None;
                    Poll::Ready(Err(e))
                }
                Poll::Ready(Ok(())) => {
                    let n = window.filled().len();
                    out.advance(n);
                    self.cursor = Some(pos + n as u64);
                    Poll::Ready(Ok(n))
                }
            }
        }

        /// Write `bytes[*done..]` at `pos + *done` and flush. `done` survives
        /// `Pending`, so the caller resumes exactly where the last poll stopped.
        pub(crate) fn poll_write_all_at(
            &mut self,
            cx: &mut Context<'_>,
            pos: u64,
            bytes: &[u8],
            done: &mut usize,
        ) -> Poll<io::Result<()>> {
            ready!(self.poll_seek_to(cx, pos + *done as u64))?;
            while *done < bytes.len() {
                let n = match Pin::new(&mut self.file).poll_write(cx, &bytes[*done..]) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Err(e)) => {
                        self.cursor = None;
                        return Poll::Ready(Err(e));
                    }
                    Poll::Ready(Ok(0)) => {
                        self.cursor = None;
                        return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
                    }
                    Poll::Ready(Ok(n)) => n,
                };
                *done += n;
                self.cursor = self.cursor.map(|c| c + n as u64);
            }
            if let Err(e) = ready!(Pin::new(&mut self.file).poll_flush(cx)) {
                self.cursor = None;
                return Poll::Ready(Err(e));
            }
            Poll::Ready(Ok(()))
        }

        pub(crate) fn close(self) -> io::Result<()> {
            drop(self.file);
            self.path.close()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spill_file_lives_in_dir_with_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let spill = SpillFile::create(dir.path(), "spool_").unwrap();
        let name = spill.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("spool_"));
        assert!(name.ends_with(".tmp"));
        assert_eq!(spill.path().parent().unwrap(), dir.path());
    }

    #[test]
    fn write_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut spill = SpillFile::create(dir.path(), "spool_").unwrap();
        spill.write_all_at(0, b"0123456789").unwrap();
        spill.write_all_at(10, b"ABCDE").unwrap();
        let mut out = [0u8; 5];
        assert_eq!(spill.read_at(8, &mut out).unwrap(), 5);
        assert_eq!(&out, b"89ABC");
    }

    #[test]
    fn close_deletes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let spill = SpillFile::create(dir.path(), "spool_").unwrap();
        let path = spill.path().to_path_buf();
        assert!(path.exists());
        spill.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn missing_dir_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SpillFile::create(&dir.path().join("absent"), "spool_").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
