//! RAII rental of a pooled byte array.
//!
//! A `PooledArray` owns one array borrowed from a `BytePool`. The array goes
//! back to the pool exactly once: either through an explicit `release` or when
//! the rental is dropped (panic-safe). The owned-or-not state is the
//! `Option` itself, so a second release is a no-op.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use spool_core::pool::BytePool;

pub struct PooledArray {
    pool: Arc<dyn BytePool>,
    buf: Option<Vec<u8>>,
}

impl PooledArray {
    /// Rent an array of at least `min_len` bytes from `pool`.
    pub fn rent(pool: Arc<dyn BytePool>, min_len: usize) -> Self {
        let buf = pool.rent(min_len);
        debug_assert!(buf.len() >= min_len, "pool returned a short array");
        Self {
            pool,
            buf: Some(buf),
        }
    }

    /// Whether the array is still owned by this rental.
    pub fn is_held(&self) -> bool {
        self.buf.is_some()
    }

    /// Length of the rented array (0 once released).
    pub fn len(&self) -> usize {
        self.buf.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hand the array back to its pool. Returns `true` if this call did the
    /// return, `false` if it had already happened.
    pub fn release(&mut self) -> bool {
        match self.buf.take() {
            Some(buf) => {
                self.pool.give_back(buf);
                #[cfg(feature = "tracing")]
                tracing::trace!(pool = self.pool.name(), "pooled array returned");
                true
            }
            None => false,
        }
    }
}

impl Drop for PooledArray {
    fn drop(&mut self) {
        self.release();
    }
}

impl Deref for PooledArray {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        self.buf.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for PooledArray {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.buf.as_deref_mut().unwrap_or(&mut [])
    }
}

impl fmt::Debug for PooledArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledArray")
            .field("pool", &self.pool.name())
            .field("len", &self.len())
            .field("held", &self.is_held())
            .finish()
    }
}
