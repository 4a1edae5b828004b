//! The in-memory tier of a spooling stream.
//!
//! A region is an append-only byte buffer with random-access reads. Small
//! thresholds are backed by an exact-fit array rented from a `BytePool`; large
//! ones by a growable `Vec` that is never pooled.

use std::sync::Arc;

use spool_core::pool::BytePool;

use crate::error::{Error, Result};
use crate::guard::PooledArray;

#[derive(Debug)]
enum Backing {
    Rented(PooledArray),
    Growable(Vec<u8>),
}

#[derive(Debug)]
pub struct MemoryRegion {
    backing: Backing,
    len: usize,
    /// Hard cap for rented regions; growable regions are unbounded.
    capacity: Option<usize>,
}

impl MemoryRegion {
    /// Fixed-capacity region over an array rented from `pool`.
    pub fn rented(pool: Arc<dyn BytePool>, capacity: usize) -> Self {
        Self {
            backing: Backing::Rented(PooledArray::rent(pool, capacity)),
            len: 0,
            capacity: Some(capacity),
        }
    }

    /// Unpooled region that grows on demand.
    pub fn growable() -> Self {
        Self {
            backing: Backing::Growable(Vec::new()),
            len: 0,
            capacity: None,
        }
    }

    /// Pick the backing for a spill threshold: exact-fit rental strictly below
    /// `max_rented`, growable otherwise.
    pub fn for_threshold(pool: Arc<dyn BytePool>, threshold: usize, max_rented: usize) -> Self {
        if threshold < max_rented {
            Self::rented(pool, threshold)
        } else {
            Self::growable()
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Whether this region currently holds an array borrowed from a pool.
    pub fn is_pooled(&self) -> bool {
        matches!(&self.backing, Backing::Rented(arr) if arr.is_held())
    }

    /// Append `bytes` at the end of the region.
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        match &mut self.backing {
            Backing::Rented(arr) => {
                if !arr.is_held() {
                    return Err(Error::Released);
                }
                let capacity = self.capacity.unwrap_or(arr.len());
                let end = self.len + bytes.len();
                if end > capacity {
                    return Err(Error::CapacityExceeded {
                        requested: bytes.len(),
                        capacity,
                        used: self.len,
                    });
                }
                arr[self.len..end].copy_from_slice(bytes);
            }
            Backing::Growable(vec) => vec.extend_from_slice(bytes),
        }
        self.len += bytes.len();
        Ok(())
    }

    /// Copy bytes starting at `pos` into `out`; returns how many were copied.
    pub fn read_at(&self, pos: u64, out: &mut [u8]) -> usize {
        let data = self.as_slice();
        let Ok(start) = usize::try_from(pos) else {
            return 0;
        };
        if start >= data.len() {
            return 0;
        }
        let n = out.len().min(data.len() - start);
        out[..n].copy_from_slice(&data[start..start + n]);
        n
    }

    /// The bytes appended so far.
    pub fn as_slice(&self) -> &[u8] {
        match &self.backing {
            Backing::Rented(arr) => arr.get(..self.len).unwrap_or(&[]),
            Backing::Growable(vec) => &vec[..self.len],
        }
    }

    /// Give a rented array back to its pool and forget the contents.
    /// Returns `true` if an array was returned by this call.
    pub fn release(&mut self) -> bool {
        self.len = 0;
        match &mut self.backing {
            Backing::Rented(arr) => arr.release(),
            Backing::Growable(vec) => {
                *vec = Vec::new();
                false
            }
        }
    }
}
