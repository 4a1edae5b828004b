//! Abstract byte-pool interface.
//!
//! The concrete implementations live in `spool-mem`. We keep only the trait
//! here so any crate can accept a pluggable pool without pulling the pooling
//! logic itself.

/// A shared source of reusable byte arrays.
///
/// `rent` hands out an array of *at least* `min_len` bytes; the caller owns it
/// until it calls `give_back`. An array must be given back at most once, which
/// the ownership transfer of `Vec<u8>` guarantees. Forgetting to give it back
/// is not unsound, it only defeats reuse, so callers should hold rentals through
/// `spool_mem::PooledArray` which returns on drop.
pub trait BytePool: Send + Sync + 'static {
    /// Rent an array whose length is at least `min_len`.
    fn rent(&self, min_len: usize) -> Vec<u8>;

    /// Return a previously rented array.
    fn give_back(&self, buf: Vec<u8>);

    /// Optional debug name for metrics/tracing.
    fn name(&self) -> &'static str {
        "pool"
    }
}

// NOTE: Do *not* add a blanket impl for `Arc<P>` here; streams take
// `Arc<dyn BytePool>` and a blanket impl would make the trait object ambiguous.
