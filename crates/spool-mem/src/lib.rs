#![forbid(unsafe_code)]
//! spool-mem: shared byte pool, exactly-once rentals and the in-memory tier.
//!
//! This crate provides concrete implementations for the `BytePool` interface
//! defined in `spool-core::pool`. Every array borrowed from a pool should be
//! held through a `PooledArray` so that it goes back exactly once, even when a
//! stream is dropped halfway through a promotion.
//!
//! No file IO lives here; spilling to disk is `spool-io`'s job.

pub mod error;
pub mod guard;
pub mod pool;
pub mod region;
pub mod tracking;

pub use guard::PooledArray;
pub use pool::{shared, SharedBytePool};
pub use region::MemoryRegion;
pub use tracking::{PeakTracker, TrackingPool};
