//! Convenient re-exports for downstream crates.

pub use crate::config::{SpoolConfig, DEFAULT_MEMORY_THRESHOLD, MAX_RENTED_BUFFER_SIZE};
pub use crate::error::{Error, Result};
pub use crate::pool::BytePool;
