use thiserror::Error;

/// Result type local to spool-mem.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("memory region capacity exceeded: requested {requested} bytes, capacity {capacity}, used {used}")]
    CapacityExceeded {
        requested: usize,
        capacity: usize,
        used: usize,
    },

    #[error("memory region already released to its pool")]
    Released,
}
