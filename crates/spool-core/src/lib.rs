#![forbid(unsafe_code)]
//! spool-core: interfaces and shared vocabulary for spoolstream.
//!
//! Only traits, configuration and error types live here. The pool
//! implementations are in `spool-mem`; the streams are in `spool-io`.

pub mod config;
pub mod error;
pub mod pool;
pub mod prelude;

pub use config::SpoolConfig;
pub use error::{Error, Result};
pub use pool::BytePool;
