//! File output for logspool
//!
//! This crate provides the sink abstraction, the rotating active-file writer,
//! segment naming, gzip compression, and the retention sweeper.

mod compress;
mod error;
pub mod naming;
mod retention;
mod sink;
mod writer;

pub use compress::gzip_in_place;
pub use error::{RetentionAction, RetentionError, RotateError};
pub use retention::{RetentionManager, SweepReport};
pub use sink::{LogSink, MemorySink};
pub use writer::{RotatingWriter, next_boundary};
