//! Logging pipeline for logspool
//!
//! This crate provides severity filtering, sampling, record encoding,
//! context extraction, and the batch buffer that feeds a [`LogSink`].

mod buffer;
mod context;
mod diagnostics;
mod encoder;
mod error;
mod filter;
mod logger;
mod policy;
mod sampler;

pub use buffer::{BatchBuffer, BufferStats, Enqueued, QUEUE_BATCHES};
pub use context::{ContextExtractor, DEFAULT_CONTEXT_KEYS, DefaultContextExtractor};
pub use diagnostics::{Diagnostic, Reporter};
pub use encoder::{EncodeError, Encoder, JsonEncoder, TextEncoder, encoder_for};
pub use error::LogError;
pub use filter::SeverityFilter;
pub use logger::{Logger, LoggerBuilder};
pub use policy::{Policy, PolicyCell};
pub use sampler::{JitterSampler, RateSampler, Sampler};

// Re-export types used in our public API
pub use logspool_rotate::{LogSink, MemorySink, RotatingWriter};
pub use logspool_types::{
    Attributes, Field, LogContext, LogEvent, LogSettings, SamplingSettings, Severity,
};
