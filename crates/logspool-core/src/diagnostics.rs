use std::fmt;
use std::path::PathBuf;

use tokio::sync::mpsc;
use tracing::{error, warn};

use logspool_types::Severity;

/// Something the logger could not do, reported out of band
#[derive(Clone, Debug, PartialEq)]
pub enum Diagnostic {
    /// Queue full; this many events were discarded since the last report
    Dropped { count: u64 },

    /// A batch could not be written and was discarded
    WriteFailed { events: usize, error: String },

    /// A queue-full event could not be written synchronously
    DirectWriteFailed { severity: Severity, error: String },

    /// One event could not be rendered and was skipped
    EncodeFailed { error: String },

    /// Flushing the sink failed
    FlushFailed { error: String },

    /// Rotating the active file failed
    RotateFailed { error: String },

    /// A retention sweep could not handle a file, or could not run at all
    RetentionFailed { path: Option<PathBuf>, error: String },

    /// Closing the sink failed during shutdown
    CloseFailed { error: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dropped { count } => write!(f, "dropped {} events: queue full", count),
            Self::WriteFailed { events, error } => {
                write!(f, "dropped batch of {} events: {}", events, error)
            }
            Self::DirectWriteFailed { severity, error } => {
                write!(f, "direct write of {} event failed: {}", severity, error)
            }
            Self::EncodeFailed { error } => write!(f, "skipped event: {}", error),
            Self::FlushFailed { error } => write!(f, "flush failed: {}", error),
            Self::RotateFailed { error } => write!(f, "rotation failed: {}", error),
            Self::RetentionFailed {
                path: Some(path),
                error,
            } => write!(f, "retention failed for {}: {}", path.display(), error),
            Self::RetentionFailed { path: None, error } => {
                write!(f, "retention sweep failed: {}", error)
            }
            Self::CloseFailed { error } => write!(f, "close failed: {}", error),
        }
    }
}

/// Fans diagnostics out to `tracing` and an optional channel
#[derive(Clone, Debug, Default)]
pub struct Reporter {
    sender: Option<mpsc::UnboundedSender<Diagnostic>>,
}

impl Reporter {
    pub fn new(sender: Option<mpsc::UnboundedSender<Diagnostic>>) -> Self {
        Self { sender }
    }

    pub fn report(&self, diagnostic: Diagnostic) {
        match &diagnostic {
            Diagnostic::Dropped { .. } | Diagnostic::EncodeFailed { .. } => {
                warn!(target: "logspool", "{}", diagnostic)
            }
            _ => error!(target: "logspool", "{}", diagnostic),
        }
        if let Some(sender) = &self.sender {
            // Receiver gone means nobody is listening any more
            let _ = sender.send(diagnostic);
        }
    }
}
