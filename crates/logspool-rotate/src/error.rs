use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures of the active-file writer
#[derive(Debug, Error)]
pub enum RotateError {
    #[error("write failed: {0}")]
    Io(#[from] io::Error),

    #[error("failed to rename {from} to {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// What a retention sweep was doing when a file failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionAction {
    Inspect,
    Compress,
    Delete,
}

impl fmt::Display for RetentionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inspect => write!(f, "inspect"),
            Self::Compress => write!(f, "compress"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Failures of a retention sweep
#[derive(Debug, Error)]
pub enum RetentionError {
    #[error("failed to list {dir}: {source}")]
    ReadDir {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to {action} {path}: {source}")]
    File {
        path: PathBuf,
        action: RetentionAction,
        #[source]
        source: io::Error,
    },
}
