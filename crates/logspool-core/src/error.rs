use thiserror::Error;

use logspool_rotate::RotateError;
use logspool_types::ConfigError;

/// Errors returned by [`crate::Logger`] construction and reconfiguration
#[derive(Debug, Error)]
pub enum LogError {
    #[error("invalid settings: {0}")]
    Config(#[from] ConfigError),

    #[error("log sink: {0}")]
    Sink(#[from] RotateError),
}
