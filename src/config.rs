//! Settings loading for the logspool binary
//!
//! Defaults, then an optional TOML file, then `LOGSPOOL_*` environment
//! variables, then validation.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};

use logspool_types::{EncoderKind, LogSettings, Severity};

pub const ENV_LEVEL: &str = "LOGSPOOL_LEVEL";
pub const ENV_ENCODER: &str = "LOGSPOOL_ENCODER";
pub const ENV_BUFFER_CAPACITY: &str = "LOGSPOOL_BUFFER_CAPACITY";
pub const ENV_FLUSH_INTERVAL_MS: &str = "LOGSPOOL_FLUSH_INTERVAL_MS";
pub const ENV_FILE: &str = "LOGSPOOL_FILE";

/// Load settings from `path` (if any) and the process environment
pub fn load(path: Option<&Path>) -> Result<LogSettings> {
    let settings = match path {
        Some(path) => from_file(path)?,
        None => LogSettings::default(),
    };
    let settings = apply_env(settings, |key| std::env::var(key).ok())?;
    settings.validate().context("invalid settings")?;
    Ok(settings)
}

fn from_file(path: &Path) -> Result<LogSettings> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

/// Apply `LOGSPOOL_*` overrides found through `lookup`
pub fn apply_env<F>(mut settings: LogSettings, lookup: F) -> Result<LogSettings>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(level) = lookup(ENV_LEVEL) {
        settings.level = level
            .parse::<Severity>()
            .with_context(|| format!("{} is invalid", ENV_LEVEL))?;
    }
    if let Some(encoder) = lookup(ENV_ENCODER) {
        settings.encoder = encoder
            .parse::<EncoderKind>()
            .with_context(|| format!("{} is invalid", ENV_ENCODER))?;
    }
    if let Some(capacity) = lookup(ENV_BUFFER_CAPACITY) {
        settings.buffer.capacity = capacity
            .trim()
            .parse()
            .with_context(|| format!("{} must be a positive integer", ENV_BUFFER_CAPACITY))?;
    }
    if let Some(interval) = lookup(ENV_FLUSH_INTERVAL_MS) {
        let millis: u64 = interval
            .trim()
            .parse()
            .with_context(|| format!("{} must be milliseconds", ENV_FLUSH_INTERVAL_MS))?;
        settings.buffer.flush_interval = Duration::from_millis(millis);
    }
    if let Some(file) = lookup(ENV_FILE).filter(|f| !f.trim().is_empty()) {
        settings.rotation.path = file.into();
    }
    Ok(settings)
}
