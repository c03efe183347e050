//! Configuration types consumed by the logspool core
//!
//! Loading these from files or the environment is the caller's job; this
//! module only defines the shape, the defaults, and validation.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Severity;

/// Largest accepted `buffer.capacity`
pub const MAX_BUFFER_CAPACITY: usize = 1 << 20;

/// Rejected settings
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("sampling rate must be within [0, 1], got {0}")]
    InvalidSamplingRate(f64),

    #[error("buffer capacity must be greater than 0")]
    ZeroBufferCapacity,

    #[error("buffer capacity {0} exceeds the maximum of {max}", max = MAX_BUFFER_CAPACITY)]
    BufferCapacityTooLarge(usize),

    #[error("flush interval must be greater than 0")]
    ZeroFlushInterval,

    #[error("rotation path must not be empty")]
    EmptyRotationPath,

    #[error("rotation max size must be greater than 0 when set")]
    ZeroRotationSize,

    #[error("rotation max age must be greater than 0 when set")]
    ZeroRotationAge,

    #[error("retention sweep interval must be greater than 0")]
    ZeroSweepInterval,

    #[error("unknown severity: {0}")]
    UnknownSeverity(String),

    #[error("unknown encoder: {0}")]
    UnknownEncoder(String),

    #[error("unknown sampler: {0}")]
    UnknownSampler(String),

    #[error("{0} settings cannot change on a running logger")]
    RequiresRestart(&'static str),
}

/// Main logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LogSettings {
    /// Minimum severity that is forwarded
    pub level: Severity,

    /// Record encoding
    pub encoder: EncoderKind,

    /// Batching behaviour
    pub buffer: BufferSettings,

    /// Sampling policy
    pub sampling: SamplingSettings,

    /// Active file and rotation triggers
    pub rotation: RotationSettings,

    /// Rotated file lifecycle
    pub retention: RetentionSettings,
}

impl LogSettings {
    /// Verbose text output flushed quickly, for local runs
    pub fn development() -> Self {
        Self {
            level: Severity::Debug,
            encoder: EncoderKind::Text,
            buffer: BufferSettings {
                capacity: 256,
                flush_interval: Duration::from_millis(200),
            },
            ..Default::default()
        }
    }

    /// JSON output under `log_dir` with hourly rotation and two weeks of history
    pub fn production(log_dir: impl AsRef<Path>) -> Self {
        Self {
            level: Severity::Info,
            encoder: EncoderKind::Json,
            rotation: RotationSettings {
                path: log_dir.as_ref().join("app.log"),
                period: Some(RotationPeriod::Hourly),
                ..Default::default()
            },
            retention: RetentionSettings {
                max_backups: Some(24 * 14),
                max_age: Some(Duration::from_secs(14 * 24 * 60 * 60)),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Set the minimum severity
    pub fn with_level(mut self, level: Severity) -> Self {
        self.level = level;
        self
    }

    /// Set the encoder
    pub fn with_encoder(mut self, encoder: EncoderKind) -> Self {
        self.encoder = encoder;
        self
    }

    /// Set the active file path
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.rotation.path = path.into();
        self
    }

    /// Set buffer capacity and flush interval
    pub fn with_buffer(mut self, capacity: usize, flush_interval: Duration) -> Self {
        self.buffer = BufferSettings {
            capacity,
            flush_interval,
        };
        self
    }

    /// Set the sampling policy
    pub fn with_sampling(mut self, sampling: SamplingSettings) -> Self {
        self.sampling = sampling;
        self
    }

    /// Check every section; nothing is applied when this fails
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.buffer.validate()?;
        self.sampling.validate()?;
        self.rotation.validate()?;
        self.retention.validate()
    }

    /// Reject changes to settings that are fixed once a logger runs
    pub fn ensure_same_structure(&self, other: &LogSettings) -> Result<(), ConfigError> {
        if self.buffer != other.buffer {
            return Err(ConfigError::RequiresRestart("buffer"));
        }
        if self.rotation != other.rotation {
            return Err(ConfigError::RequiresRestart("rotation"));
        }
        if self.retention != other.retention {
            return Err(ConfigError::RequiresRestart("retention"));
        }
        Ok(())
    }
}

/// Record encoding selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EncoderKind {
    /// `time LEVEL message key=value`
    Text,
    /// One JSON object per line
    #[default]
    Json,
}

impl FromStr for EncoderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" | "jsonl" => Ok(Self::Json),
            _ => Err(ConfigError::UnknownEncoder(s.to_string())),
        }
    }
}

/// Batch buffer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferSettings {
    /// Events per batch; the queue holds a few batches
    pub capacity: usize,

    /// Partial batches are written at least this often
    #[serde(rename = "flush_interval_ms", with = "millis")]
    pub flush_interval: Duration,
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self {
            capacity: 1000,
            flush_interval: Duration::from_secs(5),
        }
    }
}

impl BufferSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroBufferCapacity);
        }
        if self.capacity > MAX_BUFFER_CAPACITY {
            return Err(ConfigError::BufferCapacityTooLarge(self.capacity));
        }
        if self.flush_interval.is_zero() {
            return Err(ConfigError::ZeroFlushInterval);
        }
        Ok(())
    }
}

/// Sampler selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SamplerKind {
    /// Uniform random acceptance at `rate`
    #[default]
    Rate,
    /// Rate check plus a minimum spacing between accepted samples
    Jitter,
}

impl FromStr for SamplerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rate" => Ok(Self::Rate),
            "jitter" => Ok(Self::Jitter),
            _ => Err(ConfigError::UnknownSampler(s.to_string())),
        }
    }
}

/// Sampling configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingSettings {
    pub kind: SamplerKind,

    /// Acceptance probability (1.0 = keep everything)
    pub rate: f64,

    /// Minimum spacing between accepted samples (jitter sampler only)
    #[serde(rename = "jitter_ms", with = "millis")]
    pub jitter: Duration,

    /// Events at or above this severity are never sampled away
    pub never_sample_from: Severity,
}

impl Default for SamplingSettings {
    fn default() -> Self {
        Self {
            kind: SamplerKind::Rate,
            rate: 1.0,
            jitter: Duration::ZERO,
            never_sample_from: Severity::Error,
        }
    }
}

impl SamplingSettings {
    /// Rate sampling
    pub fn rate(rate: f64) -> Self {
        Self {
            rate,
            ..Default::default()
        }
    }

    /// Rate sampling with a minimum spacing
    pub fn jitter(rate: f64, jitter: Duration) -> Self {
        Self {
            kind: SamplerKind::Jitter,
            rate,
            jitter,
            ..Default::default()
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        validate_rate(self.rate)
    }
}

/// Fails for NaN and anything outside [0, 1]
pub fn validate_rate(rate: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&rate) {
        Ok(())
    } else {
        Err(ConfigError::InvalidSamplingRate(rate))
    }
}

/// Wall-clock rotation boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationPeriod {
    Hourly,
    Daily,
}

/// Active file and rotation triggers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationSettings {
    /// Canonical path of the active file
    pub path: PathBuf,

    /// Rotate once this many bytes were written to the active file; 0 in a
    /// settings file turns the limit off
    #[serde(with = "zero_is_none")]
    pub max_size: Option<u64>,

    /// Rotate once the active file has been open this long
    #[serde(rename = "max_age_secs", with = "opt_secs")]
    pub max_age: Option<Duration>,

    /// Rotate when crossing an hour or day boundary (UTC)
    pub period: Option<RotationPeriod>,
}

impl Default for RotationSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./logs/app.log"),
            max_size: Some(100 * 1024 * 1024),
            max_age: None,
            period: None,
        }
    }
}

impl RotationSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.path.as_os_str().is_empty() || self.path.file_name().is_none() {
            return Err(ConfigError::EmptyRotationPath);
        }
        if self.max_size == Some(0) {
            return Err(ConfigError::ZeroRotationSize);
        }
        if self.max_age.is_some_and(|age| age.is_zero()) {
            return Err(ConfigError::ZeroRotationAge);
        }
        Ok(())
    }
}

/// Rotated file lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionSettings {
    /// Keep at most this many rotated files; 0 in a settings file keeps all
    #[serde(with = "zero_is_none")]
    pub max_backups: Option<usize>,

    /// Delete rotated files older than this; 0 in a settings file keeps all
    #[serde(rename = "max_age_secs", with = "opt_secs")]
    pub max_age: Option<Duration>,

    /// The most recent N rotated files stay uncompressed
    pub uncompressed: usize,

    /// Period of the background sweep
    #[serde(rename = "sweep_interval_secs", with = "secs")]
    pub sweep_interval: Duration,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            max_backups: Some(7),
            max_age: Some(Duration::from_secs(7 * 24 * 60 * 60)),
            uncompressed: 2,
            sweep_interval: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl RetentionSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::ZeroSweepInterval);
        }
        Ok(())
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// `None` is written and read as 0
mod opt_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.map_or(0, |d| d.as_secs()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.filter(|s| *s > 0).map(Duration::from_secs))
    }
}

/// `None` is written and read as zero
mod zero_is_none {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize + Default,
        S: Serializer,
    {
        match value {
            Some(v) => v.serialize(serializer),
            None => T::default().serialize(serializer),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        T: Deserialize<'de> + Default + PartialEq,
        D: Deserializer<'de>,
    {
        let value = Option::<T>::deserialize(deserializer)?;
        Ok(value.filter(|v| *v != T::default()))
    }
}
