//! Shared types for logspool
//!
//! This crate contains the event model and the settings consumed by the
//! logspool crates.

pub mod config;

pub use config::{
    BufferSettings, ConfigError, EncoderKind, LogSettings, MAX_BUFFER_CAPACITY, RetentionSettings,
    RotationPeriod, RotationSettings, SamplerKind, SamplingSettings,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Severity
// ============================================================================

/// Log severity, totally ordered from `Debug` to `Fatal`
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Severity {
    Debug = 0,
    #[default]
    Info = 1,
    #[serde(alias = "warning")]
    Warn = 2,
    Error = 3,
    Fatal = 4,
}

impl Severity {
    /// All severities in ascending order
    pub const ALL: [Severity; 5] = [
        Severity::Debug,
        Severity::Info,
        Severity::Warn,
        Severity::Error,
        Severity::Fatal,
    ];

    /// Upper-case display name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
        }
    }

    /// Numeric rank, usable in atomics
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Inverse of [`Severity::as_u8`]; out-of-range values clamp to `Fatal`
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Debug,
            1 => Self::Info,
            2 => Self::Warn,
            3 => Self::Error,
            _ => Self::Fatal,
        }
    }
}

impl FromStr for Severity {
    type Err = ConfigError;

    /// Parse a severity from common spellings
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "debug" | "dbg" | "trace" => Ok(Self::Debug),
            "info" | "inf" | "information" => Ok(Self::Info),
            "warn" | "warning" | "wrn" => Ok(Self::Warn),
            "error" | "err" => Ok(Self::Error),
            "fatal" | "panic" | "critical" | "crit" => Ok(Self::Fatal),
            _ => Err(ConfigError::UnknownSeverity(s.to_string())),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Event Types
// ============================================================================

/// A single structured attribute
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub key: String,
    pub value: serde_json::Value,
}

impl Field {
    pub fn new(key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Insertion-ordered attribute map
///
/// Re-inserting an existing key replaces the value in place, so the first
/// insertion decides the position.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Attributes {
    fields: Vec<Field>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|f| f.key == key) {
            Some(existing) => existing.value = value,
            None => self.fields.push(Field { key, value }),
        }
    }

    /// Insert only when the key is not present yet
    pub fn insert_if_absent(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        let key = key.into();
        if !self.contains_key(&key) {
            self.fields.push(Field {
                key,
                value: value.into(),
            });
        }
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.fields.iter().find(|f| f.key == key).map(|f| &f.value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.iter().any(|f| f.key == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<Field> for Attributes {
    fn from_iter<I: IntoIterator<Item = Field>>(iter: I) -> Self {
        let mut attrs = Attributes::new();
        for field in iter {
            attrs.insert(field.key, field.value);
        }
        attrs
    }
}

/// A log event as it travels from the caller to the writer
#[derive(Clone, Debug)]
pub struct LogEvent {
    pub severity: Severity,
    pub message: String,
    pub attributes: Attributes,
    pub timestamp: DateTime<Utc>,
}

impl LogEvent {
    /// Create an event stamped with the current time
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            attributes: Attributes::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(key, value);
        self
    }

    pub fn with_fields(mut self, fields: impl IntoIterator<Item = Field>) -> Self {
        for field in fields {
            self.attributes.insert(field.key, field.value);
        }
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

// ============================================================================
// Context Types
// ============================================================================

/// Request-scoped values a caller carries alongside a log call
#[derive(Clone, Debug, Default)]
pub struct LogContext {
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    pub values: HashMap<String, String>,
}

impl LogContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trace(mut self, trace_id: impl Into<String>, span_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self.span_id = Some(span_id.into());
        self
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}
