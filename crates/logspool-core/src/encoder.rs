use std::io::Write;
use std::sync::Arc;

use chrono::SecondsFormat;
use serde_json::Value;
use thiserror::Error;

use logspool_types::{EncoderKind, LogEvent};

/// Keys written by the JSON encoder itself
const RESERVED_KEYS: [&str; 3] = ["time", "level", "msg"];

/// A single event could not be rendered
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("failed to serialize event: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to write event: {0}")]
    Io(#[from] std::io::Error),
}

/// Renders one event as one newline-terminated record
pub trait Encoder: Send + Sync {
    /// Append the record for `event` to `out`
    ///
    /// On error `out` may hold a partial record; callers truncate it.
    fn render(&self, event: &LogEvent, out: &mut Vec<u8>) -> Result<(), EncodeError>;
}

/// Built-in encoder for `kind`
pub fn encoder_for(kind: EncoderKind) -> Arc<dyn Encoder> {
    match kind {
        EncoderKind::Text => Arc::new(TextEncoder),
        EncoderKind::Json => Arc::new(JsonEncoder),
    }
}

/// `2026-10-16T10:15:00.123Z INFO message key=value`
#[derive(Debug, Default, Clone, Copy)]
pub struct TextEncoder;

impl Encoder for TextEncoder {
    fn render(&self, event: &LogEvent, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        write!(
            out,
            "{} {} {}",
            event.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            event.severity.as_str(),
            event.message
        )?;
        for field in event.attributes.iter() {
            write!(out, " {}=", field.key)?;
            match &field.value {
                Value::String(s) if !needs_quoting(s) => out.extend_from_slice(s.as_bytes()),
                other => serde_json::to_writer(&mut *out, other)?,
            }
        }
        out.push(b'\n');
        Ok(())
    }
}

fn needs_quoting(s: &str) -> bool {
    s.is_empty() || s.chars().any(|c| c.is_whitespace() || c == '"' || c == '=')
}

/// One JSON object per line: `time`, `level`, `msg`, then attributes in order
///
/// Attributes that collide with the envelope keys are written as
/// `fields.<key>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonEncoder;

impl Encoder for JsonEncoder {
    fn render(&self, event: &LogEvent, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        out.extend_from_slice(b"{\"time\":");
        serde_json::to_writer(
            &mut *out,
            &event.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        )?;
        out.extend_from_slice(b",\"level\":");
        serde_json::to_writer(&mut *out, event.severity.as_str())?;
        out.extend_from_slice(b",\"msg\":");
        serde_json::to_writer(&mut *out, &event.message)?;

        for field in event.attributes.iter() {
            out.push(b',');
            if RESERVED_KEYS.contains(&field.key.as_str()) {
                serde_json::to_writer(&mut *out, &format!("fields.{}", field.key))?;
            } else {
                serde_json::to_writer(&mut *out, &field.key)?;
            }
            out.push(b':');
            serde_json::to_writer(&mut *out, &field.value)?;
        }
        out.extend_from_slice(b"}\n");
        Ok(())
    }
}
