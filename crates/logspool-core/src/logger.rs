use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use logspool_rotate::{LogSink, RetentionError, RetentionManager, RotatingWriter};
use logspool_types::config::validate_rate;
use logspool_types::{Attributes, Field, LogContext, LogEvent, LogSettings, Severity};

use crate::buffer::{BatchBuffer, BufferStats, Enqueued};
use crate::context::{ContextExtractor, DefaultContextExtractor};
use crate::diagnostics::{Diagnostic, Reporter};
use crate::encoder::{Encoder, encoder_for};
use crate::error::LogError;
use crate::policy::{Policy, PolicyCell};

/// Background retention sweeper owned by a logger
struct RetentionTask {
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RetentionTask {
    async fn stop(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Drop for RetentionTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Inner {
    /// Shared with the buffer, which reads the encoder and direct-write floor
    policy: Arc<PolicyCell>,

    /// Settings currently in effect; also serializes policy changes
    settings: Mutex<LogSettings>,

    extractor: Arc<dyn ContextExtractor>,
    buffer: BatchBuffer,
    retention: Option<RetentionTask>,
}

/// Structured logger: filter, sample, then hand events to the batch buffer
///
/// Cloning is cheap; all clones feed the same buffer. Logging calls are
/// synchronous and never wait for the writer. [`Logger::with_fields`] and
/// [`Logger::with_context`] derive child loggers that add bound fields to
/// every event.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<Inner>,

    /// Added to every event under its explicit and context fields
    bound: Arc<Attributes>,
}

impl Logger {
    /// Builder for a logger writing to the file described by `settings`
    pub fn builder(settings: LogSettings) -> LoggerBuilder {
        LoggerBuilder::new(settings)
    }

    /// Child logger that adds `fields` to every event
    ///
    /// Fields given here replace earlier bound fields with the same key.
    /// The child shares the parent's buffer, settings and lifecycle.
    pub fn with_fields(&self, fields: impl IntoIterator<Item = Field>) -> Logger {
        let mut bound = (*self.bound).clone();
        for field in fields {
            bound.insert(field.key, field.value);
        }
        Logger {
            inner: Arc::clone(&self.inner),
            bound: Arc::new(bound),
        }
    }

    /// Child logger that adds the fields extracted from `context`
    pub fn with_context(&self, context: &LogContext) -> Logger {
        let fields = self
            .inner
            .extractor
            .extract(context)
            .into_iter()
            .map(|(key, value)| Field::new(key, value));
        self.with_fields(fields)
    }

    /// Fields this logger adds to every event
    pub fn bound_fields(&self) -> &Attributes {
        &self.bound
    }

    /// Log `message` with explicit fields
    ///
    /// Returns `None` when the event was filtered out or sampled away.
    pub fn log(
        &self,
        severity: Severity,
        message: impl Into<String>,
        fields: impl IntoIterator<Item = Field>,
    ) -> Option<Enqueued> {
        if !self.inner.policy.enabled(severity) {
            return None;
        }
        self.admit(LogEvent::new(severity, message).with_fields(fields))
    }

    /// Log with fields taken from `context` as well; explicit fields win
    pub fn log_with_context(
        &self,
        context: &LogContext,
        severity: Severity,
        message: impl Into<String>,
        fields: impl IntoIterator<Item = Field>,
    ) -> Option<Enqueued> {
        if !self.inner.policy.enabled(severity) {
            return None;
        }
        let mut event = LogEvent::new(severity, message).with_fields(fields);
        for (key, value) in self.inner.extractor.extract(context) {
            event.attributes.insert_if_absent(key, value);
        }
        self.admit(event)
    }

    /// Log a prepared event
    pub fn log_event(&self, event: LogEvent) -> Option<Enqueued> {
        if !self.inner.policy.enabled(event.severity) {
            return None;
        }
        self.admit(event)
    }

    /// Decide against one policy snapshot, then merge bound fields
    fn admit(&self, mut event: LogEvent) -> Option<Enqueued> {
        let policy = self.inner.policy.load();
        if !policy.admits(event.severity) {
            return None;
        }
        for field in self.bound.iter() {
            event
                .attributes
                .insert_if_absent(field.key.clone(), field.value.clone());
        }
        Some(self.inner.buffer.enqueue(event))
    }

    pub fn debug(&self, message: impl Into<String>) -> Option<Enqueued> {
        self.log(Severity::Debug, message, [])
    }

    pub fn info(&self, message: impl Into<String>) -> Option<Enqueued> {
        self.log(Severity::Info, message, [])
    }

    pub fn warn(&self, message: impl Into<String>) -> Option<Enqueued> {
        self.log(Severity::Warn, message, [])
    }

    pub fn error(&self, message: impl Into<String>) -> Option<Enqueued> {
        self.log(Severity::Error, message, [])
    }

    /// Logs at `Fatal`; the process keeps running
    pub fn fatal(&self, message: impl Into<String>) -> Option<Enqueued> {
        self.log(Severity::Fatal, message, [])
    }

    pub fn level(&self) -> Severity {
        self.inner.policy.load().level
    }

    /// Change the threshold for events logged from now on
    pub fn set_level(&self, level: Severity) {
        let mut settings = self.inner.settings.lock();
        let mut next = (*self.inner.policy.load()).clone();
        next.level = level;
        self.inner.policy.store(next);
        settings.level = level;
    }

    pub fn sampling_rate(&self) -> f64 {
        self.inner.policy.load().sampler.rate()
    }

    /// Change the sampling rate; rates outside [0, 1] are rejected
    pub fn set_sampling_rate(&self, rate: f64) -> Result<(), LogError> {
        validate_rate(rate)?;
        let mut settings = self.inner.settings.lock();
        // A single atomic store inside the current snapshot's sampler
        self.inner.policy.load().sampler.set_rate(rate);
        settings.sampling.rate = rate;
        Ok(())
    }

    /// Apply new level, sampling and encoder settings in one step
    ///
    /// Nothing changes when validation fails or when the buffer, rotation or
    /// retention sections differ from the running ones. Log calls and the
    /// writer see either the old policy or the new one, never a mix.
    pub fn update(&self, new: LogSettings) -> Result<(), LogError> {
        new.validate()?;
        let mut current = self.inner.settings.lock();
        current.ensure_same_structure(&new)?;

        // A custom encoder stays until the encoder kind itself changes
        let encoder = if new.encoder != current.encoder {
            encoder_for(new.encoder)
        } else {
            Arc::clone(&self.inner.policy.load().encoder)
        };
        self.inner.policy.store(Policy::from_settings(&new, encoder));

        *current = new;
        Ok(())
    }

    /// Settings currently in effect
    pub fn settings(&self) -> LogSettings {
        self.inner.settings.lock().clone()
    }

    /// Wait until everything logged so far is written
    pub async fn flush(&self) {
        self.inner.buffer.flush().await;
    }

    /// Write everything logged so far, then start a new segment
    ///
    /// Returns `None` once the logger is closed.
    pub async fn rotate(&self) -> Result<Option<PathBuf>, LogError> {
        if self.inner.buffer.is_closed() {
            return Ok(None);
        }
        self.inner.buffer.flush().await;
        Ok(self.inner.buffer.rotate()?)
    }

    /// Drain and close the sink and stop background work; idempotent
    pub async fn close(&self) {
        self.inner.buffer.close().await;
        if let Some(retention) = &self.inner.retention {
            retention.stop().await;
        }
    }

    pub fn stats(&self) -> BufferStats {
        self.inner.buffer.stats()
    }
}

/// Configures and starts a [`Logger`]
///
/// Without an explicit sink the logger writes through a [`RotatingWriter`]
/// at `settings.rotation.path` and runs the retention sweeper next to it.
pub struct LoggerBuilder {
    settings: LogSettings,
    sink: Option<Box<dyn LogSink>>,
    encoder: Option<Arc<dyn Encoder>>,
    extractor: Option<Arc<dyn ContextExtractor>>,
    diagnostics: Option<mpsc::UnboundedSender<Diagnostic>>,
    retention: bool,
}

impl LoggerBuilder {
    pub fn new(settings: LogSettings) -> Self {
        Self {
            settings,
            sink: None,
            encoder: None,
            extractor: None,
            diagnostics: None,
            retention: true,
        }
    }

    /// Write to `sink` instead of the rotating file; disables retention
    pub fn with_sink(mut self, sink: impl LogSink) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Use a custom encoder instead of the configured kind
    pub fn with_encoder(mut self, encoder: Arc<dyn Encoder>) -> Self {
        self.encoder = Some(encoder);
        self
    }

    pub fn with_context_extractor(mut self, extractor: Arc<dyn ContextExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Also send every diagnostic to `sender`
    pub fn with_diagnostics(mut self, sender: mpsc::UnboundedSender<Diagnostic>) -> Self {
        self.diagnostics = Some(sender);
        self
    }

    /// Do not start the retention sweeper
    pub fn without_retention(mut self) -> Self {
        self.retention = false;
        self
    }

    /// Validate settings, open the sink and start the background tasks
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> Result<Logger, LogError> {
        let settings = self.settings;
        settings.validate()?;
        let reporter = Reporter::new(self.diagnostics);

        let mut retention = None;
        let sink: Box<dyn LogSink> = match self.sink {
            Some(sink) => sink,
            None => {
                let rotated = Arc::new(Notify::new());
                let writer = RotatingWriter::open(settings.rotation.clone())?
                    .with_rotation_notify(Arc::clone(&rotated));
                if self.retention {
                    retention = Some(spawn_retention(&settings, rotated, reporter.clone()));
                }
                Box::new(writer)
            }
        };

        let encoder = self
            .encoder
            .unwrap_or_else(|| encoder_for(settings.encoder));
        let policy = Arc::new(PolicyCell::new(Policy::from_settings(&settings, encoder)));
        let buffer = BatchBuffer::spawn(&settings.buffer, sink, Arc::clone(&policy), reporter);

        let inner = Inner {
            policy,
            extractor: self
                .extractor
                .unwrap_or_else(|| Arc::new(DefaultContextExtractor::new())),
            settings: Mutex::new(settings),
            buffer,
            retention,
        };
        Ok(Logger {
            inner: Arc::new(inner),
            bound: Arc::new(Attributes::new()),
        })
    }
}

fn spawn_retention(settings: &LogSettings, rotated: Arc<Notify>, reporter: Reporter) -> RetentionTask {
    let cancel = CancellationToken::new();
    let manager = RetentionManager::new(&settings.rotation.path, settings.retention.clone());

    let task = manager.spawn(cancel.clone(), Some(rotated), move |result| match result {
        Ok(report) => {
            for failure in report.failures {
                let path = match &failure {
                    RetentionError::File { path, .. } => Some(path.clone()),
                    RetentionError::ReadDir { dir, .. } => Some(dir.clone()),
                };
                reporter.report(Diagnostic::RetentionFailed {
                    path,
                    error: failure.to_string(),
                });
            }
        }
        Err(e) => reporter.report(Diagnostic::RetentionFailed {
            path: None,
            error: e.to_string(),
        }),
    });

    RetentionTask {
        cancel,
        task: Mutex::new(Some(task)),
    }
}
