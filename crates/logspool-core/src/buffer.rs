use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use logspool_rotate::{LogSink, RotateError};
use logspool_types::{BufferSettings, LogEvent, MAX_BUFFER_CAPACITY};

use crate::diagnostics::{Diagnostic, Reporter};
use crate::encoder::Encoder;
use crate::policy::PolicyCell;

/// The queue holds this many batches before producers overflow
pub const QUEUE_BATCHES: usize = 4;

/// What happened to an enqueued event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Enqueued {
    /// Waiting for the consumer
    Queued,
    /// Queue full; written synchronously instead
    WrittenDirect,
    /// Queue full; discarded
    Dropped,
    /// Buffer closed; discarded
    Closed,
}

/// Messages from producers to the consumer task
enum Command {
    Event(LogEvent),
    Flush(oneshot::Sender<()>),
}

/// Lock-free counters behind [`BufferStats`]
#[derive(Default)]
struct AtomicStats {
    queued: AtomicU64,
    dropped: AtomicU64,
    direct_writes: AtomicU64,
    batches_written: AtomicU64,
    events_written: AtomicU64,
    write_errors: AtomicU64,
    encode_errors: AtomicU64,
}

impl AtomicStats {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    fn to_stats(&self) -> BufferStats {
        BufferStats {
            queued: self.queued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            direct_writes: self.direct_writes.load(Ordering::Relaxed),
            batches_written: self.batches_written.load(Ordering::Relaxed),
            events_written: self.events_written.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            encode_errors: self.encode_errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of buffer counters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Events accepted into the queue
    pub queued: u64,
    /// Events discarded because the queue was full
    pub dropped: u64,
    /// Events written synchronously because the queue was full
    pub direct_writes: u64,
    /// Batches written by the consumer
    pub batches_written: u64,
    /// Events written by the consumer
    pub events_written: u64,
    /// Failed sink writes (batch or direct)
    pub write_errors: u64,
    /// Events that could not be rendered
    pub encode_errors: u64,
}

/// State shared by producers and the consumer
struct Shared {
    /// Serializes the consumer and the direct-write path
    sink: Mutex<Box<dyn LogSink>>,

    /// Encoder and direct-write floor; one snapshot per batch or overflow
    policy: Arc<PolicyCell>,

    stats: AtomicStats,

    /// Drops not yet reported; the consumer reports them in aggregate
    unreported_drops: AtomicU64,

    reporter: Reporter,
}

impl Shared {
    /// Render `events` into `buf`; returns how many rendered
    fn render<'a>(
        &self,
        encoder: &dyn Encoder,
        events: impl Iterator<Item = &'a LogEvent>,
        buf: &mut Vec<u8>,
    ) -> usize {
        let mut rendered = 0;
        for event in events {
            let mark = buf.len();
            match encoder.render(event, buf) {
                Ok(()) => rendered += 1,
                Err(e) => {
                    buf.truncate(mark);
                    AtomicStats::bump(&self.stats.encode_errors, 1);
                    self.reporter.report(Diagnostic::EncodeFailed {
                        error: e.to_string(),
                    });
                }
            }
        }
        rendered
    }

    /// Write and run sink housekeeping under one lock
    fn write(&self, buf: &[u8]) -> Result<(), RotateError> {
        let mut sink = self.sink.lock();
        let written = sink.write(buf);
        if let Err(e) = sink.maintain() {
            self.reporter.report(Diagnostic::RotateFailed {
                error: e.to_string(),
            });
        }
        written
    }

    fn write_batch(&self, batch: &mut Vec<LogEvent>, buf: &mut Vec<u8>) {
        if batch.is_empty() {
            return;
        }
        buf.clear();
        let encoder = Arc::clone(&self.policy.load().encoder);
        let rendered = self.render(encoder.as_ref(), batch.iter(), buf);
        batch.clear();
        if rendered == 0 {
            return;
        }

        match self.write(buf) {
            Ok(()) => {
                AtomicStats::bump(&self.stats.batches_written, 1);
                AtomicStats::bump(&self.stats.events_written, rendered as u64);
            }
            Err(e) => {
                AtomicStats::bump(&self.stats.write_errors, 1);
                self.reporter.report(Diagnostic::WriteFailed {
                    events: rendered,
                    error: e.to_string(),
                });
            }
        }
    }

    fn report_drops(&self) {
        let count = self.unreported_drops.swap(0, Ordering::Relaxed);
        if count > 0 {
            self.reporter.report(Diagnostic::Dropped { count });
        }
    }

    fn flush_sink(&self) {
        if let Err(e) = self.sink.lock().flush() {
            self.reporter.report(Diagnostic::FlushFailed {
                error: e.to_string(),
            });
        }
    }

    fn close_sink(&self) {
        if let Err(e) = self.sink.lock().close() {
            self.reporter.report(Diagnostic::CloseFailed {
                error: e.to_string(),
            });
        }
    }
}

/// Bounded queue drained in batches by one background task
///
/// Producers never wait on the consumer: a full queue either writes the
/// event directly (at or above the policy's never-sample floor) or drops it.
/// The queue holds [`QUEUE_BATCHES`] batches, so a full batch is handed to
/// the consumer well before producers overflow.
pub struct BatchBuffer {
    sender: mpsc::Sender<Command>,
    shared: Arc<Shared>,

    closed: AtomicBool,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,

    /// Cancelled once the consumer has drained and closed the sink
    done: CancellationToken,
}

impl BatchBuffer {
    /// Start the consumer task
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(
        settings: &BufferSettings,
        sink: Box<dyn LogSink>,
        policy: Arc<PolicyCell>,
        reporter: Reporter,
    ) -> Self {
        let bound = settings.capacity.clamp(1, MAX_BUFFER_CAPACITY) * QUEUE_BATCHES;
        let (sender, receiver) = mpsc::channel(bound);
        let shared = Arc::new(Shared {
            sink: Mutex::new(sink),
            policy,
            stats: AtomicStats::default(),
            unreported_drops: AtomicU64::new(0),
            reporter,
        });
        let cancel = CancellationToken::new();
        let done = CancellationToken::new();

        let task = tokio::spawn(consume(
            receiver,
            Arc::clone(&shared),
            settings.clone(),
            cancel.clone(),
            done.clone(),
        ));

        Self {
            sender,
            shared,
            closed: AtomicBool::new(false),
            cancel,
            task: Mutex::new(Some(task)),
            done,
        }
    }

    /// Hand an event to the consumer without waiting
    pub fn enqueue(&self, event: LogEvent) -> Enqueued {
        if self.closed.load(Ordering::Acquire) {
            return Enqueued::Closed;
        }

        match self.sender.try_send(Command::Event(event)) {
            Ok(()) => {
                AtomicStats::bump(&self.shared.stats.queued, 1);
                Enqueued::Queued
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Enqueued::Closed,
            Err(mpsc::error::TrySendError::Full(Command::Event(event))) => self.overflow(event),
            Err(mpsc::error::TrySendError::Full(Command::Flush(_))) => Enqueued::Dropped,
        }
    }

    fn overflow(&self, event: LogEvent) -> Enqueued {
        let severity = event.severity;
        let policy = self.shared.policy.load();
        if !policy.writes_direct(severity) {
            AtomicStats::bump(&self.shared.stats.dropped, 1);
            AtomicStats::bump(&self.shared.unreported_drops, 1);
            return Enqueued::Dropped;
        }

        let mut buf = Vec::new();
        if self
            .shared
            .render(policy.encoder.as_ref(), std::iter::once(&event), &mut buf)
            == 0
        {
            AtomicStats::bump(&self.shared.stats.dropped, 1);
            return Enqueued::Dropped;
        }
        match self.shared.write(&buf) {
            Ok(()) => {
                AtomicStats::bump(&self.shared.stats.direct_writes, 1);
                Enqueued::WrittenDirect
            }
            Err(e) => {
                AtomicStats::bump(&self.shared.stats.write_errors, 1);
                AtomicStats::bump(&self.shared.stats.dropped, 1);
                self.shared.reporter.report(Diagnostic::DirectWriteFailed {
                    severity,
                    error: e.to_string(),
                });
                Enqueued::Dropped
            }
        }
    }

    /// Wait until everything enqueued before this call is written and the
    /// sink flushed; returns at once when the buffer is closed
    pub async fn flush(&self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let (ack, done) = oneshot::channel();
        if self.sender.send(Command::Flush(ack)).await.is_err() {
            return;
        }
        let _ = done.await;
    }

    /// Stop accepting events, drain the queue, close the sink and wait for
    /// the consumer to finish
    ///
    /// Every caller returns only after the sink is closed; once it is, later
    /// calls return immediately.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.cancel.cancel();

        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "log consumer task failed");
            }
        }
        self.done.cancelled().await;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Rotate the sink now, between batches; a closed buffer has nothing to
    /// rotate and returns `None`
    pub fn rotate(&self) -> Result<Option<PathBuf>, RotateError> {
        let mut sink = self.shared.sink.lock();
        // Checked under the sink lock so the consumer cannot close in between
        if self.is_closed() {
            return Ok(None);
        }
        sink.rotate()
    }

    pub fn stats(&self) -> BufferStats {
        self.shared.stats.to_stats()
    }
}

impl Drop for BatchBuffer {
    fn drop(&mut self) {
        // Consumer drains what it can on its own
        self.cancel.cancel();
    }
}

/// Consumer loop: batch events, write on size, tick, flush or shutdown
async fn consume(
    mut receiver: mpsc::Receiver<Command>,
    shared: Arc<Shared>,
    settings: BufferSettings,
    cancel: CancellationToken,
    done: CancellationToken,
) {
    // Fires on every exit, panics included
    let _done = done.drop_guard();

    // Grows to the batch size on demand
    let mut batch = Vec::new();
    let mut buf = Vec::new();

    let mut ticker = tokio::time::interval(settings.flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            command = receiver.recv() => match command {
                Some(command) => handle(command, &shared, &mut batch, &mut buf, settings.capacity),
                None => break,
            },

            _ = ticker.tick() => {
                shared.write_batch(&mut batch, &mut buf);
                shared.report_drops();
            }
        }
    }

    // Refuse new sends, then drain what is already queued
    receiver.close();
    while let Some(command) = receiver.recv().await {
        handle(command, &shared, &mut batch, &mut buf, settings.capacity);
    }
    shared.write_batch(&mut batch, &mut buf);
    shared.report_drops();
    shared.close_sink();
}

fn handle(
    command: Command,
    shared: &Shared,
    batch: &mut Vec<LogEvent>,
    buf: &mut Vec<u8>,
    capacity: usize,
) {
    match command {
        Command::Event(event) => {
            batch.push(event);
            if batch.len() >= capacity {
                shared.write_batch(batch, buf);
            }
        }
        Command::Flush(ack) => {
            shared.write_batch(batch, buf);
            shared.report_drops();
            shared.flush_sink();
            let _ = ack.send(());
        }
    }
}
