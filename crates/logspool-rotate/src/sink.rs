use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::RotateError;

/// Append-only destination for encoded log batches
///
/// Implementations are driven from one place at a time; callers serialize
/// access (the batch consumer and the overflow path share one mutex).
pub trait LogSink: Send + 'static {
    /// Append bytes as one unit
    fn write(&mut self, buf: &[u8]) -> Result<(), RotateError>;

    /// Push buffered bytes to the backing store
    fn flush(&mut self) -> Result<(), RotateError>;

    /// Run any housekeeping due after a write, such as rotation.
    /// Returns the path of a segment that was rotated away.
    fn maintain(&mut self) -> Result<Option<PathBuf>, RotateError> {
        Ok(None)
    }

    /// Start a new segment now, if the sink has segments at all
    fn rotate(&mut self) -> Result<Option<PathBuf>, RotateError> {
        Ok(None)
    }

    /// Release the destination; later writes may reopen it
    fn close(&mut self) -> Result<(), RotateError> {
        self.flush()
    }
}

impl LogSink for Box<dyn LogSink> {
    fn write(&mut self, buf: &[u8]) -> Result<(), RotateError> {
        (**self).write(buf)
    }

    fn flush(&mut self) -> Result<(), RotateError> {
        (**self).flush()
    }

    fn maintain(&mut self) -> Result<Option<PathBuf>, RotateError> {
        (**self).maintain()
    }

    fn rotate(&mut self) -> Result<Option<PathBuf>, RotateError> {
        (**self).rotate()
    }

    fn close(&mut self) -> Result<(), RotateError> {
        (**self).close()
    }
}

/// In-memory sink; clones share the same storage
#[derive(Clone, Default)]
pub struct MemorySink {
    data: Arc<Mutex<Vec<u8>>>,
    writes: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.data.lock()).into_owned()
    }

    /// Written lines, without terminators
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_owned).collect()
    }

    /// Number of successful `write` calls
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every following write fail with an I/O error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl LogSink for MemorySink {
    fn write(&mut self, buf: &[u8]) -> Result<(), RotateError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RotateError::Io(std::io::Error::other("memory sink set to fail")));
        }
        self.data.lock().extend_from_slice(buf);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), RotateError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), RotateError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
