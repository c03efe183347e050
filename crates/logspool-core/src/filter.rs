use std::sync::atomic::{AtomicU8, Ordering};

use logspool_types::Severity;

/// Minimum-severity gate shared by every producer
///
/// The threshold is a single atomic, so changing it is visible to the next
/// call and never touches events that already passed.
#[derive(Debug)]
pub struct SeverityFilter {
    threshold: AtomicU8,
}

impl SeverityFilter {
    pub fn new(threshold: Severity) -> Self {
        Self {
            threshold: AtomicU8::new(threshold.as_u8()),
        }
    }

    /// Whether an event at `severity` passes
    pub fn enabled(&self, severity: Severity) -> bool {
        severity.as_u8() >= self.threshold.load(Ordering::Acquire)
    }

    pub fn threshold(&self) -> Severity {
        Severity::from_u8(self.threshold.load(Ordering::Acquire))
    }

    pub fn set_threshold(&self, threshold: Severity) {
        self.threshold.store(threshold.as_u8(), Ordering::Release);
    }
}

impl Default for SeverityFilter {
    fn default() -> Self {
        Self::new(Severity::default())
    }
}
