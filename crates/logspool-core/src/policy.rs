use std::sync::Arc;

use parking_lot::RwLock;

use logspool_types::{LogSettings, Severity};

use crate::encoder::Encoder;
use crate::filter::SeverityFilter;
use crate::sampler::Sampler;

/// Everything a log call and the writer decide with, replaced as a whole
#[derive(Clone)]
pub struct Policy {
    /// Minimum severity that is forwarded
    pub level: Severity,

    /// Events at or above this are never sampled away and are written
    /// directly when the queue is full
    pub never_sample_from: Severity,

    pub sampler: Arc<Sampler>,
    pub encoder: Arc<dyn Encoder>,
}

impl Policy {
    pub fn from_settings(settings: &LogSettings, encoder: Arc<dyn Encoder>) -> Self {
        Self {
            level: settings.level,
            never_sample_from: settings.sampling.never_sample_from,
            sampler: Arc::new(Sampler::from_settings(&settings.sampling)),
            encoder,
        }
    }

    /// Level check, then sampling below the never-sample floor
    pub fn admits(&self, severity: Severity) -> bool {
        severity >= self.level && (severity >= self.never_sample_from || self.sampler.sample())
    }

    /// Whether a queue-full event is written synchronously instead of dropped
    pub fn writes_direct(&self, severity: Severity) -> bool {
        severity >= self.never_sample_from
    }
}

/// Current [`Policy`] shared by loggers and the batch buffer
///
/// Readers take one snapshot per decision, so a replacement is never seen
/// half-applied. The level is mirrored into an atomic for a lock-free early
/// reject; the snapshot stays authoritative.
pub struct PolicyCell {
    level: SeverityFilter,
    current: RwLock<Arc<Policy>>,
}

impl PolicyCell {
    pub fn new(policy: Policy) -> Self {
        Self {
            level: SeverityFilter::new(policy.level),
            current: RwLock::new(Arc::new(policy)),
        }
    }

    /// Cheap pre-check against the mirrored level
    pub fn enabled(&self, severity: Severity) -> bool {
        self.level.enabled(severity)
    }

    pub fn load(&self) -> Arc<Policy> {
        Arc::clone(&*self.current.read())
    }

    /// Replace the policy for every following decision
    pub fn store(&self, policy: Policy) {
        let mut current = self.current.write();
        let level = policy.level;
        *current = Arc::new(policy);
        // Published after the snapshot so a new-level reject implies a new snapshot
        self.level.set_threshold(level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{JsonEncoder, TextEncoder};
    use logspool_types::SamplingSettings;

    fn policy(settings: &LogSettings) -> Policy {
        Policy::from_settings(settings, Arc::new(TextEncoder))
    }

    #[test]
    fn test_admits_checks_level_then_sampling() {
        let settings = LogSettings::default()
            .with_level(Severity::Info)
            .with_sampling(SamplingSettings::rate(0.0));
        let policy = policy(&settings);

        assert!(!policy.admits(Severity::Debug));
        assert!(!policy.admits(Severity::Info));
        assert!(!policy.admits(Severity::Warn));
        assert!(policy.admits(Severity::Error));
        assert!(policy.admits(Severity::Fatal));

        assert!(!policy.writes_direct(Severity::Warn));
        assert!(policy.writes_direct(Severity::Error));
    }

    #[test]
    fn test_store_replaces_snapshot_and_level() {
        let cell = PolicyCell::new(policy(&LogSettings::default()));
        let before = cell.load();
        assert!(cell.enabled(Severity::Info));

        let mut next = policy(&LogSettings::default().with_level(Severity::Error));
        next.encoder = Arc::new(JsonEncoder);
        cell.store(next);

        assert!(!cell.enabled(Severity::Warn));
        let after = cell.load();
        assert_eq!(after.level, Severity::Error);
        assert!(!Arc::ptr_eq(&before, &after));
        // Old snapshots stay intact for whoever still holds them
        assert_eq!(before.level, Severity::Info);
    }
}
