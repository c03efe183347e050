use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use logspool_types::RetentionSettings;

use crate::compress::gzip_in_place;
use crate::naming::RotatedPattern;
use crate::{RetentionAction, RetentionError};

/// Outcome of one sweep
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Rotated segments found
    pub scanned: usize,

    /// Archives written this sweep
    pub compressed: Vec<PathBuf>,

    /// Segments removed this sweep
    pub deleted: Vec<PathBuf>,

    /// Per-file failures; the sweep continued past each of them
    pub failures: Vec<RetentionError>,
}

impl SweepReport {
    /// Whether the sweep changed nothing and hit no errors
    pub fn is_noop(&self) -> bool {
        self.compressed.is_empty() && self.deleted.is_empty() && self.failures.is_empty()
    }
}

/// A rotated segment found during a sweep
struct Segment {
    path: PathBuf,
    name: String,
    modified: SystemTime,
}

/// Compresses and deletes the rotated segments of one active file
pub struct RetentionManager {
    /// Directory holding the active file
    dir: PathBuf,

    /// Matcher for this file's segments
    pattern: RotatedPattern,

    settings: RetentionSettings,
}

impl RetentionManager {
    /// Manage segments rotated away from `active`
    pub fn new(active: &Path, settings: RetentionSettings) -> Self {
        let dir = match active.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = active
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            dir,
            pattern: RotatedPattern::new(&file_name),
            settings,
        }
    }

    /// Run one sweep
    ///
    /// Segments are ranked by modification time, newest first. A segment is
    /// deleted when its rank exceeds `max_backups` or its age exceeds
    /// `max_age`; surviving segments ranked past `uncompressed` are gzipped.
    pub fn cleanup(&self) -> Result<SweepReport, RetentionError> {
        let mut report = SweepReport::default();
        let segments = self.scan(&mut report)?;
        report.scanned = segments.len();

        let now = SystemTime::now();
        for (index, segment) in segments.into_iter().enumerate() {
            let rank = index + 1;
            let age = now.duration_since(segment.modified).unwrap_or(Duration::ZERO);

            let over_count = self.settings.max_backups.is_some_and(|max| rank > max);
            let over_age = self.settings.max_age.is_some_and(|max| age > max);

            if over_count || over_age {
                match fs::remove_file(&segment.path) {
                    Ok(()) => report.deleted.push(segment.path),
                    Err(source) => report.failures.push(RetentionError::File {
                        path: segment.path,
                        action: RetentionAction::Delete,
                        source,
                    }),
                }
                continue;
            }

            if rank > self.settings.uncompressed && !RotatedPattern::is_compressed(&segment.name)
            {
                match gzip_in_place(&segment.path) {
                    Ok(archive) => report.compressed.push(archive),
                    Err(source) => report.failures.push(RetentionError::File {
                        path: segment.path,
                        action: RetentionAction::Compress,
                        source,
                    }),
                }
            }
        }

        if !report.is_noop() {
            debug!(
                compressed = report.compressed.len(),
                deleted = report.deleted.len(),
                failures = report.failures.len(),
                "retention sweep finished"
            );
        }
        Ok(report)
    }

    /// Rotated segments, newest first
    fn scan(&self, report: &mut SweepReport) -> Result<Vec<Segment>, RetentionError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| RetentionError::ReadDir {
            dir: self.dir.clone(),
            source,
        })?;

        let mut segments = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !self.pattern.matches(&name) {
                continue;
            }
            let path = entry.path();
            let modified = entry.metadata().and_then(|meta| meta.modified());
            match modified {
                Ok(modified) => segments.push(Segment {
                    path,
                    name,
                    modified,
                }),
                Err(source) => report.failures.push(RetentionError::File {
                    path,
                    action: RetentionAction::Inspect,
                    source,
                }),
            }
        }

        // Names embed a sortable marker, which breaks mtime ties
        segments.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.name.cmp(&a.name)));
        Ok(segments)
    }

    /// Sweep every `sweep_interval`, and whenever `trigger` is notified,
    /// until `cancel` fires
    ///
    /// The first sweep runs immediately. Each report (or listing error) is
    /// handed to `on_report`.
    pub fn spawn<F>(
        self,
        cancel: CancellationToken,
        trigger: Option<Arc<Notify>>,
        on_report: F,
    ) -> tokio::task::JoinHandle<()>
    where
        F: Fn(Result<SweepReport, RetentionError>) + Send + Sync + 'static,
    {
        let manager = Arc::new(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(manager.settings.sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,

                    _ = ticker.tick() => {}

                    _ = rotation_signal(trigger.as_deref()) => {}
                }

                let sweeper = Arc::clone(&manager);
                match tokio::task::spawn_blocking(move || sweeper.cleanup()).await {
                    Ok(result) => on_report(result),
                    Err(e) => warn!(error = %e, "retention sweep task failed"),
                }
            }
        })
    }
}

async fn rotation_signal(trigger: Option<&Notify>) {
    match trigger {
        Some(notify) => notify.notified().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    /// Create a segment whose mtime is `age` in the past
    fn segment(dir: &Path, marker: &str, age: Duration) -> PathBuf {
        let path = dir.join(format!("app.log.{}", marker));
        fs::write(&path, format!("contents of {}\n", marker)).unwrap();
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(SystemTime::now() - age)
            .unwrap();
        path
    }

    fn settings(
        max_backups: Option<usize>,
        max_age: Option<Duration>,
        uncompressed: usize,
    ) -> RetentionSettings {
        RetentionSettings {
            max_backups,
            max_age,
            uncompressed,
            sweep_interval: Duration::from_secs(60),
        }
    }

    fn names(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_count_and_age_limits_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("app.log"), b"active\n").unwrap();
        // Ranked newest first: r1 .. r5
        segment(dir.path(), "20260105T000000.000", DAY);
        segment(dir.path(), "20260104T000000.000", 2 * DAY);
        segment(dir.path(), "20260103T000000.000", 8 * DAY);
        segment(dir.path(), "20260102T000000.000", 9 * DAY);
        segment(dir.path(), "20260101T000000.000", 10 * DAY);

        let manager = RetentionManager::new(
            &dir.path().join("app.log"),
            settings(Some(3), Some(7 * DAY), 10),
        );
        let report = manager.cleanup().unwrap();

        // r3 goes by age although it is within the count; r4 and r5 by both
        assert_eq!(report.scanned, 5);
        assert_eq!(report.deleted.len(), 3);
        assert_eq!(
            names(dir.path()),
            vec![
                "app.log",
                "app.log.20260104T000000.000",
                "app.log.20260105T000000.000",
            ]
        );
    }

    #[test]
    fn test_count_limit_alone_deletes() {
        let dir = tempfile::tempdir().unwrap();
        for day in 1..=5u32 {
            segment(dir.path(), &format!("2026010{}T000000.000", 6 - day), day * DAY);
        }

        let manager =
            RetentionManager::new(&dir.path().join("app.log"), settings(Some(3), None, 10));
        let report = manager.cleanup().unwrap();

        assert_eq!(report.deleted.len(), 2);
        assert!(dir.path().join("app.log.20260105T000000.000").exists());
        assert!(dir.path().join("app.log.20260103T000000.000").exists());
        assert!(!dir.path().join("app.log.20260102T000000.000").exists());
        assert!(!dir.path().join("app.log.20260101T000000.000").exists());
    }

    #[test]
    fn test_compresses_beyond_uncompressed_count() {
        let dir = tempfile::tempdir().unwrap();
        segment(dir.path(), "20260104T000000.000", DAY);
        segment(dir.path(), "20260103T000000.000", 2 * DAY);
        segment(dir.path(), "20260102T000000.000", 3 * DAY);
        segment(dir.path(), "20260101T000000.000", 4 * DAY);

        let manager = RetentionManager::new(&dir.path().join("app.log"), settings(None, None, 2));
        let report = manager.cleanup().unwrap();

        assert_eq!(report.compressed.len(), 2);
        assert!(report.deleted.is_empty());
        assert_eq!(
            names(dir.path()),
            vec![
                "app.log.20260101T000000.000.gz",
                "app.log.20260102T000000.000.gz",
                "app.log.20260103T000000.000",
                "app.log.20260104T000000.000",
            ]
        );
    }

    #[test]
    fn test_second_sweep_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        for day in 1..=6u32 {
            segment(dir.path(), &format!("2026010{}T000000.000", 7 - day), day * DAY);
        }

        let manager = RetentionManager::new(
            &dir.path().join("app.log"),
            settings(Some(4), Some(30 * DAY), 1),
        );
        let first = manager.cleanup().unwrap();
        assert_eq!(first.deleted.len(), 2);
        assert_eq!(first.compressed.len(), 3);

        let before = names(dir.path());
        let second = manager.cleanup().unwrap();
        assert!(second.is_noop());
        assert_eq!(names(dir.path()), before);
    }

    #[test]
    fn test_ignores_unrelated_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("app.log"), b"active").unwrap();
        fs::write(dir.path().join("other.log.20260101T000000.000"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let manager = RetentionManager::new(&dir.path().join("app.log"), settings(Some(0), None, 0));
        let report = manager.cleanup().unwrap();

        assert_eq!(report.scanned, 0);
        assert_eq!(names(dir.path()).len(), 3);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager = RetentionManager::new(
            &dir.path().join("missing").join("app.log"),
            settings(None, None, 0),
        );
        assert!(matches!(
            manager.cleanup(),
            Err(RetentionError::ReadDir { .. })
        ));
    }

    #[tokio::test]
    async fn test_spawned_sweep_runs_on_trigger() {
        let dir = tempfile::tempdir().unwrap();
        let manager = RetentionManager::new(&dir.path().join("app.log"), settings(Some(0), None, 0));
        let cancel = CancellationToken::new();
        let trigger = Arc::new(Notify::new());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let handle = manager.spawn(cancel.clone(), Some(Arc::clone(&trigger)), move |result| {
            let _ = tx.send(result.map(|r| r.deleted.len()));
        });

        // Startup sweep on an empty directory
        let first = rx.recv().await.unwrap().unwrap();
        assert_eq!(first, 0);

        segment(dir.path(), "20260101T000000.000", DAY);
        trigger.notify_one();
        let second = rx.recv().await.unwrap().unwrap();
        assert_eq!(second, 1);

        cancel.cancel();
        handle.await.unwrap();
    }
}
