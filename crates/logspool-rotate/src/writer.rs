use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use tokio::sync::Notify;
use tracing::{debug, warn};

use logspool_types::{RotationPeriod, RotationSettings};

use crate::naming;
use crate::sink::LogSink;
use crate::RotateError;

/// Size-, age- and period-aware writer for the active log file
///
/// Rotation closes the active file, renames it to a timestamped segment and
/// opens a fresh file at the canonical path, in that order.
pub struct RotatingWriter {
    /// Canonical path of the active file
    path: PathBuf,

    /// Rotation triggers
    settings: RotationSettings,

    /// Active handle; `None` after a failed open or after `close`
    file: Option<File>,

    /// Bytes in the active file
    bytes: u64,

    /// When the active file was opened
    opened_at: Instant,

    /// Next wall-clock boundary for period rotation
    boundary: Option<DateTime<Utc>>,

    /// Poked after every successful rotation
    rotated: Option<Arc<Notify>>,
}

impl RotatingWriter {
    /// Open (or create) the active file, appending to existing content
    pub fn open(settings: RotationSettings) -> Result<Self, RotateError> {
        let mut writer = Self {
            path: settings.path.clone(),
            settings,
            file: None,
            bytes: 0,
            opened_at: Instant::now(),
            boundary: None,
            rotated: None,
        };
        writer.open_active()?;
        Ok(writer)
    }

    /// Notify `notify` after each successful rotation
    pub fn with_rotation_notify(mut self, notify: Arc<Notify>) -> Self {
        self.rotated = Some(notify);
        self
    }

    /// Canonical path of the active file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes written to the active file (including content found on open)
    pub fn current_size(&self) -> u64 {
        self.bytes
    }

    /// Whether any trigger has fired for the active file
    pub fn should_rotate(&self) -> bool {
        if self.bytes == 0 {
            return false;
        }
        let size_hit = self.settings.max_size.is_some_and(|max| self.bytes >= max);
        let age_hit = self
            .settings
            .max_age
            .is_some_and(|age| self.opened_at.elapsed() >= age);
        let period_hit = self.boundary.is_some_and(|at| Utc::now() >= at);
        size_hit || age_hit || period_hit
    }

    /// Rotate the active file now
    ///
    /// Returns the segment path the old file was renamed to, or `None` when
    /// there was no file at the canonical path to rename.
    pub fn rotate(&mut self) -> Result<Option<PathBuf>, RotateError> {
        let target = naming::next_free_path(
            self.dir(),
            &naming::rotated_name(&self.file_name(), Utc::now()),
        );
        self.rotate_to(target)
    }

    /// Close, rename to `target`, reopen; a failed rename reopens the
    /// canonical file and keeps appending to it
    fn rotate_to(&mut self, target: PathBuf) -> Result<Option<PathBuf>, RotateError> {
        if let Some(file) = self.file.take() {
            if let Err(e) = file.sync_all() {
                warn!(path = %self.path.display(), error = %e, "sync before rotation failed");
            }
        }

        let mut segment = None;
        if self.path.exists() {
            if let Err(source) = fs::rename(&self.path, &target) {
                // Keep logging into the old file
                self.open_active()?;
                return Err(RotateError::Rename {
                    from: self.path.clone(),
                    to: target,
                    source,
                });
            }
            segment = Some(target);
        }

        self.open_active()?;

        if let Some(segment) = &segment {
            debug!(segment = %segment.display(), "rotated log file");
            if let Some(notify) = &self.rotated {
                notify.notify_one();
            }
        }
        Ok(segment)
    }

    fn open_active(&mut self) -> Result<(), RotateError> {
        let open_err = |source| RotateError::Open {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(open_err)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(open_err)?;
        let existing = file.metadata().map(|m| m.len()).unwrap_or(0);

        self.file = Some(file);
        self.bytes = existing;
        self.opened_at = Instant::now();
        self.boundary = self
            .settings
            .period
            .map(|period| next_boundary(period, Utc::now()));
        Ok(())
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl LogSink for RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> Result<(), RotateError> {
        if self.file.is_none() {
            self.open_active()?;
        }
        if let Some(file) = self.file.as_mut() {
            file.write_all(buf)?;
            self.bytes += buf.len() as u64;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), RotateError> {
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }

    fn maintain(&mut self) -> Result<Option<PathBuf>, RotateError> {
        if self.should_rotate() {
            self.rotate()
        } else {
            Ok(None)
        }
    }

    fn rotate(&mut self) -> Result<Option<PathBuf>, RotateError> {
        RotatingWriter::rotate(self)
    }

    fn close(&mut self) -> Result<(), RotateError> {
        if let Some(file) = self.file.take() {
            file.sync_all()?;
        }
        Ok(())
    }
}

/// Start of the next hour or day (UTC) after `now`
pub fn next_boundary(period: RotationPeriod, now: DateTime<Utc>) -> DateTime<Utc> {
    let step = match period {
        RotationPeriod::Hourly => TimeDelta::hours(1),
        RotationPeriod::Daily => TimeDelta::days(1),
    };
    now.duration_trunc(step).unwrap_or(now) + step
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    fn settings(path: PathBuf) -> RotationSettings {
        RotationSettings {
            path,
            max_size: None,
            max_age: None,
            period: None,
        }
    }

    fn segments(dir: &Path) -> Vec<PathBuf> {
        let mut found: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.file_name().unwrap() != "app.log")
            .collect();
        found.sort();
        found
    }

    #[test]
    fn test_creates_directory_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("app.log");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"old\n").unwrap();

        let mut writer = RotatingWriter::open(settings(path.clone())).unwrap();
        assert_eq!(writer.current_size(), 4);
        writer.write(b"new\n").unwrap();
        writer.close().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "old\nnew\n");
    }

    #[test]
    fn test_size_trigger_rotates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let mut config = settings(path.clone());
        config.max_size = Some(10);
        let mut writer = RotatingWriter::open(config).unwrap();

        writer.write(b"12345\n").unwrap();
        assert_eq!(writer.maintain().unwrap(), None);

        writer.write(b"67890\n").unwrap();
        let segment = writer.maintain().unwrap().expect("rotation");

        assert_eq!(fs::read_to_string(&segment).unwrap(), "12345\n67890\n");
        assert_eq!(writer.current_size(), 0);
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_segment_size_bounded_by_one_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let mut config = settings(path.clone());
        config.max_size = Some(64);
        let mut writer = RotatingWriter::open(config).unwrap();

        let batch = b"0123456789abcdef0123456789abcdef\n";
        for _ in 0..40 {
            writer.write(batch).unwrap();
            writer.maintain().unwrap();
        }
        writer.close().unwrap();

        let found = segments(dir.path());
        assert!(!found.is_empty());
        for segment in found {
            let len = fs::metadata(&segment).unwrap().len();
            assert!(len <= 64 + batch.len() as u64, "{} is {} bytes", segment.display(), len);
        }
    }

    #[test]
    fn test_age_trigger_rotates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let mut config = settings(path.clone());
        config.max_age = Some(Duration::from_millis(30));
        let mut writer = RotatingWriter::open(config).unwrap();

        writer.write(b"early\n").unwrap();
        assert_eq!(writer.maintain().unwrap(), None);

        std::thread::sleep(Duration::from_millis(60));
        writer.write(b"late\n").unwrap();
        assert!(writer.maintain().unwrap().is_some());
    }

    #[test]
    fn test_empty_file_is_not_rotated_by_age() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = settings(dir.path().join("app.log"));
        config.max_age = Some(Duration::from_millis(1));
        let mut writer = RotatingWriter::open(config).unwrap();

        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(writer.maintain().unwrap(), None);
    }

    #[test]
    fn test_rapid_rotations_get_distinct_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = RotatingWriter::open(settings(dir.path().join("app.log"))).unwrap();

        for i in 0..5 {
            writer.write(format!("batch {}\n", i).as_bytes()).unwrap();
            writer.rotate().unwrap();
        }

        assert_eq!(segments(dir.path()).len(), 5);
    }

    #[test]
    fn test_rotation_pokes_notify() {
        let dir = tempfile::tempdir().unwrap();
        let notify = Arc::new(Notify::new());
        let mut writer = RotatingWriter::open(settings(dir.path().join("app.log")))
            .unwrap()
            .with_rotation_notify(Arc::clone(&notify));

        writer.write(b"x\n").unwrap();
        writer.rotate().unwrap();

        // A stored permit completes immediately
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        rt.block_on(async {
            tokio::time::timeout(Duration::from_millis(100), notify.notified())
                .await
                .expect("rotation notified");
        });
    }

    #[test]
    fn test_write_reopens_after_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let mut writer = RotatingWriter::open(settings(path.clone())).unwrap();

        writer.write(b"a\n").unwrap();
        writer.close().unwrap();
        writer.write(b"b\n").unwrap();
        writer.flush().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "a\nb\n");
    }

    #[test]
    fn test_failed_rename_keeps_appending_to_active_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let mut writer = RotatingWriter::open(settings(path.clone())).unwrap();
        writer.write(b"before\n").unwrap();

        // A file cannot replace a non-empty directory
        let blocked = dir.path().join("blocked");
        fs::create_dir(&blocked).unwrap();
        fs::write(blocked.join("occupant"), b"x").unwrap();

        let err = writer.rotate_to(blocked.clone()).unwrap_err();
        assert!(
            matches!(&err, RotateError::Rename { from, to, .. } if *from == path && *to == blocked),
            "{:?}",
            err
        );

        writer.write(b"after\n").unwrap();
        writer.flush().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "before\nafter\n");
        assert_eq!(writer.current_size(), 13);
        assert_eq!(fs::read_to_string(blocked.join("occupant")).unwrap(), "x");
    }

    #[test]
    fn test_period_boundary_rotates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let mut config = settings(path.clone());
        config.period = Some(RotationPeriod::Hourly);
        let mut writer = RotatingWriter::open(config).unwrap();

        writer.write(b"last hour\n").unwrap();
        assert_eq!(writer.maintain().unwrap(), None);

        writer.boundary = Some(Utc::now() - TimeDelta::seconds(1));
        let segment = writer.maintain().unwrap().expect("rotation");

        assert_eq!(fs::read_to_string(&segment).unwrap(), "last hour\n");
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
        assert!(writer.boundary.is_some_and(|at| at > Utc::now()));
    }

    #[test]
    fn test_next_boundary() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 10, 15, 42).unwrap();
        assert_eq!(
            next_boundary(RotationPeriod::Hourly, now),
            Utc.with_ymd_and_hms(2026, 10, 16, 11, 0, 0).unwrap()
        );
        assert_eq!(
            next_boundary(RotationPeriod::Daily, now),
            Utc.with_ymd_and_hms(2026, 10, 17, 0, 0, 0).unwrap()
        );

        let on_the_hour = Utc.with_ymd_and_hms(2026, 10, 16, 10, 0, 0).unwrap();
        assert_eq!(
            next_boundary(RotationPeriod::Hourly, on_the_hour),
            Utc.with_ymd_and_hms(2026, 10, 16, 11, 0, 0).unwrap()
        );
    }
}
