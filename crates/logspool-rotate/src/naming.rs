//! Names of rotated segments
//!
//! A segment rotated away from `app.log` is called
//! `app.log.20261016T101500.123`; a second rotation inside the same
//! millisecond gets `-1`, `-2`, ... appended, and compression adds `.gz`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use regex::Regex;

/// Suffix of compressed segments
pub const COMPRESSED_SUFFIX: &str = ".gz";

/// Sortable timestamp layout of the rotation marker
const MARKER_FORMAT: &str = "%Y%m%dT%H%M%S%.3f";

/// Rotated name (without disambiguation) for `file_name` at `at`
pub fn rotated_name(file_name: &str, at: DateTime<Utc>) -> String {
    format!("{}.{}", file_name, at.format(MARKER_FORMAT))
}

/// First path of the form `candidate`, `candidate-1`, `candidate-2`, ...
/// that does not exist yet
pub fn next_free_path(dir: &Path, candidate: &str) -> PathBuf {
    let mut path = dir.join(candidate);
    let mut seq = 0u32;
    while is_taken(&path) {
        seq += 1;
        path = dir.join(format!("{}-{}", candidate, seq));
    }
    path
}

/// A name is taken by the plain segment or by its compressed form
fn is_taken(path: &Path) -> bool {
    if path.exists() {
        return true;
    }
    let compressed = path
        .file_name()
        .map(|n| format!("{}{}", n.to_string_lossy(), COMPRESSED_SUFFIX));
    compressed.is_some_and(|name| path.with_file_name(name).exists())
}

/// Matcher for the rotated segments of one active file
#[derive(Clone, Debug)]
pub struct RotatedPattern {
    regex: Regex,
}

impl RotatedPattern {
    /// Build a matcher for segments of `file_name`
    pub fn new(file_name: &str) -> Self {
        let pattern = format!(
            r"^{}\.\d{{8}}T\d{{6}}\.\d{{3}}(?:-\d+)?(?:{})?$",
            regex::escape(file_name),
            regex::escape(COMPRESSED_SUFFIX)
        );
        let regex = Regex::new(&pattern).expect("escaped rotation pattern is valid");
        Self { regex }
    }

    /// Whether `name` is a rotated segment
    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    /// Whether `name` is already compressed
    pub fn is_compressed(name: &str) -> bool {
        name.ends_with(COMPRESSED_SUFFIX)
    }
}
