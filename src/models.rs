//! Core data models for the asset scanner

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;

use crate::config::{AudioRule, CodeRule, ImageRule};

/// Rule family a file is evaluated against, in priority order
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AssetKind<'a> {
    /// Code asset (`js` with a code rule)
    Code(&'a CodeRule),
    /// Image asset with a rule for its extension
    Image(&'a ImageRule),
    /// Audio asset with a rule for its extension
    Audio(&'a AudioRule),
    /// No rule matches the extension
    Unclassified,
}

impl AssetKind<'_> {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Code(_) => "code",
            AssetKind::Image(_) => "image",
            AssetKind::Audio(_) => "audio",
            AssetKind::Unclassified => "unclassified",
        }
    }
}

impl std::fmt::Display for AssetKind<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of matching an extension against the ignore and unpermitted lists
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Disposition<'a> {
    /// Excluded from the scan, only counted as ignored
    Ignored,
    /// Disallowed, counted as skipped and tallied per extension
    Unpermitted,
    /// Eligible for rule evaluation
    Asset(AssetKind<'a>),
}

/// Start and end of a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScanTime {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ScanTime {
    /// Elapsed time between start and end
    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }

    /// Elapsed time in whole milliseconds
    pub fn duration_ms(&self) -> u64 {
        self.duration().num_milliseconds().max(0) as u64
    }
}

/// Per-file accounting; each visited file increments exactly one counter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FileCounts {
    /// Files evaluated against a rule
    pub scanned: u64,
    /// Unpermitted or unclassified files
    pub skipped: u64,
    /// Files with an ignored extension
    pub ignored: u64,
}

impl FileCounts {
    /// Total number of files visited
    pub fn total(&self) -> u64 {
        self.scanned + self.skipped + self.ignored
    }
}

/// Result of a completed scan
#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    /// When the scan started and finished
    pub time: ScanTime,
    /// File counters
    pub files: FileCounts,
    /// Violation lines followed by summary lines
    pub reports: Vec<String>,
    /// Scanned files per extension, in first-seen order
    #[serde(skip)]
    pub scanned_types: IndexMap<String, u64>,
    /// Unpermitted files per extension, in first-seen order
    #[serde(skip)]
    pub unpermitted_types: IndexMap<String, u64>,
}

impl ScanResult {
    /// Elapsed scan time in milliseconds
    pub fn duration_ms(&self) -> u64 {
        self.time.duration_ms()
    }

    /// Whether a line in the report mentions the given text
    pub fn has_report_containing(&self, needle: &str) -> bool {
        self.reports.iter().any(|line| line.contains(needle))
    }
}
