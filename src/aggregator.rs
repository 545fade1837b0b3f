//! Per-invocation scan state
//!
//! A [`ScanAggregator`] is created at the start of every scan and consumed
//! when the walk finishes. Leaf tasks on many threads record into it
//! concurrently; counters are atomic and the report buffer plus the
//! per-extension tallies sit behind a single mutex.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::format::format_duration_ms;
use crate::models::{FileCounts, ScanResult, ScanTime};

#[derive(Debug, Default)]
struct Tallies {
    reports: Vec<String>,
    scanned_types: IndexMap<String, u64>,
    unpermitted_types: IndexMap<String, u64>,
}

/// Mutable counters and report buffer for one scan run
#[derive(Debug)]
pub struct ScanAggregator {
    start: DateTime<Utc>,
    scanned: AtomicU64,
    skipped: AtomicU64,
    ignored: AtomicU64,
    tallies: Mutex<Tallies>,
}

impl ScanAggregator {
    /// Start a scan rooted at `root`; the header line is recorded first
    pub fn new(root: &Path) -> Self {
        let tallies = Tallies {
            reports: vec![format!("Scanning assets at [path = {}]", root.display())],
            ..Default::default()
        };
        Self {
            start: Utc::now(),
            scanned: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            ignored: AtomicU64::new(0),
            tallies: Mutex::new(tallies),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Tallies> {
        self.tallies.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A file with an ignored extension
    pub fn record_ignored(&self) {
        self.ignored.fetch_add(1, Ordering::Relaxed);
    }

    /// A file with an unpermitted extension
    pub fn record_unpermitted(&self, ext: &str) {
        *self.lock().unpermitted_types.entry(ext.to_string()).or_insert(0) += 1;
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// A file no rule applies to
    pub fn record_unclassified(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// A successfully evaluated file and the violations it produced
    pub fn record_scanned(&self, ext: &str, violations: Vec<String>) {
        {
            let mut tallies = self.lock();
            tallies.reports.extend(violations);
            *tallies.scanned_types.entry(ext.to_string()).or_insert(0) += 1;
        }
        self.scanned.fetch_add(1, Ordering::Relaxed);
    }

    /// Current counter values
    pub fn counts(&self) -> FileCounts {
        FileCounts {
            scanned: self.scanned.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
        }
    }

    /// Milliseconds since the scan started
    pub fn elapsed_ms(&self) -> u64 {
        (Utc::now() - self.start).num_milliseconds().max(0) as u64
    }

    /// Close the scan and append the summary lines.
    ///
    /// Order: per-file violations, unpermitted summaries, missing required
    /// types, scanned counts, closing line.
    pub fn finalize(self, required_types: &[String]) -> ScanResult {
        let end = Utc::now();
        let files = self.counts();
        let time = ScanTime {
            start: self.start,
            end,
        };
        let Tallies {
            mut reports,
            scanned_types,
            unpermitted_types,
        } = self.tallies.into_inner().unwrap_or_else(PoisonError::into_inner);

        reports.extend(unpermitted_types.iter().map(|(ext, count)| {
            format!("Detected {} unpermitted file type(s) [type = {}]", count, ext)
        }));

        reports.extend(
            required_types
                .iter()
                .filter(|ext| !scanned_types.contains_key(ext.as_str()))
                .map(|ext| format!("Could not find file types matching [type = {}]", ext)),
        );

        if !scanned_types.is_empty() {
            let counts: Vec<String> = scanned_types
                .iter()
                .map(|(ext, count)| format!("{} {}(s)", count, ext))
                .collect();
            reports.push(format!("Scanned {}", counts.join(", ")));
        }

        reports.push(format!(
            "Scan complete [time = {}]: {} file(s) scanned, {} file(s) skipped, {} file(s) ignored",
            format_duration_ms(time.duration_ms()),
            files.scanned,
            files.skipped,
            files.ignored
        ));

        ScanResult {
            time,
            files,
            reports,
            scanned_types,
            unpermitted_types,
        }
    }
}
