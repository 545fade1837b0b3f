//! Progress reporting module for scan operations
//!
//! When enabled, scan progress is written to stderr as newline-delimited
//! JSON so that wrapping tools can follow a long scan.

use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use crate::error::ScanError;
use crate::models::{FileCounts, ScanResult};

/// Default minimum interval between progress messages
pub const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 500;

/// Start message sent when scan begins
#[derive(Debug, Clone, Serialize)]
pub struct StartMessage {
    /// Message type identifier
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    /// Sequence number
    pub seq: u64,
    /// Timestamp in milliseconds since reporter creation
    pub ts: u64,
    /// Scan root path
    pub root: String,
}

/// Progress message sent during scan
#[derive(Debug, Clone, Serialize)]
pub struct ProgressMessage {
    /// Message type identifier ("p" for progress)
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    pub seq: u64,
    pub ts: u64,
    /// Files scanned so far
    #[serde(rename = "f")]
    pub scanned: u64,
    /// Files skipped so far
    #[serde(rename = "s")]
    pub skipped: u64,
    /// Files ignored so far
    #[serde(rename = "i")]
    pub ignored: u64,
    /// Last file visited
    pub path: String,
}

/// Error message sent when the scan aborts
#[derive(Debug, Clone, Serialize)]
pub struct ErrorProgressMessage {
    /// Message type identifier ("err" for error)
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    pub seq: u64,
    pub ts: u64,
    /// Error type/category
    pub error_type: String,
    /// Error message description
    pub message: String,
    /// Path that caused the error (if available)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Done message sent when scan completes
#[derive(Debug, Clone, Serialize)]
pub struct DoneMessage {
    /// Message type identifier ("done" for completion)
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    pub seq: u64,
    pub ts: u64,
    #[serde(rename = "f")]
    pub scanned: u64,
    #[serde(rename = "s")]
    pub skipped: u64,
    #[serde(rename = "i")]
    pub ignored: u64,
    /// Number of report lines
    #[serde(rename = "rc")]
    pub report_count: usize,
    /// Total scan duration in milliseconds
    pub ms: u64,
}

/// Progress reporter for outputting scan progress to stderr
///
/// Shared by all walker threads: the sequence number is atomic and the
/// throttle timestamp is behind a mutex.
pub struct ProgressReporter {
    enabled: bool,
    interval_ms: u64,
    last_report: Mutex<Instant>,
    seq: AtomicU64,
    start_time: Instant,
}

impl ProgressReporter {
    /// Create a new ProgressReporter
    ///
    /// # Arguments
    /// * `enabled` - Whether progress reporting is enabled
    /// * `interval_ms` - Minimum interval between progress messages in milliseconds
    pub fn new(enabled: bool, interval_ms: u64) -> Self {
        let now = Instant::now();
        Self {
            enabled,
            interval_ms,
            last_report: Mutex::new(now),
            seq: AtomicU64::new(0),
            start_time: now,
        }
    }

    /// A reporter that never writes anything
    pub fn disabled() -> Self {
        Self::new(false, DEFAULT_PROGRESS_INTERVAL_MS)
    }

    /// Check if the reporter is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Get the next sequence number (monotonically increasing)
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Get the current timestamp in milliseconds since reporter creation
    pub fn current_timestamp(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    /// Claim the next progress slot if the interval has elapsed
    fn claim_slot(&self) -> bool {
        let Ok(mut last) = self.last_report.try_lock() else {
            // another thread is reporting right now
            return false;
        };
        if (last.elapsed().as_millis() as u64) < self.interval_ms {
            return false;
        }
        *last = Instant::now();
        true
    }

    fn output_to_stderr<T: Serialize>(&self, msg: &T) {
        if let Ok(json) = serde_json::to_string(msg) {
            let mut stderr = std::io::stderr().lock();
            writeln!(stderr, "{}", json).ok();
            stderr.flush().ok();
        }
    }

    /// Report scan start
    pub fn report_start(&self, root: &Path) {
        if !self.enabled {
            return;
        }
        let msg = StartMessage {
            msg_type: "start",
            seq: self.next_seq(),
            ts: self.current_timestamp(),
            root: root.to_string_lossy().into_owned(),
        };
        self.output_to_stderr(&msg);
    }

    /// Report progress after a file was visited.
    ///
    /// Returns true if a message was actually sent (respects interval timing).
    pub fn report_progress(&self, counts: FileCounts, path: &Path) -> bool {
        if !self.enabled || !self.claim_slot() {
            return false;
        }
        let msg = ProgressMessage {
            msg_type: "p",
            seq: self.next_seq(),
            ts: self.current_timestamp(),
            scanned: counts.scanned,
            skipped: counts.skipped,
            ignored: counts.ignored,
            path: path.to_string_lossy().into_owned(),
        };
        self.output_to_stderr(&msg);
        true
    }

    /// Report the error that aborted the scan (ignores interval timing)
    pub fn report_error(&self, error: &ScanError) {
        if !self.enabled {
            return;
        }
        let msg = ErrorProgressMessage {
            msg_type: "err",
            seq: self.next_seq(),
            ts: self.current_timestamp(),
            error_type: format!("{:?}", error.kind),
            message: error.message.clone(),
            path: error.path.as_ref().map(|p| p.to_string_lossy().into_owned()),
        };
        self.output_to_stderr(&msg);
    }

    /// Report scan completion
    pub fn report_done(&self, result: &ScanResult) {
        if !self.enabled {
            return;
        }
        let msg = DoneMessage {
            msg_type: "done",
            seq: self.next_seq(),
            ts: self.current_timestamp(),
            scanned: result.files.scanned,
            skipped: result.files.skipped,
            ignored: result.files.ignored,
            report_count: result.reports.len(),
            ms: result.duration_ms(),
        };
        self.output_to_stderr(&msg);
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::disabled()
    }
}
