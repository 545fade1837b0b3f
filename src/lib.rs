//! Configurable compliance scanner for interactive-media asset trees
//!
//! This library walks a directory of game assets in parallel with rayon,
//! classifies every file by extension and checks code, image and audio
//! files against per-extension rules, producing a plain-text report.

pub mod aggregator;
pub mod config;
pub mod error;
pub mod evaluate;
pub mod format;
pub mod loudness;
pub mod models;
pub mod paths;
pub mod probe;
pub mod progress;
pub mod scanner;

pub use aggregator::ScanAggregator;
pub use config::{AudioRule, CodeRule, ExtensionMatcher, ImageRule, RawConfig, ScanConfig};
pub use error::{ScanError, ScanErrorKind};
pub use evaluate::{Decoders, RuleEvaluator};
pub use loudness::{FfmpegLoudness, LoudnessAnalyzer};
pub use models::{AssetKind, Disposition, FileCounts, ScanResult, ScanTime};
pub use probe::{AudioFormat, AudioFormatProbe, AudioProbe, ImageHeaderProbe, ImageProbe};
pub use progress::ProgressReporter;
pub use scanner::{scan, Scanner};
