//! Per-asset rule evaluation
//!
//! Each evaluator inspects one file against its rule and returns every
//! violation it finds. Report lines share one shape so downstream tools can
//! parse them: `<description> [recommended = X] [<file> = Y]`.

use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;

use crate::config::{AudioRule, CodeRule, ImageRule};
use crate::error::ScanError;
use crate::format::format_file_size;
use crate::loudness::{FfmpegLoudness, LoudnessAnalyzer};
use crate::models::AssetKind;
use crate::probe::{AudioFormatProbe, AudioProbe, ImageHeaderProbe, ImageProbe};

/// External decoders used by the evaluators
#[derive(Clone)]
pub struct Decoders {
    pub image: Arc<dyn ImageProbe>,
    pub audio: Arc<dyn AudioProbe>,
    pub loudness: Arc<dyn LoudnessAnalyzer>,
}

impl Default for Decoders {
    fn default() -> Self {
        Self {
            image: Arc::new(ImageHeaderProbe),
            audio: Arc::new(AudioFormatProbe::new()),
            loudness: Arc::new(FfmpegLoudness::new()),
        }
    }
}

impl std::fmt::Debug for Decoders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoders").finish_non_exhaustive()
    }
}

/// Format one violation line
pub fn violation(
    description: &str,
    recommended: impl Display,
    file_name: &str,
    actual: impl Display,
) -> String {
    format!(
        "{} [recommended = {}] [{} = {}]",
        description, recommended, file_name, actual
    )
}

/// Power-of-two test; zero is not a power of two
pub fn is_power_of_two(n: u32) -> bool {
    n > 0 && (n & (n - 1)) == 0
}

/// A threshold counts only when it is set and non-zero
fn threshold<T: Copy + PartialOrd + Default>(value: Option<T>) -> Option<T> {
    value.filter(|v| *v > T::default())
}

fn bound(value: Option<u32>) -> String {
    value.map_or_else(|| "any".to_string(), |v| v.to_string())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

fn file_size(path: &Path) -> Result<u64, ScanError> {
    std::fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| ScanError::io(path.to_path_buf(), e))
}

fn trim_ms(ms: f64) -> f64 {
    (ms * 1000.0).round() / 1000.0
}

/// Evaluates files against code, image and audio rules
#[derive(Debug, Clone, Default)]
pub struct RuleEvaluator {
    decoders: Decoders,
}

impl RuleEvaluator {
    pub fn new(decoders: Decoders) -> Self {
        Self { decoders }
    }

    /// Dispatch on the asset kind; unclassified files produce nothing
    pub fn evaluate(&self, path: &Path, kind: &AssetKind<'_>) -> Result<Vec<String>, ScanError> {
        match kind {
            AssetKind::Code(rule) => self.evaluate_code(path, rule),
            AssetKind::Image(rule) => self.evaluate_image(path, rule),
            AssetKind::Audio(rule) => self.evaluate_audio(path, rule),
            AssetKind::Unclassified => Ok(Vec::new()),
        }
    }

    pub fn evaluate_code(&self, path: &Path, rule: &CodeRule) -> Result<Vec<String>, ScanError> {
        let size = file_size(path)?;
        let mut reports = Vec::new();

        if let Some(max_size) = threshold(rule.max_size) {
            if size > max_size {
                reports.push(violation(
                    "JS file size is larger than the recommended file size",
                    format_file_size(max_size),
                    &file_name(path),
                    format_file_size(size),
                ));
            }
        }

        Ok(reports)
    }

    pub fn evaluate_image(&self, path: &Path, rule: &ImageRule) -> Result<Vec<String>, ScanError> {
        let size = file_size(path)?;
        let (width, height) = self.decoders.image.dimensions(path)?;
        let name = file_name(path);
        let mut reports = Vec::new();

        let max_width = threshold(rule.max_width);
        let max_height = threshold(rule.max_height);
        let too_wide = max_width.is_some_and(|max| width > max);
        let too_tall = max_height.is_some_and(|max| height > max);
        if too_wide || too_tall {
            reports.push(violation(
                "Image is larger than the recommended max dimensions",
                format!("{}x{}", bound(max_width), bound(max_height)),
                &name,
                format!("{}x{}", width, height),
            ));
        }

        if rule.power_of_two && !(is_power_of_two(width) && is_power_of_two(height)) {
            reports.push(violation(
                "Image dimensions are recommended to be powers of two",
                "power of two",
                &name,
                format!("{}x{}", width, height),
            ));
        }

        if let Some(max_size) = threshold(rule.max_size) {
            if size > max_size {
                reports.push(violation(
                    "Image file size is larger than the recommended file size",
                    format_file_size(max_size),
                    &name,
                    format_file_size(size),
                ));
            }
        }

        Ok(reports)
    }

    pub fn evaluate_audio(&self, path: &Path, rule: &AudioRule) -> Result<Vec<String>, ScanError> {
        let size = file_size(path)?;
        let format = self.decoders.audio.format(path)?;
        let name = file_name(path);
        let mut reports = Vec::new();

        // only negative thresholds are checked
        if let Some(max_loudness) = rule.max_loudness.filter(|v| *v < 0.0) {
            let loudness = self.decoders.loudness.integrated_loudness(path)?;
            if loudness < max_loudness {
                reports.push(violation(
                    "Audio loudness is louder than the recommended loudness",
                    format!("{} LUFS", max_loudness),
                    &name,
                    format!("{} LUFS", loudness),
                ));
            }
        }

        if let Some(max_size) = threshold(rule.max_size) {
            if size > max_size {
                reports.push(violation(
                    "Audio file size is larger than the recommended file size",
                    format_file_size(max_size),
                    &name,
                    format_file_size(size),
                ));
            }
        }

        if let Some(max_channels) = threshold(rule.max_channels) {
            if format.channels > max_channels {
                reports.push(violation(
                    "Audio file contains more than the recommended number of channels",
                    max_channels,
                    &name,
                    format.channels,
                ));
            }
        }

        if let Some(sample_rate) = threshold(rule.sample_rate) {
            if format.sample_rate != sample_rate {
                reports.push(violation(
                    "Audio sample rate does not match the recommended sample rate",
                    sample_rate,
                    &name,
                    format.sample_rate,
                ));
            }
        }

        if let Some(duration) = threshold(rule.duration) {
            let measured = format.duration_ms();
            if measured > duration as f64 {
                reports.push(violation(
                    "Audio duration is larger than recommended duration",
                    duration,
                    &name,
                    trim_ms(measured),
                ));
            }
        }

        Ok(reports)
    }
}
