//! Integrated loudness measurement through ffmpeg's `loudnorm` filter

use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use crate::error::ScanError;
use crate::probe::{find_tool, run_tool};

/// Environment override for the ffmpeg binary
pub const FFMPEG_ENV: &str = "ASSET_SCANNER_FFMPEG";

const INTEGRATED_PATTERN: &str = r"Input Integrated:\s*(-?[0-9]+(?:\.[0-9]+)?)\s*LUFS";

static INTEGRATED_REGEX: OnceLock<Regex> = OnceLock::new();

fn integrated_regex() -> &'static Regex {
    INTEGRATED_REGEX.get_or_init(|| Regex::new(INTEGRATED_PATTERN).expect("invalid regex pattern"))
}

/// Measures integrated loudness (LUFS) of an audio file
pub trait LoudnessAnalyzer: Send + Sync {
    fn integrated_loudness(&self, path: &Path) -> Result<f64, ScanError>;
}

/// Extract the `Input Integrated: <n> LUFS` value from loudnorm output
pub fn parse_integrated_loudness(output: &str) -> Option<f64> {
    integrated_regex()
        .captures(output)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

/// Runs `ffmpeg -af loudnorm=print_format=summary` and reads its summary
#[derive(Debug, Clone, Default)]
pub struct FfmpegLoudness {
    ffmpeg: Option<PathBuf>,
}

impl FfmpegLoudness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific ffmpeg binary instead of searching for one
    pub fn with_ffmpeg(mut self, path: PathBuf) -> Self {
        self.ffmpeg = Some(path);
        self
    }
}

impl LoudnessAnalyzer for FfmpegLoudness {
    fn integrated_loudness(&self, path: &Path) -> Result<f64, ScanError> {
        let binary = match &self.ffmpeg {
            Some(binary) => binary.clone(),
            None => find_tool("ffmpeg", FFMPEG_ENV)?,
        };

        let mut cmd = Command::new(&binary);
        cmd.args(["-hide_banner", "-nostats", "-i"])
            .arg(path)
            .args(["-af", "loudnorm=print_format=summary", "-f", "null", "-"]);
        let output = run_tool(cmd, &binary, path)?;

        // loudnorm prints its summary on stderr
        parse_integrated_loudness(&output.stderr)
            .or_else(|| parse_integrated_loudness(&output.stdout))
            .ok_or_else(|| {
                ScanError::loudness_parse(
                    path.to_path_buf(),
                    "ffmpeg output did not contain an integrated loudness value",
                )
            })
    }
}
