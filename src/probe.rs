//! Asset metadata decoders
//!
//! The scanner never decodes pixels or samples itself. Image dimensions come
//! from the image header (or the root element of an SVG document), PCM WAV
//! format data from `hound`, and every other audio container is handed to
//! `ffprobe`.

use regex::Regex;
use serde::Deserialize;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use crate::error::ScanError;

/// Environment override for the ffprobe binary
pub const FFPROBE_ENV: &str = "ASSET_SCANNER_FFPROBE";

/// Reads pixel dimensions of an image file
pub trait ImageProbe: Send + Sync {
    fn dimensions(&self, path: &Path) -> Result<(u32, u32), ScanError>;
}

/// Format metadata of an audio file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioFormat {
    /// Number of channels
    pub channels: u16,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Duration in seconds
    pub duration_secs: f64,
}

impl AudioFormat {
    /// Duration in milliseconds
    pub fn duration_ms(&self) -> f64 {
        self.duration_secs * 1000.0
    }
}

/// Reads format metadata of an audio file
pub trait AudioProbe: Send + Sync {
    fn format(&self, path: &Path) -> Result<AudioFormat, ScanError>;
}

fn lower_extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

/// Header-only image probe backed by the `image` crate; SVG documents are
/// sized from their root element
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageHeaderProbe;

impl ImageProbe for ImageHeaderProbe {
    fn dimensions(&self, path: &Path) -> Result<(u32, u32), ScanError> {
        if lower_extension(path) == "svg" {
            let bytes = std::fs::read(path).map_err(|e| ScanError::io(path.to_path_buf(), e))?;
            return parse_svg_dimensions(path, &String::from_utf8_lossy(&bytes));
        }

        let reader = image::ImageReader::open(path)
            .map_err(|e| ScanError::io(path.to_path_buf(), e))?
            .with_guessed_format()
            .map_err(|e| ScanError::io(path.to_path_buf(), e))?;
        reader
            .into_dimensions()
            .map_err(|e| ScanError::image_decode(path.to_path_buf(), e.to_string()))
    }
}

fn svg_root_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<svg\b([^>]*)>").expect("valid svg root regex"))
}

fn svg_attr_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
            .expect("valid svg attribute regex")
    })
}

/// Absolute length in user units; relative units and percentages give `None`
fn svg_length(value: &str) -> Option<f64> {
    let value = value.trim();
    let number = value.strip_suffix("px").unwrap_or(value).trim();
    number.parse::<f64>().ok().filter(|n| n.is_finite() && *n > 0.0)
}

fn svg_view_box(value: &str) -> Option<(f64, f64)> {
    let parts: Vec<f64> = value
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|p| !p.is_empty())
        .map(|p| p.parse::<f64>())
        .collect::<Result<_, _>>()
        .ok()?;
    match parts.as_slice() {
        [_, _, w, h] if *w > 0.0 && *h > 0.0 => Some((*w, *h)),
        _ => None,
    }
}

/// Size an SVG document from the `width`/`height` of its root element,
/// falling back to the `viewBox` extent for missing or relative lengths
pub fn parse_svg_dimensions(path: &Path, text: &str) -> Result<(u32, u32), ScanError> {
    let attrs = svg_root_regex()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .ok_or_else(|| ScanError::image_decode(path.to_path_buf(), "no <svg> root element"))?
        .as_str();

    let (mut width, mut height, mut view_box) = (None, None, None);
    for caps in svg_attr_regex().captures_iter(attrs) {
        let value = caps.get(2).or_else(|| caps.get(3)).map_or("", |m| m.as_str());
        match &caps[1] {
            "width" => width = svg_length(value),
            "height" => height = svg_length(value),
            "viewBox" => view_box = svg_view_box(value),
            _ => {}
        }
    }

    let width = width.or(view_box.map(|(w, _)| w));
    let height = height.or(view_box.map(|(_, h)| h));
    match (width, height) {
        (Some(w), Some(h)) => Ok((w.round() as u32, h.round() as u32)),
        _ => Err(ScanError::image_decode(
            path.to_path_buf(),
            "svg root has neither absolute width/height nor a viewBox",
        )),
    }
}

const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_IEEE_FLOAT: u16 = 0x0003;

/// Format tag of a RIFF/WAVE file's `fmt ` chunk; `None` if the file is not
/// a well-formed RIFF/WAVE container
fn wav_format_tag(path: &Path) -> Result<Option<u16>, ScanError> {
    let mut file = File::open(path).map_err(|e| ScanError::io(path.to_path_buf(), e))?;

    let mut header = [0u8; 12];
    if file.read_exact(&mut header).is_err() {
        return Ok(None);
    }
    if &header[0..4] != b"RIFF" || &header[8..12] != b"WAVE" {
        return Ok(None);
    }

    let mut chunk = [0u8; 8];
    while file.read_exact(&mut chunk).is_ok() {
        if &chunk[0..4] == b"fmt " {
            let mut tag = [0u8; 2];
            return Ok(file.read_exact(&mut tag).ok().map(|_| u16::from_le_bytes(tag)));
        }
        let len = u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]) as i64;
        // chunks are word aligned
        if file.seek(SeekFrom::Current(len + (len & 1))).is_err() {
            break;
        }
    }
    Ok(None)
}

/// Audio probe: PCM and float WAV through `hound`, everything else
/// (compressed WAV included) through `ffprobe`
#[derive(Debug, Clone, Default)]
pub struct AudioFormatProbe {
    ffprobe: Option<PathBuf>,
}

impl AudioFormatProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific ffprobe binary instead of searching for one
    pub fn with_ffprobe(mut self, path: PathBuf) -> Self {
        self.ffprobe = Some(path);
        self
    }

    fn probe_wav(path: &Path) -> Result<AudioFormat, ScanError> {
        let reader = hound::WavReader::open(path)
            .map_err(|e| ScanError::audio_decode(path.to_path_buf(), e.to_string()))?;
        let spec = reader.spec();
        if spec.sample_rate == 0 {
            return Err(ScanError::audio_decode(
                path.to_path_buf(),
                "WAV header reports a zero sample rate",
            ));
        }
        Ok(AudioFormat {
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            duration_secs: reader.duration() as f64 / spec.sample_rate as f64,
        })
    }

    fn probe_external(&self, path: &Path) -> Result<AudioFormat, ScanError> {
        let binary = match &self.ffprobe {
            Some(binary) => binary.clone(),
            None => find_tool("ffprobe", FFPROBE_ENV)?,
        };

        let mut cmd = Command::new(&binary);
        cmd.args(["-v", "error", "-select_streams", "a:0"])
            .args(["-show_entries", "stream=channels,sample_rate:format=duration"])
            .args(["-of", "json"])
            .arg(path);
        let output = run_tool(cmd, &binary, path)?;
        parse_ffprobe_json(path, &output.stdout)
    }
}

impl AudioProbe for AudioFormatProbe {
    fn format(&self, path: &Path) -> Result<AudioFormat, ScanError> {
        match lower_extension(path).as_str() {
            "wav" | "wave" => match wav_format_tag(path)? {
                None => Err(ScanError::audio_decode(
                    path.to_path_buf(),
                    "not a RIFF/WAVE file or missing fmt chunk",
                )),
                Some(WAVE_FORMAT_PCM | WAVE_FORMAT_IEEE_FLOAT) => Self::probe_wav(path),
                Some(tag) => Self::probe_wav(path).or_else(|e| {
                    log::debug!(
                        "WAV format tag {:#06x} in {:?} not readable by hound ({}), using ffprobe",
                        tag,
                        path,
                        e.message
                    );
                    self.probe_external(path)
                }),
            },
            _ => self.probe_external(path),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    channels: Option<u16>,
    sample_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Parse `ffprobe -of json` output for the first audio stream
pub fn parse_ffprobe_json(path: &Path, json: &str) -> Result<AudioFormat, ScanError> {
    let decode_err = |msg: String| ScanError::audio_decode(path.to_path_buf(), msg);

    let output: FfprobeOutput =
        serde_json::from_str(json).map_err(|e| decode_err(format!("ffprobe output: {}", e)))?;
    let stream = output
        .streams
        .first()
        .ok_or_else(|| decode_err("no audio stream found".to_string()))?;

    let channels = stream
        .channels
        .ok_or_else(|| decode_err("missing channel count".to_string()))?;
    let sample_rate = stream
        .sample_rate
        .as_deref()
        .and_then(|rate| rate.parse::<u32>().ok())
        .ok_or_else(|| decode_err("missing or invalid sample rate".to_string()))?;
    let duration_secs = output
        .format
        .and_then(|format| format.duration)
        .and_then(|duration| duration.parse::<f64>().ok())
        .ok_or_else(|| decode_err("missing or invalid duration".to_string()))?;

    Ok(AudioFormat {
        channels,
        sample_rate,
        duration_secs,
    })
}

/// Captured output of a finished external tool
#[derive(Debug)]
pub(crate) struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Locate an external tool: environment override first, then PATH
pub(crate) fn find_tool(name: &str, env_var: &str) -> Result<PathBuf, ScanError> {
    if let Ok(path) = std::env::var(env_var) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Ok(path);
        }
        log::warn!("{} points to missing binary {:?}", env_var, path);
    }

    which::which(name)
        .map_err(|e| ScanError::external_process(None, format!("{} not found: {}", name, e)))
}

/// Run a prepared command to completion; a non-zero exit is an error
pub(crate) fn run_tool(
    mut cmd: Command,
    binary: &Path,
    target: &Path,
) -> Result<ToolOutput, ScanError> {
    log::debug!("Running {:?} on {:?}", binary, target);

    let output = cmd.output().map_err(|e| {
        ScanError::external_process(
            Some(target.to_path_buf()),
            format!("failed to start {:?}: {}", binary, e),
        )
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        let code = output.status.code().unwrap_or(-1);
        let last_line = stderr.lines().last().unwrap_or("").trim().to_string();
        return Err(ScanError::external_process(
            Some(target.to_path_buf()),
            format!("{:?} exited with code {}: {}", binary, code, last_line),
        ));
    }

    Ok(ToolOutput { stdout, stderr })
}
