//! Configuration for the asset scanner
//!
//! A scan is driven by a loosely-structured JSON document ([`RawConfig`]) that
//! is turned into an immutable [`ScanConfig`]: typed rule tables, compiled
//! ignore/unpermitted matchers and the list of required extensions.

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ScanError;
use crate::models::{AssetKind, Disposition};

/// Key of the only code-asset rule currently understood
pub const JS_RULE: &str = "js";

/// Size limit for code assets
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CodeRule {
    /// Maximum file size in bytes
    pub max_size: Option<u64>,
}

/// Constraints for one image extension
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ImageRule {
    /// Maximum width in pixels
    pub max_width: Option<u32>,
    /// Maximum height in pixels
    pub max_height: Option<u32>,
    /// Maximum file size in bytes
    pub max_size: Option<u64>,
    /// Both dimensions must be powers of two
    pub power_of_two: bool,
    /// At least one file with this extension must exist
    pub require: bool,
}

/// Constraints for one audio extension
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AudioRule {
    /// Maximum file size in bytes
    pub max_size: Option<u64>,
    /// Maximum channel count
    pub max_channels: Option<u16>,
    /// Exact expected sample rate in Hz
    pub sample_rate: Option<u32>,
    /// Maximum duration in milliseconds
    pub duration: Option<u64>,
    /// Integrated loudness threshold in LUFS (only negative values are checked)
    pub max_loudness: Option<f64>,
    /// At least one file with this extension must exist
    pub require: bool,
}

/// Rule tables as they appear in the configuration document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawRules {
    pub code: Option<IndexMap<String, CodeRule>>,
    pub images: Option<IndexMap<String, ImageRule>>,
    pub audio: Option<IndexMap<String, AudioRule>>,
}

/// The configuration document before compilation. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub rules: Option<RawRules>,
    pub ignore: Option<Vec<String>>,
    pub unpermitted: Option<Vec<String>>,
}

/// Matches bare extensions against a configured extension list.
///
/// Entries are joined into one unanchored alternation, so an entry matches
/// any extension that contains it (`js` matches `mjs`). An empty list never
/// matches anything.
#[derive(Debug, Clone, Default)]
pub enum ExtensionMatcher {
    #[default]
    Never,
    Pattern(Regex),
}

impl ExtensionMatcher {
    /// Compile a matcher from a list of extensions
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let alternatives: Vec<String> = entries
            .into_iter()
            .filter_map(|entry| {
                let ext = normalize_extension(entry.as_ref());
                if ext.is_empty() {
                    log::warn!("Dropping blank extension entry {:?}", entry.as_ref());
                    None
                } else {
                    Some(regex::escape(&ext))
                }
            })
            .collect();

        if alternatives.is_empty() {
            return ExtensionMatcher::Never;
        }

        match Regex::new(&alternatives.join("|")) {
            Ok(pattern) => ExtensionMatcher::Pattern(pattern),
            Err(e) => {
                log::warn!("Extension list could not be compiled, matching nothing: {}", e);
                ExtensionMatcher::Never
            }
        }
    }

    /// Substring test against a bare extension
    pub fn is_match(&self, ext: &str) -> bool {
        match self {
            ExtensionMatcher::Never => false,
            ExtensionMatcher::Pattern(pattern) => pattern.is_match(ext),
        }
    }

    /// The compiled alternation, if any
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ExtensionMatcher::Never => None,
            ExtensionMatcher::Pattern(pattern) => Some(pattern.as_str()),
        }
    }
}

/// Lower-case an extension and strip a leading dot
pub fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

/// Normalise rule keys. Keys that collapse onto one extension keep the first
/// key's position and the last key's rule.
fn normalize_keys<R>(section: &str, table: Option<IndexMap<String, R>>) -> IndexMap<String, R> {
    let mut normalized = IndexMap::new();
    for (key, rule) in table.unwrap_or_default() {
        let ext = normalize_extension(&key);
        if normalized.insert(ext.clone(), rule).is_some() {
            log::warn!(
                "Duplicate {} rule for {:?} (from key {:?}), keeping the later rule",
                section,
                ext,
                key
            );
        }
    }
    normalized
}

/// Compiled, immutable configuration for one scan
#[derive(Debug, Clone, Default)]
pub struct ScanConfig {
    /// Code rules by asset kind (only `js` is consulted)
    pub code_rules: IndexMap<String, CodeRule>,
    /// Image rules by extension
    pub image_rules: IndexMap<String, ImageRule>,
    /// Audio rules by extension
    pub audio_rules: IndexMap<String, AudioRule>,
    /// Extensions excluded from the scan
    pub ignored: ExtensionMatcher,
    /// Extensions that must never appear
    pub unpermitted: ExtensionMatcher,
    /// Extensions that must appear at least once, image rules first
    pub required_types: Vec<String>,
}

impl ScanConfig {
    /// Compile a raw configuration. Missing sections become empty tables.
    pub fn parse(raw: RawConfig) -> Self {
        let rules = raw.rules.unwrap_or_default();
        let code_rules = normalize_keys("code", rules.code);
        let image_rules = normalize_keys("image", rules.images);
        let audio_rules = normalize_keys("audio", rules.audio);

        let required_types = image_rules
            .iter()
            .filter(|(_, rule)| rule.require)
            .map(|(ext, _)| ext.clone())
            .chain(
                audio_rules
                    .iter()
                    .filter(|(_, rule)| rule.require)
                    .map(|(ext, _)| ext.clone()),
            )
            .collect();

        Self {
            code_rules,
            image_rules,
            audio_rules,
            ignored: ExtensionMatcher::from_entries(raw.ignore.unwrap_or_default()),
            unpermitted: ExtensionMatcher::from_entries(raw.unpermitted.unwrap_or_default()),
            required_types,
        }
    }

    /// Parse a JSON configuration document
    pub fn from_json_str(json: &str) -> Result<Self, ScanError> {
        let raw: RawConfig =
            serde_json::from_str(json).map_err(|e| ScanError::config(None, e.to_string()))?;
        Ok(Self::parse(raw))
    }

    /// Read and parse a JSON configuration file
    pub fn load(path: &Path) -> Result<Self, ScanError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ScanError::io(path.to_path_buf(), e))?;
        let raw: RawConfig = serde_json::from_str(&content)
            .map_err(|e| ScanError::config(Some(path.to_path_buf()), e.to_string()))?;
        Ok(Self::parse(raw))
    }

    /// Create a config builder
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::new()
    }

    /// Pick the rule family for an extension: code, then image, then audio
    pub fn classify(&self, ext: &str) -> AssetKind<'_> {
        if ext == JS_RULE {
            if let Some(rule) = self.code_rules.get(JS_RULE) {
                return AssetKind::Code(rule);
            }
        }
        if let Some(rule) = self.image_rules.get(ext) {
            return AssetKind::Image(rule);
        }
        if let Some(rule) = self.audio_rules.get(ext) {
            return AssetKind::Audio(rule);
        }
        AssetKind::Unclassified
    }

    /// Decide what happens to a file with this extension
    pub fn disposition(&self, ext: &str) -> Disposition<'_> {
        if self.ignored.is_match(ext) {
            Disposition::Ignored
        } else if self.unpermitted.is_match(ext) {
            Disposition::Unpermitted
        } else {
            Disposition::Asset(self.classify(ext))
        }
    }
}

/// Builder for ScanConfig
#[derive(Debug, Default)]
pub struct ScanConfigBuilder {
    raw: RawConfig,
}

impl ScanConfigBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    fn rules(&mut self) -> &mut RawRules {
        self.raw.rules.get_or_insert_with(RawRules::default)
    }

    /// Set the rule for a code asset kind
    pub fn code_rule(mut self, kind: impl Into<String>, rule: CodeRule) -> Self {
        self.rules()
            .code
            .get_or_insert_with(IndexMap::new)
            .insert(kind.into(), rule);
        self
    }

    /// Set the rule for an image extension
    pub fn image_rule(mut self, ext: impl Into<String>, rule: ImageRule) -> Self {
        self.rules()
            .images
            .get_or_insert_with(IndexMap::new)
            .insert(ext.into(), rule);
        self
    }

    /// Set the rule for an audio extension
    pub fn audio_rule(mut self, ext: impl Into<String>, rule: AudioRule) -> Self {
        self.rules()
            .audio
            .get_or_insert_with(IndexMap::new)
            .insert(ext.into(), rule);
        self
    }

    /// Add an ignored extension
    pub fn ignore(mut self, ext: impl Into<String>) -> Self {
        self.raw.ignore.get_or_insert_with(Vec::new).push(ext.into());
        self
    }

    /// Add an unpermitted extension
    pub fn unpermitted(mut self, ext: impl Into<String>) -> Self {
        self.raw
            .unpermitted
            .get_or_insert_with(Vec::new)
            .push(ext.into());
        self
    }

    /// Build the config
    pub fn build(self) -> ScanConfig {
        ScanConfig::parse(self.raw)
    }
}
