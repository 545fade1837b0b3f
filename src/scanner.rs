//! Scanner module - walks an asset tree and evaluates every file
//!
//! Each directory fans its children out onto the rayon pool and waits for
//! all of them. The first evaluation error short-circuits the walk and is
//! returned in place of a result; counters gathered so far are dropped.

use rayon::prelude::*;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::aggregator::ScanAggregator;
use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::evaluate::{Decoders, RuleEvaluator};
use crate::models::{AssetKind, Disposition, ScanResult};
use crate::progress::{ProgressReporter, DEFAULT_PROGRESS_INTERVAL_MS};

/// Lower-cased extension without the dot, empty if there is none
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

/// Recursive walk over one tree, recording into a shared aggregator
struct TreeWalker<'a> {
    config: &'a ScanConfig,
    evaluator: &'a RuleEvaluator,
    aggregator: &'a ScanAggregator,
    reporter: &'a ProgressReporter,
}

impl TreeWalker<'_> {
    fn walk(&self, path: &Path) -> Result<(), ScanError> {
        let metadata =
            std::fs::metadata(path).map_err(|e| ScanError::io(path.to_path_buf(), e))?;
        if metadata.is_dir() {
            let real =
                std::fs::canonicalize(path).map_err(|e| ScanError::io(path.to_path_buf(), e))?;
            self.walk_dir(path, &[real])
        } else {
            self.visit_file(path)
        }
    }

    /// Walk one directory. `chain` holds the resolved paths of `dir` and its
    /// ancestors; a linked directory already on the chain is a loop.
    fn walk_dir(&self, dir: &Path, chain: &[PathBuf]) -> Result<(), ScanError> {
        let entries = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;

        entries.par_iter().try_for_each(|entry| {
            let path = entry.path();
            let real = if entry.path_is_symlink() {
                if !path.is_dir() {
                    return self.visit_file(path);
                }
                std::fs::canonicalize(path).map_err(|e| ScanError::io(path.to_path_buf(), e))?
            } else if entry.file_type().is_dir() {
                match chain.last() {
                    Some(parent) => parent.join(entry.file_name()),
                    None => path.to_path_buf(),
                }
            } else {
                return self.visit_file(path);
            };

            if chain.contains(&real) {
                log::warn!("Skipping directory link loop {:?} -> {:?}", path, real);
                return Ok(());
            }
            let mut nested = chain.to_vec();
            nested.push(real);
            self.walk_dir(path, &nested)
        })
    }

    fn visit_file(&self, path: &Path) -> Result<(), ScanError> {
        let ext = extension_of(path);

        match self.config.disposition(&ext) {
            Disposition::Ignored => {
                log::debug!("Ignored {:?}", path);
                self.aggregator.record_ignored();
            }
            Disposition::Unpermitted => {
                log::debug!("Unpermitted type {:?}: {:?}", ext, path);
                self.aggregator.record_unpermitted(&ext);
            }
            Disposition::Asset(AssetKind::Unclassified) => {
                log::debug!("No rule for {:?}: {:?}", ext, path);
                self.aggregator.record_unclassified();
            }
            Disposition::Asset(kind) => {
                log::debug!("Evaluating {} asset {:?}", kind, path);
                let violations = self.evaluator.evaluate(path, &kind)?;
                self.aggregator.record_scanned(&ext, violations);
            }
        }

        self.reporter.report_progress(self.aggregator.counts(), path);
        Ok(())
    }
}

/// Runs scans with one configuration and one set of decoders.
///
/// Every call to [`Scanner::scan`] starts from fresh counters, so a scanner
/// can be reused and shared between threads.
#[derive(Debug)]
pub struct Scanner {
    config: ScanConfig,
    evaluator: RuleEvaluator,
    num_threads: usize,
    log_results: bool,
    show_progress: bool,
}

impl Scanner {
    /// Create a scanner with the default decoders
    pub fn new(config: ScanConfig) -> Self {
        Self {
            config,
            evaluator: RuleEvaluator::default(),
            num_threads: 0,
            log_results: false,
            show_progress: false,
        }
    }

    /// Replace the external decoders
    pub fn with_decoders(mut self, decoders: Decoders) -> Self {
        self.evaluator = RuleEvaluator::new(decoders);
        self
    }

    /// Worker threads for the walk; 0 uses the global rayon pool
    pub fn num_threads(mut self, threads: usize) -> Self {
        self.num_threads = threads;
        self
    }

    /// Print the report lines to stdout once the scan completes
    pub fn log_results(mut self, enabled: bool) -> Self {
        self.log_results = enabled;
        self
    }

    /// Emit JSON progress messages on stderr
    pub fn show_progress(mut self, enabled: bool) -> Self {
        self.show_progress = enabled;
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scan the tree rooted at `root`.
    ///
    /// Fails with the first evaluation error, or with
    /// [`ScanErrorKind::ThreadPool`](crate::error::ScanErrorKind::ThreadPool)
    /// when a dedicated pool cannot be started.
    pub fn scan(&self, root: &Path) -> Result<ScanResult, ScanError> {
        let reporter = ProgressReporter::new(self.show_progress, DEFAULT_PROGRESS_INTERVAL_MS);
        reporter.report_start(root);
        log::info!("Scanning assets at {:?}", root);

        let aggregator = ScanAggregator::new(root);
        let walker = TreeWalker {
            config: &self.config,
            evaluator: &self.evaluator,
            aggregator: &aggregator,
            reporter: &reporter,
        };

        let outcome = if self.num_threads > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.num_threads)
                .build()
                .map_err(|e| ScanError::thread_pool(e.to_string()))?;
            pool.install(|| walker.walk(root))
        } else {
            walker.walk(root)
        };

        if let Err(e) = outcome {
            log::error!("Scan of {:?} failed: {}", root, e);
            reporter.report_error(&e);
            return Err(e);
        }

        let result = aggregator.finalize(&self.config.required_types);
        log::info!(
            "Scan complete: {} scanned, {} skipped, {} ignored in {}ms",
            result.files.scanned,
            result.files.skipped,
            result.files.ignored,
            result.duration_ms()
        );

        if self.log_results {
            for line in &result.reports {
                println!("{}", line);
            }
        }
        reporter.report_done(&result);

        Ok(result)
    }
}

/// Scan `root` with `config` and the default decoders
pub fn scan(root: &Path, config: &ScanConfig) -> Result<ScanResult, ScanError> {
    Scanner::new(config.clone()).scan(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AudioRule, CodeRule, ImageRule};
    use crate::error::ScanErrorKind;
    use crate::loudness::LoudnessAnalyzer;
    use crate::probe::{AudioFormat, AudioFormatProbe, AudioProbe, ImageHeaderProbe};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn write_png(path: &Path, width: u32, height: u32) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = std::io::BufWriter::new(file);
        image::RgbaImage::new(width, height)
            .write_to(&mut writer, image::ImageFormat::Png)
            .unwrap();
    }

    fn write_wav(path: &Path, channels: u16, sample_rate: u32, frames: u32) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..frames * channels as u32 {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn touch(dir: &Path, name: &str, len: usize) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, vec![b'x'; len]).unwrap();
        path
    }

    struct FixedLoudness(f64);

    impl LoudnessAnalyzer for FixedLoudness {
        fn integrated_loudness(&self, _path: &Path) -> Result<f64, ScanError> {
            Ok(self.0)
        }
    }

    #[derive(Default)]
    struct CountingAudio {
        calls: AtomicUsize,
    }

    impl AudioProbe for CountingAudio {
        fn format(&self, _path: &Path) -> Result<AudioFormat, ScanError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(AudioFormat {
                channels: 1,
                sample_rate: 44100,
                duration_secs: 1.0,
            })
        }
    }

    fn offline_decoders(loudness: f64) -> Decoders {
        Decoders {
            image: Arc::new(ImageHeaderProbe),
            audio: Arc::new(AudioFormatProbe::new()),
            loudness: Arc::new(FixedLoudness(loudness)),
        }
    }

    fn game_tree() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("images/ui")).unwrap();
        std::fs::create_dir_all(root.join("audio")).unwrap();
        std::fs::create_dir_all(root.join("js")).unwrap();

        write_png(&root.join("images/hero.png"), 200, 200);
        write_png(&root.join("images/ui/button.png"), 64, 64);
        write_wav(&root.join("audio/theme.wav"), 2, 44100, 44100);
        touch(root, "js/game.js", 2048);
        touch(root, "js/game.js.map", 10);
        touch(root, "source.psd", 10);
        touch(root, "README.md", 10);
        touch(root, "LICENSE", 10);
        dir
    }

    fn game_config() -> ScanConfig {
        ScanConfig::builder()
            .code_rule("js", CodeRule { max_size: Some(1024) })
            .image_rule(
                "png",
                ImageRule {
                    max_width: Some(128),
                    max_height: Some(128),
                    power_of_two: true,
                    require: true,
                    ..Default::default()
                },
            )
            .image_rule("svg", ImageRule { require: true, ..Default::default() })
            .audio_rule(
                "wav",
                AudioRule {
                    max_channels: Some(1),
                    sample_rate: Some(44100),
                    ..Default::default()
                },
            )
            .ignore("map")
            .unpermitted("psd")
            .build()
    }

    #[test]
    fn test_full_tree() {
        let tree = game_tree();
        let result = Scanner::new(game_config())
            .with_decoders(offline_decoders(-20.0))
            .scan(tree.path())
            .unwrap();

        assert_eq!(result.files.scanned, 4);
        // psd, md and the extensionless LICENSE
        assert_eq!(result.files.skipped, 3);
        assert_eq!(result.files.ignored, 1);

        assert_eq!(result.scanned_types["png"], 2);
        assert_eq!(result.scanned_types["wav"], 1);
        assert_eq!(result.scanned_types["js"], 1);
        assert_eq!(result.unpermitted_types["psd"], 1);

        assert!(result.has_report_containing(
            "Image is larger than the recommended max dimensions [recommended = 128x128] [hero.png = 200x200]"
        ));
        assert!(result.has_report_containing(
            "Image dimensions are recommended to be powers of two [recommended = power of two] [hero.png = 200x200]"
        ));
        assert!(!result.has_report_containing("button.png"));
        assert!(result.has_report_containing(
            "Audio file contains more than the recommended number of channels [recommended = 1] [theme.wav = 2]"
        ));
        assert!(result.has_report_containing(
            "JS file size is larger than the recommended file size [recommended = 1 KB] [game.js = 2 KB]"
        ));

        let n = result.reports.len();
        assert_eq!(
            result.reports[n - 4],
            "Detected 1 unpermitted file type(s) [type = psd]"
        );
        assert_eq!(
            result.reports[n - 3],
            "Could not find file types matching [type = svg]"
        );
        assert!(result.reports[n - 2].starts_with("Scanned "));
        assert!(result.reports[n - 1]
            .ends_with("4 file(s) scanned, 3 file(s) skipped, 1 file(s) ignored"));
    }

    #[test]
    fn test_scenario_oversize_and_other_extension() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("big.png"), 200, 200);
        // PNG data under a different extension; the header is sniffed
        write_png(&dir.path().join("icon.tex"), 128, 128);

        let config = ScanConfig::builder()
            .image_rule(
                "png",
                ImageRule {
                    max_width: Some(100),
                    max_height: Some(100),
                    power_of_two: true,
                    require: true,
                    ..Default::default()
                },
            )
            .image_rule(
                "tex",
                ImageRule {
                    max_width: Some(256),
                    max_height: Some(256),
                    ..Default::default()
                },
            )
            .build();

        let result = scan(dir.path(), &config).unwrap();
        assert_eq!(result.files.scanned, 2);

        let oversize: Vec<_> = result
            .reports
            .iter()
            .filter(|line| line.contains("max dimensions"))
            .collect();
        assert_eq!(oversize.len(), 1);
        assert!(oversize[0].contains("[big.png = 200x200]"));
        assert!(!result.has_report_containing("icon.tex"));
        assert!(!result.has_report_containing("Could not find file types"));
    }

    #[test]
    fn test_scenario_unmatched_extension_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "notes.xyz", 5);

        let config = ScanConfig::builder()
            .image_rule("png", ImageRule::default())
            .ignore("txt")
            .unpermitted("exe")
            .build();
        let result = scan(dir.path(), &config).unwrap();

        assert_eq!(result.files.skipped, 1);
        assert_eq!(result.files.scanned, 0);
        assert_eq!(result.files.ignored, 0);
        // header and closing line only
        assert_eq!(result.reports.len(), 2);
        assert!(!result.has_report_containing("xyz"));
    }

    #[test]
    fn test_scenario_corrupt_audio_fails_whole_scan() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        for i in 0..20 {
            write_png(&dir.path().join(format!("a/sprite{}.png", i)), 16, 16);
        }
        write_wav(&dir.path().join("a/ok.wav"), 1, 22050, 100);
        std::fs::write(dir.path().join("a/b/broken.wav"), b"RIFF\0\0\0\0WAVEjunk").unwrap();

        let config = ScanConfig::builder()
            .image_rule("png", ImageRule::default())
            .audio_rule("wav", AudioRule::default())
            .build();

        let err = scan(dir.path(), &config).unwrap_err();
        assert_eq!(err.kind, ScanErrorKind::AudioDecode);
        assert!(err
            .path
            .as_ref()
            .is_some_and(|p| p.ends_with("broken.wav")));
    }

    #[test]
    fn test_missing_required_type_position() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("a.png"), 8, 8);
        touch(dir.path(), "x.exe", 1);

        let config = ScanConfig::builder()
            .image_rule("png", ImageRule::default())
            .image_rule("svg", ImageRule { require: true, ..Default::default() })
            .unpermitted("exe")
            .build();
        let result = scan(dir.path(), &config).unwrap();

        let missing: Vec<usize> = result
            .reports
            .iter()
            .enumerate()
            .filter(|(_, line)| line.contains("Could not find file types matching"))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(missing.len(), 1);
        assert!(result.reports[missing[0]].contains("[type = svg]"));

        let unpermitted = result
            .reports
            .iter()
            .position(|line| line.starts_with("Detected "))
            .unwrap();
        let scanned = result
            .reports
            .iter()
            .position(|line| line.starts_with("Scanned "))
            .unwrap();
        assert!(unpermitted < missing[0]);
        assert!(missing[0] < scanned);
    }

    #[test]
    fn test_image_rule_wins_over_audio_rule() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("clip.dat"), 4, 4);

        let audio = Arc::new(CountingAudio::default());
        let decoders = Decoders {
            image: Arc::new(ImageHeaderProbe),
            audio: audio.clone(),
            loudness: Arc::new(FixedLoudness(0.0)),
        };
        let config = ScanConfig::builder()
            .image_rule("dat", ImageRule::default())
            .audio_rule("dat", AudioRule::default())
            .build();

        let result = Scanner::new(config)
            .with_decoders(decoders)
            .scan(dir.path())
            .unwrap();
        assert_eq!(result.files.scanned, 1);
        assert_eq!(audio.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_ignore_is_substring_match() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "module.mjs", 1);
        touch(dir.path(), "main.js", 1);

        let config = ScanConfig::builder()
            .code_rule("js", CodeRule { max_size: Some(1) })
            .ignore("js")
            .build();
        let result = scan(dir.path(), &config).unwrap();
        assert_eq!(result.files.ignored, 2);
        assert_eq!(result.files.scanned, 0);
    }

    #[test]
    fn test_uppercase_extension_matches_rule() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("LOGO.PNG"), 300, 10);

        let config = ScanConfig::builder()
            .image_rule(
                "png",
                ImageRule {
                    max_width: Some(256),
                    ..Default::default()
                },
            )
            .build();
        let result = scan(dir.path(), &config).unwrap();
        assert_eq!(result.scanned_types["png"], 1);
        assert!(result.has_report_containing("[LOGO.PNG = 300x10]"));
    }

    #[test]
    fn test_loudness_threshold() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("music.wav"), 1, 44100, 100);

        let config = ScanConfig::builder()
            .audio_rule(
                "wav",
                AudioRule {
                    max_loudness: Some(-23.0),
                    ..Default::default()
                },
            )
            .build();

        let loud = Scanner::new(config.clone())
            .with_decoders(offline_decoders(-30.0))
            .scan(dir.path())
            .unwrap();
        assert!(loud.has_report_containing(
            "Audio loudness is louder than the recommended loudness [recommended = -23 LUFS] [music.wav = -30 LUFS]"
        ));

        let fine = Scanner::new(config)
            .with_decoders(offline_decoders(-18.0))
            .scan(dir.path())
            .unwrap();
        assert!(!fine.has_report_containing("loudness"));
    }

    #[test]
    fn test_repeated_scans_are_equivalent() {
        let tree = game_tree();
        let scanner = Scanner::new(game_config()).with_decoders(offline_decoders(-20.0));

        let first = scanner.scan(tree.path()).unwrap();
        let second = scanner.scan(tree.path()).unwrap();

        let mut first_scanned: Vec<_> = first.scanned_types.iter().collect();
        let mut second_scanned: Vec<_> = second.scanned_types.iter().collect();
        first_scanned.sort();
        second_scanned.sort();
        assert_eq!(first_scanned, second_scanned);
        assert_eq!(first.unpermitted_types, second.unpermitted_types);
        assert_eq!(first.files, second.files);

        let body = |result: &ScanResult| {
            let mut lines: Vec<String> = result
                .reports
                .iter()
                .filter(|line| !line.starts_with("Scan complete") && !line.starts_with("Scanned "))
                .cloned()
                .collect();
            lines.sort();
            lines
        };
        assert_eq!(body(&first), body(&second));
    }

    #[test]
    fn test_dedicated_thread_pool() {
        let tree = game_tree();
        let result = Scanner::new(game_config())
            .with_decoders(offline_decoders(-20.0))
            .num_threads(2)
            .scan(tree.path())
            .unwrap();
        assert_eq!(result.files.total(), 8);
    }

    #[test]
    fn test_single_file_root() {
        let dir = tempfile::tempdir().unwrap();
        let file = touch(dir.path(), "bundle.js", 4096);
        let config = ScanConfig::builder()
            .code_rule("js", CodeRule { max_size: Some(1024) })
            .build();

        let result = scan(&file, &config).unwrap();
        assert_eq!(result.files.scanned, 1);
        assert!(result.has_report_containing("[bundle.js = 4 KB]"));
    }

    #[test]
    fn test_missing_root() {
        let err = scan(Path::new("/no/such/asset/root"), &ScanConfig::default()).unwrap_err();
        assert_eq!(err.kind, ScanErrorKind::NotFound);
    }

    #[test]
    fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let result = scan(dir.path(), &ScanConfig::default()).unwrap();
        assert_eq!(result.files.total(), 0);
        assert_eq!(result.reports.len(), 2);
    }

    #[test]
    fn test_svg_sized_from_root_element() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("logo.svg"),
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="64" height="64"></svg>"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("banner.svg"),
            r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 300 50"></svg>"#,
        )
        .unwrap();

        let config = ScanConfig::builder()
            .image_rule(
                "svg",
                ImageRule {
                    max_width: Some(128),
                    require: true,
                    ..Default::default()
                },
            )
            .build();
        let result = scan(dir.path(), &config).unwrap();

        assert_eq!(result.files.scanned, 2);
        assert!(result.has_report_containing(
            "Image is larger than the recommended max dimensions [recommended = 128xany] [banner.svg = 300x50]"
        ));
        assert!(!result.has_report_containing("logo.svg"));
        assert!(!result.has_report_containing("Could not find file types"));
    }

    #[cfg(unix)]
    #[test]
    fn test_linked_directory_is_walked() {
        let dir = tempfile::tempdir().unwrap();
        let shared = dir.path().join("shared");
        let root = dir.path().join("deploy");
        std::fs::create_dir_all(&shared).unwrap();
        std::fs::create_dir_all(&root).unwrap();
        write_png(&shared.join("a.png"), 8, 8);
        std::os::unix::fs::symlink(&shared, root.join("levels")).unwrap();
        // a link named like an asset must not be decoded as one
        std::os::unix::fs::symlink(&shared, root.join("atlas.png")).unwrap();

        let config = ScanConfig::builder()
            .image_rule("png", ImageRule::default())
            .build();
        let result = scan(&root, &config).unwrap();

        assert_eq!(result.files.scanned, 2);
        assert_eq!(result.files.skipped, 0);
        assert_eq!(result.files.ignored, 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_directory_link_loop_terminates() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("a/b")).unwrap();
        std::fs::create_dir_all(root.join("c")).unwrap();
        touch(root, "a/b/one.js", 1);
        touch(root, "c/two.js", 1);
        std::os::unix::fs::symlink(root, root.join("a/b/up")).unwrap();
        std::os::unix::fs::symlink(root.join("a"), root.join("c/to_a")).unwrap();
        std::os::unix::fs::symlink(root.join("c"), root.join("a/to_c")).unwrap();

        let config = ScanConfig::builder()
            .code_rule("js", CodeRule::default())
            .build();
        let result = scan(root, &config).unwrap();

        // one.js is reached through a/ and c/to_a/, two.js through c/ and a/to_c/
        assert_eq!(result.files.scanned, 4);
        assert_eq!(result.files.skipped, 0);
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of(Path::new("a/b/Hero.PNG")), "png");
        assert_eq!(extension_of(Path::new("archive.tar.gz")), "gz");
        assert_eq!(extension_of(Path::new(".gitignore")), "");
        assert_eq!(extension_of(Path::new("LICENSE")), "");
    }
}
