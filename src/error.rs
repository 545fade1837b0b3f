//! Error types for the asset scanner

use std::path::PathBuf;
use thiserror::Error;

/// Error kinds that can occur during scanning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanErrorKind {
    /// Permission denied when accessing a file or directory
    PermissionDenied,
    /// File or directory not found
    NotFound,
    /// I/O error during file operations
    IoError,
    /// Path cannot be used as a scan root
    InvalidPath,
    /// Image header could not be decoded
    ImageDecode,
    /// Audio format metadata could not be decoded
    AudioDecode,
    /// An external decoder could not be started or exited unsuccessfully
    ExternalProcess,
    /// Loudness analysis output did not contain an integrated loudness value
    LoudnessParse,
    /// Configuration file could not be read or parsed
    Config,
    /// The worker thread pool could not be started
    ThreadPool,
}

/// Represents an error that occurred during scanning
#[derive(Debug, Error)]
#[error("{kind:?}: {message} (path: {path:?})")]
pub struct ScanError {
    /// The kind of error
    pub kind: ScanErrorKind,
    /// The path where the error occurred
    pub path: Option<PathBuf>,
    /// Human-readable error message
    pub message: String,
}

impl ScanError {
    /// Create a new scan error
    pub fn new(kind: ScanErrorKind, path: Option<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path,
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(path: PathBuf) -> Self {
        Self::new(
            ScanErrorKind::NotFound,
            Some(path.clone()),
            format!("Not found: {:?}", path),
        )
    }

    /// Create an invalid path error
    pub fn invalid_path(path: PathBuf, message: impl Into<String>) -> Self {
        Self::new(ScanErrorKind::InvalidPath, Some(path), message)
    }

    /// Wrap an I/O error with the path it happened on
    pub fn io(path: PathBuf, err: std::io::Error) -> Self {
        let mut error = Self::from(err);
        error.path = Some(path);
        error
    }

    /// Create an image decode error
    pub fn image_decode(path: PathBuf, message: impl Into<String>) -> Self {
        Self::new(ScanErrorKind::ImageDecode, Some(path), message)
    }

    /// Create an audio decode error
    pub fn audio_decode(path: PathBuf, message: impl Into<String>) -> Self {
        Self::new(ScanErrorKind::AudioDecode, Some(path), message)
    }

    /// Create an external process error
    pub fn external_process(path: Option<PathBuf>, message: impl Into<String>) -> Self {
        Self::new(ScanErrorKind::ExternalProcess, path, message)
    }

    /// Create a loudness parse error
    pub fn loudness_parse(path: PathBuf, message: impl Into<String>) -> Self {
        Self::new(ScanErrorKind::LoudnessParse, Some(path), message)
    }

    /// Create a configuration error
    pub fn config(path: Option<PathBuf>, message: impl Into<String>) -> Self {
        Self::new(ScanErrorKind::Config, path, message)
    }

    /// Create a thread pool error
    pub fn thread_pool(message: impl Into<String>) -> Self {
        Self::new(ScanErrorKind::ThreadPool, None, message)
    }
}

impl From<std::io::Error> for ScanError {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::PermissionDenied => ScanErrorKind::PermissionDenied,
            std::io::ErrorKind::NotFound => ScanErrorKind::NotFound,
            _ => ScanErrorKind::IoError,
        };
        Self::new(kind, None, err.to_string())
    }
}

impl From<walkdir::Error> for ScanError {
    fn from(err: walkdir::Error) -> Self {
        let path = err.path().map(|p| p.to_path_buf());
        let kind = match err.io_error().map(|e| e.kind()) {
            Some(std::io::ErrorKind::PermissionDenied) => ScanErrorKind::PermissionDenied,
            Some(std::io::ErrorKind::NotFound) => ScanErrorKind::NotFound,
            _ => ScanErrorKind::IoError,
        };
        Self::new(kind, path, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_kind_mapping() {
        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert_eq!(ScanError::from(denied).kind, ScanErrorKind::PermissionDenied);

        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(ScanError::from(missing).kind, ScanErrorKind::NotFound);

        let other = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert_eq!(ScanError::from(other).kind, ScanErrorKind::IoError);
    }

    #[test]
    fn test_io_with_path() {
        let err = ScanError::io(
            PathBuf::from("/assets/a.png"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.kind, ScanErrorKind::NotFound);
        assert_eq!(err.path, Some(PathBuf::from("/assets/a.png")));
    }

    #[test]
    fn test_display_contains_message() {
        let err = ScanError::loudness_parse(PathBuf::from("a.ogg"), "no integrated loudness");
        let text = err.to_string();
        assert!(text.contains("LoudnessParse"));
        assert!(text.contains("no integrated loudness"));
    }

    #[test]
    fn test_thread_pool_error_has_own_kind() {
        let err = ScanError::thread_pool("could not spawn worker");
        assert_eq!(err.kind, ScanErrorKind::ThreadPool);
        assert_ne!(err.kind, ScanErrorKind::IoError);
        assert!(err.path.is_none());
        assert!(err.to_string().starts_with("ThreadPool: could not spawn worker"));
    }
}
