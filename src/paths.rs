//! Path expansion and validation helpers

use std::path::{Component, Path, PathBuf};

use crate::error::ScanError;

/// Replace a leading `~` with the home directory and make the path absolute
pub fn expand_path(raw: &str) -> PathBuf {
    let expanded = match raw.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') || rest.starts_with('\\') => {
            match directories::BaseDirs::new() {
                Some(dirs) => dirs
                    .home_dir()
                    .join(rest.trim_start_matches(['/', '\\'])),
                None => PathBuf::from(raw),
            }
        }
        _ => PathBuf::from(raw),
    };

    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(expanded),
            Err(_) => expanded,
        }
    };
    normalize(&absolute)
}

/// Lexically resolve `.` and `..` components
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Whether the expanded path exists and is a directory
pub fn is_directory(raw: &str) -> bool {
    expand_path(raw).is_dir()
}

/// Whether the expanded path exists and is a regular file
pub fn is_file(raw: &str) -> bool {
    expand_path(raw).is_file()
}

/// Check that a game build path exists, is a directory and holds an `index.html`
pub fn validate_game_path(raw: &str) -> Result<PathBuf, ScanError> {
    let full = expand_path(raw);

    if !full.exists() {
        return Err(ScanError::not_found(full));
    }
    if !full.is_dir() {
        return Err(ScanError::invalid_path(
            full.clone(),
            format!("{} (resolved to {}) is not a directory", raw, full.display()),
        ));
    }
    if !full.join("index.html").is_file() {
        return Err(ScanError::invalid_path(
            full.clone(),
            format!(
                "{} (resolved to {}) did not contain an index.html",
                raw,
                full.display()
            ),
        ));
    }

    log::info!("{} valid", raw);
    Ok(full)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScanErrorKind;

    #[test]
    fn test_expand_home() {
        let Some(dirs) = directories::BaseDirs::new() else {
            return;
        };
        assert_eq!(expand_path("~"), normalize(dirs.home_dir()));
        assert_eq!(
            expand_path("~/games/demo"),
            normalize(&dirs.home_dir().join("games/demo"))
        );
    }

    #[test]
    fn test_tilde_inside_name_is_kept() {
        let expanded = expand_path("/tmp/~backup");
        assert_eq!(expanded, PathBuf::from("/tmp/~backup"));
    }

    #[test]
    fn test_relative_paths_become_absolute() {
        let expanded = expand_path("assets/../deploy/./images");
        assert!(expanded.is_absolute());
        assert!(expanded.ends_with("deploy/images"));
    }

    #[test]
    fn test_is_directory_and_is_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "x").unwrap();

        let dir_str = dir.path().to_str().unwrap();
        let file_str = file.to_str().unwrap();
        assert!(is_directory(dir_str));
        assert!(!is_file(dir_str));
        assert!(is_file(file_str));
        assert!(!is_directory(file_str));
        assert!(!is_file("/no/such/path/here"));
    }

    #[test]
    fn test_validate_game_path() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_str().unwrap().to_string();

        let err = validate_game_path(&root).unwrap_err();
        assert_eq!(err.kind, ScanErrorKind::InvalidPath);
        assert!(err.message.contains("index.html"));

        std::fs::write(dir.path().join("index.html"), "<html></html>").unwrap();
        let resolved = validate_game_path(&root).unwrap();
        assert!(resolved.join("index.html").is_file());

        let file = dir.path().join("index.html");
        let err = validate_game_path(file.to_str().unwrap()).unwrap_err();
        assert_eq!(err.kind, ScanErrorKind::InvalidPath);

        let err = validate_game_path("/no/such/game").unwrap_err();
        assert_eq!(err.kind, ScanErrorKind::NotFound);
    }
}
