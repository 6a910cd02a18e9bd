use super::plan::has_recognized_extension;
use crate::errors::LoadError;
use std::fs;
use std::path::{Path, PathBuf};

/// Conventional model filenames, checked in order inside every search directory.
pub const CONVENTIONAL_FILENAMES: [&str; 6] = [
    "yolov8n_best_model.pt",
    "model.pth",
    "model.pt",
    "best_model.pth",
    "weights.pth",
    "cotton_weed_model.pth",
];

pub const DEFAULT_MODEL_DIRS: [&str; 2] = ["models", "../models"];

/// Where to look for a model when no explicit path is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPaths {
    pub dirs: Vec<PathBuf>,
    pub filenames: Vec<String>,
}

impl Default for SearchPaths {
    fn default() -> Self {
        Self::with_dirs(DEFAULT_MODEL_DIRS)
    }
}

impl SearchPaths {
    pub fn with_dirs<I, P>(dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            dirs: dirs.into_iter().map(Into::into).collect(),
            filenames: CONVENTIONAL_FILENAMES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Resolves the model file to load.
    ///
    /// Order: explicit path, then the first conventional filename present in any
    /// search directory, then the first recognized file (by name) in a search
    /// directory.
    pub fn resolve(&self, explicit: Option<&Path>) -> Result<PathBuf, LoadError> {
        if let Some(path) = explicit {
            return if path.exists() {
                Ok(absolute(path))
            } else {
                Err(LoadError::ModelNotFound(path.display().to_string()))
            };
        }

        for dir in &self.dirs {
            for name in &self.filenames {
                let candidate = dir.join(name);
                if candidate.is_file() {
                    tracing::debug!(path = %candidate.display(), "Found conventional model file");
                    return Ok(absolute(&candidate));
                }
            }
        }

        for dir in &self.dirs {
            if let Some(found) = first_recognized_file(dir) {
                tracing::debug!(path = %found.display(), "Found model file by extension");
                return Ok(absolute(&found));
            }
        }

        Err(LoadError::ModelNotFound(format!(
            "no model in {} (supported formats: .pth, .pt, .h5, .onnx, .pb)",
            self.dirs
                .iter()
                .map(|d| d.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }
}

fn first_recognized_file(dir: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && has_recognized_extension(path))
        .collect();
    files.sort();
    files.into_iter().next()
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn test_explicit_path_wins() {
        let dir = tempdir().unwrap();
        let explicit = dir.path().join("custom.onnx");
        File::create(&explicit).unwrap();
        File::create(dir.path().join("model.pth")).unwrap();

        let search = SearchPaths::with_dirs([dir.path()]);
        let resolved = search.resolve(Some(explicit.as_path())).unwrap();
        assert!(resolved.ends_with("custom.onnx"));
    }

    #[test]
    fn test_missing_explicit_path_is_not_found() {
        let dir = tempdir().unwrap();
        let search = SearchPaths::with_dirs([dir.path()]);
        let err = search
            .resolve(Some(dir.path().join("missing.pt").as_path()))
            .unwrap_err();
        assert!(matches!(err, LoadError::ModelNotFound(_)));
    }

    #[test]
    fn test_conventional_name_beats_directory_scan() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join("aaa.onnx")).unwrap();
        File::create(dir.path().join("best_model.pth")).unwrap();
        File::create(dir.path().join("model.pt")).unwrap();

        let search = SearchPaths::with_dirs([dir.path()]);
        let resolved = search.resolve(None).unwrap();
        assert!(resolved.ends_with("model.pt"), "got {}", resolved.display());
    }

    #[test]
    fn test_conventional_names_checked_across_all_dirs_first() {
        let first = tempdir().unwrap();
        let second = tempdir().unwrap();
        File::create(first.path().join("other.onnx")).unwrap();
        File::create(second.path().join("weights.pth")).unwrap();

        let search = SearchPaths::with_dirs([first.path(), second.path()]);
        let resolved = search.resolve(None).unwrap();
        assert!(resolved.ends_with("weights.pth"));
    }

    #[test]
    fn test_single_onnx_file_is_found() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join("foo.onnx")).unwrap();
        File::create(dir.path().join("README.md")).unwrap();

        let search = SearchPaths::with_dirs([dir.path()]);
        let resolved = search.resolve(None).unwrap();
        assert!(resolved.ends_with("foo.onnx"));
    }

    #[test]
    fn test_directory_without_recognized_files() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join("notes.txt")).unwrap();
        File::create(dir.path().join("model.tflite")).unwrap();

        let missing = dir.path().join("missing");
        let search = SearchPaths::with_dirs([dir.path().to_path_buf(), missing]);
        let err = search.resolve(None).unwrap_err();
        assert!(matches!(err, LoadError::ModelNotFound(_)), "got {err:?}");
    }
}
