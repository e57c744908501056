//! Local CSV discovery.

use std::io;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, PipelineResult};

/// Returns the `.csv` files directly inside `dir`, sorted by path.
///
/// Sub-directories are not searched. A missing directory is an I/O error.
pub fn csv_files_in_dir(dir: impl AsRef<Path>) -> PipelineResult<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(PipelineError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("not a directory: {}", dir.display()),
        )));
    }

    let pattern = format!(
        "{}/*.csv",
        glob::Pattern::escape(&dir.to_string_lossy())
    );
    let entries = glob::glob(&pattern)
        .map_err(|e| PipelineError::schema(format!("invalid directory pattern '{pattern}': {e}")))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| PipelineError::Io(e.into_error()))?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Object key used for an uploaded local file: `raw/<file name>`.
pub fn object_key_for(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|name| format!("raw/{name}"))
}

/// File stem of an object key (`raw/orders.csv` -> `orders`).
pub fn dataset_name_for(key: &str) -> String {
    Path::new(key)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(key)
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_only_top_level_csv_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.csv"), "x\n1\n").unwrap();
        std::fs::write(dir.path().join("a.csv"), "x\n1\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hi").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/c.csv"), "x\n1\n").unwrap();

        let files = csv_files_in_dir(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_owned())
            .collect();
        assert_eq!(names, vec!["a.csv", "b.csv"]);
    }

    #[test]
    fn missing_directory_is_io_error() {
        let err = csv_files_in_dir("definitely/not/here").unwrap_err();
        assert!(matches!(err, PipelineError::Io(_)));
    }

    #[test]
    fn keys_and_names() {
        assert_eq!(
            object_key_for(Path::new("/tmp/raw/orders.csv")).as_deref(),
            Some("raw/orders.csv")
        );
        assert_eq!(dataset_name_for("raw/orders.csv"), "orders");
    }
}
