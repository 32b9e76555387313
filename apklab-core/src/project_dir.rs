//! Chooses where the output of decoding an APK goes.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::error::ApklabError;

// Guard against a broken filesystem that reports every path as existing.
const MAX_SUFFIX_ATTEMPTS: usize = 4096;

/// Gets a project directory for the given input file: the file's path without its extension.
/// If that path already exists, `1` is appended until a free path is found, so that the output of a
/// previous run is never overwritten.
pub fn allocate_project_dir(input: impl AsRef<Path>) -> Result<PathBuf> {
    allocate_with_limit(input.as_ref(), MAX_SUFFIX_ATTEMPTS)
}

fn allocate_with_limit(input: &Path, max_attempts: usize) -> Result<PathBuf> {
    let stem = input.file_stem().unwrap_or(input.as_os_str());
    let base = match input.parent() {
        Some(parent) => parent.join(stem),
        None => PathBuf::from(stem),
    };

    let mut candidate = base.clone().into_os_string();
    for _ in 0..max_attempts {
        if !Path::new(&candidate).exists() {
            return Ok(PathBuf::from(candidate));
        }

        candidate.push("1");
    }

    Err(ApklabError::ProjectDirExhausted { base }.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_extension_next_to_input() {
        let dir = tempfile::tempdir().unwrap();
        let apk = dir.path().join("app-release.apk");

        assert_eq!(allocate_project_dir(&apk).unwrap(), dir.path().join("app-release"));
    }

    #[test]
    fn appends_ones_without_touching_existing_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let apk = dir.path().join("test.apk");
        let marker = dir.path().join("test").join("keep.txt");

        let first = allocate_project_dir(&apk).unwrap();
        std::fs::create_dir(&first).unwrap();
        std::fs::write(&marker, "previous run").unwrap();

        let second = allocate_project_dir(&apk).unwrap();
        assert_eq!(second, dir.path().join("test1"));
        std::fs::create_dir(&second).unwrap();

        let third = allocate_project_dir(&apk).unwrap();
        assert_eq!(third, dir.path().join("test11"));

        assert_eq!(std::fs::read_to_string(marker).unwrap(), "previous run");
    }

    #[test]
    fn existing_file_also_counts_as_taken() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes"), "").unwrap();

        assert_eq!(
            allocate_project_dir(dir.path().join("notes.apk")).unwrap(),
            dir.path().join("notes1")
        );
    }

    #[test]
    fn gives_up_after_limit() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["app", "app1", "app11"] {
            std::fs::create_dir(dir.path().join(name)).unwrap();
        }

        let err = allocate_with_limit(&dir.path().join("app.apk"), 3).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ApklabError>(),
            Some(ApklabError::ProjectDirExhausted { .. })
        ));
    }
}
