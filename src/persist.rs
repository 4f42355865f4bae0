//! File Replacement
//!
//! Rule files and dashboard exports are replaced whole: the new body goes to
//! a staging file next to the target, which is then renamed over it. Readers
//! see either the old or the new document, never a prefix.

use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Sibling staging file for `path`. Ends in `.tmp` so `*.json` scans skip it.
fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.tmp", name, Uuid::new_v4().simple()))
}

fn parent_dir(path: &Path) -> Option<&Path> {
    path.parent().filter(|p| !p.as_os_str().is_empty())
}

/// Replace `path` with `body`, creating parent directories.
pub(crate) fn replace_file(path: &Path, body: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = parent_dir(path) {
        std::fs::create_dir_all(parent)?;
    }

    let staging = staging_path(path);
    let result = std::fs::write(&staging, body).and_then(|()| std::fs::rename(&staging, path));
    if result.is_err() {
        let _ = std::fs::remove_file(&staging);
    }
    result
}

/// Async form of [`replace_file`].
pub(crate) async fn replace_file_async(path: &Path, body: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = parent_dir(path) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let staging = staging_path(path);
    let mut result = tokio::fs::write(&staging, body).await;
    if result.is_ok() {
        result = tokio::fs::rename(&staging, path).await;
    }
    if result.is_err() {
        let _ = tokio::fs::remove_file(&staging).await;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_staging_path_is_hidden_sibling() {
        let staging = staging_path(Path::new("/data/dashboard.json"));
        assert_eq!(staging.parent(), Some(Path::new("/data")));

        let name = staging.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".dashboard.json."));
        assert!(name.ends_with(".tmp"));
    }

    #[test]
    fn test_replace_overwrites_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("rules.json");

        replace_file(&path, b"{\"rules\":[]}").unwrap();
        replace_file(&path, b"{\"rules\":[1]}").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"rules\":[1]}");
        assert_eq!(entries(&dir.path().join("nested")), vec!["rules.json"]);
    }

    #[test]
    fn test_failed_replace_keeps_original() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be replaced by a file.
        let target = dir.path().join("occupied");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("keep"), "x").unwrap();

        assert!(replace_file(&target, b"new").is_err());
        assert!(target.join("keep").exists());
        assert_eq!(entries(dir.path()), vec!["occupied"]);
    }

    #[tokio::test]
    async fn test_async_replace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dashboard.json");
        std::fs::write(&path, "old").unwrap();

        replace_file_async(&path, b"new").await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
        assert_eq!(entries(dir.path()), vec!["dashboard.json"]);
    }
}
