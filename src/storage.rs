//! Filesystem helpers for the index storage directory.
//!
//! Every file the builder writes goes through [`write_atomic`]: the bytes are
//! written to a sibling `*.tmp` file, flushed, and renamed over the target.
//! Readers therefore see either the previous file or the new one in full.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

const TMP_SUFFIX: &str = "tmp";

const WRITE_CHECK: &str = ".write-check";

/// Create the storage directory if needed and check it is writable by
/// creating and removing a scratch file in it.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    let storage_err = |source: std::io::Error| Error::StorageDir {
        path: dir.to_path_buf(),
        source,
    };

    std::fs::create_dir_all(dir).map_err(storage_err)?;

    let check = dir.join(WRITE_CHECK);
    std::fs::File::create(&check).map_err(storage_err)?;
    std::fs::remove_file(&check).map_err(storage_err)?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(TMP_SUFFIX);
    path.with_file_name(name)
}

pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = tmp_path(path);
    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// Remove every file in `dir` whose name is not in `keep`: superseded index
/// files, `*.tmp` leftovers of interrupted builds, files from an older
/// `index_file` setting. Subdirectories are left alone.
pub fn remove_unreferenced(dir: &Path, keep: &[&str]) -> Result<usize> {
    let mut removed = 0;
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let referenced = entry
            .file_name()
            .to_str()
            .is_some_and(|name| keep.contains(&name));
        if !referenced && remove_if_exists(&entry.path())? {
            removed += 1;
        }
    }
    Ok(removed)
}

/// Delete a file, treating "already gone" as success. Returns whether it existed.
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_replaces() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.json");
        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "two");
        assert!(!tmp.path().join("index.json.tmp").exists());
    }

    #[test]
    fn test_remove_unreferenced() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path();
        std::fs::write(dir.join("index_meta.json"), "{}").unwrap();
        std::fs::write(dir.join("index-2.json"), "{}").unwrap();
        std::fs::write(dir.join("index-1.json"), "{}").unwrap();
        std::fs::write(dir.join("index-2.json.tmp"), "partial").unwrap();
        std::fs::write(dir.join("index.json"), "{}").unwrap();
        std::fs::create_dir(dir.join("nested")).unwrap();

        let removed = remove_unreferenced(dir, &["index_meta.json", "index-2.json"]).unwrap();
        assert_eq!(removed, 3);
        assert!(dir.join("index_meta.json").exists());
        assert!(dir.join("index-2.json").exists());
        assert!(!dir.join("index-1.json").exists());
        assert!(!dir.join("index.json").exists());
        assert!(dir.join("nested").is_dir());

        assert_eq!(remove_unreferenced(&dir.join("missing"), &[]).unwrap(), 0);
    }

    #[test]
    fn test_ensure_dir_creates_and_leaves_no_trace() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("a").join("index");
        ensure_dir(&dir).unwrap();
        assert!(dir.is_dir());
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[test]
    fn test_ensure_dir_unwritable_location() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();
        let err = ensure_dir(&blocker.join("index")).unwrap_err();
        assert!(matches!(err, Error::StorageDir { .. }));
        assert!(err.is_config());
    }

    #[test]
    fn test_remove_if_exists() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index_meta.json");
        assert!(!remove_if_exists(&path).unwrap());
        std::fs::write(&path, "{}").unwrap();
        assert!(remove_if_exists(&path).unwrap());
    }
}
