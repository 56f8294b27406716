//! Build manifest (`index_meta.json`).
//!
//! The manifest is the version stamp of the persisted index. Every build
//! writes its vectors to a fresh file named after the build time
//! (`index-20240101T000000123456789Z.json`) and then switches the manifest
//! over to it with one atomic rename. Until that rename the previous
//! manifest, and the index file it names, are untouched, so readers only
//! ever see complete builds.
//!
//! Readers compare `build_time` with what they have cached to notice a newer
//! build; the builder compares `embedding_model` with the configured one to
//! decide between an incremental and a full build.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Full,
    Incremental,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Full => write!(f, "full"),
            Strategy::Incremental => write!(f, "incremental"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub embedding_model: String,
    /// RFC 3339 with nanoseconds, so consecutive builds get distinct stamps.
    pub build_time: String,
    pub strategy: Strategy,
    pub doc_count: usize,
    /// File name, inside the storage directory, holding this build's vectors.
    pub index_file: String,
}

impl Manifest {
    /// Stamp a new build. `index_base` is the configured index file name
    /// (`index.json`); the build's own file is derived from it.
    pub fn new(
        embedding_model: impl Into<String>,
        strategy: Strategy,
        doc_count: usize,
        index_base: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            embedding_model: embedding_model.into(),
            build_time: now.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true),
            strategy,
            doc_count,
            index_file: versioned_file_name(index_base, &now),
        }
    }

    pub fn index_path(&self, storage_dir: &Path) -> PathBuf {
        storage_dir.join(&self.index_file)
    }
}

/// `index.json` + build time → `index-<yyyymmddThhmmss><nanos>Z.json`.
fn versioned_file_name(base: &str, at: &DateTime<Utc>) -> String {
    let stamp = at.format("%Y%m%dT%H%M%S%9fZ");
    match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{}-{}.{}", stem, stamp, ext),
        _ => format!("{}-{}", base, stamp),
    }
}

/// Read the manifest. `Ok(None)` when no build has completed yet; a file that
/// exists but does not parse is [`Error::IndexCorrupt`].
pub fn read(path: &Path) -> Result<Option<Manifest>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let corrupt = |reason: String| Error::IndexCorrupt {
        path: path.to_path_buf(),
        reason,
    };

    let manifest: Manifest = serde_json::from_str(&content)
        .map_err(|e| corrupt(format!("unreadable manifest: {}", e)))?;

    // Must name a plain file inside the storage directory.
    if manifest.index_file.is_empty()
        || manifest.index_file.contains(['/', '\\'])
        || manifest.index_file.starts_with('.')
    {
        return Err(corrupt(format!(
            "manifest names an invalid index file '{}'",
            manifest.index_file
        )));
    }

    Ok(Some(manifest))
}

pub fn write(path: &Path, manifest: &Manifest) -> Result<()> {
    let json = serde_json::to_vec_pretty(manifest)?;
    storage::write_atomic(path, &json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_is_none() {
        let tmp = TempDir::new().unwrap();
        assert!(read(&tmp.path().join("index_meta.json")).unwrap().is_none());
    }

    #[test]
    fn test_write_then_read() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index_meta.json");
        let manifest = Manifest::new("hash:feature-hash-v1", Strategy::Incremental, 3, "index.json");
        write(&path, &manifest).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["strategy"], "incremental");
        assert_eq!(raw["doc_count"], 3);

        assert_eq!(read(&path).unwrap(), Some(manifest));
    }

    #[test]
    fn test_garbage_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index_meta.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(read(&path).unwrap_err().is_corrupt());
    }

    #[test]
    fn test_build_time_is_rfc3339() {
        let manifest = Manifest::new("m", Strategy::Full, 0, "index.json");
        assert!(chrono::DateTime::parse_from_rfc3339(&manifest.build_time).is_ok());
    }

    #[test]
    fn test_index_file_named_after_build() {
        let at = chrono::DateTime::parse_from_rfc3339("2024-03-05T07:08:09.000000042Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            versioned_file_name("index.json", &at),
            "index-20240305T070809000000042Z.json"
        );
        assert_eq!(
            versioned_file_name("vectors", &at),
            "vectors-20240305T070809000000042Z"
        );

        let manifest = Manifest::new("m", Strategy::Full, 0, "index.json");
        assert!(manifest.index_file.starts_with("index-"));
        assert!(manifest.index_file.ends_with(".json"));
    }

    #[test]
    fn test_rejects_index_file_outside_storage_dir() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index_meta.json");
        let mut manifest = Manifest::new("m", Strategy::Full, 0, "index.json");
        manifest.index_file = "../elsewhere.json".into();
        write(&path, &manifest).unwrap();
        assert!(read(&path).unwrap_err().is_corrupt());
    }
}
