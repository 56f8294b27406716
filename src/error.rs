//! Error types for the knowledge harness.
//!
//! Errors fall into four categories that callers handle differently:
//!
//! | Category | Variants | Typical reaction |
//! |----------|----------|------------------|
//! | Configuration | [`Error::Config`], [`Error::IndexNotBuilt`], [`Error::ModelMismatch`], [`Error::StorageDir`] | fix config or run `kb build` |
//! | Provider | [`Error::Provider`] | retry later; the build or query is aborted |
//! | Index corruption | [`Error::IndexCorrupt`] | incremental builds fall back to a full rebuild |
//! | Store | [`Error::Store`], [`Error::EntryNotFound`], [`Error::InvalidEntry`] | surfaced to the caller unchanged |

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or unreadable configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A query arrived before any build produced a manifest and index.
    #[error("Index not built: no manifest or index in {}. Run `kb build` first.", storage_dir.display())]
    IndexNotBuilt { storage_dir: PathBuf },

    /// The embedding provider does not match the model the index was built with.
    #[error("Embedding model mismatch: index built with '{index_model}', provider is '{provider_model}'")]
    ModelMismatch {
        index_model: String,
        provider_model: String,
    },

    /// The index storage directory cannot be created or written.
    #[error("Storage directory {} is not usable: {source}", path.display())]
    StorageDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The embedding call failed.
    #[error("Embedding provider error: {0:#}")]
    Provider(anyhow::Error),

    /// The persisted index cannot be loaded or is inconsistent.
    #[error("Index corrupt at {}: {reason}", path.display())]
    IndexCorrupt { path: PathBuf, reason: String },

    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    /// Rejected entry field values (e.g. an empty intent).
    #[error("Invalid entry: {0}")]
    InvalidEntry(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::IndexNotBuilt { .. }
                | Error::ModelMismatch { .. }
                | Error::StorageDir { .. }
        )
    }

    pub fn is_provider(&self) -> bool {
        matches!(self, Error::Provider(_))
    }

    pub fn is_corrupt(&self) -> bool {
        matches!(self, Error::IndexCorrupt { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
