//! Configuration loading and validation.
//!
//! The configuration file is TOML and is resolved exactly once, at process
//! start, by [`load_config`]. The resulting [`Config`] is passed by reference
//! to every component; nothing reads configuration from globals.
//!
//! ```toml
//! [db]
//! path = "./data/kb.sqlite"
//!
//! [index]
//! storage_dir = "./data/index"
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [retrieval]
//! top_k = 5
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Providers accepted in `[embedding].provider`.
pub const PROVIDERS: &[&str] = &["disabled", "openai", "ollama", "local", "hash"];

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub index: IndexConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Directory holding the persisted vector index and its manifest.
    pub storage_dir: PathBuf,
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,
    /// Base name of the index files. Each build writes a sibling stamped
    /// with its build time and records that name in the manifest.
    #[serde(default = "default_index_file")]
    pub index_file: String,
}

fn default_manifest_file() -> String {
    "index_meta.json".to_string()
}
fn default_index_file() -> String {
    "index.json".to_string()
}

impl IndexConfig {
    pub fn manifest_path(&self) -> PathBuf {
        self.storage_dir.join(&self.manifest_file)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

impl Config {
    /// Parse and validate a configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.retrieval.top_k < 1 {
            return Err(Error::Config("retrieval.top_k must be >= 1".into()));
        }

        if self.embedding.batch_size < 1 {
            return Err(Error::Config("embedding.batch_size must be >= 1".into()));
        }

        if self.index.manifest_file == self.index.index_file {
            return Err(Error::Config(
                "index.manifest_file and index.index_file must differ".into(),
            ));
        }

        // Builds delete files in storage_dir that the manifest does not name.
        if self.db.path.starts_with(&self.index.storage_dir) {
            return Err(Error::Config(format!(
                "db.path ({}) must not be inside index.storage_dir ({})",
                self.db.path.display(),
                self.index.storage_dir.display()
            )));
        }

        let provider = self.embedding.provider.as_str();
        if !PROVIDERS.contains(&provider) {
            return Err(Error::Config(format!(
                "unknown embedding provider: '{}'. Must be one of: {}",
                provider,
                PROVIDERS.join(", ")
            )));
        }

        if matches!(provider, "openai" | "ollama") {
            if self.embedding.model.is_none() {
                return Err(Error::Config(format!(
                    "embedding.model must be specified when provider is '{}'",
                    provider
                )));
            }
            if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                return Err(Error::Config(format!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    provider
                )));
            }
        }

        if self.embedding.dims == Some(0) {
            return Err(Error::Config("embedding.dims must be > 0".into()));
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;

    Config::from_toml(&content)
}
