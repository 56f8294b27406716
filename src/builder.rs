//! Index builder: strategy selection, full rebuild, incremental refresh.
//!
//! # Strategy selection
//!
//! | Condition (checked in order) | Strategy |
//! |------------------------------|----------|
//! | `--force` | full |
//! | mode `full` | full |
//! | no manifest, unreadable manifest, or the index file it names is missing | full |
//! | manifest model ≠ configured model | full |
//! | otherwise | incremental |
//!
//! # Incremental refresh
//!
//! Every entry is reconstructed and hashed. An id absent from the index is
//! embedded and inserted; an id whose content hash differs is re-embedded and
//! replaced in place; an id with a matching hash is skipped without calling
//! the provider. Ids no longer present in the entry store are pruned. If the
//! persisted index cannot be loaded or was built with a different model or
//! dimensionality, the build falls back to a full rebuild.
//!
//! # Persistence order
//!
//! All embedding happens in memory first. Once every vector is in hand the
//! index is saved to a new file named after this build, and the manifest is
//! switched to it last, with one atomic rename. The previous manifest and the
//! file it names are never modified, so a provider failure or a crash at any
//! point leaves the previous build servable. After the switch, every file in
//! the storage directory that the new manifest does not name is removed.

use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{Config, IndexConfig};
use crate::embedding::{self, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::manifest::{self, Manifest, Strategy};
use crate::models::Document;
use crate::reconstruct::to_document;
use crate::vector_index::VectorIndex;
use crate::{db, migrate, storage, store};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildMode {
    #[default]
    Auto,
    Full,
    Incremental,
}

impl FromStr for BuildMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(BuildMode::Auto),
            "full" => Ok(BuildMode::Full),
            "incremental" => Ok(BuildMode::Incremental),
            other => Err(Error::Config(format!(
                "unknown build mode '{}': expected auto, full, or incremental",
                other
            ))),
        }
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildMode::Auto => write!(f, "auto"),
            BuildMode::Full => write!(f, "full"),
            BuildMode::Incremental => write!(f, "incremental"),
        }
    }
}

/// Outcome of one build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    /// Strategy actually executed (a fallback reports `full`).
    pub strategy: Strategy,
    pub doc_count: usize,
    /// Number of texts sent to the embedding provider.
    pub embedded: usize,
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub pruned: usize,
    /// An incremental build was attempted but the persisted index was unusable.
    pub fell_back: bool,
    pub build_time: String,
}

impl BuildReport {
    fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            doc_count: 0,
            embedded: 0,
            added: 0,
            updated: 0,
            unchanged: 0,
            pruned: 0,
            fell_back: false,
            build_time: String::new(),
        }
    }
}

pub struct IndexBuilder {
    index: IndexConfig,
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl IndexBuilder {
    pub fn new(config: &Config, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            index: config.index.clone(),
            provider,
            batch_size: config.embedding.batch_size,
        }
    }

    /// Decide between a full and an incremental build, with the reason.
    pub fn select_strategy(&self, mode: BuildMode, force: bool) -> (Strategy, &'static str) {
        if force {
            return (Strategy::Full, "forced");
        }
        if mode == BuildMode::Full {
            return (Strategy::Full, "full mode requested");
        }
        match manifest::read(&self.index.manifest_path()) {
            Ok(None) => (Strategy::Full, "no manifest"),
            Err(e) => {
                warn!(error = %e, "manifest unreadable");
                (Strategy::Full, "unreadable manifest")
            }
            Ok(Some(m)) if !m.index_path(&self.index.storage_dir).exists() => {
                (Strategy::Full, "no existing index")
            }
            Ok(Some(m)) if m.embedding_model != self.provider.model_id() => {
                (Strategy::Full, "embedding model changed")
            }
            Ok(Some(_)) => (Strategy::Incremental, "compatible index"),
        }
    }

    pub async fn build(&self, pool: &SqlitePool, mode: BuildMode, force: bool) -> Result<BuildReport> {
        let storage_dir = &self.index.storage_dir;
        storage::ensure_dir(storage_dir)?;

        let entries = store::list_all(pool).await?;
        let docs: Vec<Document> = entries.iter().map(to_document).collect();

        let (strategy, reason) = self.select_strategy(mode, force);
        info!(%mode, %strategy, reason, entries = docs.len(), "starting index build");

        let (index, mut report) = match strategy {
            Strategy::Full => self.build_full(docs).await?,
            Strategy::Incremental => match self.load_existing() {
                Ok(existing) => self.build_incremental(existing, docs).await?,
                Err(e) if e.is_corrupt() => {
                    warn!(error = %e, "persisted index unusable, falling back to full rebuild");
                    let (index, mut report) = self.build_full(docs).await?;
                    report.fell_back = true;
                    (index, report)
                }
                Err(e) => return Err(e),
            },
        };

        let manifest = Manifest::new(
            self.provider.model_id(),
            report.strategy,
            index.len(),
            &self.index.index_file,
        );
        index.save(&manifest.index_path(storage_dir))?;
        manifest::write(&self.index.manifest_path(), &manifest)?;

        // The new build is live; everything else in the directory is stale.
        let keep = [self.index.manifest_file.as_str(), manifest.index_file.as_str()];
        match storage::remove_unreferenced(storage_dir, &keep) {
            Ok(0) => {}
            Ok(removed) => info!(removed, "removed superseded index files"),
            Err(e) => warn!(error = %e, "could not remove superseded index files"),
        }

        report.doc_count = index.len();
        report.build_time = manifest.build_time;
        info!(
            strategy = %report.strategy,
            docs = report.doc_count,
            embedded = report.embedded,
            added = report.added,
            updated = report.updated,
            unchanged = report.unchanged,
            pruned = report.pruned,
            "index build complete"
        );
        Ok(report)
    }

    fn load_existing(&self) -> Result<VectorIndex> {
        let manifest_path = self.index.manifest_path();
        let current = manifest::read(&manifest_path)?.ok_or_else(|| Error::IndexCorrupt {
            path: manifest_path,
            reason: "manifest disappeared during the build".into(),
        })?;
        let path = current.index_path(&self.index.storage_dir);
        let existing = VectorIndex::load(&path)?;
        existing.ensure_compatible(&path, &self.provider.model_id(), self.provider.dims())?;
        Ok(existing)
    }

    async fn build_full(&self, docs: Vec<Document>) -> Result<(VectorIndex, BuildReport)> {
        let mut report = BuildReport::new(Strategy::Full);
        let mut index = VectorIndex::new(self.provider.model_id(), self.provider.dims());

        let vectors = self.embed_documents(&docs).await?;
        report.embedded = vectors.len();
        report.added = docs.len();

        for (doc, vector) in docs.into_iter().zip(vectors) {
            index.upsert(doc, vector);
        }
        Ok((index, report))
    }

    async fn build_incremental(
        &self,
        mut index: VectorIndex,
        docs: Vec<Document>,
    ) -> Result<(VectorIndex, BuildReport)> {
        let mut report = BuildReport::new(Strategy::Incremental);

        let live: HashSet<String> = docs.iter().map(|d| d.id.clone()).collect();
        report.pruned = index.retain_ids(|id| live.contains(id)).len();

        let mut pending = Vec::new();
        for doc in docs {
            match index.get(&doc.id) {
                None => {
                    report.added += 1;
                    pending.push(doc);
                }
                Some(existing) if existing.content_hash != doc.content_hash => {
                    report.updated += 1;
                    pending.push(doc);
                }
                Some(existing) => {
                    report.unchanged += 1;
                    if existing.metadata != doc.metadata {
                        index.set_metadata(&doc.id, doc.metadata);
                    }
                }
            }
        }

        let vectors = self.embed_documents(&pending).await?;
        report.embedded = vectors.len();

        for (doc, vector) in pending.into_iter().zip(vectors) {
            index.upsert(doc, vector);
        }
        Ok((index, report))
    }

    async fn embed_documents(&self, docs: &[Document]) -> Result<Vec<Vec<f32>>> {
        if docs.is_empty() {
            return Ok(Vec::new());
        }
        let texts: Vec<String> = docs.iter().map(|d| d.text.clone()).collect();
        embedding::embed_batched(self.provider.as_ref(), &texts, self.batch_size).await
    }
}

/// Build (or refresh) the index described by `config`.
///
/// Entry point for `kb build`. Opens the entry store, creates the configured
/// provider, and runs one [`IndexBuilder::build`].
pub async fn build_index(config: &Config, mode: BuildMode, force: bool) -> Result<BuildReport> {
    if !config.embedding.is_enabled() {
        return Err(Error::Config(
            "Embedding provider is disabled. Set [embedding] provider in config.".into(),
        ));
    }

    let provider = embedding::create_provider(&config.embedding)?;
    let pool = db::connect(config).await?;
    migrate::migrate_pool(&pool).await?;

    let result = IndexBuilder::new(config, provider)
        .build(&pool, mode, force)
        .await;
    pool.close().await;
    result
}

/// CLI entry point for `kb build`: runs one build and prints the report.
pub async fn run_build(config: &Config, mode: BuildMode, force: bool) -> Result<()> {
    let report = build_index(config, mode, force).await?;

    println!("build {}", report.strategy);
    if report.fell_back {
        println!("  (persisted index was unusable; rebuilt from scratch)");
    }
    println!("  documents: {}", report.doc_count);
    println!("  embedded:  {}", report.embedded);
    println!("  added:     {}", report.added);
    println!("  updated:   {}", report.updated);
    println!("  unchanged: {}", report.unchanged);
    println!("  pruned:    {}", report.pruned);
    println!("  build_time: {}", report.build_time);
    Ok(())
}
