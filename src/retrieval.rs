//! Retrieval service with hot reload.
//!
//! A [`Retriever`] is created once per serving process and shared (by
//! reference or `Arc`). It never touches the entry store: each query reads
//! the small manifest file, and if its `build_time` differs from the cached
//! one (or nothing is cached yet) the index file the manifest names is
//! loaded before the search runs. Builds in another process are therefore
//! picked up on the next query without any explicit invalidation signal, and
//! a build that has not switched the manifest yet is never seen.
//!
//! Queries are embedded with the model recorded in the manifest, never the
//! one currently configured, so a config change cannot make the read path
//! compare vectors from two different models. A provider injected with
//! [`Retriever::with_provider`] must match the manifest's model or the query
//! fails with [`Error::ModelMismatch`].

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::{Config, EmbeddingConfig, IndexConfig};
use crate::embedding::{self, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::manifest::{self, Manifest};
use crate::models::RetrievalHit;
use crate::vector_index::VectorIndex;

struct LoadedIndex {
    build_time: String,
    index: Arc<VectorIndex>,
    provider: Arc<dyn EmbeddingProvider>,
}

pub struct Retriever {
    index: IndexConfig,
    embedding: EmbeddingConfig,
    provider: Option<Arc<dyn EmbeddingProvider>>,
    cache: Mutex<Option<LoadedIndex>>,
}

impl Retriever {
    /// Retriever that creates its query provider from the manifest's model id.
    pub fn new(config: &Config) -> Self {
        Self {
            index: config.index.clone(),
            embedding: config.embedding.clone(),
            provider: None,
            cache: Mutex::new(None),
        }
    }

    /// Retriever that always embeds queries with `provider`.
    pub fn with_provider(config: &Config, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider: Some(provider),
            ..Self::new(config)
        }
    }

    /// Top `top_k` documents for `query`, best first.
    ///
    /// Returns an empty list for an empty query, `top_k == 0`, or an index
    /// with no documents. Fails with [`Error::IndexNotBuilt`] before the
    /// first build and with [`Error::IndexCorrupt`] if the persisted index
    /// cannot be loaded; the read path never rebuilds.
    pub async fn query(&self, query: &str, top_k: usize) -> Result<Vec<RetrievalHit>> {
        let manifest = self.current_manifest()?;

        if query.trim().is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let (index, provider) = {
            let mut cache = self.cache.lock().await;
            match cache.as_ref() {
                Some(loaded) if loaded.build_time == manifest.build_time => {
                    (loaded.index.clone(), loaded.provider.clone())
                }
                _ => {
                    let loaded = match self.load(&manifest) {
                        Ok(loaded) => loaded,
                        Err(e) => {
                            // A newer build may have switched the manifest and
                            // removed the file this one names.
                            let newer = self.current_manifest()?;
                            if newer.build_time == manifest.build_time {
                                return Err(e);
                            }
                            self.load(&newer)?
                        }
                    };
                    debug!(
                        build_time = %loaded.build_time,
                        docs = loaded.index.len(),
                        "loaded index"
                    );
                    let pair = (loaded.index.clone(), loaded.provider.clone());
                    *cache = Some(loaded);
                    pair
                }
            }
        };

        if index.is_empty() {
            return Ok(Vec::new());
        }

        let vector = embedding::embed_query(provider.as_ref(), query).await?;
        Ok(index.search(&vector, top_k))
    }

    /// `build_time` of the index currently held in memory, if any.
    pub async fn cached_build_time(&self) -> Option<String> {
        self.cache
            .lock()
            .await
            .as_ref()
            .map(|loaded| loaded.build_time.clone())
    }

    fn current_manifest(&self) -> Result<Manifest> {
        let not_built = || Error::IndexNotBuilt {
            storage_dir: self.index.storage_dir.clone(),
        };

        let dir = &self.index.storage_dir;
        let read = || manifest::read(&self.index.manifest_path());

        let manifest = read()?.ok_or_else(not_built)?;
        if manifest.index_path(dir).exists() {
            return Ok(manifest);
        }
        match read()? {
            Some(newer)
                if newer.build_time != manifest.build_time && newer.index_path(dir).exists() =>
            {
                Ok(newer)
            }
            _ => Err(not_built()),
        }
    }

    fn load(&self, manifest: &Manifest) -> Result<LoadedIndex> {
        let path = manifest.index_path(&self.index.storage_dir);
        let index = VectorIndex::load(&path)?;

        if index.embedding_model() != manifest.embedding_model {
            return Err(Error::IndexCorrupt {
                path,
                reason: format!(
                    "index built with '{}' but manifest records '{}'",
                    index.embedding_model(),
                    manifest.embedding_model
                ),
            });
        }

        let provider = match &self.provider {
            Some(provider) => {
                if provider.model_id() != manifest.embedding_model {
                    return Err(Error::ModelMismatch {
                        index_model: manifest.embedding_model.clone(),
                        provider_model: provider.model_id(),
                    });
                }
                provider.clone()
            }
            None => embedding::create_provider_for_model(
                &self.embedding,
                &manifest.embedding_model,
                index.dims(),
            )?,
        };

        Ok(LoadedIndex {
            build_time: manifest.build_time.clone(),
            index: Arc::new(index),
            provider,
        })
    }
}

/// CLI entry point for `kb query`: runs one query and prints the hits.
pub async fn run_query(config: &Config, query: &str, top_k: Option<usize>) -> Result<()> {
    let top_k = top_k.unwrap_or(config.retrieval.top_k);
    let hits = Retriever::new(config).query(query, top_k).await?;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!("{}. [{:.2}] {}", i + 1, hit.score, hit.metadata.intent);
        if !hit.metadata.tags.is_empty() {
            println!("    tags: {}", hit.metadata.tags.join(", "));
        }
        if !hit.metadata.contributor.is_empty() {
            println!("    contributor: {}", hit.metadata.contributor);
        }
        println!("    recorded: {}", hit.metadata.timestamp);
        println!("    id: {}", hit.id);
        println!();
    }

    Ok(())
}
