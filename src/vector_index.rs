//! Persisted vector index.
//!
//! A JSON file mapping document id → `{ text, content_hash, metadata, vector }`,
//! stamped with the embedding model and dimensionality it was built with.
//! Search is an exhaustive cosine scan, which is adequate for a knowledge
//! base of a few thousand entries.
//!
//! Keys are unique by construction (`BTreeMap`), and the builder prunes ids
//! that no longer exist in the entry store, so the key set always equals the
//! set of entry ids at the last build.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::embedding::cosine_similarity;
use crate::error::{Error, Result};
use crate::models::{Document, DocumentMetadata, RetrievalHit};
use crate::storage;

/// Bumped whenever the on-disk layout changes; older files are treated as corrupt.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub text: String,
    pub content_hash: String,
    pub metadata: DocumentMetadata,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    format_version: u32,
    embedding_model: String,
    dims: usize,
    documents: BTreeMap<String, IndexedDocument>,
}

impl VectorIndex {
    pub fn new(embedding_model: impl Into<String>, dims: usize) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            embedding_model: embedding_model.into(),
            dims,
            documents: BTreeMap::new(),
        }
    }

    /// Load and structurally validate an index file.
    ///
    /// Parse failures, an unknown format version, and vectors whose length
    /// disagrees with the recorded `dims` are all [`Error::IndexCorrupt`].
    pub fn load(path: &Path) -> Result<Self> {
        let corrupt = |reason: String| Error::IndexCorrupt {
            path: path.to_path_buf(),
            reason,
        };

        let content = std::fs::read_to_string(path).map_err(|e| corrupt(e.to_string()))?;
        let index: VectorIndex =
            serde_json::from_str(&content).map_err(|e| corrupt(format!("invalid JSON: {}", e)))?;

        if index.format_version != FORMAT_VERSION {
            return Err(corrupt(format!(
                "unsupported format version {} (expected {})",
                index.format_version, FORMAT_VERSION
            )));
        }

        if let Some((id, _)) = index
            .documents
            .iter()
            .find(|(_, doc)| doc.vector.len() != index.dims)
        {
            return Err(corrupt(format!(
                "document {} has a vector of the wrong dimension (expected {})",
                id, index.dims
            )));
        }

        Ok(index)
    }

    /// Check that this index was built by `embedding_model` with `dims`-sized vectors.
    pub fn ensure_compatible(&self, path: &Path, embedding_model: &str, dims: usize) -> Result<()> {
        if self.embedding_model != embedding_model {
            return Err(Error::IndexCorrupt {
                path: path.to_path_buf(),
                reason: format!(
                    "index built with '{}', expected '{}'",
                    self.embedding_model, embedding_model
                ),
            });
        }
        if self.dims != dims {
            return Err(Error::IndexCorrupt {
                path: path.to_path_buf(),
                reason: format!("index has {} dims, expected {}", self.dims, dims),
            });
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec(self)?;
        storage::write_atomic(path, &json)
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&IndexedDocument> {
        self.documents.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.documents.keys().map(String::as_str)
    }

    /// Insert or replace a document with its vector.
    pub fn upsert(&mut self, doc: Document, vector: Vec<f32>) {
        self.documents.insert(
            doc.id,
            IndexedDocument {
                text: doc.text,
                content_hash: doc.content_hash,
                metadata: doc.metadata,
                vector,
            },
        );
    }

    /// Replace only the metadata of an existing document; the vector is kept.
    pub fn set_metadata(&mut self, id: &str, metadata: DocumentMetadata) -> bool {
        match self.documents.get_mut(id) {
            Some(doc) => {
                doc.metadata = metadata;
                true
            }
            None => false,
        }
    }

    /// Drop every document whose id is not accepted by `keep`. Returns the removed ids.
    pub fn retain_ids(&mut self, mut keep: impl FnMut(&str) -> bool) -> Vec<String> {
        let removed: Vec<String> = self
            .documents
            .keys()
            .filter(|id| !keep(id.as_str()))
            .cloned()
            .collect();
        for id in &removed {
            self.documents.remove(id);
        }
        removed
    }

    /// Top `top_k` documents by cosine similarity, highest first; ties by id.
    pub fn search(&self, query: &[f32], top_k: usize) -> Vec<RetrievalHit> {
        if top_k == 0 {
            return Vec::new();
        }

        let mut hits: Vec<RetrievalHit> = self
            .documents
            .iter()
            .map(|(id, doc)| RetrievalHit {
                id: id.clone(),
                text: doc.text.clone(),
                score: cosine_similarity(query, &doc.vector),
                metadata: doc.metadata.clone(),
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(top_k);
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn doc(id: &str) -> Document {
        Document {
            id: id.to_string(),
            text: format!("text of {}", id),
            content_hash: format!("hash-{}", id),
            metadata: DocumentMetadata {
                tags: vec![],
                contributor: String::new(),
                timestamp: "2024-01-01T00:00:00Z".into(),
                doc_type: "cookbook_record".into(),
                intent: id.to_string(),
            },
        }
    }

    fn sample() -> VectorIndex {
        let mut index = VectorIndex::new("test:unit", 2);
        index.upsert(doc("a"), vec![1.0, 0.0]);
        index.upsert(doc("b"), vec![0.0, 1.0]);
        index.upsert(doc("c"), vec![0.7, 0.7]);
        index
    }

    #[test]
    fn test_search_order() {
        let hits = sample().search(&[1.0, 0.1], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[1].id, "c");
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn test_search_ties_by_id() {
        let mut index = VectorIndex::new("test:unit", 2);
        index.upsert(doc("z"), vec![1.0, 0.0]);
        index.upsert(doc("m"), vec![2.0, 0.0]);
        let hits = index.search(&[1.0, 0.0], 5);
        assert_eq!(hits[0].id, "m");
        assert_eq!(hits[1].id, "z");
    }

    #[test]
    fn test_search_edge_cases() {
        assert!(sample().search(&[1.0, 0.0], 0).is_empty());
        assert!(VectorIndex::new("test:unit", 2)
            .search(&[1.0, 0.0], 5)
            .is_empty());
        assert_eq!(sample().search(&[1.0, 0.0], 10).len(), 3);
    }

    #[test]
    fn test_save_load_preserves_vectors() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.json");
        let mut index = VectorIndex::new("test:unit", 3);
        index.upsert(doc("a"), vec![0.1, -2.5, 1.0e-7]);
        index.save(&path).unwrap();

        let loaded = VectorIndex::load(&path).unwrap();
        assert_eq!(loaded.get("a"), index.get("a"));
        assert_eq!(loaded.embedding_model(), "test:unit");
        assert_eq!(loaded.dims(), 3);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.json");
        std::fs::write(&path, "{ truncated").unwrap();
        assert!(VectorIndex::load(&path).unwrap_err().is_corrupt());
    }

    #[test]
    fn test_load_rejects_wrong_dims() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.json");
        let mut index = VectorIndex::new("test:unit", 2);
        index.upsert(doc("a"), vec![1.0, 0.0, 0.0]);
        index.save(&path).unwrap();
        assert!(VectorIndex::load(&path).unwrap_err().is_corrupt());
    }

    #[test]
    fn test_ensure_compatible() {
        let index = sample();
        let path = Path::new("index.json");
        assert!(index.ensure_compatible(path, "test:unit", 2).is_ok());
        assert!(index.ensure_compatible(path, "test:other", 2).is_err());
        assert!(index.ensure_compatible(path, "test:unit", 3).is_err());
    }

    #[test]
    fn test_retain_and_metadata() {
        let mut index = sample();
        let removed = index.retain_ids(|id| id != "b");
        assert_eq!(removed, vec!["b".to_string()]);
        assert_eq!(index.ids().collect::<Vec<_>>(), vec!["a", "c"]);

        let mut meta = doc("a").metadata;
        meta.tags = vec!["redis".into()];
        assert!(index.set_metadata("a", meta));
        assert_eq!(index.get("a").unwrap().metadata.tags, vec!["redis"]);
        assert_eq!(index.get("a").unwrap().vector, vec![1.0, 0.0]);
        assert!(!index.set_metadata("b", doc("b").metadata));
    }
}
