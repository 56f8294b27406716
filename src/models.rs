//! Core data models used throughout the knowledge harness.
//!
//! [`KnowledgeEntry`] rows live in the entry store. [`Document`] values are
//! derived from them on every build and never stored there; the vector index
//! keeps its own copy of each document's text, hash and metadata.

use serde::{Deserialize, Serialize};

/// One structured experience record, as stored in `knowledge_entries`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: String,
    pub intent: String,
    pub problem_context: String,
    pub root_cause: String,
    pub solution_steps: String,
    pub evidence: String,
    /// Comma-separated keywords.
    pub tags: String,
    pub contributor: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Field values for a new entry. The store assigns the id and timestamps.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewEntry {
    pub intent: String,
    #[serde(default)]
    pub problem_context: String,
    #[serde(default)]
    pub root_cause: String,
    #[serde(default)]
    pub solution_steps: String,
    #[serde(default)]
    pub evidence: String,
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub contributor: String,
}

/// Partial update. `None` leaves the stored value unchanged.
#[derive(Debug, Clone, Default)]
pub struct EntryUpdate {
    pub intent: Option<String>,
    pub problem_context: Option<String>,
    pub root_cause: Option<String>,
    pub solution_steps: Option<String>,
    pub evidence: Option<String>,
    pub tags: Option<String>,
    pub contributor: Option<String>,
}

impl EntryUpdate {
    pub fn is_empty(&self) -> bool {
        self.intent.is_none()
            && self.problem_context.is_none()
            && self.root_cause.is_none()
            && self.solution_steps.is_none()
            && self.evidence.is_none()
            && self.tags.is_none()
            && self.contributor.is_none()
    }
}

/// Metadata attached to an indexed document. Returned with retrieval hits,
/// never embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub tags: Vec<String>,
    pub contributor: String,
    /// ISO-8601 rendering of the entry's `created_at`.
    pub timestamp: String,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub intent: String,
}

/// Retrievable unit derived from a [`KnowledgeEntry`].
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub content_hash: String,
    pub metadata: DocumentMetadata,
}

/// A single result from [`crate::retrieval::Retriever::query`].
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalHit {
    pub id: String,
    pub text: String,
    pub score: f32,
    pub metadata: DocumentMetadata,
}
