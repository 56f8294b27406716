//! Document reconstruction: entry row → canonical text, metadata and hash.
//!
//! The text layout is fixed. Every section header is always emitted, in the
//! same order, so two entries with equal field values always reconstruct to
//! byte-identical text and therefore to the same content hash. Any edit to a
//! field changes the text, which is what lets incremental builds detect
//! changed documents by hash alone.
//!
//! ```text
//! # Intent
//! {intent}
//!
//! # 1. Problem Context
//! {problem_context}
//!
//! # 2. Root Cause Analysis
//! {root_cause}
//!
//! # 3. Solution / SOP
//! {solution_steps}
//!
//! # 4. Evidence
//! {evidence}
//! ```

use sha2::{Digest, Sha256};

use crate::models::{Document, DocumentMetadata, KnowledgeEntry};

pub const DOC_TYPE: &str = "cookbook_record";

pub fn reconstruct(entry: &KnowledgeEntry) -> String {
    format!(
        "# Intent\n{}\n\n# 1. Problem Context\n{}\n\n# 2. Root Cause Analysis\n{}\n\n# 3. Solution / SOP\n{}\n\n# 4. Evidence\n{}\n",
        entry.intent, entry.problem_context, entry.root_cause, entry.solution_steps, entry.evidence
    )
}

pub fn metadata(entry: &KnowledgeEntry) -> DocumentMetadata {
    DocumentMetadata {
        tags: split_tags(&entry.tags),
        contributor: entry.contributor.clone(),
        timestamp: format_ts_iso(entry.created_at),
        doc_type: DOC_TYPE.to_string(),
        intent: entry.intent.clone(),
    }
}

pub fn to_document(entry: &KnowledgeEntry) -> Document {
    let text = reconstruct(entry);
    let content_hash = content_hash(&text);
    Document {
        id: entry.id.clone(),
        text,
        content_hash,
        metadata: metadata(entry),
    }
}

/// SHA-256 of the reconstructed text, lowercase hex.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn split_tags(tags: &str) -> Vec<String> {
    tags.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
        .unwrap_or_else(|| ts.to_string())
}
