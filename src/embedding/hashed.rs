//! Deterministic feature-hashing embedder.
//!
//! Each lowercase alphanumeric token is hashed with SHA-256 into one of
//! `dims` buckets with a ±1 sign, and the resulting bag-of-words vector is
//! L2-normalized. Texts that share vocabulary land close together, the output
//! is identical across processes and platforms, and no network or model
//! download is involved. Used for offline operation and tests.

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::EmbeddingProvider;

pub const DEFAULT_MODEL: &str = "feature-hash-v1";
pub const DEFAULT_DIMS: usize = 256;

/// Upper bound on tokens hashed per text.
const MAX_TOKENS: usize = 4096;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "do", "for", "how", "i", "in", "is", "it",
    "of", "on", "or", "the", "to", "what", "with",
];

pub struct HashedProvider {
    model: String,
    dims: usize,
}

impl HashedProvider {
    pub fn new(model: Option<String>, dims: Option<usize>) -> Self {
        Self {
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            dims: dims.unwrap_or(DEFAULT_DIMS),
        }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dims];
        if self.dims == 0 {
            return embedding;
        }

        for token in tokens(text).take(MAX_TOKENS) {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let idx = (u64::from_le_bytes(bucket) % self.dims as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            embedding[idx] += sign;
        }

        normalize(&mut embedding);
        embedding
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
}

fn normalize(embedding: &mut [f32]) {
    let norm_sq: f32 = embedding.iter().map(|x| x * x).sum();
    if norm_sq <= 0.0 {
        return;
    }
    let inv_norm = norm_sq.sqrt().recip();
    for v in embedding.iter_mut() {
        *v *= inv_norm;
    }
}

#[async_trait]
impl EmbeddingProvider for HashedProvider {
    fn provider_name(&self) -> &str {
        "hash"
    }
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}
