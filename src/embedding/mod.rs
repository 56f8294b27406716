//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and concrete implementations:
//! - **[`DisabledProvider`]**: returns errors; used when embeddings are not configured.
//! - **[`OpenAIProvider`]**: calls the OpenAI embeddings API with retry and backoff.
//! - **[`OllamaProvider`]**: calls a local Ollama instance's `/api/embed` endpoint.
//! - **`LocalProvider`**: runs models locally via fastembed (feature `local-embeddings-fastembed`).
//! - **[`HashedProvider`]**: deterministic feature hashing, fully offline.
//!
//! # Model identity
//!
//! Every provider reports a [`EmbeddingProvider::model_id`] of the form
//! `"<provider>:<model>"`. The index builder stamps it into the manifest and
//! the index file; vectors produced under different ids are never mixed.
//! [`create_provider_for_model`] reverses the mapping so the read path can
//! embed queries with exactly the model an index was built with.
//!
//! # Retry Strategy
//!
//! The OpenAI and Ollama providers use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

mod hashed;

pub use hashed::HashedProvider;

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

/// An opaque `texts → vectors` function with a stable identity.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Provider family, e.g. `"openai"`.
    fn provider_name(&self) -> &str;
    /// Model identifier within the family, e.g. `"text-embedding-3-small"`.
    fn model_name(&self) -> &str;
    /// Vector dimensionality.
    fn dims(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    fn model_id(&self) -> String {
        format!("{}:{}", self.provider_name(), self.model_name())
    }
}

/// Embed `texts` in batches of `batch_size`, checking the count and
/// dimensionality of every returned vector.
pub async fn embed_batched(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut vectors = Vec::with_capacity(texts.len());

    for batch in texts.chunks(batch_size.max(1)) {
        let batch_vectors = provider.embed(batch).await.map_err(Error::Provider)?;
        if batch_vectors.len() != batch.len() {
            return Err(Error::Provider(anyhow!(
                "{} returned {} vectors for {} texts",
                provider.model_id(),
                batch_vectors.len(),
                batch.len()
            )));
        }
        if let Some(bad) = batch_vectors.iter().find(|v| v.len() != provider.dims()) {
            return Err(Error::Provider(anyhow!(
                "{} returned a {}-dimensional vector, expected {}",
                provider.model_id(),
                bad.len(),
                provider.dims()
            )));
        }
        vectors.extend(batch_vectors);
    }

    Ok(vectors)
}

/// Embed a single query text.
pub async fn embed_query(provider: &dyn EmbeddingProvider, text: &str) -> Result<Vec<f32>> {
    let results = embed_batched(provider, &[text.to_string()], 1).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| Error::Provider(anyhow!("Empty embedding response")))
}

// ============ Disabled Provider ============

/// A no-op provider that always fails.
///
/// Used when `embedding.provider = "disabled"`.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn provider_name(&self) -> &str {
        "disabled"
    }
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }

    async fn embed(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.")
    }
}

fn http_client(config: &EmbeddingConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API.
///
/// Calls `POST /v1/embeddings` with the configured model. Requires the
/// `OPENAI_API_KEY` environment variable.
pub struct OpenAIProvider {
    model: String,
    dims: usize,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| Error::Config("embedding.model required for OpenAI provider".into()))?;
        let dims = config
            .dims
            .ok_or_else(|| Error::Config("embedding.dims required for OpenAI provider".into()))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::Config("OPENAI_API_KEY environment variable not set".into()))?;

        Ok(Self {
            model,
            dims,
            api_key,
            max_retries: config.max_retries,
            client: http_client(config)?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn provider_name(&self) -> &str {
        "openai"
    }
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let json = post_with_retry(
            "OpenAI",
            self.max_retries,
            || {
                self.client
                    .post("https://api.openai.com/v1/embeddings")
                    .header("Authorization", format!("Bearer {}", self.api_key))
                    .json(&body)
            },
            |e| anyhow!(e),
        )
        .await?;

        parse_openai_response(&json)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> anyhow::Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        let embedding = item
            .get("embedding")
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing embedding"))?;
        indexed.push((index, parse_vector(embedding)?));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default `http://localhost:11434`).
pub struct OllamaProvider {
    model: String,
    dims: usize,
    url: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| Error::Config("embedding.model required for Ollama provider".into()))?;
        let dims = config
            .dims
            .ok_or_else(|| Error::Config("embedding.dims required for Ollama provider".into()))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        Ok(Self {
            model,
            dims,
            url,
            max_retries: config.max_retries,
            client: http_client(config)?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn provider_name(&self) -> &str {
        "ollama"
    }
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let endpoint = format!("{}/api/embed", self.url.trim_end_matches('/'));

        let json = post_with_retry(
            "Ollama",
            self.max_retries,
            || self.client.post(&endpoint).json(&body),
            |e| {
                anyhow!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    self.url,
                    e
                )
            },
        )
        .await?;

        let embeddings = json
            .get("embeddings")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?;

        embeddings.iter().map(parse_vector).collect()
    }
}

fn parse_vector(value: &serde_json::Value) -> anyhow::Result<Vec<f32>> {
    Ok(value
        .as_array()
        .ok_or_else(|| anyhow!("Invalid embedding response: embedding is not an array"))?
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

/// POST a JSON request with exponential backoff on 429, 5xx and network errors.
async fn post_with_retry<B, E>(
    service: &str,
    max_retries: u32,
    build: B,
    on_network_error: E,
) -> anyhow::Result<serde_json::Value>
where
    B: Fn() -> reqwest::RequestBuilder,
    E: Fn(reqwest::Error) -> anyhow::Error,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tracing::debug!(service, attempt, ?delay, "retrying embedding request");
            tokio::time::sleep(delay).await;
        }

        match build().send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                let body_text = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(anyhow!("{} API error {}: {}", service, status, body_text));
                    continue;
                }

                bail!("{} API error {}: {}", service, status, body_text);
            }
            Err(e) => {
                last_err = Some(on_network_error(e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{} embedding failed after retries", service)))
}

// ============ Local Provider (fastembed) ============

#[cfg(feature = "local-embeddings-fastembed")]
pub use local::LocalProvider;

#[cfg(feature = "local-embeddings-fastembed")]
mod local {
    use anyhow::{anyhow, bail};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    use super::EmbeddingProvider;
    use crate::config::EmbeddingConfig;

    /// Runs an ONNX embedding model in-process.
    ///
    /// The model is downloaded from Hugging Face on first use and cached;
    /// afterwards no network calls are made. The loaded model is kept for the
    /// lifetime of the provider.
    pub struct LocalProvider {
        model_name: String,
        dims: usize,
        batch_size: usize,
        model: Arc<Mutex<Option<fastembed::TextEmbedding>>>,
    }

    impl LocalProvider {
        pub fn new(config: &EmbeddingConfig) -> crate::error::Result<Self> {
            let model_name = config
                .model
                .clone()
                .unwrap_or_else(|| "all-minilm-l6-v2".to_string());
            config_to_fastembed_model(&model_name)
                .map_err(|e| crate::error::Error::Config(e.to_string()))?;

            let dims = config.dims.unwrap_or(match model_name.as_str() {
                "bge-base-en-v1.5" | "nomic-embed-text-v1" | "nomic-embed-text-v1.5" => 768,
                "bge-large-en-v1.5" => 1024,
                _ => 384,
            });

            Ok(Self {
                model_name,
                dims,
                batch_size: config.batch_size,
                model: Arc::new(Mutex::new(None)),
            })
        }
    }

    fn config_to_fastembed_model(name: &str) -> anyhow::Result<fastembed::EmbeddingModel> {
        match name {
            "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
            "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
            "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
            "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
            "nomic-embed-text-v1" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV1),
            "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
            other => bail!(
                "Unknown local embedding model: '{}'. Supported models: \
                 all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
                 nomic-embed-text-v1, nomic-embed-text-v1.5",
                other
            ),
        }
    }

    #[async_trait]
    impl EmbeddingProvider for LocalProvider {
        fn provider_name(&self) -> &str {
            "local"
        }
        fn model_name(&self) -> &str {
            &self.model_name
        }
        fn dims(&self) -> usize {
            self.dims
        }

        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            let fastembed_model = config_to_fastembed_model(&self.model_name)?;
            let batch_size = self.batch_size;
            let texts = texts.to_vec();
            let slot = Arc::clone(&self.model);

            tokio::task::spawn_blocking(move || {
                let mut guard = slot
                    .lock()
                    .map_err(|_| anyhow!("local embedding model lock poisoned"))?;
                if guard.is_none() {
                    let model = fastembed::TextEmbedding::try_new(
                        fastembed::InitOptions::new(fastembed_model)
                            .with_show_download_progress(true),
                    )
                    .map_err(|e| anyhow!("Failed to initialize local embedding model: {}", e))?;
                    *guard = Some(model);
                }
                let model = guard
                    .as_mut()
                    .ok_or_else(|| anyhow!("local embedding model not initialized"))?;
                model
                    .embed(texts, Some(batch_size))
                    .map_err(|e| anyhow!("Local embedding failed: {}", e))
            })
            .await?
        }
    }
}

/// Create the [`EmbeddingProvider`] named by `config.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"openai"` | [`OpenAIProvider`] |
/// | `"ollama"` | [`OllamaProvider`] |
/// | `"local"` | `LocalProvider` (feature `local-embeddings-fastembed`) |
/// | `"hash"` | [`HashedProvider`] |
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "openai" => Ok(Arc::new(OpenAIProvider::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalProvider::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => Err(Error::Config(
            "Local embedding provider requires --features local-embeddings-fastembed".into(),
        )),
        "hash" => Ok(Arc::new(HashedProvider::new(
            config.model.clone(),
            config.dims,
        ))),
        other => Err(Error::Config(format!(
            "Unknown embedding provider: {}",
            other
        ))),
    }
}

/// Create a provider for a `"<provider>:<model>"` id recorded in a manifest,
/// reusing transport settings (URL, timeout, retries) from `config`.
pub fn create_provider_for_model(
    config: &EmbeddingConfig,
    model_id: &str,
    dims: usize,
) -> Result<Arc<dyn EmbeddingProvider>> {
    let (provider, model) = model_id.split_once(':').ok_or_else(|| {
        Error::Config(format!(
            "malformed embedding model id '{}' (expected provider:model)",
            model_id
        ))
    })?;

    let resolved = EmbeddingConfig {
        provider: provider.to_string(),
        model: Some(model.to_string()),
        dims: Some(dims),
        ..config.clone()
    };
    let created = create_provider(&resolved)?;

    if created.model_id() != model_id {
        return Err(Error::ModelMismatch {
            index_model: model_id.to_string(),
            provider_model: created.model_id(),
        });
    }
    Ok(created)
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors of
/// different lengths, and zero vectors.
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal_and_opposite() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_parse_openai_response_orders_by_index() {
        let json = serde_json::json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0] },
                { "index": 0, "embedding": [1.0, 0.0] }
            ]
        });
        let vectors = parse_openai_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        assert!(parse_openai_response(&serde_json::json!({})).is_err());
    }

    #[test]
    fn test_create_provider_variants() {
        let disabled = create_provider(&EmbeddingConfig::default()).unwrap();
        assert_eq!(disabled.model_id(), "disabled:disabled");

        let hash = create_provider(&EmbeddingConfig {
            provider: "hash".into(),
            dims: Some(32),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(hash.model_id(), "hash:feature-hash-v1");
        assert_eq!(hash.dims(), 32);

        let err = create_provider(&EmbeddingConfig {
            provider: "cohere".into(),
            ..Default::default()
        })
        .err()
        .unwrap();
        assert!(err.is_config());
    }

    #[test]
    fn test_create_provider_for_model() {
        let config = EmbeddingConfig::default();
        let provider = create_provider_for_model(&config, "hash:custom", 16).unwrap();
        assert_eq!(provider.model_id(), "hash:custom");
        assert_eq!(provider.dims(), 16);

        assert!(create_provider_for_model(&config, "no-separator", 16).is_err());
    }

    #[tokio::test]
    async fn test_disabled_embed_is_provider_error() {
        let err = embed_query(&DisabledProvider, "hello").await.unwrap_err();
        assert!(err.is_provider());
    }

    #[tokio::test]
    async fn test_embed_batched_checks_dims() {
        struct Short;
        #[async_trait]
        impl EmbeddingProvider for Short {
            fn provider_name(&self) -> &str {
                "test"
            }
            fn model_name(&self) -> &str {
                "short"
            }
            fn dims(&self) -> usize {
                4
            }
            async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
                Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
            }
        }

        let err = embed_batched(&Short, &["a".to_string()], 8)
            .await
            .unwrap_err();
        assert!(err.is_provider());
    }

    #[tokio::test]
    async fn test_embed_batched_preserves_order() {
        let provider = HashedProvider::new(None, Some(16));
        let texts: Vec<String> = (0..5).map(|i| format!("text number {}", i)).collect();
        let vectors = embed_batched(&provider, &texts, 2).await.unwrap();
        assert_eq!(vectors.len(), 5);
        for (text, vector) in texts.iter().zip(&vectors) {
            assert_eq!(vector, &provider.embed_one(text));
        }
    }
}
