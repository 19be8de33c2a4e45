//! Embedding provider trait and the FastEmbed-backed implementation.

use crate::error::{EmbedError, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use half::f16;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

/// Configuration for the FastEmbed provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedConfig {
    /// Name of the built-in FastEmbed model to load.
    pub model_name: String,
    /// Batch size used when embedding many texts at once.
    pub batch_size: usize,
    /// Whether to normalize embeddings to unit length.
    pub normalize: bool,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            model_name: "all-minilm-l6-v2".to_string(),
            batch_size: 16,
            normalize: true,
        }
    }
}

impl EmbedConfig {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            ..Self::default()
        }
    }

    /// Map the configured name onto a built-in FastEmbed model.
    fn resolve_model(&self) -> Result<EmbeddingModel> {
        match self.model_name.to_lowercase().as_str() {
            "all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
            "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
            "nomic-embed-text-v1.5" => Ok(EmbeddingModel::NomicEmbedTextV15),
            other => Err(EmbedError::invalid_config(format!(
                "unknown embedding model: {other}"
            ))),
        }
    }

    /// Cache key identifying the loaded model for this configuration.
    fn cache_key(&self) -> String {
        format!("{}:{}", self.model_name.to_lowercase(), self.normalize)
    }
}

/// Result of embedding a batch of texts.
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    /// One embedding per input text, in input order.
    pub embeddings: Vec<Vec<f16>>,
    /// Dimension of each embedding vector.
    pub dimension: usize,
}

impl EmbeddingResult {
    pub fn new(embeddings: Vec<Vec<f16>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

type ModelCacheEntry = (Arc<Mutex<TextEmbedding>>, usize);

/// Process-wide cache of initialized models, keyed by configuration.
static MODEL_CACHE: OnceLock<Mutex<HashMap<String, ModelCacheEntry>>> = OnceLock::new();

fn model_cache() -> &'static Mutex<HashMap<String, ModelCacheEntry>> {
    MODEL_CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Trait for anything that can turn text into embedding vectors.
///
/// Implementations must be deterministic: identical input text with an
/// identical configuration produces identical vectors. The indexing pipeline
/// depends on that for idempotent re-embedding.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text.
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>>;

    /// Embed a batch of texts.
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult>;

    /// Dimension of the vectors this provider produces.
    fn embedding_dimension(&self) -> usize;

    /// Short identifier for logging.
    fn provider_name(&self) -> &str;
}

/// FastEmbed-backed provider running local ONNX models.
#[derive(Clone)]
pub struct FastEmbedProvider {
    config: EmbedConfig,
    model: Arc<Mutex<TextEmbedding>>,
    dimension: usize,
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("config", &self.config)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl FastEmbedProvider {
    /// Load (or reuse from the process cache) the configured model.
    pub async fn create(config: EmbedConfig) -> Result<Self> {
        let cache_key = config.cache_key();

        let cached = {
            let cache = model_cache().lock().unwrap();
            cache
                .get(&cache_key)
                .map(|(model, dim)| (Arc::clone(model), *dim))
        };

        if let Some((model, dimension)) = cached {
            tracing::debug!("Reusing cached embedding model: {}", config.model_name);
            return Ok(Self {
                config,
                model,
                dimension,
            });
        }

        let embedding_model = config.resolve_model()?;
        let model_name = config.model_name.clone();

        let (model, dimension) =
            tokio::task::spawn_blocking(move || -> Result<(TextEmbedding, usize)> {
                tracing::info!("Loading embedding model: {model_name}");

                let init_options =
                    InitOptions::new(embedding_model).with_show_download_progress(false);
                let mut model = TextEmbedding::try_new(init_options)?;

                // Probe the dimension with a throwaway embedding.
                let probe = model.embed(vec!["probe".to_string()], None)?;
                let dimension = probe.first().map(|e| e.len()).unwrap_or(384);

                tracing::info!("Embedding model ready, dimension {dimension}");
                Ok((model, dimension))
            })
            .await??;

        let model = Arc::new(Mutex::new(model));
        {
            let mut cache = model_cache().lock().unwrap();
            cache.insert(cache_key, (Arc::clone(&model), dimension));
        }

        Ok(Self {
            config,
            model,
            dimension,
        })
    }

    /// Drop all cached models.
    pub fn clear_cache() {
        model_cache().lock().unwrap().clear();
    }

    fn convert(&self, embeddings: Vec<Vec<f32>>) -> Vec<Vec<f16>> {
        embeddings
            .into_iter()
            .map(|embedding| {
                let mut converted: Vec<f16> = embedding.into_iter().map(f16::from_f32).collect();
                if self.config.normalize {
                    let norm: f32 = converted
                        .iter()
                        .map(|x| x.to_f32() * x.to_f32())
                        .sum::<f32>()
                        .sqrt();
                    if norm > 0.0 {
                        for value in &mut converted {
                            *value = f16::from_f32(value.to_f32() / norm);
                        }
                    }
                }
                converted
            })
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>> {
        let texts = vec![text.to_string()];
        let result = self.embed_texts(&texts).await?;
        result
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::invalid_config("no embedding generated for text"))
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }

        tracing::debug!("Embedding {} texts", texts.len());

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size) {
            let batch = batch.to_vec();
            let model = Arc::clone(&self.model);

            let raw = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
                let mut guard = model.lock().unwrap();
                Ok(guard.embed(batch, None)?)
            })
            .await??;

            all_embeddings.extend(self.convert(raw));
        }

        Ok(EmbeddingResult::new(all_embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "fastembed"
    }
}
