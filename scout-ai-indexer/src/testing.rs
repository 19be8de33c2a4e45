//! Deterministic test doubles for the pipeline's capability seams.

use crate::catalog::{CatalogError, CatalogRecord, CatalogRows, CatalogState, FileCatalog, StateOrder};
use async_trait::async_trait;
use half::f16;
use scout_ai_embed::{EmbedError, EmbeddingProvider, EmbeddingResult};
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

/// Embedding provider that derives pseudo-embeddings from a hash of the
/// input text. Identical text always maps to the identical unit vector, so
/// similarity search behaves predictably without loading a model.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed(&self, text: &str) -> Vec<f16> {
        let mut values: Vec<f32> = (0..self.dimension)
            .map(|i| {
                let mut hasher = std::collections::hash_map::DefaultHasher::new();
                text.hash(&mut hasher);
                i.hash(&mut hasher);
                let bucket = hasher.finish() % 2000;
                (bucket as f32 / 1000.0) - 1.0
            })
            .collect();

        let norm: f32 = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut values {
                *value /= norm;
            }
        }
        values.into_iter().map(f16::from_f32).collect()
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>, EmbedError> {
        Ok(self.embed(text))
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult, EmbedError> {
        Ok(EmbeddingResult::new(
            texts.iter().map(|t| self.embed(t)).collect(),
        ))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "hash"
    }
}

/// In-memory catalog whose state tests mutate directly. Structured queries
/// are unsupported and fail the way a broken query would.
#[derive(Default)]
pub struct StaticCatalog {
    state: Mutex<CatalogState>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, state: CatalogState) {
        *self.state.lock().unwrap() = state;
    }

    pub fn insert(&self, path: impl Into<String>, modified_at: i64) {
        let path = path.into();
        self.state.lock().unwrap().insert(
            path.clone(),
            CatalogRecord { path, modified_at },
        );
    }

    pub fn remove(&self, path: &str) {
        self.state.lock().unwrap().remove(path);
    }
}

#[async_trait]
impl FileCatalog for StaticCatalog {
    async fn current_state(&self, _order: StateOrder) -> Result<CatalogState, CatalogError> {
        Ok(self.state.lock().unwrap().clone())
    }

    async fn execute(&self, _query: &str) -> Result<CatalogRows, CatalogError> {
        Err(CatalogError::Query(
            "static catalog does not support structured queries".to_string(),
        ))
    }
}
