//! # scout-ai-embed
//!
//! Embedding adapter for the scout pipeline: a small [`EmbeddingProvider`]
//! trait plus a production implementation backed by local ONNX models via
//! FastEmbed. Embeddings are half-precision ([`half::f16`]) and normalized,
//! so cosine similarity reduces to a dot product downstream.
//!
//! The provider is deliberately thin. Loaded models are cached process-wide
//! by configuration so repeated construction with the same settings reuses
//! the same model, and batch embedding runs on the blocking thread pool to
//! keep the async executor responsive.

pub mod error;
pub mod provider;

pub use error::{EmbedError, Result};
pub use provider::{EmbedConfig, EmbeddingProvider, EmbeddingResult, FastEmbedProvider};
