//! Error types for the embedding adapter.

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Error type covering configuration, model loading and generation failures.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// The embedding configuration names an unknown model or is otherwise
    /// unusable.
    #[error("Invalid embedding configuration: {message}")]
    InvalidConfig { message: String },

    /// A blocking embedding task panicked or was cancelled.
    #[error("Embedding task failed: {source}")]
    AsyncTask {
        #[from]
        source: tokio::task::JoinError,
    },

    /// Failure surfaced by the underlying embedding engine.
    #[error("Embedding engine error: {source}")]
    Engine {
        #[from]
        source: anyhow::Error,
    },
}

impl EmbedError {
    /// Convenience constructor for configuration errors.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
