//! Configuration for the scout pipeline.
//!
//! Stored as TOML. On first run a default configuration indexing the user's
//! home directory is written out, with platform cache folders excluded.

use crate::store::VectorStoreConfig;
use crate::sync::SyncEngineConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoutConfig {
    /// Folders whose files are indexed.
    pub index_folders: Vec<PathBuf>,
    /// Folders skipped during catalog scans.
    pub index_folder_exceptions: Vec<PathBuf>,
    /// Location of the file catalog database.
    pub catalog_db_path: PathBuf,
    /// Location of the vector store database.
    pub vector_db_path: PathBuf,
    /// Seconds between catalog polls.
    pub poll_interval_secs: u64,
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Overlap between neighbouring chunks.
    pub chunk_overlap: usize,
    /// Chunks embedded per provider call.
    pub chunk_batch_size: usize,
    /// Results returned by similarity queries.
    pub top_k: usize,
    /// Embedding model name for the FastEmbed provider.
    pub embedding_model: String,
}

impl Default for ScoutConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("scout");

        let mut exceptions = Vec::new();
        if cfg!(windows) {
            exceptions.push(home.join("AppData"));
        } else {
            exceptions.push(home.join(".cache"));
            exceptions.push(home.join(".local"));
        }

        Self {
            index_folders: vec![home],
            index_folder_exceptions: exceptions,
            catalog_db_path: data_dir.join("scout-catalog.db"),
            vector_db_path: data_dir.join("scout-content.db"),
            poll_interval_secs: 30,
            chunk_size: 500,
            chunk_overlap: 200,
            chunk_batch_size: 500,
            top_k: 5,
            embedding_model: "all-minilm-l6-v2".to_string(),
        }
    }
}

impl ScoutConfig {
    /// Load a config file, or write and return the defaults when it does
    /// not exist yet.
    pub async fn load_or_init(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path).await
        } else {
            let config = Self::default();
            config.save(path).await?;
            Ok(config)
        }
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config from {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config at {}", path.display()))
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let raw = toml::to_string_pretty(self)?;
        tokio::fs::write(path, raw)
            .await
            .with_context(|| format!("writing config to {}", path.display()))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn vector_store_config(&self) -> VectorStoreConfig {
        VectorStoreConfig {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            top_k: self.top_k,
            chunk_batch_size: self.chunk_batch_size,
        }
    }

    pub fn sync_engine_config(&self) -> SyncEngineConfig {
        SyncEngineConfig::default().with_poll_interval(self.poll_interval())
    }
}
