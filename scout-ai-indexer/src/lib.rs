//! scout-ai-indexer: incremental file indexing with dual-index retrieval
//!
//! This crate keeps two indexes of a user's local files consistent (a
//! structured file catalog and a chunked vector store) and routes
//! natural-language questions to whichever can answer them. Indexing is
//! incremental: an external-index snapshot is polled and diffed, and only
//! the classified changes are re-parsed, re-chunked and re-embedded.
//!
//! ## Key Modules
//!
//! - **[`catalog`]**: the structured file index capability and its SQLite
//!   implementation
//! - **[`parse`]**: extension-driven content parsing into a tagged variant
//! - **[`store`]**: the persistent vector collection with deterministic
//!   chunk ids
//! - **[`detect`]** / **[`sync`]**: snapshot diffing and the background
//!   reconcile-then-monitor loop
//! - **[`router`]** / **[`assistant`]**: query routing with provenance, and
//!   the two-step answer facade
//!
//! ## Architecture
//!
//! ```text
//! Catalog ──snapshot──> ChangeDetector ──ChangeEvents──> consumers
//!    ↑                        ↑                              │
//! folder walk            SyncEngine (one task)          VectorStore
//!                             │                              │
//!                        ReadyGate ──────> QueryRouter <── similarity
//!                                               │
//!                                           Assistant
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scout_ai_indexer::catalog::SqliteCatalog;
//! use scout_ai_indexer::parse::ContentParser;
//! use scout_ai_indexer::store::{VectorStore, VectorStoreConfig};
//! use scout_ai_indexer::sync::{SyncEngine, SyncEngineConfig};
//! use scout_ai_indexer::testing::HashEmbedder;
//! use std::path::{Path, PathBuf};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let catalog = Arc::new(
//!     SqliteCatalog::open(Path::new("catalog.db"), vec![PathBuf::from(".")], vec![]).await?,
//! );
//! let store = Arc::new(
//!     VectorStore::open(
//!         Path::new("content.db"),
//!         ContentParser::with_defaults(),
//!         Arc::new(HashEmbedder::new(32)),
//!         VectorStoreConfig::default(),
//!     )
//!     .await?,
//! );
//! let handle = SyncEngine::spawn(catalog, store, vec![], SyncEngineConfig::default());
//! handle.wait_ready().await?;
//! # Ok(())
//! # }
//! ```

pub mod assistant;
pub mod catalog;
pub mod config;
pub mod detect;
pub mod parse;
pub mod router;
pub mod store;
pub mod sync;
pub mod testing;
