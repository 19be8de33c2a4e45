//! The structured file catalog capability.
//!
//! The catalog is the pipeline's source of truth for which files exist and
//! when they changed. The synchronization loop only ever sees the
//! [`FileCatalog`] trait; exactly one production implementation is selected
//! at startup by configuration ([`SqliteCatalog`] on this target), never by
//! runtime platform sniffing at call sites.

pub mod sqlite;

pub use sqlite::SqliteCatalog;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tracked fields for one catalog row. Change detection is defined purely
/// over these fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub path: String,
    pub modified_at: i64,
}

/// A full snapshot of the catalog's indexable files, keyed by path.
pub type CatalogState = BTreeMap<String, CatalogRecord>;

/// Sort order for snapshot fetches. The map result is order-independent;
/// this only shapes the underlying query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateOrder {
    ModifiedAt,
    Size,
}

/// Rows returned by a structured query: column names plus stringified
/// values, one `Vec<String>` per row.
#[derive(Debug, Clone, Default)]
pub struct CatalogRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CatalogRows {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Render rows as `col: value, col: value` lines, one line per row.
    pub fn to_context_lines(&self) -> String {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row.iter())
                    .map(|(column, value)| format!("{column}: {value}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Catalog failures, split by how callers recover.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The catalog could not be reached or refreshed. The caller keeps its
    /// previous snapshot and retries on the next poll cycle.
    #[error("file catalog unavailable: {0}")]
    Unavailable(String),

    /// Walking the configured folders failed.
    #[error("catalog scan failed: {source}")]
    Scan {
        #[from]
        source: std::io::Error,
    },

    /// A structured query failed at execution time. The query router treats
    /// this as a fallback trigger, never a hard failure.
    #[error("structured query failed: {0}")]
    Query(String),
}

/// Queryable catalog of file metadata, restricted to the parsable extension
/// allowlist.
#[async_trait]
pub trait FileCatalog: Send + Sync {
    /// Snapshot of all indexable files with their tracked fields.
    async fn current_state(&self, order: StateOrder) -> Result<CatalogState, CatalogError>;

    /// Execute a structured query and return its rows.
    async fn execute(&self, query: &str) -> Result<CatalogRows, CatalogError>;
}
