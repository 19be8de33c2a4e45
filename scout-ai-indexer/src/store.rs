//! Vector store: a persistent chunk collection kept consistent with the
//! file catalog.
//!
//! ## Schema
//!
//! ```sql
//! CREATE TABLE file_content (
//!     chunk_id TEXT PRIMARY KEY,   -- "{path}_{ordinal+1}", deterministic
//!     path TEXT NOT NULL,          -- source file
//!     fileext TEXT NOT NULL,       -- lowercased extension
//!     modified_at INTEGER NOT NULL,-- source mtime at ingest (unix seconds)
//!     content TEXT NOT NULL,       -- chunk text
//!     embedding BLOB               -- f16 vector
//! );
//! ```
//!
//! Chunk ids are derived from the source path and the chunk ordinal only, so
//! re-chunking unchanged content regenerates the same ids and an upsert is
//! idempotent. `update` replaces a path wholesale inside one transaction,
//! which also removes trailing chunks left over when a file shrinks.
//!
//! SQLite runs in WAL mode with a busy timeout, so similarity queries can
//! interleave with the monitor task's writes at the database's own
//! transaction granularity.

use crate::catalog::{CatalogRecord, CatalogState};
use crate::detect::{ChangeEvent, ChangeKind};
use crate::parse::{ContentParser, SplitterKind, extension_of, splitter_kind};
use crate::sync::ChangeConsumer;
use anyhow::Result;
use async_trait::async_trait;
use half::f16;
use scout_ai_context::{splitter_for_document, splitter_for_text};
use scout_ai_embed::EmbeddingProvider;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Knobs for chunking, embedding and retrieval.
#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Overlap carried between neighbouring chunks.
    pub chunk_overlap: usize,
    /// Default number of results for similarity queries.
    pub top_k: usize,
    /// How many chunks to embed per provider call.
    pub chunk_batch_size: usize,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 200,
            top_k: 5,
            chunk_batch_size: 500,
        }
    }
}

/// One stored chunk.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub chunk_id: String,
    pub path: String,
    pub fileext: String,
    pub modified_at: i64,
    pub content: String,
    pub embedding: Option<Vec<f16>>,
}

/// Counts over the stored collection.
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub chunks: usize,
    pub files: usize,
    pub embedded: usize,
}

/// Deterministic chunk id: source path plus 1-based ordinal.
pub fn chunk_id(path: &str, ordinal: usize) -> String {
    format!("{}_{}", path, ordinal + 1)
}

/// The persistent vector collection.
pub struct VectorStore {
    pool: SqlitePool,
    parser: ContentParser,
    embedder: Arc<dyn EmbeddingProvider>,
    config: VectorStoreConfig,
}

impl VectorStore {
    /// Open (creating if missing) the store database.
    pub async fn open(
        db_path: &Path,
        parser: ContentParser,
        embedder: Arc<dyn EmbeddingProvider>,
        config: VectorStoreConfig,
    ) -> Result<Self> {
        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(db_path)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .create_if_missing(true),
        )
        .await?;
        Self::new_with_pool(pool, parser, embedder, config).await
    }

    /// In-memory store for tests. A single pooled connection keeps the
    /// in-memory database alive; separate connections would each see their
    /// own empty database.
    pub async fn open_memory(
        parser: ContentParser,
        embedder: Arc<dyn EmbeddingProvider>,
        config: VectorStoreConfig,
    ) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::new_with_pool(pool, parser, embedder, config).await
    }

    async fn new_with_pool(
        pool: SqlitePool,
        parser: ContentParser,
        embedder: Arc<dyn EmbeddingProvider>,
        config: VectorStoreConfig,
    ) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS file_content (
                chunk_id TEXT PRIMARY KEY,
                path TEXT NOT NULL,
                fileext TEXT NOT NULL,
                modified_at INTEGER NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_file_content_path ON file_content(path)")
            .execute(&pool)
            .await?;

        Ok(Self {
            pool,
            parser,
            embedder,
            config,
        })
    }

    pub fn config(&self) -> &VectorStoreConfig {
        &self.config
    }

    /// Parse, chunk and embed one file into insert-ready records. An empty
    /// result means the file contributes nothing (unsupported or empty
    /// content), which is not an error.
    async fn build_chunks(&self, path: &str, modified_at: i64) -> Result<Vec<ChunkRecord>> {
        let file_path = Path::new(path);
        let parsed = self.parser.parse(file_path).await?;
        let Some(text) = parsed.into_document_text() else {
            return Ok(Vec::new());
        };
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let splitter = match splitter_kind(file_path) {
            SplitterKind::Markdown => {
                splitter_for_document(path, self.config.chunk_size, self.config.chunk_overlap)
            }
            SplitterKind::Plain => {
                splitter_for_text(path, self.config.chunk_size, self.config.chunk_overlap)
            }
        };
        let chunks = splitter.split(&text);

        let fileext = extension_of(file_path).unwrap_or_default();
        let mut records: Vec<ChunkRecord> = chunks
            .into_iter()
            .map(|chunk| ChunkRecord {
                chunk_id: chunk_id(path, chunk.sequence),
                path: path.to_string(),
                fileext: fileext.clone(),
                modified_at,
                content: chunk.text,
                embedding: None,
            })
            .collect();

        for batch in records.chunks_mut(self.config.chunk_batch_size) {
            let texts: Vec<String> = batch.iter().map(|r| r.content.clone()).collect();
            let result = self.embedder.embed_texts(&texts).await?;
            for (record, embedding) in batch.iter_mut().zip(result.embeddings) {
                record.embedding = Some(embedding);
            }
        }

        Ok(records)
    }

    async fn insert_record(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        record: &ChunkRecord,
    ) -> Result<()> {
        let embedding_bytes = record
            .embedding
            .as_ref()
            .map(|e| bytemuck::cast_slice::<f16, u8>(e).to_vec());

        sqlx::query(
            r#"
            INSERT INTO file_content (chunk_id, path, fileext, modified_at, content, embedding)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(chunk_id) DO UPDATE SET
                path = excluded.path,
                fileext = excluded.fileext,
                modified_at = excluded.modified_at,
                content = excluded.content,
                embedding = excluded.embedding
            "#,
        )
        .bind(&record.chunk_id)
        .bind(&record.path)
        .bind(&record.fileext)
        .bind(record.modified_at)
        .bind(&record.content)
        .bind(embedding_bytes)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Ingest a newly observed file. A file with unsupported or empty
    /// content is a silent no-op.
    pub async fn add(&self, path: &str, modified_at: i64) -> Result<usize> {
        let records = self.build_chunks(path, modified_at).await?;
        if records.is_empty() {
            debug!("No indexable content in {path}, skipping");
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        for record in &records {
            Self::insert_record(&mut tx, record).await?;
        }
        tx.commit().await?;
        Ok(records.len())
    }

    /// Re-ingest a modified file. Prior chunks for the path are removed and
    /// the fresh set inserted in the same transaction, so a file that shrank
    /// leaves no stale trailing chunks behind.
    pub async fn update(&self, path: &str, modified_at: i64) -> Result<usize> {
        let records = self.build_chunks(path, modified_at).await?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM file_content WHERE path = ?1")
            .bind(path)
            .execute(&mut *tx)
            .await?;
        for record in &records {
            Self::insert_record(&mut tx, record).await?;
        }
        tx.commit().await?;
        Ok(records.len())
    }

    /// Remove every chunk belonging to a path.
    pub async fn delete(&self, path: &str) -> Result<usize> {
        let result = sqlx::query("DELETE FROM file_content WHERE path = ?1")
            .bind(path)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    /// Rank stored chunks against a query text by cosine similarity,
    /// most similar first.
    pub async fn search(&self, text: &str, top_k: usize) -> Result<Vec<(f32, ChunkRecord)>> {
        let query_embedding = self.embedder.embed_text(text).await?;

        let rows = sqlx::query(
            "SELECT chunk_id, path, fileext, modified_at, content, embedding
             FROM file_content WHERE embedding IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<(f32, ChunkRecord)> = Vec::with_capacity(rows.len());
        for row in rows {
            let embedding_bytes: Vec<u8> = row.get("embedding");
            let embedding: Vec<f16> = bytemuck::pod_collect_to_vec(&embedding_bytes);
            let similarity = cosine_similarity(&query_embedding, &embedding);

            scored.push((
                similarity,
                ChunkRecord {
                    chunk_id: row.get("chunk_id"),
                    path: row.get("path"),
                    fileext: row.get("fileext"),
                    modified_at: row.get("modified_at"),
                    content: row.get("content"),
                    embedding: Some(embedding),
                },
            ));
        }

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    /// Top-k chunk texts for a query, concatenated with blank lines,
    /// ranked most similar first.
    pub async fn query(&self, text: &str, top_k: usize) -> Result<String> {
        let results = self.search(text, top_k).await?;
        Ok(results
            .into_iter()
            .map(|(_, chunk)| chunk.content)
            .collect::<Vec<_>>()
            .join("\n\n"))
    }

    /// The `(path, modified_at)` pairs this store has materialized, used as
    /// the reconciliation baseline on startup.
    pub async fn materialized_state(&self) -> Result<CatalogState> {
        let rows = sqlx::query("SELECT DISTINCT path, modified_at FROM file_content")
            .fetch_all(&self.pool)
            .await?;

        let mut state = CatalogState::new();
        for row in rows {
            let path: String = row.get("path");
            let modified_at: i64 = row.get("modified_at");
            state.insert(path.clone(), CatalogRecord { path, modified_at });
        }
        Ok(state)
    }

    /// All chunks stored for one path, in insertion order.
    pub async fn chunks_for_path(&self, path: &str) -> Result<Vec<ChunkRecord>> {
        let rows = sqlx::query(
            "SELECT chunk_id, path, fileext, modified_at, content, embedding
             FROM file_content WHERE path = ?1 ORDER BY rowid",
        )
        .bind(path)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let embedding_bytes: Option<Vec<u8>> = row.get("embedding");
                ChunkRecord {
                    chunk_id: row.get("chunk_id"),
                    path: row.get("path"),
                    fileext: row.get("fileext"),
                    modified_at: row.get("modified_at"),
                    content: row.get("content"),
                    embedding: embedding_bytes.map(|bytes| bytemuck::pod_collect_to_vec(&bytes)),
                }
            })
            .collect())
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM file_content")
            .fetch_one(&self.pool)
            .await?;
        let files: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT path) FROM file_content")
            .fetch_one(&self.pool)
            .await?;
        let embedded: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM file_content WHERE embedding IS NOT NULL")
                .fetch_one(&self.pool)
                .await?;

        Ok(StoreStats {
            chunks: chunks as usize,
            files: files as usize,
            embedded: embedded as usize,
        })
    }
}

#[async_trait]
impl ChangeConsumer for VectorStore {
    async fn apply(&self, changes: &[ChangeEvent]) -> Result<()> {
        for change in changes {
            let outcome = match change.kind {
                ChangeKind::Deleted => self.delete(&change.path).await.map(|_| ()),
                ChangeKind::Added => self.add(&change.path, change.modified_at).await.map(|_| ()),
                ChangeKind::Modified => {
                    self.update(&change.path, change.modified_at).await.map(|_| ())
                }
            };
            // One bad file must not sink the rest of the batch.
            if let Err(e) = outcome {
                warn!("Failed to apply {:?} for {}: {e:#}", change.kind, change.path);
            }
        }
        Ok(())
    }
}

/// Cosine similarity between two f16 vectors; 0.0 on dimension mismatch.
fn cosine_similarity(a: &[f16], b: &[f16]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| f32::from(*x) * f32::from(*y))
        .sum();
    let norm_a: f32 = a.iter().map(|x| f32::from(*x).powi(2)).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| f32::from(*x).powi(2)).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::HashEmbedder;

    async fn store() -> VectorStore {
        VectorStore::open_memory(
            ContentParser::with_defaults(),
            Arc::new(HashEmbedder::new(32)),
            VectorStoreConfig {
                chunk_size: 80,
                chunk_overlap: 20,
                ..VectorStoreConfig::default()
            },
        )
        .await
        .unwrap()
    }

    async fn write_file(dir: &Path, name: &str, content: &str) -> String {
        let path = dir.join(name);
        tokio::fs::write(&path, content).await.unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn chunk_ids_start_at_one() {
        assert_eq!(chunk_id("/a/b.txt", 0), "/a/b.txt_1");
        assert_eq!(chunk_id("/a/b.txt", 4), "/a/b.txt_5");
    }

    #[tokio::test]
    async fn unsupported_extension_is_a_silent_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "data.zip", "not indexable").await;

        let store = store().await;
        let inserted = store.add(&path, 100).await.unwrap();

        assert_eq!(inserted, 0);
        assert!(store.chunks_for_path(&path).await.unwrap().is_empty());
        assert_eq!(store.stats().await.unwrap().chunks, 0);
    }

    #[tokio::test]
    async fn empty_content_is_a_silent_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "blank.txt", "   \n  ").await;

        let store = store().await;
        assert_eq!(store.add(&path, 100).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn update_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let content = (0..30).map(|i| format!("line {i}\n")).collect::<String>();
        let path = write_file(dir.path(), "notes.txt", &content).await;

        let store = store().await;
        store.update(&path, 100).await.unwrap();
        let first = store.chunks_for_path(&path).await.unwrap();
        store.update(&path, 100).await.unwrap();
        let second = store.chunks_for_path(&path).await.unwrap();

        assert!(!first.is_empty());
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.chunk_id, b.chunk_id);
            assert_eq!(a.content, b.content);
            assert_eq!(a.modified_at, b.modified_at);
            assert_eq!(a.embedding, b.embedding);
        }
    }

    #[tokio::test]
    async fn shrinking_file_leaves_no_stale_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let long = (0..60).map(|i| format!("sentence number {i}\n")).collect::<String>();
        let path = write_file(dir.path(), "shrink.txt", &long).await;

        let store = store().await;
        store.add(&path, 100).await.unwrap();
        let before = store.chunks_for_path(&path).await.unwrap();
        assert!(before.len() > 1);

        tokio::fs::write(&path, "just one line now\n").await.unwrap();
        store.update(&path, 200).await.unwrap();
        let after = store.chunks_for_path(&path).await.unwrap();

        assert_eq!(after.len(), 1);
        assert_eq!(after[0].chunk_id, chunk_id(&path, 0));
        assert_eq!(after[0].modified_at, 200);
    }

    #[tokio::test]
    async fn delete_cascades_to_one_path_only() {
        let dir = tempfile::tempdir().unwrap();
        // Both files produce a chunk ordinal 1, so the ids collide in shape
        // but not in value.
        let a = write_file(dir.path(), "a.txt", "alpha file contents").await;
        let b = write_file(dir.path(), "b.txt", "beta file contents").await;

        let store = store().await;
        store.add(&a, 100).await.unwrap();
        store.add(&b, 100).await.unwrap();

        let removed = store.delete(&a).await.unwrap();
        assert!(removed >= 1);
        assert!(store.chunks_for_path(&a).await.unwrap().is_empty());

        let remaining = store.chunks_for_path(&b).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].chunk_id, chunk_id(&b, 0));
    }

    #[tokio::test]
    async fn query_ranks_exact_text_first() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_file(dir.path(), "a.txt", "the quick brown fox").await;
        let b = write_file(dir.path(), "b.txt", "an entirely different subject").await;

        let store = store().await;
        store.add(&a, 100).await.unwrap();
        store.add(&b, 100).await.unwrap();

        // The hash embedder maps identical text to identical vectors, so an
        // exact match ranks first with similarity ~1.
        let results = store.search("the quick brown fox", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].1.path, a);
        assert!(results[0].0 > results[1].0);

        let context = store.query("the quick brown fox", 1).await.unwrap();
        assert_eq!(context, "the quick brown fox");
    }

    #[tokio::test]
    async fn materialized_state_reflects_stored_paths() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_file(dir.path(), "a.txt", "alpha").await;
        let b = write_file(dir.path(), "b.txt", "beta").await;

        let store = store().await;
        store.add(&a, 111).await.unwrap();
        store.add(&b, 222).await.unwrap();

        let state = store.materialized_state().await.unwrap();
        assert_eq!(state.len(), 2);
        assert_eq!(state.get(&a).unwrap().modified_at, 111);
        assert_eq!(state.get(&b).unwrap().modified_at, 222);
    }

    #[tokio::test]
    async fn consumer_applies_all_three_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_file(dir.path(), "a.txt", "first version").await;
        let b = write_file(dir.path(), "b.txt", "will be removed").await;

        let store = store().await;
        store
            .apply(&[
                ChangeEvent {
                    kind: ChangeKind::Added,
                    path: a.clone(),
                    modified_at: 1,
                },
                ChangeEvent {
                    kind: ChangeKind::Added,
                    path: b.clone(),
                    modified_at: 1,
                },
            ])
            .await
            .unwrap();
        assert_eq!(store.stats().await.unwrap().files, 2);

        tokio::fs::write(&a, "second version").await.unwrap();
        store
            .apply(&[
                ChangeEvent {
                    kind: ChangeKind::Modified,
                    path: a.clone(),
                    modified_at: 2,
                },
                ChangeEvent {
                    kind: ChangeKind::Deleted,
                    path: b.clone(),
                    modified_at: 1,
                },
            ])
            .await
            .unwrap();

        let chunks = store.chunks_for_path(&a).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "second version");
        assert!(store.chunks_for_path(&b).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn a_missing_file_fails_without_sinking_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_file(dir.path(), "good.txt", "still fine").await;

        let store = store().await;
        store
            .apply(&[
                ChangeEvent {
                    kind: ChangeKind::Added,
                    path: "/nowhere/missing.txt".to_string(),
                    modified_at: 1,
                },
                ChangeEvent {
                    kind: ChangeKind::Added,
                    path: good.clone(),
                    modified_at: 1,
                },
            ])
            .await
            .unwrap();

        // The broken entry was skipped, the good one landed.
        assert_eq!(store.chunks_for_path(&good).await.unwrap().len(), 1);
    }

    #[test]
    fn cosine_similarity_basics() {
        let unit_x = vec![f16::from_f32(1.0), f16::from_f32(0.0)];
        let unit_y = vec![f16::from_f32(0.0), f16::from_f32(1.0)];
        assert!((cosine_similarity(&unit_x, &unit_x) - 1.0).abs() < 1e-3);
        assert!(cosine_similarity(&unit_x, &unit_y).abs() < 1e-3);
        assert_eq!(cosine_similarity(&unit_x, &[]), 0.0);
    }
}
