//! SQLite-backed file catalog.
//!
//! This is the production [`FileCatalog`] for platforms without a queryable
//! OS file index: it maintains its own `file_metadata` table by walking the
//! configured folders on every snapshot, so the table always plays the role
//! of the external, eventually-consistent index the rest of the pipeline
//! polls.

use super::{CatalogError, CatalogRecord, CatalogRows, CatalogState, FileCatalog, StateOrder};
use crate::parse::parsable_extensions;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, SqlitePool};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

/// File catalog stored in its own SQLite database.
pub struct SqliteCatalog {
    pool: SqlitePool,
    folders: Vec<PathBuf>,
    exceptions: Vec<PathBuf>,
    extensions: HashSet<&'static str>,
}

fn unix_seconds(time: SystemTime) -> i64 {
    time.duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

impl SqliteCatalog {
    /// Open (creating if missing) the catalog database.
    pub async fn open(
        db_path: &Path,
        folders: Vec<PathBuf>,
        exceptions: Vec<PathBuf>,
    ) -> Result<Self, CatalogError> {
        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(db_path)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .create_if_missing(true),
        )
        .await
        .map_err(|e| CatalogError::Unavailable(e.to_string()))?;

        Self::new_with_pool(pool, folders, exceptions).await
    }

    /// In-memory catalog for tests. A single pooled connection keeps the
    /// in-memory database alive; separate connections would each see their
    /// own empty database.
    pub async fn open_memory(
        folders: Vec<PathBuf>,
        exceptions: Vec<PathBuf>,
    ) -> Result<Self, CatalogError> {
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| CatalogError::Unavailable(e.to_string()))?;
        Self::new_with_pool(pool, folders, exceptions).await
    }

    async fn new_with_pool(
        pool: SqlitePool,
        folders: Vec<PathBuf>,
        exceptions: Vec<PathBuf>,
    ) -> Result<Self, CatalogError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS file_metadata (
                file_path TEXT PRIMARY KEY,
                file_name TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                created_at INTEGER,
                modified_at INTEGER NOT NULL,
                accessed_at INTEGER,
                generation INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| CatalogError::Unavailable(e.to_string()))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_file_metadata_modified ON file_metadata(modified_at)")
            .execute(&pool)
            .await
            .map_err(|e| CatalogError::Unavailable(e.to_string()))?;

        Ok(Self {
            pool,
            folders,
            exceptions,
            extensions: parsable_extensions().collect(),
        })
    }

    fn is_excepted(&self, path: &Path) -> bool {
        self.exceptions.iter().any(|exc| path.starts_with(exc))
    }

    fn is_indexable(&self, path: &Path) -> bool {
        crate::parse::extension_of(path)
            .map(|ext| self.extensions.contains(ext.as_str()))
            .unwrap_or(false)
    }

    /// Walk the configured folders and bring `file_metadata` up to date.
    /// Rows not seen in this pass belonged to deleted files and are removed.
    pub async fn refresh(&self) -> Result<(), CatalogError> {
        let generation: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(generation), 0) + 1 FROM file_metadata")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| CatalogError::Unavailable(e.to_string()))?;

        let mut seen = 0usize;
        let mut dir_stack: Vec<PathBuf> = self
            .folders
            .iter()
            .filter(|folder| !self.is_excepted(folder))
            .cloned()
            .collect();

        while let Some(current_dir) = dir_stack.pop() {
            let mut read_dir = match tokio::fs::read_dir(&current_dir).await {
                Ok(rd) => rd,
                Err(e) => {
                    warn!("Failed to read directory {}: {}", current_dir.display(), e);
                    continue;
                }
            };

            loop {
                let entry = match read_dir.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Failed to walk {}: {}", current_dir.display(), e);
                        break;
                    }
                };

                let path = entry.path();
                if self.is_excepted(&path) {
                    continue;
                }
                let metadata = match entry.metadata().await {
                    Ok(m) => m,
                    Err(e) => {
                        warn!("Failed to stat {}: {}", path.display(), e);
                        continue;
                    }
                };

                if metadata.is_dir() {
                    dir_stack.push(path);
                    continue;
                }
                if !metadata.is_file() || !self.is_indexable(&path) {
                    continue;
                }

                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let modified_at = metadata.modified().map(unix_seconds).unwrap_or(0);
                let created_at = metadata.created().ok().map(unix_seconds);
                let accessed_at = metadata.accessed().ok().map(unix_seconds);

                sqlx::query(
                    r#"
                    INSERT INTO file_metadata
                        (file_path, file_name, file_size, created_at, modified_at, accessed_at, generation)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    ON CONFLICT(file_path) DO UPDATE SET
                        file_name = excluded.file_name,
                        file_size = excluded.file_size,
                        created_at = excluded.created_at,
                        modified_at = excluded.modified_at,
                        accessed_at = excluded.accessed_at,
                        generation = excluded.generation
                    "#,
                )
                .bind(path.to_string_lossy().into_owned())
                .bind(file_name)
                .bind(metadata.len() as i64)
                .bind(created_at)
                .bind(modified_at)
                .bind(accessed_at)
                .bind(generation)
                .execute(&self.pool)
                .await
                .map_err(|e| CatalogError::Unavailable(e.to_string()))?;

                seen += 1;
            }
        }

        sqlx::query("DELETE FROM file_metadata WHERE generation < ?1")
            .bind(generation)
            .execute(&self.pool)
            .await
            .map_err(|e| CatalogError::Unavailable(e.to_string()))?;

        debug!("Catalog refresh complete, {seen} files");
        Ok(())
    }

    fn value_to_string(row: &SqliteRow, index: usize) -> String {
        if let Ok(value) = row.try_get::<Option<i64>, _>(index) {
            return value.map(|v| v.to_string()).unwrap_or_default();
        }
        if let Ok(value) = row.try_get::<Option<f64>, _>(index) {
            return value.map(|v| v.to_string()).unwrap_or_default();
        }
        if let Ok(value) = row.try_get::<Option<String>, _>(index) {
            return value.unwrap_or_default();
        }
        if let Ok(value) = row.try_get::<Option<Vec<u8>>, _>(index) {
            return value.map(|v| format!("<{} bytes>", v.len())).unwrap_or_default();
        }
        String::new()
    }
}

#[async_trait]
impl FileCatalog for SqliteCatalog {
    async fn current_state(&self, order: StateOrder) -> Result<CatalogState, CatalogError> {
        self.refresh().await?;

        let order_column = match order {
            StateOrder::ModifiedAt => "modified_at",
            StateOrder::Size => "file_size",
        };
        let query =
            format!("SELECT file_path, modified_at FROM file_metadata ORDER BY {order_column} DESC");

        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CatalogError::Unavailable(e.to_string()))?;

        let mut state = CatalogState::new();
        for row in rows {
            let path: String = row.get("file_path");
            let modified_at: i64 = row.get("modified_at");
            state.insert(path.clone(), CatalogRecord { path, modified_at });
        }
        Ok(state)
    }

    async fn execute(&self, query: &str) -> Result<CatalogRows, CatalogError> {
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CatalogError::Query(e.to_string()))?;

        let Some(first) = rows.first() else {
            return Ok(CatalogRows::default());
        };

        let columns: Vec<String> = first
            .columns()
            .iter()
            .map(|column| column.name().to_string())
            .collect();

        let rows = rows
            .iter()
            .map(|row| {
                (0..columns.len())
                    .map(|index| Self::value_to_string(row, index))
                    .collect()
            })
            .collect();

        Ok(CatalogRows { columns, rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn catalog_over(dir: &Path) -> SqliteCatalog {
        SqliteCatalog::open_memory(vec![dir.to_path_buf()], Vec::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn snapshot_contains_only_parsable_files() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.txt"), "text").await.unwrap();
        tokio::fs::write(dir.path().join("b.zip"), "blob").await.unwrap();
        let sub = dir.path().join("sub");
        tokio::fs::create_dir(&sub).await.unwrap();
        tokio::fs::write(sub.join("c.md"), "# md").await.unwrap();

        let catalog = catalog_over(dir.path()).await;
        let state = catalog.current_state(StateOrder::ModifiedAt).await.unwrap();

        assert_eq!(state.len(), 2);
        assert!(state.keys().any(|p| p.ends_with("a.txt")));
        assert!(state.keys().any(|p| p.ends_with("c.md")));
        assert!(!state.keys().any(|p| p.ends_with("b.zip")));
    }

    #[tokio::test]
    async fn deleted_files_leave_the_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.txt");
        tokio::fs::write(&path, "here for now").await.unwrap();

        let catalog = catalog_over(dir.path()).await;
        let before = catalog.current_state(StateOrder::ModifiedAt).await.unwrap();
        assert_eq!(before.len(), 1);

        tokio::fs::remove_file(&path).await.unwrap();
        let after = catalog.current_state(StateOrder::ModifiedAt).await.unwrap();
        assert!(after.is_empty());
    }

    #[tokio::test]
    async fn exception_folders_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let skipped = dir.path().join("cache");
        tokio::fs::create_dir(&skipped).await.unwrap();
        tokio::fs::write(skipped.join("noise.txt"), "noise").await.unwrap();
        tokio::fs::write(dir.path().join("keep.txt"), "keep").await.unwrap();

        let catalog =
            SqliteCatalog::open_memory(vec![dir.path().to_path_buf()], vec![skipped.clone()])
                .await
                .unwrap();
        let state = catalog.current_state(StateOrder::ModifiedAt).await.unwrap();

        assert_eq!(state.len(), 1);
        assert!(state.keys().any(|p| p.ends_with("keep.txt")));
    }

    #[tokio::test]
    async fn execute_returns_named_columns() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("report.txt"), "hello").await.unwrap();

        let catalog = catalog_over(dir.path()).await;
        catalog.refresh().await.unwrap();

        let rows = catalog
            .execute("SELECT file_name, file_size FROM file_metadata")
            .await
            .unwrap();

        assert_eq!(rows.columns, vec!["file_name", "file_size"]);
        assert_eq!(rows.rows.len(), 1);
        assert_eq!(rows.rows[0][0], "report.txt");
        assert_eq!(rows.rows[0][1], "5");
    }

    #[tokio::test]
    async fn execute_surfaces_query_failures() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog_over(dir.path()).await;

        let result = catalog.execute("SELECT nope FROM file_metadata").await;
        assert!(matches!(result, Err(CatalogError::Query(_))));
    }
}
