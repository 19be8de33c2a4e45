//! End-to-end tests for the synchronization pipeline: reconcile from the
//! store's materialized state, monitor the catalog for changes, and keep the
//! vector store consistent without a full rescan.

use anyhow::Result;
use async_trait::async_trait;
use scout_ai_indexer::catalog::{CatalogError, CatalogRows, CatalogState, FileCatalog, StateOrder};
use scout_ai_indexer::detect::ChangeEvent;
use scout_ai_indexer::parse::ContentParser;
use scout_ai_indexer::store::{VectorStore, VectorStoreConfig};
use scout_ai_indexer::sync::{ChangeConsumer, SyncEngine, SyncEngineConfig, SyncState};
use scout_ai_indexer::testing::{HashEmbedder, StaticCatalog};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn engine_config() -> SyncEngineConfig {
    SyncEngineConfig::default().with_poll_interval(Duration::from_millis(50))
}

async fn memory_store() -> Arc<VectorStore> {
    Arc::new(
        VectorStore::open_memory(
            ContentParser::with_defaults(),
            Arc::new(HashEmbedder::new(32)),
            VectorStoreConfig::default(),
        )
        .await
        .unwrap(),
    )
}

async fn write_file(dir: &Path, name: &str, content: &str) -> String {
    let path = dir.join(name);
    tokio::fs::write(&path, content).await.unwrap();
    path.to_string_lossy().into_owned()
}

/// Poll `condition` until it holds or the timeout elapses.
async fn wait_for<F, Fut>(mut condition: F, timeout: Duration) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Consumer that records every change event it receives.
#[derive(Default)]
struct RecordingConsumer {
    events: Mutex<Vec<ChangeEvent>>,
}

#[async_trait]
impl ChangeConsumer for RecordingConsumer {
    async fn apply(&self, changes: &[ChangeEvent]) -> Result<()> {
        self.events.lock().unwrap().extend_from_slice(changes);
        Ok(())
    }
}

/// Catalog wrapper that delays every snapshot, for readiness-gating tests.
struct SlowCatalog {
    inner: StaticCatalog,
    delay: Duration,
}

#[async_trait]
impl FileCatalog for SlowCatalog {
    async fn current_state(&self, order: StateOrder) -> Result<CatalogState, CatalogError> {
        tokio::time::sleep(self.delay).await;
        self.inner.current_state(order).await
    }

    async fn execute(&self, query: &str) -> Result<CatalogRows, CatalogError> {
        self.inner.execute(query).await
    }
}

#[tokio::test]
async fn reconcile_then_monitor_keeps_store_consistent() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_file(dir.path(), "a.txt", "alpha contents").await;
    let b = write_file(dir.path(), "b.txt", "beta contents").await;

    let catalog = Arc::new(StaticCatalog::new());
    catalog.insert(a.clone(), 100);
    catalog.insert(b.clone(), 100);

    let store = memory_store().await;
    let handle = SyncEngine::spawn(catalog.clone(), store.clone(), vec![], engine_config());

    handle.wait_ready().await.unwrap();
    assert_eq!(handle.state(), SyncState::Monitoring);
    assert_eq!(store.stats().await.unwrap().files, 2);

    // Modified: new content plus a bumped timestamp in the catalog.
    tokio::fs::write(&a, "alpha rewritten").await.unwrap();
    catalog.insert(a.clone(), 200);
    let store_for_wait = store.clone();
    let a_for_wait = a.clone();
    assert!(
        wait_for(
            move || {
                let store = store_for_wait.clone();
                let a = a_for_wait.clone();
                async move {
                    store
                        .chunks_for_path(&a)
                        .await
                        .map(|chunks| chunks.iter().any(|c| c.content.contains("rewritten")))
                        .unwrap_or(false)
                }
            },
            Duration::from_secs(5),
        )
        .await,
        "modified file was not re-ingested"
    );

    // Deleted: removed from the catalog, chunks must cascade away.
    catalog.remove(&b);
    let store_for_wait = store.clone();
    let b_for_wait = b.clone();
    assert!(
        wait_for(
            move || {
                let store = store_for_wait.clone();
                let b = b_for_wait.clone();
                async move {
                    store
                        .chunks_for_path(&b)
                        .await
                        .map(|chunks| chunks.is_empty())
                        .unwrap_or(false)
                }
            },
            Duration::from_secs(5),
        )
        .await,
        "deleted file was not removed from the store"
    );
    // The other path is untouched.
    assert!(!store.chunks_for_path(&a).await.unwrap().is_empty());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn restart_over_unchanged_corpus_applies_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_file(dir.path(), "a.txt", "alpha contents").await;

    let catalog = Arc::new(StaticCatalog::new());
    catalog.insert(a.clone(), 100);

    let store = memory_store().await;

    // First run ingests the file.
    let handle = SyncEngine::spawn(catalog.clone(), store.clone(), vec![], engine_config());
    handle.wait_ready().await.unwrap();
    assert_eq!(store.stats().await.unwrap().files, 1);
    handle.shutdown().await.unwrap();

    // Second run reconciles against the store's materialized state, not an
    // empty baseline: nothing should be re-applied.
    let recorder = Arc::new(RecordingConsumer::default());
    let handle = SyncEngine::spawn(
        catalog,
        store.clone(),
        vec![recorder.clone()],
        engine_config(),
    );
    handle.wait_ready().await.unwrap();

    assert!(recorder.events.lock().unwrap().is_empty());
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn readiness_gates_queries_until_reconciliation_completes() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_file(dir.path(), "a.txt", "gated contents").await;

    let inner = StaticCatalog::new();
    inner.insert(a.clone(), 100);
    let catalog = Arc::new(SlowCatalog {
        inner,
        delay: Duration::from_millis(300),
    });

    let store = memory_store().await;
    let handle = SyncEngine::spawn(catalog, store.clone(), vec![], engine_config());

    // Construction must not block, and the gate must still be closed while
    // the slow snapshot is in flight.
    assert_ne!(handle.state(), SyncState::Monitoring);

    handle.wait_ready().await.unwrap();
    // Once the gate opens the initial reconciliation has fully applied.
    assert_eq!(handle.state(), SyncState::Monitoring);
    assert_eq!(store.stats().await.unwrap().files, 1);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_stops_the_loop() {
    let catalog = Arc::new(StaticCatalog::new());
    let store = memory_store().await;

    let handle = SyncEngine::spawn(catalog.clone(), store.clone(), vec![], engine_config());
    handle.wait_ready().await.unwrap();
    handle.shutdown().await.unwrap();

    // Changes after shutdown are never picked up.
    let dir = tempfile::tempdir().unwrap();
    let late = write_file(dir.path(), "late.txt", "too late").await;
    catalog.insert(late.clone(), 100);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(store.chunks_for_path(&late).await.unwrap().is_empty());
}

#[tracing_test::traced_test]
#[tokio::test]
async fn catalog_outage_is_retried_without_losing_state() {
    // A catalog that fails its first N snapshots, then recovers.
    struct FlakyCatalog {
        inner: StaticCatalog,
        failures_left: Mutex<u32>,
    }

    #[async_trait]
    impl FileCatalog for FlakyCatalog {
        async fn current_state(&self, order: StateOrder) -> Result<CatalogState, CatalogError> {
            {
                let mut failures = self.failures_left.lock().unwrap();
                if *failures > 0 {
                    *failures -= 1;
                    return Err(CatalogError::Unavailable("index offline".to_string()));
                }
            }
            self.inner.current_state(order).await
        }

        async fn execute(&self, query: &str) -> Result<CatalogRows, CatalogError> {
            self.inner.execute(query).await
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let a = write_file(dir.path(), "a.txt", "eventually indexed").await;

    let inner = StaticCatalog::new();
    inner.insert(a.clone(), 100);
    let catalog = Arc::new(FlakyCatalog {
        inner,
        failures_left: Mutex::new(2),
    });

    let store = memory_store().await;
    let handle = SyncEngine::spawn(catalog, store.clone(), vec![], engine_config());

    // Reconciliation retries through the outage and still becomes ready.
    tokio::time::timeout(Duration::from_secs(5), handle.wait_ready())
        .await
        .expect("engine never became ready")
        .unwrap();
    assert_eq!(store.stats().await.unwrap().files, 1);
    assert!(logs_contain("Reconciliation failed"));

    handle.shutdown().await.unwrap();
}
