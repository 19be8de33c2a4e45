//! The synchronization engine: startup reconciliation, then periodic
//! monitoring of the file catalog, applying classified changes to every
//! registered consumer.
//!
//! ## Lifecycle
//!
//! ```text
//! Initializing -> Reconciling -> Monitoring -> Stopped
//! ```
//!
//! Reconciliation diffs the catalog against what the vector store already
//! has materialized, so a process restart over an unchanged corpus applies
//! zero changes instead of re-ingesting every file. Readiness is signalled
//! exactly once, after the first successful reconciliation; monitoring never
//! starts before that. The whole loop is a single tokio task, so at most one
//! reconcile or monitor cycle is ever in flight, and the retained snapshot
//! is owned and mutated by that task alone.

use crate::catalog::{CatalogState, FileCatalog, StateOrder};
use crate::detect::{ChangeDetector, ChangeEvent, diff};
use crate::store::VectorStore;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Receives the full change list for each cycle and branches on the change
/// kind internally. A failure for one consumer is logged and must not affect
/// the others.
#[async_trait]
pub trait ChangeConsumer: Send + Sync {
    async fn apply(&self, changes: &[ChangeEvent]) -> Result<()>;
}

/// Where the engine currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Initializing,
    Reconciling,
    Monitoring,
    Stopped,
}

/// Configuration for the synchronization engine.
#[derive(Debug, Clone)]
pub struct SyncEngineConfig {
    /// Delay between catalog polls once monitoring.
    pub poll_interval: Duration,
}

impl Default for SyncEngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
        }
    }
}

impl SyncEngineConfig {
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// Awaitable readiness gate handed to query-side components.
///
/// `wait` resolves once the initial reconciliation has completed; queries
/// issued earlier block here instead of being answered from a partial index.
#[derive(Clone)]
pub struct ReadyGate {
    state_rx: watch::Receiver<SyncState>,
    // Keeps the channel open for gates not backed by a live engine.
    _standalone: Option<Arc<watch::Sender<SyncState>>>,
}

impl ReadyGate {
    /// A gate that is already open; for components running without a live
    /// engine (one-shot CLI commands, tests).
    pub fn open() -> Self {
        let (tx, rx) = watch::channel(SyncState::Monitoring);
        Self {
            state_rx: rx,
            _standalone: Some(Arc::new(tx)),
        }
    }

    pub async fn wait(&self) -> Result<()> {
        let mut rx = self.state_rx.clone();
        loop {
            match *rx.borrow_and_update() {
                SyncState::Monitoring => return Ok(()),
                SyncState::Stopped => {
                    anyhow::bail!("synchronization stopped before becoming ready")
                }
                _ => {}
            }
            rx.changed()
                .await
                .map_err(|_| anyhow::anyhow!("synchronization task went away"))?;
        }
    }
}

/// Handle to a running synchronization engine.
pub struct SyncHandle {
    state_rx: watch::Receiver<SyncState>,
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SyncHandle {
    /// Current lifecycle state.
    pub fn state(&self) -> SyncState {
        *self.state_rx.borrow()
    }

    /// Gate that opens when the initial reconciliation completes.
    pub fn gate(&self) -> ReadyGate {
        ReadyGate {
            state_rx: self.state_rx.clone(),
            _standalone: None,
        }
    }

    /// Wait for the initial reconciliation to complete.
    pub async fn wait_ready(&self) -> Result<()> {
        self.gate().wait().await
    }

    /// Signal shutdown and wait for the loop to finish its current cycle
    /// and exit. A cycle is never interrupted mid-file.
    pub async fn shutdown(mut self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            task.await?;
        }
        Ok(())
    }
}

/// Spawns and owns the reconcile-then-monitor loop.
pub struct SyncEngine;

impl SyncEngine {
    /// Start the engine as a background task and return its handle.
    ///
    /// The vector store is always the first registered consumer; it also
    /// provides the reconciliation baseline. Construction returns
    /// immediately; use [`SyncHandle::wait_ready`] to await the gate.
    pub fn spawn(
        catalog: Arc<dyn FileCatalog>,
        store: Arc<VectorStore>,
        extra_consumers: Vec<Arc<dyn ChangeConsumer>>,
        config: SyncEngineConfig,
    ) -> SyncHandle {
        let (state_tx, state_rx) = watch::channel(SyncState::Initializing);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut consumers: Vec<Arc<dyn ChangeConsumer>> = vec![store.clone()];
        consumers.extend(extra_consumers);

        let task = tokio::spawn(run_loop(
            catalog,
            store,
            consumers,
            config,
            state_tx,
            shutdown_rx,
        ));

        SyncHandle {
            state_rx,
            shutdown_tx,
            task: Some(task),
        }
    }
}

/// Sleep for `duration`, waking early on shutdown. Returns true when the
/// engine should stop.
async fn wait_or_shutdown(shutdown_rx: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    if *shutdown_rx.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        changed = shutdown_rx.changed() => changed.is_err() || *shutdown_rx.borrow(),
    }
}

async fn apply_all(consumers: &[Arc<dyn ChangeConsumer>], changes: &[ChangeEvent]) {
    for consumer in consumers {
        if let Err(e) = consumer.apply(changes).await {
            error!("Change consumer failed for this cycle: {e:#}");
        }
    }
}

/// One-time reconciliation: catalog state vs. what the store has on disk.
async fn reconcile(
    detector: &ChangeDetector,
    store: &VectorStore,
    consumers: &[Arc<dyn ChangeConsumer>],
) -> Result<CatalogState> {
    let baseline = store.materialized_state().await?;
    let current = detector.snapshot(StateOrder::Size).await?;

    let changes = diff(&baseline, &current);
    info!(
        "Reconciliation: {} known, {} current, {} changes",
        baseline.len(),
        current.len(),
        changes.len()
    );
    if !changes.is_empty() {
        apply_all(consumers, &changes).await;
    }

    Ok(current)
}

async fn run_loop(
    catalog: Arc<dyn FileCatalog>,
    store: Arc<VectorStore>,
    consumers: Vec<Arc<dyn ChangeConsumer>>,
    config: SyncEngineConfig,
    state_tx: watch::Sender<SyncState>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let detector = ChangeDetector::new(catalog);

    // Retained snapshot; this task is its single writer.
    let mut snapshot: CatalogState;

    loop {
        let _ = state_tx.send(SyncState::Reconciling);
        match reconcile(&detector, &store, &consumers).await {
            Ok(state) => {
                snapshot = state;
                break;
            }
            Err(e) => {
                warn!("Reconciliation failed, retrying in {:?}: {e:#}", config.poll_interval);
                if wait_or_shutdown(&mut shutdown_rx, config.poll_interval).await {
                    let _ = state_tx.send(SyncState::Stopped);
                    return;
                }
            }
        }
    }

    // Readiness fires exactly once, here.
    let _ = state_tx.send(SyncState::Monitoring);
    info!("Initial reconciliation complete, monitoring for changes");

    loop {
        if wait_or_shutdown(&mut shutdown_rx, config.poll_interval).await {
            break;
        }

        match detector.detect(&snapshot).await {
            Ok((changes, new_state)) => {
                if !changes.is_empty() {
                    debug!("Detected {} changes", changes.len());
                    apply_all(&consumers, &changes).await;
                }
                // Committed only after the full diff; a failed cycle above
                // leaves the previous baseline in place.
                snapshot = new_state;
            }
            Err(e) => {
                warn!("Catalog poll failed, keeping previous snapshot: {e}");
            }
        }
    }

    let _ = state_tx.send(SyncState::Stopped);
    info!("Synchronization engine stopped");
}
