//! Snapshot diffing and change classification.
//!
//! Detection is defined purely over the tracked catalog fields
//! (`path`, `modified_at`). A file whose content changed without touching
//! its modification time is not detected, and a touched-but-unchanged file
//! is re-ingested; both are accepted limitations of timestamp-based diffing.

use crate::catalog::{CatalogError, CatalogState, FileCatalog, StateOrder};
use std::sync::Arc;

/// How a path changed between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

/// A single classified change. Ephemeral: produced by a diff, consumed by
/// the registered consumers, never persisted.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub path: String,
    pub modified_at: i64,
}

/// Diff two snapshots into a classified change list.
///
/// Every path appears in at most one event: `Deleted` for paths only in
/// `previous`, `Added` for paths only in `new`, `Modified` for paths in both
/// whose records differ.
pub fn diff(previous: &CatalogState, new: &CatalogState) -> Vec<ChangeEvent> {
    let mut changes = Vec::new();

    for (path, record) in previous {
        if !new.contains_key(path) {
            changes.push(ChangeEvent {
                kind: ChangeKind::Deleted,
                path: path.clone(),
                modified_at: record.modified_at,
            });
        }
    }

    for (path, record) in new {
        match previous.get(path) {
            None => changes.push(ChangeEvent {
                kind: ChangeKind::Added,
                path: path.clone(),
                modified_at: record.modified_at,
            }),
            Some(previous_record) if previous_record != record => changes.push(ChangeEvent {
                kind: ChangeKind::Modified,
                path: path.clone(),
                modified_at: record.modified_at,
            }),
            Some(_) => {}
        }
    }

    changes
}

/// Fetches catalog snapshots and diffs them against a caller-owned baseline.
///
/// The detector holds no snapshot of its own; the synchronization loop owns
/// the retained state and passes it in, so only the loop's task ever mutates
/// it.
pub struct ChangeDetector {
    catalog: Arc<dyn FileCatalog>,
}

impl ChangeDetector {
    pub fn new(catalog: Arc<dyn FileCatalog>) -> Self {
        Self { catalog }
    }

    /// Fetch a fresh snapshot without diffing.
    pub async fn snapshot(&self, order: StateOrder) -> Result<CatalogState, CatalogError> {
        self.catalog.current_state(order).await
    }

    /// Fetch the current state and diff it against `previous`.
    ///
    /// On success the new state is returned alongside the changes so the
    /// caller can commit it as the next baseline. On failure nothing is
    /// returned and the caller's baseline stays untouched for the next
    /// cycle.
    pub async fn detect(
        &self,
        previous: &CatalogState,
    ) -> Result<(Vec<ChangeEvent>, CatalogState), CatalogError> {
        let new_state = self.catalog.current_state(StateOrder::ModifiedAt).await?;
        let changes = diff(previous, &new_state);
        Ok((changes, new_state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogRecord;

    fn record(path: &str, modified_at: i64) -> (String, CatalogRecord) {
        (
            path.to_string(),
            CatalogRecord {
                path: path.to_string(),
                modified_at,
            },
        )
    }

    #[test]
    fn diff_classifies_every_transition_exactly_once() {
        let previous: CatalogState = [
            record("/a.txt", 100),
            record("/b.txt", 100),
            record("/c.txt", 100),
        ]
        .into_iter()
        .collect();
        let new: CatalogState = [
            record("/b.txt", 200), // modified
            record("/c.txt", 100), // unchanged
            record("/d.txt", 300), // added
        ]
        .into_iter()
        .collect();

        let changes = diff(&previous, &new);
        assert_eq!(changes.len(), 3);

        let kind_of = |path: &str| {
            changes
                .iter()
                .filter(|c| c.path == path)
                .map(|c| c.kind)
                .collect::<Vec<_>>()
        };
        assert_eq!(kind_of("/a.txt"), vec![ChangeKind::Deleted]);
        assert_eq!(kind_of("/b.txt"), vec![ChangeKind::Modified]);
        assert_eq!(kind_of("/c.txt"), Vec::<ChangeKind>::new());
        assert_eq!(kind_of("/d.txt"), vec![ChangeKind::Added]);
    }

    #[test]
    fn identical_snapshots_diff_to_nothing() {
        let state: CatalogState = [record("/a.txt", 1), record("/b.txt", 2)]
            .into_iter()
            .collect();
        assert!(diff(&state, &state.clone()).is_empty());
    }

    #[test]
    fn deleted_events_carry_the_last_known_timestamp() {
        let previous: CatalogState = [record("/a.txt", 42)].into_iter().collect();
        let new = CatalogState::new();

        let changes = diff(&previous, &new);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::Deleted);
        assert_eq!(changes[0].modified_at, 42);
    }

    #[test]
    fn empty_baseline_marks_everything_added() {
        let new: CatalogState = [record("/a.txt", 1), record("/b.txt", 2)]
            .into_iter()
            .collect();
        let changes = diff(&CatalogState::new(), &new);
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().all(|c| c.kind == ChangeKind::Added));
    }
}
