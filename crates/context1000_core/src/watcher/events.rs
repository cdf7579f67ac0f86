//! Mapping of debounced filesystem events onto pending document changes.
//!
//! # Responsibility
//! - Fold notify events delivered by the debouncer into one batch per flush.
//! - Expand directory-level events into the documents they cover.
//!
//! # Invariants
//! - At most one pending change per path; the latest event wins.
//! - Access events never produce changes.
//! - A directory created, removed or renamed under the root never drops its
//!   documents silently: it is rescanned against the disk and the store.

use crate::config::CatalogConfig;
use crate::service::catalog_service::collect_documents;
use crate::store::artifact_store::ArtifactStore;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// What the next apply phase should do with one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingChange {
    /// Re-read and re-parse; a missing file turns into a removal.
    Upsert,
    Remove,
    /// Directory-level change: every stored document below the path is
    /// re-checked and every document found on disk below it is loaded.
    Rescan,
}

/// Changes collected for one apply phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    changes: BTreeMap<PathBuf, PendingChange>,
}

impl ChangeBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one pending change, overwriting any earlier one for `path`.
    pub fn record(&mut self, path: impl Into<PathBuf>, change: PendingChange) {
        self.changes.insert(path.into(), change);
    }

    /// Folds a notify event into the batch; returns how many paths were
    /// recorded.
    ///
    /// Document paths are recorded as they are. Other paths below the root
    /// turn into a rescan when the event changes the tree shape (create,
    /// remove, rename). A backend overflow rescans the whole root.
    pub fn record_event(&mut self, event: &Event, config: &CatalogConfig) -> usize {
        if event.need_rescan() {
            self.record(config.root.clone(), PendingChange::Rescan);
            return 1;
        }

        let structural = matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_))
        );
        let mut recorded = 0;
        for (path, change) in classify(event) {
            if config.is_document(path) {
                self.record(path, change);
                recorded += 1;
            } else if structural
                && config.is_within_root(path)
                && (change == PendingChange::Remove || path.is_dir())
            {
                self.record(path, PendingChange::Rescan);
                recorded += 1;
            }
        }
        recorded
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn get(&self, path: &Path) -> Option<PendingChange> {
        self.changes.get(path).copied()
    }

    /// Pending changes in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, PendingChange)> {
        self.changes.iter().map(|(path, change)| (path, *change))
    }

    /// Empties the batch, returning what it held.
    pub fn take(&mut self) -> ChangeBatch {
        std::mem::take(self)
    }

    /// Expands rescans into per-document changes, in path order.
    ///
    /// A rescanned directory yields a removal for each source key `store`
    /// holds below it and an upsert for each document still on disk below
    /// it. When both apply to one path the upsert wins, since it falls back
    /// to a removal when the file is gone.
    pub fn resolve(
        &self,
        config: &CatalogConfig,
        store: &ArtifactStore,
    ) -> Vec<(PathBuf, PendingChange)> {
        let mut resolved: BTreeMap<PathBuf, PendingChange> = BTreeMap::new();
        for (path, change) in &self.changes {
            match change {
                PendingChange::Upsert | PendingChange::Remove => {
                    merge(&mut resolved, path.clone(), *change);
                }
                PendingChange::Rescan => {
                    for key in store.source_keys_under(path) {
                        merge(&mut resolved, PathBuf::from(key), PendingChange::Remove);
                    }
                    if path.is_dir() {
                        for document in collect_documents(config, path) {
                            merge(&mut resolved, document, PendingChange::Upsert);
                        }
                    }
                }
            }
        }
        resolved.into_iter().collect()
    }
}

fn merge(resolved: &mut BTreeMap<PathBuf, PendingChange>, path: PathBuf, change: PendingChange) {
    let entry = resolved.entry(path).or_insert(change);
    if change == PendingChange::Upsert {
        *entry = PendingChange::Upsert;
    }
}

fn classify(event: &Event) -> Vec<(&Path, PendingChange)> {
    match &event.kind {
        EventKind::Access(_) => Vec::new(),
        EventKind::Remove(_) => all_paths(event, PendingChange::Remove),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            all_paths(event, PendingChange::Remove)
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => vec![
            (event.paths[0].as_path(), PendingChange::Remove),
            (event.paths[1].as_path(), PendingChange::Upsert),
        ],
        _ => all_paths(event, PendingChange::Upsert),
    }
}

fn all_paths(event: &Event, change: PendingChange) -> Vec<(&Path, PendingChange)> {
    event
        .paths
        .iter()
        .map(|path| (path.as_path(), change))
        .collect()
}
