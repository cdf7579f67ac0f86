//! Derived lookup structures over a store.
//!
//! # Responsibility
//! - Map kind, tag, relation target and full-text token to artifact ids.
//! - Rebuild only the entries of changed ids on incremental updates.
//!
//! # Invariants
//! - Only indexable artifacts (present, not dangling) are indexed.
//! - Empty posting sets are dropped, so an incrementally updated index
//!   compares equal to a full rebuild over the same store.
//! - Kind listings follow store insertion order.
//! - Clones share structure, so `update` on a copy costs only the changed
//!   entries and their postings.

use crate::index::tokenize::tokenize;
use crate::model::artifact::{Artifact, ArtifactId, ArtifactKind};
use crate::store::artifact_store::ArtifactStore;
use im::{OrdMap, OrdSet};
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
struct IndexedEntry {
    kind: ArtifactKind,
    seq: u64,
    tags: BTreeSet<String>,
    targets: Vec<ArtifactId>,
    tokens: BTreeSet<String>,
}

impl IndexedEntry {
    fn from_artifact(artifact: &Artifact, seq: u64) -> Self {
        let mut tokens = tokenize(&artifact.title);
        tokens.extend(tokenize(&artifact.body));
        Self {
            kind: artifact.kind(),
            seq,
            tags: artifact.tags.clone(),
            targets: artifact.relations.clone(),
            tokens,
        }
    }
}

/// Query structures derived from one store state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArtifactIndex {
    entries: OrdMap<ArtifactId, Arc<IndexedEntry>>,
    by_kind: OrdMap<ArtifactKind, OrdMap<u64, ArtifactId>>,
    by_tag: OrdMap<String, OrdSet<ArtifactId>>,
    by_target: OrdMap<ArtifactId, OrdSet<ArtifactId>>,
    by_token: OrdMap<String, OrdSet<ArtifactId>>,
}

impl ArtifactIndex {
    /// Builds an index over every indexable artifact of `store`.
    pub fn build(store: &ArtifactStore) -> Self {
        let mut index = Self::default();
        for (id, stored) in store.iter() {
            if store.is_indexable(id) {
                index.add(&stored.artifact, stored.seq);
            }
        }
        index
    }

    /// Returns a copy of this index with `changed` ids recomputed from `store`.
    pub fn update<'a, I>(mut self, changed: I, store: &ArtifactStore) -> Self
    where
        I: IntoIterator<Item = &'a ArtifactId>,
    {
        self.apply_changes(changed, store);
        self
    }

    /// Recomputes the entries of `changed` ids in place.
    ///
    /// Ids absent from `store` or dangling are dropped from the index.
    pub fn apply_changes<'a, I>(&mut self, changed: I, store: &ArtifactStore)
    where
        I: IntoIterator<Item = &'a ArtifactId>,
    {
        for id in changed {
            self.drop_entry(id);
            if !store.is_indexable(id) {
                continue;
            }
            if let Some(stored) = store.entry(id) {
                self.add(&stored.artifact, stored.seq);
            }
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All indexed ids in id order.
    pub fn ids(&self) -> BTreeSet<ArtifactId> {
        self.entries.keys().cloned().collect()
    }

    /// Ids of one kind in insertion order.
    pub fn ids_by_kind(&self, kind: ArtifactKind) -> Vec<ArtifactId> {
        self.by_kind
            .get(&kind)
            .map(|ids| ids.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Ids carrying `tag` (expects a normalized tag).
    pub fn ids_by_tag(&self, tag: &str) -> BTreeSet<ArtifactId> {
        postings(&self.by_tag, tag)
    }

    /// Ids whose relations name `target`.
    pub fn ids_relating_to(&self, target: &str) -> BTreeSet<ArtifactId> {
        postings(&self.by_target, target)
    }

    /// Ids whose title or body contains `token` (expects a lowercase token).
    pub fn ids_by_token(&self, token: &str) -> BTreeSet<ArtifactId> {
        postings(&self.by_token, token)
    }

    /// Known tags in sorted order.
    pub fn tags(&self) -> Vec<String> {
        self.by_tag.keys().cloned().collect()
    }

    fn add(&mut self, artifact: &Artifact, seq: u64) {
        let entry = IndexedEntry::from_artifact(artifact, seq);
        let id = &artifact.id;

        match self.by_kind.get_mut(&entry.kind) {
            Some(ids) => {
                ids.insert(entry.seq, id.clone());
            }
            None => {
                self.by_kind
                    .insert(entry.kind, OrdMap::unit(entry.seq, id.clone()));
            }
        }
        for tag in &entry.tags {
            add_posting(&mut self.by_tag, tag, id);
        }
        for target in &entry.targets {
            add_posting(&mut self.by_target, target, id);
        }
        for token in &entry.tokens {
            add_posting(&mut self.by_token, token, id);
        }
        self.entries.insert(id.clone(), Arc::new(entry));
    }

    fn drop_entry(&mut self, id: &str) {
        let Some(entry) = self.entries.remove(id) else {
            return;
        };

        if let Some(ids) = self.by_kind.get_mut(&entry.kind) {
            ids.remove(&entry.seq);
            if ids.is_empty() {
                self.by_kind.remove(&entry.kind);
            }
        }
        for tag in &entry.tags {
            remove_posting(&mut self.by_tag, tag, id);
        }
        for target in &entry.targets {
            remove_posting(&mut self.by_target, target, id);
        }
        for token in &entry.tokens {
            remove_posting(&mut self.by_token, token, id);
        }
    }
}

fn postings(map: &OrdMap<String, OrdSet<ArtifactId>>, key: &str) -> BTreeSet<ArtifactId> {
    map.get(key)
        .map(|ids| ids.iter().cloned().collect())
        .unwrap_or_default()
}

fn add_posting(map: &mut OrdMap<String, OrdSet<ArtifactId>>, key: &str, id: &ArtifactId) {
    match map.get_mut(key) {
        Some(ids) => {
            ids.insert(id.clone());
        }
        None => {
            map.insert(key.to_string(), OrdSet::unit(id.clone()));
        }
    }
}

fn remove_posting(map: &mut OrdMap<String, OrdSet<ArtifactId>>, key: &str, id: &str) {
    if let Some(ids) = map.get_mut(key) {
        ids.remove(id);
        if ids.is_empty() {
            map.remove(key);
        }
    }
}
