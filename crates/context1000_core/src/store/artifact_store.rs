//! In-memory artifact store.
//!
//! # Responsibility
//! - Hold parsed artifacts keyed by stable id (the store is the arena).
//! - Enforce id uniqueness with content-hash idempotence.
//! - Track relation integrity and quarantine state.
//!
//! # Invariants
//! - An id maps to at most one artifact; conflicting inserts are rejected.
//! - Every failed mutation leaves the store unchanged.
//! - Forward references stay soft until `settle()`; `settle()` and
//!   `remove()` move unresolved artifacts into the dangling state, and any
//!   write that resolves all of an artifact's relations moves it back out.
//! - Insertion order (`seq`) of an id survives `replace()`.
//! - Every artifact with an unresolved relation is either dangling or
//!   waiting in the unsettled set for the next `settle()`.
//! - Clones share structure; a write copies only the paths it touches.

use crate::model::artifact::{Artifact, ArtifactId, SourceLocation};
use crate::parser::document::content_hash;
use crate::store::report::{DanglingRelation, QuarantineEntry, ValidationReport};
use im::{OrdMap, OrdSet};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::Arc;

pub type StoreResult<T> = Result<T, StoreError>;

/// Store mutation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Id already present with different content, or defined by another
    /// source document.
    DuplicateId(ArtifactId),
    /// Target id does not exist.
    NotFound(ArtifactId),
    /// `replace(id, artifact)` called with an artifact carrying another id.
    IdMismatch {
        expected: ArtifactId,
        actual: ArtifactId,
    },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateId(id) => {
                write!(f, "artifact id already defined elsewhere: {id}")
            }
            Self::NotFound(id) => write!(f, "artifact not found: {id}"),
            Self::IdMismatch { expected, actual } => write!(
                f,
                "replacement artifact id `{actual}` does not match target `{expected}`"
            ),
        }
    }
}

impl Error for StoreError {}

/// One stored artifact plus bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub artifact: Arc<Artifact>,
    pub content_hash: String,
    /// Insertion order; stable across replacements.
    pub seq: u64,
    /// Store revision of the last write to this id.
    pub revision: u64,
}

/// Result of a successful `remove()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedArtifact {
    pub artifact: Arc<Artifact>,
    /// Artifacts that referenced the removed id and are now dangling.
    pub dangling_referrers: Vec<ArtifactId>,
}

/// Arena of artifacts keyed by id.
#[derive(Debug, Clone, Default)]
pub struct ArtifactStore {
    entries: OrdMap<ArtifactId, StoredArtifact>,
    /// relation target -> ids whose relations name it (resolved or not).
    referrers: OrdMap<ArtifactId, OrdSet<ArtifactId>>,
    /// id -> relation targets that were unresolved when last validated.
    dangling: OrdMap<ArtifactId, BTreeSet<ArtifactId>>,
    /// Ids written since the last settle with forward references still open.
    unsettled: OrdSet<ArtifactId>,
    /// source key -> id of the artifact parsed from it.
    sources: OrdMap<String, ArtifactId>,
    /// source key -> failure for documents that never made it in.
    document_failures: OrdMap<String, QuarantineEntry>,
    next_seq: u64,
    revision: u64,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new artifact.
    ///
    /// Re-inserting identical content is a no-op success.
    ///
    /// # Errors
    /// - `DuplicateId` when the id exists with a different content hash.
    pub fn insert(&mut self, artifact: Artifact) -> StoreResult<()> {
        let hash = content_hash(&artifact);
        if let Some(existing) = self.entries.get(&artifact.id) {
            if existing.content_hash == hash {
                return Ok(());
            }
            return Err(StoreError::DuplicateId(artifact.id));
        }

        self.revision += 1;
        let seq = self.next_seq;
        self.next_seq += 1;

        let id = artifact.id.clone();
        self.link(&artifact);
        self.entries.insert(
            id.clone(),
            StoredArtifact {
                artifact: Arc::new(artifact),
                content_hash: hash,
                seq,
                revision: self.revision,
            },
        );
        self.resolve_referrers_of(&id);
        self.track_forward_references(&id);
        Ok(())
    }

    /// Swaps the artifact stored under `id`.
    ///
    /// # Errors
    /// - `IdMismatch` when `artifact.id != id`.
    /// - `NotFound` when `id` is absent.
    pub fn replace(&mut self, id: &str, artifact: Artifact) -> StoreResult<()> {
        if artifact.id != id {
            return Err(StoreError::IdMismatch {
                expected: id.to_string(),
                actual: artifact.id,
            });
        }
        let Some(existing) = self.entries.get(id) else {
            return Err(StoreError::NotFound(id.to_string()));
        };

        let hash = content_hash(&artifact);
        if existing.content_hash == hash && existing.artifact.source == artifact.source {
            return Ok(());
        }

        let seq = existing.seq;
        let previous = Arc::clone(&existing.artifact);
        self.unlink(&previous);
        self.link(&artifact);

        self.revision += 1;
        self.entries.insert(
            id.to_string(),
            StoredArtifact {
                artifact: Arc::new(artifact),
                content_hash: hash,
                seq,
                revision: self.revision,
            },
        );

        if self.dangling.contains_key(id) {
            self.revalidate(id);
        }
        self.track_forward_references(id);
        Ok(())
    }

    /// Removes an artifact and re-validates its referrers.
    ///
    /// # Errors
    /// - `NotFound` when `id` is absent.
    pub fn remove(&mut self, id: &str) -> StoreResult<RemovedArtifact> {
        let Some(removed) = self.entries.remove(id) else {
            return Err(StoreError::NotFound(id.to_string()));
        };

        self.revision += 1;
        self.unlink(&removed.artifact);
        self.dangling.remove(id);
        self.unsettled.remove(id);

        let referrers = self.referrers(id);
        for referrer in &referrers {
            self.revalidate(referrer);
            self.unsettled.remove(referrer);
        }

        Ok(RemovedArtifact {
            artifact: removed.artifact,
            dangling_referrers: referrers,
        })
    }

    /// Resolves every relation in the store and returns the resulting report.
    ///
    /// Only unsettled ids need re-checking; every other artifact is either
    /// fully resolved or already tracked as dangling.
    pub fn settle(&mut self) -> ValidationReport {
        let pending = std::mem::take(&mut self.unsettled);
        for id in &pending {
            self.revalidate(id);
        }
        self.validation_report()
    }

    /// Builds the current report without re-resolving relations.
    pub fn validation_report(&self) -> ValidationReport {
        let mut quarantined: Vec<QuarantineEntry> =
            self.document_failures.values().cloned().collect();
        let mut dangling_relations = Vec::new();

        for (id, missing) in &self.dangling {
            let targets: Vec<&str> = missing.iter().map(String::as_str).collect();
            quarantined.push(QuarantineEntry {
                id: id.clone(),
                reason: format!("unresolved relations: {}", targets.join(", ")),
            });
            for target in missing {
                dangling_relations.push(DanglingRelation {
                    id: id.clone(),
                    missing_target: target.clone(),
                });
            }
        }

        quarantined.sort();
        dangling_relations.sort();
        ValidationReport {
            quarantined,
            dangling_relations,
        }
    }

    /// Records why one source document is not in the store.
    pub fn quarantine_document(&mut self, source_key: &str, reason: impl Display) {
        self.document_failures.insert(
            source_key.to_string(),
            QuarantineEntry {
                id: source_key.to_string(),
                reason: reason.to_string(),
            },
        );
    }

    /// Whether `source_key` currently has a recorded failure.
    pub fn is_document_quarantined(&self, source_key: &str) -> bool {
        self.document_failures.contains_key(source_key)
    }

    /// Source keys of every stored artifact, sorted.
    pub fn source_keys(&self) -> Vec<String> {
        self.sources.keys().cloned().collect()
    }

    /// Source keys of stored artifacts below directory `dir`, sorted.
    ///
    /// Matches whole path components: `/docs` does not cover `/docs2/a.md`.
    pub fn source_keys_under(&self, dir: &Path) -> Vec<String> {
        let Some(dir_key) = SourceLocation::from_path(dir).key() else {
            return Vec::new();
        };
        let prefix = format!("{}/", dir_key.trim_end_matches('/'));
        self.sources
            .range(prefix.clone()..)
            .map(|(key, _)| key)
            .take_while(|key| key.starts_with(&prefix))
            .cloned()
            .collect()
    }

    /// Clears a recorded parse failure; returns whether one existed.
    pub fn clear_document_quarantine(&mut self, source_key: &str) -> bool {
        self.document_failures.remove(source_key).is_some()
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Artifact>> {
        self.entries.get(id).map(|entry| &entry.artifact)
    }

    pub fn entry(&self, id: &str) -> Option<&StoredArtifact> {
        self.entries.get(id)
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

    /// Monotonic counter bumped by every effective write.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Iterates stored artifacts in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&ArtifactId, &StoredArtifact)> {
        self.entries.iter()
    }

    /// Returns whether an artifact may appear in the index.
    pub fn is_indexable(&self, id: &str) -> bool {
        self.entries.contains_key(id) && !self.dangling.contains_key(id)
    }

    pub fn is_dangling(&self, id: &str) -> bool {
        self.dangling.contains_key(id)
    }

    /// Ids currently in the dangling state.
    pub fn dangling_ids(&self) -> BTreeSet<ArtifactId> {
        self.dangling.keys().cloned().collect()
    }

    /// Ids whose open forward references the next `settle()` will resolve.
    pub fn unsettled_ids(&self) -> BTreeSet<ArtifactId> {
        self.unsettled.iter().cloned().collect()
    }

    /// Stored ids whose relations name `id`, whether or not `id` exists.
    pub fn referrers(&self, id: &str) -> Vec<ArtifactId> {
        self.referrers
            .get(id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Id of the artifact parsed from `source_key`, if any.
    pub fn id_for_source(&self, source_key: &str) -> Option<&ArtifactId> {
        self.sources.get(source_key)
    }

    fn link(&mut self, artifact: &Artifact) {
        for target in &artifact.relations {
            match self.referrers.get_mut(target) {
                Some(set) => {
                    set.insert(artifact.id.clone());
                }
                None => {
                    self.referrers
                        .insert(target.clone(), OrdSet::unit(artifact.id.clone()));
                }
            }
        }
        if let Some(key) = artifact.source.key() {
            self.sources.insert(key, artifact.id.clone());
        }
    }

    fn unlink(&mut self, artifact: &Artifact) {
        for target in &artifact.relations {
            if let Some(set) = self.referrers.get_mut(target) {
                set.remove(&artifact.id);
                if set.is_empty() {
                    self.referrers.remove(target);
                }
            }
        }
        if let Some(key) = artifact.source.key() {
            if self.sources.get(&key) == Some(&artifact.id) {
                self.sources.remove(&key);
            }
        }
    }

    fn missing_targets(&self, id: &str) -> BTreeSet<ArtifactId> {
        self.entries
            .get(id)
            .map(|entry| {
                entry
                    .artifact
                    .relations
                    .iter()
                    .filter(|target| !self.entries.contains_key(target.as_str()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Recomputes the dangling entry of `id` from its current relations.
    fn revalidate(&mut self, id: &str) {
        let missing = self.missing_targets(id);
        if missing.is_empty() {
            self.dangling.remove(id);
        } else {
            self.dangling.insert(id.to_string(), missing);
        }
    }

    fn track_forward_references(&mut self, id: &str) {
        if !self.dangling.contains_key(id) && !self.missing_targets(id).is_empty() {
            self.unsettled.insert(id.to_string());
        } else {
            self.unsettled.remove(id);
        }
    }

    fn resolve_referrers_of(&mut self, id: &str) {
        for referrer in self.referrers(id) {
            if let Some(missing) = self.dangling.get_mut(&referrer) {
                missing.remove(id);
                if missing.is_empty() {
                    self.dangling.remove(&referrer);
                }
            }
        }
    }
}
