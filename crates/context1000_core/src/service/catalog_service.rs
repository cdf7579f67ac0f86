//! Artifact catalog: single owner of store + index.
//!
//! # Responsibility
//! - Serialize every mutation behind one lock around store and index.
//! - Publish immutable snapshots so readers never see half-applied writes.
//! - Map source documents to artifacts (load, reload, delete).
//!
//! # Invariants
//! - A published snapshot's index always reflects exactly its own store.
//! - A failed mutation publishes nothing.
//! - One document's failure never blocks other documents in a batch.

use crate::config::{CatalogConfig, ConfigError};
use crate::index::artifact_index::ArtifactIndex;
use crate::logging::{sanitize_message, MAX_LOG_VALUE_CHARS};
use crate::model::artifact::{Artifact, ArtifactId, ArtifactSummary, SourceLocation};
use crate::parser::document::{declared_id, parse, raw_digest, ParseError};
use crate::query::engine::{query, QueryDescriptor};
use crate::store::artifact_store::{ArtifactStore, RemovedArtifact, StoreError, StoreResult};
use crate::store::report::ValidationReport;
use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::convert::Infallible;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;
use walkdir::WalkDir;

const DETACHED_KEY_PREFIX: &str = "<memory>:";

/// Directory load failures that abort the whole load.
///
/// Per-document failures are reported in [`LoadSummary`] instead.
#[derive(Debug)]
pub enum LoadError {
    Config(ConfigError),
    Root { path: PathBuf, source: std::io::Error },
}

impl Display for LoadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::Root { path, source } => {
                write!(f, "cannot open artifact root `{}`: {source}", path.display())
            }
        }
    }
}

impl Error for LoadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Root { source, .. } => Some(source),
        }
    }
}

impl From<ConfigError> for LoadError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

/// What happened to one loaded document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Inserted(ArtifactId),
    Replaced(ArtifactId),
    /// Same content already stored.
    Unchanged(ArtifactId),
    /// Parse failed; any previous version of the document stays visible.
    Quarantined(ParseError),
    /// Parsed, but the store refused it (e.g. id owned by another document).
    Rejected(StoreError),
}

/// One pending change to a source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentChange {
    Upsert { raw: String, source: SourceLocation },
    Remove { path: PathBuf },
}

/// Result of applying one [`DocumentChange`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOutcome {
    Loaded(LoadOutcome),
    /// Document removed; carries the id of the artifact it backed, if any.
    Removed(Option<ArtifactId>),
}

/// Counters for a directory load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub documents: usize,
    pub inserted: usize,
    pub replaced: usize,
    pub unchanged: usize,
    pub quarantined: usize,
    pub rejected: usize,
    /// Stored documents that disappeared from disk.
    pub removed: usize,
    /// Files that could not be read, with the io error text.
    pub unreadable: Vec<(PathBuf, String)>,
    pub report: ValidationReport,
}

impl LoadSummary {
    fn record(&mut self, outcome: &ChangeOutcome) {
        match outcome {
            ChangeOutcome::Loaded(LoadOutcome::Inserted(_)) => self.inserted += 1,
            ChangeOutcome::Loaded(LoadOutcome::Replaced(_)) => self.replaced += 1,
            ChangeOutcome::Loaded(LoadOutcome::Unchanged(_)) => self.unchanged += 1,
            ChangeOutcome::Loaded(LoadOutcome::Quarantined(_)) => self.quarantined += 1,
            ChangeOutcome::Loaded(LoadOutcome::Rejected(_)) => self.rejected += 1,
            ChangeOutcome::Removed(Some(_)) => self.removed += 1,
            ChangeOutcome::Removed(None) => {}
        }
    }
}

/// Immutable, internally consistent view of the catalog.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    store: ArtifactStore,
    index: ArtifactIndex,
    version: u64,
}

impl CatalogSnapshot {
    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn index(&self) -> &ArtifactIndex {
        &self.index
    }

    /// Bumped once per published mutation.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Full fetch by id, including quarantined (dangling) artifacts.
    pub fn get(&self, id: &str) -> Option<Arc<Artifact>> {
        self.store.get(id).cloned()
    }

    pub fn query(&self, descriptor: &QueryDescriptor) -> Vec<Arc<Artifact>> {
        query(&self.store, &self.index, descriptor)
    }

    /// Query results projected to summaries (no body).
    pub fn query_summaries(&self, descriptor: &QueryDescriptor) -> Vec<ArtifactSummary> {
        self.query(descriptor)
            .iter()
            .map(|artifact| ArtifactSummary::from(artifact.as_ref()))
            .collect()
    }

    pub fn validation_report(&self) -> ValidationReport {
        self.store.validation_report()
    }
}

/// Thread-safe catalog facade.
///
/// Queries run against the snapshot current at call time; mutations are
/// serialized and publish a new snapshot in one swap.
#[derive(Debug, Default)]
pub struct ArtifactCatalog {
    current: RwLock<Arc<CatalogSnapshot>>,
    mutation: Mutex<()>,
}

impl ArtifactCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a catalog over an existing store (e.g. restored from disk).
    pub fn from_store(store: ArtifactStore) -> Self {
        let index = ArtifactIndex::build(&store);
        Self {
            current: RwLock::new(Arc::new(CatalogSnapshot {
                store,
                index,
                version: 0,
            })),
            mutation: Mutex::new(()),
        }
    }

    /// Returns the current snapshot.
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    pub fn get(&self, id: &str) -> StoreResult<Arc<Artifact>> {
        self.snapshot()
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    pub fn query(&self, descriptor: &QueryDescriptor) -> Vec<ArtifactSummary> {
        self.snapshot().query_summaries(descriptor)
    }

    pub fn validation_report(&self) -> ValidationReport {
        self.snapshot().validation_report()
    }

    pub fn insert(&self, artifact: Artifact) -> StoreResult<()> {
        self.try_mutate("insert", |store, touched| {
            touched.insert(artifact.id.clone());
            store.insert(artifact)
        })
    }

    pub fn replace(&self, id: &str, artifact: Artifact) -> StoreResult<()> {
        self.try_mutate("replace", |store, touched| {
            touched.insert(id.to_string());
            store.replace(id, artifact)
        })
    }

    pub fn remove(&self, id: &str) -> StoreResult<RemovedArtifact> {
        self.try_mutate("remove", |store, touched| {
            touched.insert(id.to_string());
            store.remove(id)
        })
    }

    /// Resolves all relations and publishes the resulting quarantine state.
    pub fn settle(&self) -> ValidationReport {
        self.mutate("settle", |store, _| store.settle())
    }

    /// Parses one document and inserts or replaces its artifact.
    pub fn load_document(&self, raw: &str, source: SourceLocation) -> LoadOutcome {
        let change = DocumentChange::Upsert {
            raw: raw.to_string(),
            source,
        };
        match self.apply_documents(vec![change], false).pop() {
            Some(ChangeOutcome::Loaded(outcome)) => outcome,
            _ => LoadOutcome::Quarantined(ParseError::MalformedMetadata {
                reason: "document was not applied".to_string(),
            }),
        }
    }

    /// Drops the artifact (and any quarantine record) backed by `path`.
    pub fn remove_document(&self, path: &Path) -> Option<RemovedArtifact> {
        let key = SourceLocation::from_path(path).key()?;
        self.mutate("remove_document", |store, touched| {
            remove_document_in(store, &key, touched)
        })
    }

    /// Applies a batch of document changes as one published mutation.
    ///
    /// Removals run before upserts so a renamed document keeps its artifact.
    /// Outcomes are returned in input order. When `settle` is set, relations
    /// are resolved after the whole batch is applied.
    pub fn apply_documents(&self, changes: Vec<DocumentChange>, settle: bool) -> Vec<ChangeOutcome> {
        let count = changes.len();
        let outcomes = self.mutate("apply_documents", |store, touched| {
            let mut ordered: Vec<(usize, DocumentChange)> = changes.into_iter().enumerate().collect();
            ordered.sort_by_key(|(position, change)| {
                (matches!(change, DocumentChange::Upsert { .. }), *position)
            });

            let mut outcomes: Vec<(usize, ChangeOutcome)> = ordered
                .into_iter()
                .map(|(position, change)| (position, apply_change(store, change, touched)))
                .collect();
            if settle {
                store.settle();
            }
            outcomes.sort_by_key(|(position, _)| *position);
            outcomes.into_iter().map(|(_, outcome)| outcome).collect::<Vec<_>>()
        });
        debug!(
            "event=catalog_apply module=catalog status=ok documents={} settle={}",
            count, settle
        );
        outcomes
    }

    /// Loads every document under `config.root`, drops stored documents that
    /// vanished from it, then settles.
    ///
    /// # Errors
    /// - `LoadError::Config` when `config` is invalid.
    /// - `LoadError::Root` when the root cannot be resolved.
    pub fn load_directory(&self, config: &CatalogConfig) -> Result<LoadSummary, LoadError> {
        let started_at = Instant::now();
        let config = resolve_config(config)?;
        info!(
            "event=catalog_load module=catalog status=start root={}",
            config.root.display()
        );

        let mut summary = LoadSummary::default();
        let mut changes = Vec::new();
        let mut seen = BTreeSet::new();

        for path in collect_documents(&config, &config.root) {
            match std::fs::read_to_string(&path) {
                Ok(raw) => {
                    let source = SourceLocation::from_path(&path);
                    if let Some(key) = source.key() {
                        seen.insert(key);
                    }
                    changes.push(DocumentChange::Upsert { raw, source });
                }
                Err(err) => {
                    warn!(
                        "event=catalog_load module=catalog status=skip path={} error={}",
                        path.display(),
                        sanitize_message(&err.to_string(), MAX_LOG_VALUE_CHARS)
                    );
                    summary.unreadable.push((path, err.to_string()));
                }
            }
        }
        summary.documents = changes.len();

        for key in self.snapshot().store().source_keys_under(&config.root) {
            if !seen.contains(&key) {
                changes.push(DocumentChange::Remove {
                    path: PathBuf::from(key),
                });
            }
        }

        for outcome in self.apply_documents(changes, true) {
            summary.record(&outcome);
        }
        summary.report = self.validation_report();

        info!(
            "event=catalog_load module=catalog status=ok root={} documents={} inserted={} replaced={} quarantined={} rejected={} removed={} dangling={} duration_ms={}",
            config.root.display(),
            summary.documents,
            summary.inserted,
            summary.replaced,
            summary.quarantined,
            summary.rejected,
            summary.removed,
            summary.report.dangling_relations.len(),
            started_at.elapsed().as_millis()
        );
        Ok(summary)
    }

    fn mutate<T, F>(&self, operation: &'static str, apply: F) -> T
    where
        F: FnOnce(&mut ArtifactStore, &mut BTreeSet<ArtifactId>) -> T,
    {
        match self.try_mutate(operation, |store, touched| {
            Ok::<T, Infallible>(apply(store, touched))
        }) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Applies `apply` to a copy of the store and publishes the result with
    /// an incrementally updated index; on error nothing changes.
    ///
    /// Copies share structure with the published snapshot, so a mutation
    /// costs what it touches rather than the size of the catalog.
    fn try_mutate<T, E, F>(&self, operation: &'static str, apply: F) -> Result<T, E>
    where
        F: FnOnce(&mut ArtifactStore, &mut BTreeSet<ArtifactId>) -> Result<T, E>,
        E: Display,
    {
        let _guard = self.mutation.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.snapshot();

        let mut store = current.store.clone();
        let unsettled_before = store.unsettled_ids();
        let mut touched = BTreeSet::new();

        let value = match apply(&mut store, &mut touched) {
            Ok(value) => value,
            Err(err) => {
                debug!(
                    "event=catalog_mutation module=catalog status=error op={} error={}",
                    operation,
                    sanitize_message(&err.to_string(), MAX_LOG_VALUE_CHARS)
                );
                return Err(err);
            }
        };

        let affected = affected_ids(&store, &touched, unsettled_before);
        let index = current.index.clone().update(affected.iter(), &store);
        let version = current.version + 1;
        let next = Arc::new(CatalogSnapshot {
            store,
            index,
            version,
        });

        let mut slot = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *slot = next;
        debug!(
            "event=catalog_mutation module=catalog status=ok op={} affected={} version={}",
            operation,
            affected.len(),
            version
        );
        Ok(value)
    }
}

/// Ids whose index entries may differ after a mutation: the ones written,
/// their referrers (dangling transitions), and anything a settle may have
/// moved into the dangling state.
fn affected_ids(
    store: &ArtifactStore,
    touched: &BTreeSet<ArtifactId>,
    unsettled_before: BTreeSet<ArtifactId>,
) -> BTreeSet<ArtifactId> {
    let mut affected = unsettled_before;
    for id in touched {
        affected.insert(id.clone());
        affected.extend(store.referrers(id));
    }
    affected
}

fn apply_change(
    store: &mut ArtifactStore,
    change: DocumentChange,
    touched: &mut BTreeSet<ArtifactId>,
) -> ChangeOutcome {
    match change {
        DocumentChange::Upsert { raw, source } => {
            ChangeOutcome::Loaded(load_document_in(store, &raw, source, touched))
        }
        DocumentChange::Remove { path } => {
            let removed = SourceLocation::from_path(path)
                .key()
                .and_then(|key| remove_document_in(store, &key, touched));
            ChangeOutcome::Removed(removed.map(|removed| removed.artifact.id.clone()))
        }
    }
}

fn load_document_in(
    store: &mut ArtifactStore,
    raw: &str,
    source: SourceLocation,
    touched: &mut BTreeSet<ArtifactId>,
) -> LoadOutcome {
    let key = source.key();
    let artifact = match parse(raw, &source) {
        Ok(artifact) => artifact,
        Err(err) => {
            warn!(
                "event=document_parse module=catalog status=quarantined source={} error_code={} error={}",
                source,
                err.code(),
                sanitize_message(&err.to_string(), MAX_LOG_VALUE_CHARS)
            );
            store.quarantine_document(&failure_key(key.as_deref(), raw), &err);
            return LoadOutcome::Quarantined(err);
        }
    };

    let id = artifact.id.clone();
    let previous = key
        .as_deref()
        .and_then(|key| store.id_for_source(key))
        .cloned();
    let revision_before = store.revision();

    let result = match previous {
        Some(previous) if previous == id => store.replace(&id, artifact).map(|()| {
            if store.revision() == revision_before {
                LoadOutcome::Unchanged(id.clone())
            } else {
                LoadOutcome::Replaced(id.clone())
            }
        }),
        // Identical content does not make another document's id ours.
        _ if owned_by_other_source(store, &id, key.as_deref()) => {
            Err(StoreError::DuplicateId(id.clone()))
        }
        Some(previous) => store.insert(artifact).map(|()| {
            // The document now declares another id; drop the old artifact.
            if let Ok(removed) = store.remove(&previous) {
                touched.extend(removed.dangling_referrers);
            }
            touched.insert(previous);
            LoadOutcome::Inserted(id.clone())
        }),
        None => store.insert(artifact).map(|()| {
            if store.revision() == revision_before {
                LoadOutcome::Unchanged(id.clone())
            } else {
                LoadOutcome::Inserted(id.clone())
            }
        }),
    };

    let failure_key = key.unwrap_or_else(|| detached_key(&id));
    match result {
        Ok(outcome) => {
            touched.insert(id);
            store.clear_document_quarantine(&failure_key);
            outcome
        }
        Err(err) => {
            warn!(
                "event=document_load module=catalog status=rejected source={} id={} error={}",
                source, id, err
            );
            store.quarantine_document(&failure_key, &err);
            LoadOutcome::Rejected(err)
        }
    }
}

fn owned_by_other_source(store: &ArtifactStore, id: &str, key: Option<&str>) -> bool {
    store
        .get(id)
        .map(|existing| existing.source.key().as_deref() != key)
        .unwrap_or(false)
}

/// Quarantine key for a failed document: its source key, or a synthetic
/// `<memory>:` key when it has no path.
fn failure_key(key: Option<&str>, raw: &str) -> String {
    match key {
        Some(key) => key.to_string(),
        None => match declared_id(raw) {
            Some(id) => detached_key(&id),
            None => format!("{DETACHED_KEY_PREFIX}{}", raw_digest(raw)),
        },
    }
}

fn detached_key(id: &str) -> String {
    format!("{DETACHED_KEY_PREFIX}{id}")
}

fn remove_document_in(
    store: &mut ArtifactStore,
    key: &str,
    touched: &mut BTreeSet<ArtifactId>,
) -> Option<RemovedArtifact> {
    store.clear_document_quarantine(key);
    let id = store.id_for_source(key)?.clone();
    let removed = store.remove(&id).ok()?;
    touched.insert(id);
    touched.extend(removed.dangling_referrers.iter().cloned());
    Some(removed)
}

fn resolve_config(config: &CatalogConfig) -> Result<CatalogConfig, LoadError> {
    let mut config = config.validate()?;
    config.root = std::fs::canonicalize(&config.root).map_err(|source| LoadError::Root {
        path: config.root.clone(),
        source,
    })?;
    Ok(config)
}

/// Candidate documents under `dir` (inside `config.root`), sorted for
/// deterministic loads.
pub(crate) fn collect_documents(config: &CatalogConfig, dir: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(config.follow_symlinks)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry
                    .file_name()
                    .to_str()
                    .map(|name| name.starts_with('.'))
                    .unwrap_or(false)
        })
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(
                    "event=catalog_walk module=catalog status=skip error={}",
                    sanitize_message(&err.to_string(), MAX_LOG_VALUE_CHARS)
                );
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && config.is_document(entry.path()))
        .map(|entry| entry.into_path())
        .collect();
    paths.sort();
    paths
}

/// Canonicalizes and validates `config` the same way directory loads do.
pub(crate) fn prepare_config(config: &CatalogConfig) -> Result<CatalogConfig, LoadError> {
    resolve_config(config)
}
