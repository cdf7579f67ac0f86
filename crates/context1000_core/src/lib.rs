//! Core domain logic for context1000 architectural artifacts.
//! This crate is the single source of truth for artifact schemas and invariants.

pub mod config;
pub mod db;
pub mod index;
pub mod logging;
pub mod model;
pub mod parser;
pub mod query;
pub mod repo;
pub mod schema;
pub mod service;
pub mod store;
pub mod watcher;

pub use config::{CatalogConfig, ConfigError};
pub use index::artifact_index::ArtifactIndex;
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::artifact::{
    Artifact, ArtifactDetails, ArtifactId, ArtifactKind, ArtifactSummary, DecisionStatus,
    RuleSeverity, SourceLocation,
};
pub use parser::document::{content_hash, parse, serialize, ParseError, SerializeError};
pub use query::engine::{OrderBy, QueryDescriptor};
pub use repo::artifact_repo::{
    ArtifactRepository, PersistedDocument, RepoError, RepoResult, SnapshotInfo,
    SqliteArtifactRepository,
};
pub use schema::registry::{FieldSpec, FieldType, KindSchema, SchemaRegistry, UnknownKindError};
pub use service::catalog_service::{
    ArtifactCatalog, CatalogSnapshot, ChangeOutcome, DocumentChange, LoadError, LoadOutcome,
    LoadSummary,
};
pub use store::artifact_store::{ArtifactStore, RemovedArtifact, StoreError, StoreResult};
pub use store::report::{DanglingRelation, QuarantineEntry, ValidationReport};
pub use watcher::change_watcher::{apply_batch, BatchSummary, ChangeWatcher, WatchError, WatcherState};
pub use watcher::events::{ChangeBatch, PendingChange};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
