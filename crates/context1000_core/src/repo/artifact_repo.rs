//! Artifact snapshot repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist the artifacts of a store as canonical documents.
//! - Rebuild a store from persisted documents without touching the source tree.
//!
//! # Invariants
//! - `save_store` replaces the persisted set and its metadata atomically.
//! - Read paths reject rows that no longer parse or no longer hash to the
//!   stored digest instead of masking them.
//! - A restore that finds fewer or more rows than the last save recorded is
//!   refused.

use crate::model::artifact::{Artifact, ArtifactId, ArtifactKind, SourceLocation};
use crate::parser::document::{content_hash, parse, serialize, SerializeError};
use crate::store::artifact_store::{ArtifactStore, StoreError};
use log::info;
use rusqlite::{params, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

const DOCUMENT_SELECT_SQL: &str = "SELECT
    id,
    kind,
    source_path,
    source_line,
    content_hash,
    seq,
    document
FROM artifacts";

const META_ARTIFACT_COUNT: &str = "artifact_count";
const META_SAVED_AT_MS: &str = "saved_at_ms";
const META_WRITER_VERSION: &str = "writer_version";

pub type RepoResult<T> = Result<T, RepoError>;

/// Snapshot persistence error, from opening the database to decoding rows.
#[derive(Debug)]
pub enum RepoError {
    Sqlite(rusqlite::Error),
    /// The database was written by a build with a newer snapshot schema.
    SchemaTooNew { found: u32, supported: u32 },
    /// The recorded schema version claims a table that is missing.
    SchemaIncomplete { table: String },
    Encode(SerializeError),
    Store(StoreError),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::SchemaTooNew { found, supported } => write!(
                f,
                "snapshot schema version {found} is newer than supported {supported}"
            ),
            Self::SchemaIncomplete { table } => {
                write!(f, "snapshot schema is missing table `{table}`")
            }
            Self::Encode(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::InvalidData(message) => {
                write!(f, "invalid persisted artifact data: {message}")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Encode(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::SchemaTooNew { .. } | Self::SchemaIncomplete { .. } | Self::InvalidData(_) => {
                None
            }
        }
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<SerializeError> for RepoError {
    fn from(value: SerializeError) -> Self {
        Self::Encode(value)
    }
}

impl From<StoreError> for RepoError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// One persisted artifact row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedDocument {
    pub id: ArtifactId,
    pub kind: ArtifactKind,
    pub source: SourceLocation,
    pub content_hash: String,
    pub seq: u64,
    /// Canonical document text (metadata block + body).
    pub document: String,
}

impl PersistedDocument {
    /// Re-parses the stored document and checks it against the row.
    pub fn decode(&self) -> RepoResult<Artifact> {
        let artifact = parse(&self.document, &self.source)
            .map_err(|err| RepoError::InvalidData(format!("artifact `{}`: {err}", self.id)))?;
        if artifact.id != self.id {
            return Err(RepoError::InvalidData(format!(
                "row `{}` holds a document for `{}`",
                self.id, artifact.id
            )));
        }
        if content_hash(&artifact) != self.content_hash {
            return Err(RepoError::InvalidData(format!(
                "artifact `{}` does not match its stored content hash",
                self.id
            )));
        }
        Ok(artifact)
    }
}

/// What the last `save_store` recorded about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotInfo {
    pub artifact_count: usize,
    /// Milliseconds since the Unix epoch.
    pub saved_at_ms: u64,
    /// `core_version()` of the build that wrote the snapshot.
    pub writer_version: String,
}

/// Repository interface for catalog snapshots.
pub trait ArtifactRepository {
    /// Replaces the persisted set with the store's artifacts; returns the count.
    fn save_store(&self, store: &ArtifactStore) -> RepoResult<usize>;
    /// Persisted rows in original insertion order.
    fn load_documents(&self) -> RepoResult<Vec<PersistedDocument>>;
    fn count(&self) -> RepoResult<usize>;
    /// Metadata of the last save, `None` before the first one.
    fn snapshot_info(&self) -> RepoResult<Option<SnapshotInfo>>;

    /// Rebuilds and settles a store from persisted rows.
    fn restore_store(&self) -> RepoResult<ArtifactStore> {
        let documents = self.load_documents()?;
        if let Some(info) = self.snapshot_info()? {
            if info.artifact_count != documents.len() {
                return Err(RepoError::InvalidData(format!(
                    "snapshot recorded {} artifacts but holds {}",
                    info.artifact_count,
                    documents.len()
                )));
            }
        }

        let mut store = ArtifactStore::new();
        for document in documents {
            store.insert(document.decode()?)?;
        }
        store.settle();
        Ok(store)
    }
}

/// SQLite-backed snapshot repository.
pub struct SqliteArtifactRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteArtifactRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl ArtifactRepository for SqliteArtifactRepository<'_> {
    fn save_store(&self, store: &ArtifactStore) -> RepoResult<usize> {
        let started_at = Instant::now();
        let mut entries: Vec<_> = store.iter().map(|(_, entry)| entry).collect();
        entries.sort_by_key(|entry| entry.seq);

        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM artifacts;", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO artifacts (
                    id,
                    kind,
                    title,
                    source_path,
                    source_line,
                    content_hash,
                    seq,
                    document
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            )?;
            for entry in &entries {
                let artifact = &entry.artifact;
                stmt.execute(params![
                    artifact.id.as_str(),
                    artifact.kind().as_str(),
                    artifact.title.as_str(),
                    artifact.source.key(),
                    to_db_int(artifact.source.line as u64)?,
                    entry.content_hash.as_str(),
                    to_db_int(entry.seq)?,
                    serialize(artifact)?,
                ])?;
            }
        }
        let saved_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0);
        {
            let mut stmt = tx.prepare(
                "INSERT INTO snapshot_meta (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
            )?;
            stmt.execute(params![META_ARTIFACT_COUNT, entries.len().to_string()])?;
            stmt.execute(params![META_SAVED_AT_MS, saved_at_ms.to_string()])?;
            stmt.execute(params![META_WRITER_VERSION, crate::core_version()])?;
        }
        tx.commit()?;

        info!(
            "event=snapshot_save module=repo status=ok artifacts={} duration_ms={}",
            entries.len(),
            started_at.elapsed().as_millis()
        );
        Ok(entries.len())
    }

    fn load_documents(&self) -> RepoResult<Vec<PersistedDocument>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{DOCUMENT_SELECT_SQL} ORDER BY seq ASC;"))?;
        let mut rows = stmt.query([])?;

        let mut documents = Vec::new();
        while let Some(row) = rows.next()? {
            documents.push(parse_document_row(row)?);
        }
        Ok(documents)
    }

    fn count(&self) -> RepoResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM artifacts;", [], |row| row.get(0))?;
        usize::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative artifact count {count}")))
    }

    fn snapshot_info(&self) -> RepoResult<Option<SnapshotInfo>> {
        let mut stmt = self.conn.prepare("SELECT key, value FROM snapshot_meta;")?;
        let mut rows = stmt.query([])?;
        let mut artifact_count = None;
        let mut saved_at_ms = None;
        let mut writer_version = None;
        while let Some(row) = rows.next()? {
            let key: String = row.get(0)?;
            let value: String = row.get(1)?;
            match key.as_str() {
                META_ARTIFACT_COUNT => artifact_count = Some(parse_meta_number(&key, &value)?),
                META_SAVED_AT_MS => saved_at_ms = Some(parse_meta_number(&key, &value)?),
                META_WRITER_VERSION => writer_version = Some(value),
                _ => {}
            }
        }

        match (artifact_count, saved_at_ms, writer_version) {
            (None, None, None) => Ok(None),
            (Some(artifact_count), Some(saved_at_ms), Some(writer_version)) => {
                Ok(Some(SnapshotInfo {
                    artifact_count: usize::try_from(artifact_count).map_err(|_| {
                        RepoError::InvalidData(format!("artifact count {artifact_count} overflows"))
                    })?,
                    saved_at_ms,
                    writer_version,
                }))
            }
            _ => Err(RepoError::InvalidData(
                "snapshot metadata is incomplete".to_string(),
            )),
        }
    }
}

fn parse_meta_number(key: &str, value: &str) -> RepoResult<u64> {
    value
        .parse()
        .map_err(|_| RepoError::InvalidData(format!("snapshot metadata `{key}` is not a number")))
}

fn parse_document_row(row: &Row<'_>) -> RepoResult<PersistedDocument> {
    let id: String = row.get(0)?;
    let kind_raw: String = row.get(1)?;
    let source_path: Option<String> = row.get(2)?;
    let source_line: i64 = row.get(3)?;
    let content_hash: String = row.get(4)?;
    let seq: i64 = row.get(5)?;
    let document: String = row.get(6)?;

    let kind = ArtifactKind::parse(&kind_raw)
        .ok_or_else(|| RepoError::InvalidData(format!("unknown kind `{kind_raw}` for `{id}`")))?;
    let line = usize::try_from(source_line)
        .ok()
        .filter(|line| *line >= 1)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid source line for `{id}`")))?;
    let seq = u64::try_from(seq)
        .map_err(|_| RepoError::InvalidData(format!("negative seq for `{id}`")))?;

    Ok(PersistedDocument {
        id,
        kind,
        source: SourceLocation {
            path: source_path.map(PathBuf::from),
            line,
        },
        content_hash,
        seq,
        document,
    })
}

fn to_db_int(value: u64) -> RepoResult<i64> {
    i64::try_from(value)
        .map_err(|_| RepoError::InvalidData(format!("value {value} exceeds sqlite integer range")))
}
