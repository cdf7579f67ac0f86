//! Artifact snapshot schema, upgraded step by step.
//!
//! # Invariants
//! - Step versions start at 1 and increase by one; the stored version lives
//!   in `PRAGMA user_version`.
//! - A database written by a newer build is refused, never downgraded.
//! - After an upgrade every table the snapshot repository touches exists.

use crate::repo::artifact_repo::{RepoError, RepoResult};
use log::{debug, info};
use rusqlite::Connection;

struct SchemaStep {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const STEPS: &[SchemaStep] = &[
    SchemaStep {
        version: 1,
        name: "artifacts",
        sql: include_str!("sql/0001_artifacts.sql"),
    },
    SchemaStep {
        version: 2,
        name: "snapshot_meta",
        sql: include_str!("sql/0002_snapshot_meta.sql"),
    },
];

/// Tables read or written by `SqliteArtifactRepository`.
pub const SNAPSHOT_TABLES: &[&str] = &["artifacts", "snapshot_meta"];

/// Schema version this build writes.
pub fn current_version() -> u32 {
    STEPS.last().map_or(0, |step| step.version)
}

/// Version recorded in the database, 0 for a fresh file.
pub fn stored_version(conn: &Connection) -> RepoResult<u32> {
    Ok(conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?)
}

/// Brings the snapshot schema to [`current_version`] in one transaction,
/// then checks that the snapshot tables exist. Returns the version found.
pub fn upgrade(conn: &mut Connection) -> RepoResult<u32> {
    let found = stored_version(conn)?;
    let supported = current_version();
    if found > supported {
        return Err(RepoError::SchemaTooNew { found, supported });
    }

    if found < supported {
        let tx = conn.transaction()?;
        for step in STEPS.iter().filter(|step| step.version > found) {
            tx.execute_batch(step.sql)?;
            tx.pragma_update(None, "user_version", step.version)?;
            debug!(
                "event=schema_step module=db status=ok version={} name={}",
                step.version, step.name
            );
        }
        tx.commit()?;
        info!(
            "event=schema_upgrade module=db status=ok from_version={} to_version={}",
            found, supported
        );
    }

    for table in SNAPSHOT_TABLES {
        if !table_exists(conn, table)? {
            return Err(RepoError::SchemaIncomplete {
                table: (*table).to_string(),
            });
        }
    }
    Ok(found)
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1);",
        [table],
        |row| row.get::<_, bool>(0),
    )?)
}
