//! SQLite snapshot cache: connection bootstrap and the artifact schema.
//!
//! Failures surface as [`crate::repo::artifact_repo::RepoError`]; nothing in
//! this module is usable before the schema check passes.

mod open;
pub mod schema;

pub use open::{open_db, open_db_in_memory};
