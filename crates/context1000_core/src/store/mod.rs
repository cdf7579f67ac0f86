//! Artifact storage and corpus integrity.
//!
//! # Responsibility
//! - Own parsed artifacts keyed by id.
//! - Report quarantined documents and dangling relations.
//!
//! # Invariants
//! - Mutations are all-or-nothing; errors never leave partial writes.

pub mod artifact_store;
pub mod report;
