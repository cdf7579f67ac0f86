//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define snapshot persistence contracts for the artifact catalog.
//! - Isolate SQLite query details from catalog orchestration.
//!
//! # Invariants
//! - Persisted documents are canonical encodings; reads re-run the parser.

pub mod artifact_repo;
