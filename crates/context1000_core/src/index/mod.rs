//! In-memory lookup index over the artifact store.
//!
//! # Responsibility
//! - Provide kind/tag/relation/full-text lookups for the query engine.
//! - Support incremental updates proportional to change size.

pub mod artifact_index;
pub mod tokenize;
