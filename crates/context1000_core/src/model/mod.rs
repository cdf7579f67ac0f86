//! Domain model for architectural artifacts.
//!
//! # Responsibility
//! - Define canonical data structures used by parser, store and index.
//! - Keep one variant per artifact kind so kind handling stays exhaustive.
//!
//! # Invariants
//! - Every artifact is identified by a stable `ArtifactId`.
//! - Cross-artifact links are ids, resolved only by the store.

pub mod artifact;
