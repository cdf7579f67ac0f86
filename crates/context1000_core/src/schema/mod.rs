//! Artifact kind schemas.
//!
//! Static, process-wide declarations of which metadata fields each
//! artifact kind requires.

pub mod registry;
