//! Artifact document parsing.
//!
//! # Responsibility
//! - Split documents into metadata block and body.
//! - Validate metadata against the schema registry.
//! - Provide the canonical encoding used for round-trips and persistence.

pub mod document;
pub mod frontmatter;
