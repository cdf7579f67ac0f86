//! Core use-case services.
//!
//! # Responsibility
//! - Own the artifact store and index as one consistent unit.
//! - Keep watcher and CLI layers decoupled from store and index details.

pub mod catalog_service;
