//! Query entry points over store + index snapshots.

pub mod engine;
