//! Filesystem change tracking for artifact directories.

pub mod change_watcher;
pub mod events;
