//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `context1000_core` linkage.
//! - Optionally load one artifact directory and print its validation report.
//! - Keep output deterministic for quick local sanity checks.

use context1000_core::{ArtifactCatalog, ArtifactKind, CatalogConfig, QueryDescriptor};
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("context1000_core ping={}", context1000_core::ping());
    println!("context1000_core version={}", context1000_core::core_version());

    let Some(root) = std::env::args().nth(1) else {
        return ExitCode::SUCCESS;
    };

    let catalog = ArtifactCatalog::new();
    let summary = match catalog.load_directory(&CatalogConfig::new(&root)) {
        Ok(summary) => summary,
        Err(err) => {
            eprintln!("load failed: {err}");
            return ExitCode::FAILURE;
        }
    };

    println!(
        "documents={} inserted={} quarantined={} rejected={} unreadable={}",
        summary.documents,
        summary.inserted,
        summary.quarantined,
        summary.rejected,
        summary.unreadable.len()
    );
    for kind in ArtifactKind::ALL {
        let count = catalog
            .query(&QueryDescriptor::new().with_kind(kind))
            .len();
        println!("kind={kind} count={count}");
    }
    for entry in &summary.report.quarantined {
        println!("quarantined id={} reason={}", entry.id, entry.reason);
    }
    for dangling in &summary.report.dangling_relations {
        println!(
            "dangling id={} missing={}",
            dangling.id, dangling.missing_target
        );
    }

    if summary.report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    }
}
