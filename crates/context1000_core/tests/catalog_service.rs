use context1000_core::{
    ArtifactCatalog, ArtifactKind, CatalogConfig, ChangeOutcome, DocumentChange, LoadError,
    LoadOutcome, ParseError, QueryDescriptor, SourceLocation, StoreError,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;

fn decision_doc(id: &str, title: &str, relations: &[&str]) -> String {
    format!(
        "---\nid: {id}\nkind: decision\ntitle: {title}\nstatus: accepted\nrelations: [{}]\n---\nBody of {id}.\n",
        relations.join(", ")
    )
}

fn rule_doc(id: &str) -> String {
    format!("---\nid: {id}\nkind: rule\ntitle: Rule {id}\nseverity: warning\n---\n")
}

fn query_ids(catalog: &ArtifactCatalog, descriptor: &QueryDescriptor) -> Vec<String> {
    catalog
        .query(descriptor)
        .into_iter()
        .map(|summary| summary.id)
        .collect()
}

#[test]
fn dangling_relation_is_quarantined_until_target_arrives() {
    let catalog = ArtifactCatalog::new();
    let decisions = QueryDescriptor::new().with_kind(ArtifactKind::Decision);

    catalog.load_document(
        &decision_doc("d2", "Second", &["d1"]),
        SourceLocation::from_path("/docs/d2.md"),
    );
    let report = catalog.settle();
    assert_eq!(report.dangling_relations.len(), 1);
    assert_eq!(report.dangling_relations[0].missing_target, "d1");
    assert!(query_ids(&catalog, &decisions).is_empty());
    assert_eq!(catalog.get("d2").unwrap().title, "Second");

    let outcome = catalog.load_document(
        &decision_doc("d1", "First", &[]),
        SourceLocation::from_path("/docs/d1.md"),
    );
    assert_eq!(outcome, LoadOutcome::Inserted("d1".to_string()));
    assert!(catalog.validation_report().is_clean());
    assert_eq!(query_ids(&catalog, &decisions), vec!["d2", "d1"]);
}

#[test]
fn load_document_reports_each_outcome() {
    let catalog = ArtifactCatalog::new();
    let source = SourceLocation::from_path("/docs/r1.md");

    assert_eq!(
        catalog.load_document(&rule_doc("r1"), source.clone()),
        LoadOutcome::Inserted("r1".to_string())
    );
    assert_eq!(
        catalog.load_document(&rule_doc("r1"), source.clone()),
        LoadOutcome::Unchanged("r1".to_string())
    );

    let edited = rule_doc("r1").replace("severity: warning", "severity: error");
    assert_eq!(
        catalog.load_document(&edited, source.clone()),
        LoadOutcome::Replaced("r1".to_string())
    );

    let broken = "---\nid: r1\nkind: rule\n---\n";
    assert!(matches!(
        catalog.load_document(broken, source),
        LoadOutcome::Quarantined(ParseError::MissingField { field: "title" })
    ));
}

#[test]
fn failed_reparse_keeps_previous_version_visible() {
    let catalog = ArtifactCatalog::new();
    let source = SourceLocation::from_path("/docs/r1.md");
    catalog.load_document(&rule_doc("r1"), source.clone());

    catalog.load_document("---\nkind: rule\ntitle: [unclosed\n---\n", source.clone());

    assert_eq!(catalog.get("r1").unwrap().title, "Rule r1");
    let report = catalog.validation_report();
    assert_eq!(report.quarantined.len(), 1);
    assert_eq!(report.quarantined[0].id, "/docs/r1.md");

    catalog.load_document(&rule_doc("r1"), source);
    assert!(catalog.validation_report().is_clean());
}

#[test]
fn duplicate_id_from_another_document_is_rejected() {
    let catalog = ArtifactCatalog::new();
    catalog.load_document(&rule_doc("r1"), SourceLocation::from_path("/docs/a.md"));

    let other = rule_doc("r1").replace("Rule r1", "Impostor");
    let outcome = catalog.load_document(&other, SourceLocation::from_path("/docs/b.md"));

    assert_eq!(
        outcome,
        LoadOutcome::Rejected(StoreError::DuplicateId("r1".to_string()))
    );
    assert_eq!(catalog.get("r1").unwrap().title, "Rule r1");
    assert_eq!(catalog.validation_report().quarantined[0].id, "/docs/b.md");
}

#[test]
fn changing_the_declared_id_moves_the_artifact() {
    let catalog = ArtifactCatalog::new();
    let source = SourceLocation::from_path("/docs/rule.md");
    catalog.load_document(&rule_doc("r-old"), source.clone());

    let outcome = catalog.load_document(&rule_doc("r-new"), source);

    assert_eq!(outcome, LoadOutcome::Inserted("r-new".to_string()));
    assert!(catalog.get("r-old").is_err());
    assert_eq!(
        query_ids(&catalog, &QueryDescriptor::new()),
        vec!["r-new".to_string()]
    );
}

#[test]
fn remove_document_drops_artifact_and_dangles_referrers() {
    let catalog = ArtifactCatalog::new();
    catalog.load_document(&decision_doc("d1", "First", &[]), SourceLocation::from_path("/docs/d1.md"));
    catalog.load_document(
        &decision_doc("d2", "Second", &["d1"]),
        SourceLocation::from_path("/docs/d2.md"),
    );

    let removed = catalog.remove_document(Path::new("/docs/d1.md")).unwrap();

    assert_eq!(removed.artifact.id, "d1");
    assert_eq!(removed.dangling_referrers, vec!["d2".to_string()]);
    assert!(query_ids(&catalog, &QueryDescriptor::new()).is_empty());
    assert!(catalog.remove_document(Path::new("/docs/d1.md")).is_none());
}

#[test]
fn snapshots_are_isolated_from_later_mutations() {
    let catalog = ArtifactCatalog::new();
    catalog.load_document(&rule_doc("r1"), SourceLocation::detached());
    let before = catalog.snapshot();

    catalog.load_document(&rule_doc("r2"), SourceLocation::detached());
    catalog.remove("r1").unwrap();

    assert_eq!(before.query(&QueryDescriptor::new()).len(), 1);
    assert!(before.get("r1").is_some());
    let after = catalog.snapshot();
    assert!(after.version() > before.version());
    assert_eq!(after.query_summaries(&QueryDescriptor::new())[0].id, "r2");
}

#[test]
fn failed_mutation_publishes_nothing() {
    let catalog = ArtifactCatalog::new();
    catalog.load_document(&rule_doc("r1"), SourceLocation::detached());
    let version = catalog.snapshot().version();

    assert!(catalog.remove("missing").is_err());
    assert_eq!(catalog.snapshot().version(), version);
}

#[test]
fn concurrent_readers_see_consistent_snapshots() {
    let catalog = Arc::new(ArtifactCatalog::new());
    let writer = {
        let catalog = Arc::clone(&catalog);
        std::thread::spawn(move || {
            for n in 0..50 {
                catalog.load_document(&rule_doc(&format!("r{n}")), SourceLocation::detached());
            }
        })
    };
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let catalog = Arc::clone(&catalog);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    let snapshot = catalog.snapshot();
                    assert_eq!(snapshot.index().len(), snapshot.store().len());
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(catalog.snapshot().store().len(), 50);
}

#[test]
fn apply_documents_returns_outcomes_in_input_order() {
    let catalog = ArtifactCatalog::new();
    catalog.load_document(&rule_doc("r1"), SourceLocation::from_path("/docs/old.md"));

    let outcomes = catalog.apply_documents(
        vec![
            DocumentChange::Upsert {
                raw: rule_doc("r1"),
                source: SourceLocation::from_path("/docs/new.md"),
            },
            DocumentChange::Remove {
                path: "/docs/old.md".into(),
            },
        ],
        true,
    );

    assert_eq!(
        outcomes,
        vec![
            ChangeOutcome::Loaded(LoadOutcome::Inserted("r1".to_string())),
            ChangeOutcome::Removed(Some("r1".to_string())),
        ]
    );
    assert_eq!(
        catalog
            .snapshot()
            .store()
            .id_for_source("/docs/new.md")
            .map(String::as_str),
        Some("r1")
    );
}

#[test]
fn load_directory_scans_filters_and_prunes() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("decisions")).unwrap();
    fs::create_dir_all(root.join(".drafts")).unwrap();
    fs::write(root.join("decisions/d1.md"), decision_doc("d1", "First", &[])).unwrap();
    fs::write(
        root.join("decisions/d2.mdx"),
        decision_doc("d2", "Second", &["d1", "d9"]),
    )
    .unwrap();
    fs::write(root.join("broken.md"), "no metadata").unwrap();
    fs::write(root.join("notes.txt"), rule_doc("ignored")).unwrap();
    fs::write(root.join(".drafts/r1.md"), rule_doc("hidden")).unwrap();

    let catalog = ArtifactCatalog::new();
    let summary = catalog.load_directory(&CatalogConfig::new(root)).unwrap();

    assert_eq!(summary.documents, 3);
    assert_eq!(summary.inserted, 2);
    assert_eq!(summary.quarantined, 1);
    assert_eq!(summary.report.dangling_relations.len(), 1);
    assert_eq!(summary.report.dangling_relations[0].missing_target, "d9");
    assert!(catalog.get("hidden").is_err());
    assert!(catalog.get("ignored").is_err());

    fs::remove_file(root.join("decisions/d1.md")).unwrap();
    let summary = catalog.load_directory(&CatalogConfig::new(root)).unwrap();
    assert_eq!(summary.removed, 1);
    assert_eq!(summary.unchanged, 1);
    assert!(catalog.get("d1").is_err());
}

#[test]
fn load_directory_rejects_missing_root() {
    let dir = tempfile::tempdir().unwrap();
    let err = ArtifactCatalog::new()
        .load_directory(&CatalogConfig::new(dir.path().join("nope")))
        .unwrap_err();
    assert!(matches!(err, LoadError::Root { .. }));
}

#[test]
fn removing_a_decision_reports_its_referrer_as_dangling() {
    let catalog = ArtifactCatalog::new();
    catalog.load_document(
        &decision_doc("d1", "Use event sourcing", &[]),
        SourceLocation::detached(),
    );
    catalog.load_document(
        &decision_doc("d2", "Revisit event sourcing", &["d1"]),
        SourceLocation::detached(),
    );
    assert!(catalog.settle().dangling_relations.is_empty());

    catalog.remove("d1").unwrap();
    let report = catalog.settle();

    assert_eq!(report.dangling_relations.len(), 1);
    assert_eq!(report.dangling_relations[0].id, "d2");
    assert_eq!(report.dangling_relations[0].missing_target, "d1");
}

#[test]
fn guide_missing_title_leaves_the_store_untouched() {
    let catalog = ArtifactCatalog::new();
    let before = catalog.snapshot();

    let outcome = catalog.load_document(
        "---\nid: g1\nkind: guide\n---\nbody\n",
        SourceLocation::detached(),
    );

    assert_eq!(
        outcome,
        LoadOutcome::Quarantined(ParseError::MissingField { field: "title" })
    );
    assert_eq!(catalog.snapshot().store().revision(), before.store().revision());
    assert!(catalog.snapshot().store().is_empty());
}

#[test]
fn loading_a_root_keeps_documents_of_a_sibling_root_with_the_same_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let docs = dir.path().join("docs");
    let docs2 = dir.path().join("docs2");
    fs::create_dir_all(&docs).unwrap();
    fs::create_dir_all(&docs2).unwrap();
    fs::write(docs.join("a.md"), rule_doc("a")).unwrap();
    fs::write(docs2.join("b.md"), rule_doc("b")).unwrap();

    let catalog = ArtifactCatalog::new();
    catalog.load_directory(&CatalogConfig::new(&docs2)).unwrap();
    let summary = catalog.load_directory(&CatalogConfig::new(&docs)).unwrap();

    assert_eq!(summary.removed, 0);
    assert!(catalog.get("a").is_ok());
    assert!(catalog.get("b").is_ok());
}

#[test]
fn identical_document_under_another_path_is_rejected_and_reported() {
    let catalog = ArtifactCatalog::new();
    let first = catalog.load_document(&rule_doc("g1"), SourceLocation::from_path("/docs/a.md"));
    let second = catalog.load_document(&rule_doc("g1"), SourceLocation::from_path("/docs/b.md"));

    assert_eq!(first, LoadOutcome::Inserted("g1".to_string()));
    assert_eq!(
        second,
        LoadOutcome::Rejected(StoreError::DuplicateId("g1".to_string()))
    );
    let report = catalog.validation_report();
    assert_eq!(report.quarantined.len(), 1);
    assert_eq!(report.quarantined[0].id, "/docs/b.md");
    assert_eq!(
        catalog
            .snapshot()
            .store()
            .id_for_source("/docs/a.md")
            .map(String::as_str),
        Some("g1")
    );
}

#[test]
fn detached_failures_are_reported_under_synthetic_keys() {
    let catalog = ArtifactCatalog::new();

    let outcome = catalog.load_document(
        "---\nid: g1\nkind: guide\n---\nbody\n",
        SourceLocation::detached(),
    );
    assert_eq!(
        outcome,
        LoadOutcome::Quarantined(ParseError::MissingField { field: "title" })
    );
    catalog.load_document("not a document", SourceLocation::detached());

    let report = catalog.validation_report();
    assert_eq!(report.quarantined.len(), 2);
    assert!(report.quarantined.iter().any(|entry| entry.id == "<memory>:g1"));
    assert!(report
        .quarantined
        .iter()
        .all(|entry| entry.id.starts_with("<memory>:")));

    catalog.load_document(
        "---\nid: g1\nkind: guide\ntitle: Fixed\n---\nbody\n",
        SourceLocation::detached(),
    );
    let report = catalog.validation_report();
    assert_eq!(report.quarantined.len(), 1);
    assert!(report.quarantined.iter().all(|entry| entry.id != "<memory>:g1"));
}

#[test]
fn detached_duplicate_of_a_file_backed_artifact_is_rejected() {
    let catalog = ArtifactCatalog::new();
    catalog.load_document(&rule_doc("r1"), SourceLocation::from_path("/docs/r1.md"));

    let outcome = catalog.load_document(&rule_doc("r1"), SourceLocation::detached());

    assert_eq!(
        outcome,
        LoadOutcome::Rejected(StoreError::DuplicateId("r1".to_string()))
    );
    assert_eq!(catalog.validation_report().quarantined[0].id, "<memory>:r1");
}
