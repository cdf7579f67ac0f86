use context1000_core::{
    Artifact, ArtifactDetails, ArtifactId, ArtifactIndex, ArtifactKind, ArtifactStore,
    DecisionStatus,
};
use std::collections::BTreeSet;

fn guide(id: &str, tags: &[&str], relations: &[&str], body: &str) -> Artifact {
    Artifact::new(id, format!("Guide {id}"), ArtifactDetails::Guide { audience: None })
        .with_tags(tags.iter().copied())
        .with_relations(relations.iter().copied())
        .with_body(body)
}

fn decision(id: &str, relations: &[&str]) -> Artifact {
    Artifact::new(
        id,
        format!("Decision {id}"),
        ArtifactDetails::Decision {
            status: DecisionStatus::Accepted,
            date: None,
        },
    )
    .with_relations(relations.iter().copied())
}

fn ids(values: &[&str]) -> BTreeSet<ArtifactId> {
    values.iter().map(|value| value.to_string()).collect()
}

#[test]
fn build_indexes_kind_tag_relation_and_text() {
    let mut store = ArtifactStore::new();
    store
        .insert(guide("g1", &["onboarding"], &["d1"], "Install the toolchain first."))
        .unwrap();
    store.insert(decision("d1", &[])).unwrap();

    let index = ArtifactIndex::build(&store);

    assert_eq!(index.len(), 2);
    assert_eq!(index.ids_by_kind(ArtifactKind::Guide), vec!["g1"]);
    assert_eq!(index.ids_by_tag("onboarding"), ids(&["g1"]));
    assert_eq!(index.ids_relating_to("d1"), ids(&["g1"]));
    assert_eq!(index.ids_by_token("toolchain"), ids(&["g1"]));
    assert_eq!(index.ids_by_token("decision"), ids(&["d1"]));
}

#[test]
fn incremental_updates_match_full_rebuild() {
    let mut store = ArtifactStore::new();
    let mut index = ArtifactIndex::build(&store);

    let steps: Vec<(Artifact, bool)> = vec![
        (guide("g1", &["a", "b"], &[], "alpha beta"), false),
        (guide("g2", &["b"], &["g1"], "beta gamma"), false),
        (guide("g1", &["c"], &[], "delta"), true),
    ];

    for (artifact, is_replace) in steps {
        let id = artifact.id.clone();
        if is_replace {
            store.replace(&id, artifact).unwrap();
        } else {
            store.insert(artifact).unwrap();
        }
        index = index.update([&id], &store);
        assert_eq!(index, ArtifactIndex::build(&store));
    }

    let removed = store.remove("g1").unwrap();
    let mut changed = vec!["g1".to_string()];
    changed.extend(removed.dangling_referrers);
    index = index.update(changed.iter(), &store);
    assert_eq!(index, ArtifactIndex::build(&store));
    assert!(index.ids_by_tag("a").is_empty());
    assert!(index.tags().iter().all(|tag| tag != "c"));
}

#[test]
fn dangling_artifacts_are_not_indexed() {
    let mut store = ArtifactStore::new();
    store.insert(decision("d2", &["d1"])).unwrap();
    store.settle();

    let index = ArtifactIndex::build(&store);
    assert!(!index.contains("d2"));
    assert!(index.is_empty());

    store.insert(decision("d1", &[])).unwrap();
    let index = index.update([&"d1".to_string(), &"d2".to_string()], &store);
    assert_eq!(index, ArtifactIndex::build(&store));
    assert_eq!(index.ids_by_kind(ArtifactKind::Decision), vec!["d2", "d1"]);
}

#[test]
fn kind_listing_follows_insertion_order() {
    let mut store = ArtifactStore::new();
    for id in ["zeta", "alpha", "mid"] {
        store.insert(decision(id, &[])).unwrap();
    }
    let index = ArtifactIndex::build(&store);
    assert_eq!(
        index.ids_by_kind(ArtifactKind::Decision),
        vec!["zeta", "alpha", "mid"]
    );
}

mod catalog_driven {
    use context1000_core::{ArtifactCatalog, ArtifactIndex, DanglingRelation, SourceLocation};
    use proptest::prelude::*;
    use std::path::PathBuf;

    const IDS: &[&str] = &["a1", "b2", "c3", "d4", "e5"];
    const TAGS: &[&str] = &["alpha", "beta", "gamma"];
    const BODIES: &[&str] = &["install toolchain", "toolchain and cache", "cache only"];
    const SLOTS: usize = 4;

    #[derive(Debug, Clone)]
    enum Step {
        Load {
            slot: usize,
            id: usize,
            relations: Vec<usize>,
            tag: usize,
            body: usize,
        },
        RemoveDocument {
            slot: usize,
        },
        RemoveId {
            id: usize,
        },
        Settle,
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            4 => (
                0..SLOTS,
                0..IDS.len(),
                prop::collection::vec(0..IDS.len(), 0..3),
                0..TAGS.len(),
                0..BODIES.len(),
            )
                .prop_map(|(slot, id, relations, tag, body)| Step::Load {
                    slot,
                    id,
                    relations,
                    tag,
                    body,
                }),
            2 => (0..SLOTS).prop_map(|slot| Step::RemoveDocument { slot }),
            1 => (0..IDS.len()).prop_map(|id| Step::RemoveId { id }),
            2 => Just(Step::Settle),
        ]
    }

    fn slot_path(slot: usize) -> PathBuf {
        PathBuf::from(format!("/docs/slot{slot}.md"))
    }

    fn document(id: usize, relations: &[usize], tag: usize, body: usize) -> String {
        let relations: Vec<&str> = relations.iter().map(|index| IDS[*index]).collect();
        format!(
            "---\nid: {}\nkind: guide\ntitle: Guide {}\ntags: [{}]\nrelations: [{}]\n---\n{}\n",
            IDS[id],
            IDS[id],
            TAGS[tag],
            relations.join(", "),
            BODIES[body]
        )
    }

    fn expected_dangling(catalog: &ArtifactCatalog) -> Vec<DanglingRelation> {
        let snapshot = catalog.snapshot();
        let store = snapshot.store();
        let mut expected: Vec<DanglingRelation> = store
            .iter()
            .flat_map(|(id, entry)| {
                entry
                    .artifact
                    .relations
                    .iter()
                    .filter(|target| !store.contains(target))
                    .map(|target| DanglingRelation {
                        id: id.clone(),
                        missing_target: target.clone(),
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        expected.sort();
        expected
    }

    proptest! {
        #[test]
        fn index_matches_a_rebuild_after_every_catalog_step(
            steps in prop::collection::vec(step(), 1..40)
        ) {
            let catalog = ArtifactCatalog::new();
            for step in steps {
                match step {
                    Step::Load { slot, id, relations, tag, body } => {
                        catalog.load_document(
                            &document(id, &relations, tag, body),
                            SourceLocation::from_path(slot_path(slot)),
                        );
                    }
                    Step::RemoveDocument { slot } => {
                        catalog.remove_document(&slot_path(slot));
                    }
                    Step::RemoveId { id } => {
                        let _ = catalog.remove(IDS[id]);
                    }
                    Step::Settle => {
                        let report = catalog.settle();
                        prop_assert_eq!(report.dangling_relations, expected_dangling(&catalog));
                    }
                }

                let snapshot = catalog.snapshot();
                prop_assert_eq!(snapshot.index(), &ArtifactIndex::build(snapshot.store()));
            }
        }
    }
}
