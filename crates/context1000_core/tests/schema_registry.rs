use context1000_core::schema::registry::{FIELD_OWNER, FIELD_SEVERITY, FIELD_STATUS, FIELD_TITLE};
use context1000_core::{ArtifactKind, FieldType, SchemaRegistry};

#[test]
fn every_kind_requires_kind_and_title() {
    let registry = SchemaRegistry::global();
    for kind in registry.kinds() {
        let schema = registry.describe(kind);
        let required: Vec<&str> = schema.required_fields().map(|field| field.name).collect();
        assert!(required.contains(&"kind"), "{kind} must require kind");
        assert!(required.contains(&FIELD_TITLE), "{kind} must require title");
        assert_eq!(schema.fields[0].name, "id");
    }
}

#[test]
fn kind_specific_fields_are_declared() {
    let registry = SchemaRegistry::global();

    let decision = registry.describe(ArtifactKind::Decision);
    let status = decision.field(FIELD_STATUS).unwrap();
    assert!(status.required);
    assert_eq!(
        status.field_type,
        FieldType::Enum(&["proposed", "accepted", "superseded"])
    );

    let rule = registry.describe(ArtifactKind::Rule);
    assert!(rule.field(FIELD_SEVERITY).unwrap().required);

    let guide = registry.describe(ArtifactKind::Guide);
    assert_eq!(guide.required_fields().count(), 2);

    let project = registry.describe(ArtifactKind::Project);
    assert!(project.field(FIELD_OWNER).unwrap().required);
    assert!(project.field(FIELD_STATUS).is_none());
}

#[test]
fn describe_name_is_case_insensitive_and_rejects_unknown_kinds() {
    let registry = SchemaRegistry::global();
    assert_eq!(
        registry.describe_name(" Rule ").unwrap().kind,
        ArtifactKind::Rule
    );

    let err = registry.describe_name("memo").unwrap_err();
    assert_eq!(err.name, "memo");
    assert!(err.to_string().contains("decision|rule|guide|project"));
}

#[test]
fn kinds_are_listed_in_canonical_order() {
    assert_eq!(SchemaRegistry::global().kinds(), ArtifactKind::ALL.to_vec());
}

#[test]
fn registry_is_shared_across_threads() {
    let handles: Vec<_> = (0..4)
        .map(|_| std::thread::spawn(|| SchemaRegistry::global() as *const SchemaRegistry as usize))
        .collect();
    let addresses: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(addresses.windows(2).all(|pair| pair[0] == pair[1]));
}
