//! Artifact document parser and canonical serializer.
//!
//! # Responsibility
//! - Turn one raw document into a typed, schema-valid `Artifact`.
//! - Emit the canonical document encoding for an artifact.
//! - Compute the content hash used for idempotent store inserts.
//!
//! # Invariants
//! - Parsing is a pure function of `(raw, source)`.
//! - Relations are checked for identifier syntax only, never existence.
//! - `parse(serialize(a), &a.source) == a` for every valid artifact.

use crate::model::artifact::{
    dedup_relation_list, is_valid_artifact_id, normalize_tags, Artifact, ArtifactDetails,
    ArtifactKind, DecisionStatus, RuleSeverity, SourceLocation,
};
use crate::parser::frontmatter::{join_document, split_document};
use crate::schema::registry::{
    FieldSpec, FieldType, SchemaRegistry, FIELD_AUDIENCE, FIELD_DATE, FIELD_ID, FIELD_KIND,
    FIELD_OWNER, FIELD_RELATIONS, FIELD_REPOSITORY, FIELD_SCOPE, FIELD_SEVERITY, FIELD_STATUS,
    FIELD_TAGS, FIELD_TITLE,
};
use serde_yaml::{Mapping, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

const RAW_DIGEST_CHARS: usize = 12;

pub type ParseResult<T> = Result<T, ParseError>;

/// Structured parse failure for one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Metadata block is missing, unterminated or not a key/value mapping.
    MalformedMetadata { reason: String },
    /// `kind` is outside the closed set.
    UnknownKind { name: String },
    /// Required field is absent, null or blank.
    MissingField { field: &'static str },
    /// Field value has the wrong type or is outside its allowed values.
    InvalidFieldType {
        field: &'static str,
        expected: String,
        actual: String,
    },
}

impl ParseError {
    /// Stable machine-readable code for logs and reports.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedMetadata { .. } => "malformed_metadata",
            Self::UnknownKind { .. } => "unknown_kind",
            Self::MissingField { .. } => "missing_field",
            Self::InvalidFieldType { .. } => "invalid_field_type",
        }
    }

    fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedMetadata {
            reason: reason.into(),
        }
    }

    fn invalid(field: &'static str, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::InvalidFieldType {
            field,
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedMetadata { reason } => write!(f, "malformed metadata: {reason}"),
            Self::UnknownKind { name } => write!(f, "unknown artifact kind `{name}`"),
            Self::MissingField { field } => write!(f, "missing required field `{field}`"),
            Self::InvalidFieldType {
                field,
                expected,
                actual,
            } => write!(f, "field `{field}` expected {expected}, got {actual}"),
        }
    }
}

impl Error for ParseError {}

/// Canonical encoding failure.
#[derive(Debug)]
pub struct SerializeError(serde_yaml::Error);

impl Display for SerializeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to encode artifact metadata: {}", self.0)
    }
}

impl Error for SerializeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.0)
    }
}

#[derive(Debug)]
enum FieldValue {
    Text(String),
    List(Vec<String>),
}

/// Parses one raw document into a validated artifact.
///
/// `source` is copied onto the artifact unchanged; when the metadata has no
/// explicit `id`, the id is derived from the source path's file stem.
///
/// # Errors
/// - `MalformedMetadata` when the block is missing or not a mapping.
/// - `UnknownKind` when `kind` is outside the closed set.
/// - `MissingField` / `InvalidFieldType` per the kind schema.
pub fn parse(raw: &str, source: &SourceLocation) -> ParseResult<Artifact> {
    let split = split_document(raw).ok_or_else(|| {
        ParseError::malformed("document must open and close its metadata block with `---`")
    })?;
    let metadata = parse_metadata_block(split.metadata)?;

    let kind_value = present(&metadata, FIELD_KIND).ok_or(ParseError::MissingField {
        field: FIELD_KIND,
    })?;
    let kind_name = kind_value
        .as_str()
        .ok_or_else(|| ParseError::invalid(FIELD_KIND, "string", value_type_name(kind_value)))?;
    let registry = SchemaRegistry::global();
    let kind = registry
        .resolve_kind(kind_name)
        .map_err(|err| ParseError::UnknownKind { name: err.name })?;
    let schema = registry.describe(kind);

    let mut values = HashMap::new();
    for spec in &schema.fields {
        if spec.name == FIELD_KIND {
            continue;
        }
        if let Some(value) = read_field(&metadata, spec)? {
            values.insert(spec.name, value);
        } else if spec.required {
            return Err(ParseError::MissingField { field: spec.name });
        }
    }

    let id = match take_text(&mut values, FIELD_ID) {
        Some(id) => id,
        None => derive_id(source)?,
    };
    let title = require_text(&mut values, FIELD_TITLE)?;
    let tags = normalize_tags(take_list(&mut values, FIELD_TAGS));
    let relations = dedup_relation_list(take_list(&mut values, FIELD_RELATIONS));
    let details = build_details(kind, &mut values)?;

    Ok(Artifact {
        id,
        title,
        tags,
        relations,
        body: split.body.to_string(),
        details,
        source: source.clone(),
    })
}

/// Encodes an artifact in the canonical document layout.
///
/// Keys follow schema order; empty optional fields are omitted.
pub fn serialize(artifact: &Artifact) -> Result<String, SerializeError> {
    let mut map = Mapping::new();
    insert_text(&mut map, FIELD_ID, &artifact.id);
    insert_text(&mut map, FIELD_KIND, artifact.kind().as_str());
    insert_text(&mut map, FIELD_TITLE, &artifact.title);
    if !artifact.tags.is_empty() {
        insert_list(&mut map, FIELD_TAGS, artifact.tags.iter());
    }
    if !artifact.relations.is_empty() {
        insert_list(&mut map, FIELD_RELATIONS, artifact.relations.iter());
    }

    match &artifact.details {
        ArtifactDetails::Decision { status, date } => {
            insert_text(&mut map, FIELD_STATUS, status.as_str());
            insert_optional(&mut map, FIELD_DATE, date.as_deref());
        }
        ArtifactDetails::Rule { severity, scope } => {
            insert_text(&mut map, FIELD_SEVERITY, severity.as_str());
            insert_optional(&mut map, FIELD_SCOPE, scope.as_deref());
        }
        ArtifactDetails::Guide { audience } => {
            insert_optional(&mut map, FIELD_AUDIENCE, audience.as_deref());
        }
        ArtifactDetails::Project { owner, repository } => {
            insert_text(&mut map, FIELD_OWNER, owner);
            insert_optional(&mut map, FIELD_REPOSITORY, repository.as_deref());
        }
    }

    let metadata = serde_yaml::to_string(&Value::Mapping(map)).map_err(SerializeError)?;
    Ok(join_document(&metadata, &artifact.body))
}

/// Returns the hex SHA-256 digest of an artifact's content.
///
/// Covers every field except `source`.
pub fn content_hash(artifact: &Artifact) -> String {
    let mut hasher = Sha256::new();
    hash_field(&mut hasher, FIELD_ID, &artifact.id);
    hash_field(&mut hasher, FIELD_KIND, artifact.kind().as_str());
    hash_field(&mut hasher, FIELD_TITLE, &artifact.title);
    for tag in &artifact.tags {
        hash_field(&mut hasher, FIELD_TAGS, tag);
    }
    for relation in &artifact.relations {
        hash_field(&mut hasher, FIELD_RELATIONS, relation);
    }
    match &artifact.details {
        ArtifactDetails::Decision { status, date } => {
            hash_field(&mut hasher, FIELD_STATUS, status.as_str());
            hash_optional(&mut hasher, FIELD_DATE, date.as_deref());
        }
        ArtifactDetails::Rule { severity, scope } => {
            hash_field(&mut hasher, FIELD_SEVERITY, severity.as_str());
            hash_optional(&mut hasher, FIELD_SCOPE, scope.as_deref());
        }
        ArtifactDetails::Guide { audience } => {
            hash_optional(&mut hasher, FIELD_AUDIENCE, audience.as_deref());
        }
        ArtifactDetails::Project { owner, repository } => {
            hash_field(&mut hasher, FIELD_OWNER, owner);
            hash_optional(&mut hasher, FIELD_REPOSITORY, repository.as_deref());
        }
    }
    hash_field(&mut hasher, "body", &artifact.body);
    hex::encode(hasher.finalize())
}

/// Best-effort read of the explicit `id` of a document that may not parse.
///
/// Returns `None` unless the metadata block is readable and `id` is a
/// syntactically valid identifier.
pub fn declared_id(raw: &str) -> Option<String> {
    let split = split_document(raw)?;
    let metadata = parse_metadata_block(split.metadata).ok()?;
    let id = present(&metadata, FIELD_ID)?.as_str()?.trim();
    is_valid_artifact_id(id).then(|| id.to_string())
}

/// Short hex digest of raw document text, for naming documents with no path.
pub fn raw_digest(raw: &str) -> String {
    let digest = hex::encode(Sha256::digest(raw.as_bytes()));
    digest[..RAW_DIGEST_CHARS].to_string()
}

fn parse_metadata_block(block: &str) -> ParseResult<Mapping> {
    if block.trim().is_empty() {
        return Ok(Mapping::new());
    }

    let value: Value = serde_yaml::from_str(block)
        .map_err(|err| ParseError::malformed(format!("invalid YAML: {err}")))?;
    let mapping = match value {
        Value::Mapping(mapping) => mapping,
        Value::Null => Mapping::new(),
        other => {
            return Err(ParseError::malformed(format!(
                "expected key/value mapping, got {}",
                value_type_name(&other)
            )))
        }
    };

    if let Some(key) = mapping.keys().find(|key| !key.is_string()) {
        return Err(ParseError::malformed(format!(
            "metadata keys must be strings, got {}",
            value_type_name(key)
        )));
    }

    Ok(mapping)
}

fn present<'a>(metadata: &'a Mapping, name: &str) -> Option<&'a Value> {
    metadata.get(name).filter(|value| !value.is_null())
}

fn read_field(metadata: &Mapping, spec: &FieldSpec) -> ParseResult<Option<FieldValue>> {
    let Some(value) = present(metadata, spec.name) else {
        return Ok(None);
    };
    let expected = spec.field_type.describe();

    match spec.field_type {
        FieldType::String | FieldType::Identifier | FieldType::Enum(_) => {
            let text = value
                .as_str()
                .ok_or_else(|| ParseError::invalid(spec.name, &expected, value_type_name(value)))?
                .trim();
            if text.is_empty() {
                return Ok(None);
            }
            let accepted = match spec.field_type {
                FieldType::Identifier => is_valid_artifact_id(text),
                FieldType::Enum(allowed) => allowed.contains(&text),
                _ => true,
            };
            if !accepted {
                return Err(ParseError::invalid(spec.name, expected, format!("\"{text}\"")));
            }
            Ok(Some(FieldValue::Text(text.to_string())))
        }
        FieldType::StringList | FieldType::IdentifierList => {
            let items = value
                .as_sequence()
                .ok_or_else(|| ParseError::invalid(spec.name, &expected, value_type_name(value)))?;
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                let text = item
                    .as_str()
                    .ok_or_else(|| {
                        ParseError::invalid(
                            spec.name,
                            &expected,
                            format!("list containing {}", value_type_name(item)),
                        )
                    })?
                    .trim();
                if text.is_empty() {
                    return Err(ParseError::invalid(spec.name, &expected, "empty string"));
                }
                if spec.field_type == FieldType::IdentifierList && !is_valid_artifact_id(text) {
                    return Err(ParseError::invalid(spec.name, &expected, format!("\"{text}\"")));
                }
                out.push(text.to_string());
            }
            Ok(Some(FieldValue::List(out)))
        }
    }
}

fn take_text(values: &mut HashMap<&'static str, FieldValue>, name: &'static str) -> Option<String> {
    match values.remove(name) {
        Some(FieldValue::Text(text)) => Some(text),
        _ => None,
    }
}

fn require_text(
    values: &mut HashMap<&'static str, FieldValue>,
    name: &'static str,
) -> ParseResult<String> {
    take_text(values, name).ok_or(ParseError::MissingField { field: name })
}

fn take_list(values: &mut HashMap<&'static str, FieldValue>, name: &'static str) -> Vec<String> {
    match values.remove(name) {
        Some(FieldValue::List(items)) => items,
        _ => Vec::new(),
    }
}

fn build_details(
    kind: ArtifactKind,
    values: &mut HashMap<&'static str, FieldValue>,
) -> ParseResult<ArtifactDetails> {
    let details = match kind {
        ArtifactKind::Decision => {
            let status = require_text(values, FIELD_STATUS)?;
            ArtifactDetails::Decision {
                status: DecisionStatus::parse(&status).ok_or_else(|| {
                    ParseError::invalid(FIELD_STATUS, "decision status", format!("\"{status}\""))
                })?,
                date: take_text(values, FIELD_DATE),
            }
        }
        ArtifactKind::Rule => {
            let severity = require_text(values, FIELD_SEVERITY)?;
            ArtifactDetails::Rule {
                severity: RuleSeverity::parse(&severity).ok_or_else(|| {
                    ParseError::invalid(FIELD_SEVERITY, "rule severity", format!("\"{severity}\""))
                })?,
                scope: take_text(values, FIELD_SCOPE),
            }
        }
        ArtifactKind::Guide => ArtifactDetails::Guide {
            audience: take_text(values, FIELD_AUDIENCE),
        },
        ArtifactKind::Project => ArtifactDetails::Project {
            owner: require_text(values, FIELD_OWNER)?,
            repository: take_text(values, FIELD_REPOSITORY),
        },
    };
    Ok(details)
}

fn derive_id(source: &SourceLocation) -> ParseResult<String> {
    let stem = source
        .path
        .as_deref()
        .and_then(|path| path.file_stem())
        .map(|stem| stem.to_string_lossy().into_owned())
        .ok_or(ParseError::MissingField { field: FIELD_ID })?;

    if !is_valid_artifact_id(&stem) {
        return Err(ParseError::invalid(
            FIELD_ID,
            FieldType::Identifier.describe(),
            format!("path stem \"{stem}\""),
        ));
    }
    Ok(stem)
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(number) if number.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Sequence(_) => "list",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

fn insert_text(map: &mut Mapping, key: &str, value: &str) {
    map.insert(Value::from(key), Value::from(value));
}

fn insert_optional(map: &mut Mapping, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        insert_text(map, key, value);
    }
}

fn insert_list<'a>(map: &mut Mapping, key: &str, items: impl Iterator<Item = &'a String>) {
    let sequence = items.map(|item| Value::from(item.as_str())).collect();
    map.insert(Value::from(key), Value::Sequence(sequence));
}

fn hash_field(hasher: &mut Sha256, name: &str, value: &str) {
    hasher.update(name.as_bytes());
    hasher.update([0u8]);
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

fn hash_optional(hasher: &mut Sha256, name: &str, value: Option<&str>) {
    if let Some(value) = value {
        hash_field(hasher, name, value);
    }
}

#[cfg(test)]
mod tests {
    use super::{content_hash, declared_id, parse, raw_digest, ParseError};
    use crate::model::artifact::SourceLocation;

    #[test]
    fn scalar_where_list_expected_is_type_mismatch() {
        let doc = "---\nid: g1\nkind: guide\ntitle: Testing\ntags: backend\n---\n";
        let err = parse(doc, &SourceLocation::detached()).unwrap_err();
        assert_eq!(
            err,
            ParseError::InvalidFieldType {
                field: "tags",
                expected: "list of strings".to_string(),
                actual: "string".to_string(),
            }
        );
    }

    #[test]
    fn hash_ignores_source_location() {
        let doc = "---\nid: g1\nkind: guide\ntitle: Testing\n---\nbody\n";
        let a = parse(doc, &SourceLocation::detached()).unwrap();
        let b = parse(doc, &SourceLocation::from_path("/docs/g1.md")).unwrap();
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn hash_changes_with_body() {
        let a = parse(
            "---\nid: g1\nkind: guide\ntitle: T\n---\none\n",
            &SourceLocation::detached(),
        )
        .unwrap();
        let b = parse(
            "---\nid: g1\nkind: guide\ntitle: T\n---\ntwo\n",
            &SourceLocation::detached(),
        )
        .unwrap();
        assert_ne!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn declared_id_survives_schema_failures() {
        assert_eq!(
            declared_id("---\nid: g1\nkind: guide\n---\n").as_deref(),
            Some("g1")
        );
        assert_eq!(declared_id("---\nid: has space\n---\n"), None);
        assert_eq!(declared_id("---\nid: [unclosed\n---\n"), None);
        assert_eq!(declared_id("no metadata"), None);
    }

    #[test]
    fn raw_digest_is_short_and_stable() {
        assert_eq!(raw_digest("abc").len(), 12);
        assert_eq!(raw_digest("abc"), raw_digest("abc"));
        assert_ne!(raw_digest("abc"), raw_digest("abd"));
    }
}
