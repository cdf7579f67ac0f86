//! Process-wide artifact schema registry.
//!
//! # Responsibility
//! - Declare required/optional fields and their types for every kind.
//! - Resolve kind names given as strings.
//!
//! # Invariants
//! - The registry is built once and never mutated afterwards.
//! - Every kind schema lists the common fields first, in canonical order.

use crate::model::artifact::{ArtifactKind, DecisionStatus, RuleSeverity};
use once_cell::sync::Lazy;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const FIELD_ID: &str = "id";
pub const FIELD_KIND: &str = "kind";
pub const FIELD_TITLE: &str = "title";
pub const FIELD_TAGS: &str = "tags";
pub const FIELD_RELATIONS: &str = "relations";
pub const FIELD_STATUS: &str = "status";
pub const FIELD_DATE: &str = "date";
pub const FIELD_SEVERITY: &str = "severity";
pub const FIELD_SCOPE: &str = "scope";
pub const FIELD_AUDIENCE: &str = "audience";
pub const FIELD_OWNER: &str = "owner";
pub const FIELD_REPOSITORY: &str = "repository";

static REGISTRY: Lazy<SchemaRegistry> = Lazy::new(SchemaRegistry::build);

/// Value type accepted by one metadata field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Non-empty free-form string.
    String,
    /// String matching artifact id syntax.
    Identifier,
    /// Sequence of non-empty strings.
    StringList,
    /// Sequence of identifier strings.
    IdentifierList,
    /// String restricted to a closed set of values.
    Enum(&'static [&'static str]),
}

impl FieldType {
    /// Human-readable expectation used in parse diagnostics.
    pub fn describe(self) -> String {
        match self {
            Self::String => "string".to_string(),
            Self::Identifier => "identifier".to_string(),
            Self::StringList => "list of strings".to_string(),
            Self::IdentifierList => "list of identifiers".to_string(),
            Self::Enum(values) => format!("one of {}", values.join("|")),
        }
    }
}

/// Declaration of one metadata field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub field_type: FieldType,
    pub required: bool,
}

impl FieldSpec {
    const fn required(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            required: true,
        }
    }

    const fn optional(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            required: false,
        }
    }
}

const COMMON_FIELDS: [FieldSpec; 5] = [
    FieldSpec::optional(FIELD_ID, FieldType::Identifier),
    FieldSpec::required(FIELD_KIND, FieldType::String),
    FieldSpec::required(FIELD_TITLE, FieldType::String),
    FieldSpec::optional(FIELD_TAGS, FieldType::StringList),
    FieldSpec::optional(FIELD_RELATIONS, FieldType::IdentifierList),
];

/// Full field list for one kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindSchema {
    pub kind: ArtifactKind,
    pub fields: Vec<FieldSpec>,
}

impl KindSchema {
    fn new(kind: ArtifactKind, specific: &[FieldSpec]) -> Self {
        let mut fields = COMMON_FIELDS.to_vec();
        fields.extend_from_slice(specific);
        Self { kind, fields }
    }

    /// Looks up one field by name.
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|field| field.required)
    }

    pub fn optional_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|field| !field.required)
    }
}

/// Raised when a kind name is outside the closed set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownKindError {
    pub name: String,
}

impl Display for UnknownKindError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unknown artifact kind `{}`; expected decision|rule|guide|project",
            self.name
        )
    }
}

impl Error for UnknownKindError {}

/// Immutable registry of kind schemas.
#[derive(Debug)]
pub struct SchemaRegistry {
    schemas: [KindSchema; 4],
}

impl SchemaRegistry {
    /// Returns the process-wide registry.
    pub fn global() -> &'static SchemaRegistry {
        &REGISTRY
    }

    fn build() -> Self {
        Self {
            schemas: [
                KindSchema::new(
                    ArtifactKind::Decision,
                    &[
                        FieldSpec::required(FIELD_STATUS, FieldType::Enum(DecisionStatus::VALUES)),
                        FieldSpec::optional(FIELD_DATE, FieldType::String),
                    ],
                ),
                KindSchema::new(
                    ArtifactKind::Rule,
                    &[
                        FieldSpec::required(FIELD_SEVERITY, FieldType::Enum(RuleSeverity::VALUES)),
                        FieldSpec::optional(FIELD_SCOPE, FieldType::String),
                    ],
                ),
                KindSchema::new(
                    ArtifactKind::Guide,
                    &[FieldSpec::optional(FIELD_AUDIENCE, FieldType::String)],
                ),
                KindSchema::new(
                    ArtifactKind::Project,
                    &[
                        FieldSpec::required(FIELD_OWNER, FieldType::String),
                        FieldSpec::optional(FIELD_REPOSITORY, FieldType::String),
                    ],
                ),
            ],
        }
    }

    /// Returns the schema for a known kind.
    pub fn describe(&self, kind: ArtifactKind) -> &KindSchema {
        match kind {
            ArtifactKind::Decision => &self.schemas[0],
            ArtifactKind::Rule => &self.schemas[1],
            ArtifactKind::Guide => &self.schemas[2],
            ArtifactKind::Project => &self.schemas[3],
        }
    }

    /// Returns the schema for a kind given by name.
    ///
    /// # Errors
    /// - `UnknownKindError` when `name` is not one of the closed set.
    pub fn describe_name(&self, name: &str) -> Result<&KindSchema, UnknownKindError> {
        let kind = self.resolve_kind(name)?;
        Ok(self.describe(kind))
    }

    /// Resolves a kind name case-insensitively.
    pub fn resolve_kind(&self, name: &str) -> Result<ArtifactKind, UnknownKindError> {
        ArtifactKind::parse(name).ok_or_else(|| UnknownKindError {
            name: name.trim().to_string(),
        })
    }

    /// All registered kinds in canonical order.
    pub fn kinds(&self) -> Vec<ArtifactKind> {
        self.schemas.iter().map(|schema| schema.kind).collect()
    }
}
