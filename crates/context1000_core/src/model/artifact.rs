//! Artifact domain model.
//!
//! # Responsibility
//! - Define the canonical record for decision/rule/guide/project artifacts.
//! - Carry kind-specific metadata as one variant per kind.
//!
//! # Invariants
//! - `id` is stable and unique within one store.
//! - `tags` are normalized (trimmed, lowercase, deduplicated).
//! - `relations` hold ids only; they never own or embed other artifacts.
//! - `source` is diagnostic metadata and never part of content identity.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// Stable identifier for every artifact.
///
/// Kept as a type alias to make semantic intent explicit in signatures.
pub type ArtifactId = String;

const KIND_LABELS: &[&str] = &["Decision", "Rule", "Guide", "Project"];

/// Closed set of artifact kinds.
///
/// On the wire a kind is its label (`"Rule"`); any casing is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArtifactKind {
    /// Architectural decision record.
    Decision,
    /// Enforceable engineering rule.
    Rule,
    /// How-to or explanatory guide.
    Guide,
    /// Project descriptor.
    Project,
}

impl ArtifactKind {
    /// All kinds in canonical order.
    pub const ALL: [ArtifactKind; 4] = [Self::Decision, Self::Rule, Self::Guide, Self::Project];

    /// Stable lowercase name used in documents and persisted rows.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Decision => "decision",
            Self::Rule => "rule",
            Self::Guide => "guide",
            Self::Project => "project",
        }
    }

    /// Display label used by the query and summary wire shapes.
    pub fn label(self) -> &'static str {
        match self {
            Self::Decision => "Decision",
            Self::Rule => "Rule",
            Self::Guide => "Guide",
            Self::Project => "Project",
        }
    }

    /// Parses a kind name case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "decision" => Some(Self::Decision),
            "rule" => Some(Self::Rule),
            "guide" => Some(Self::Guide),
            "project" => Some(Self::Project),
            _ => None,
        }
    }
}

impl Serialize for ArtifactKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for ArtifactKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Self::parse(&name).ok_or_else(|| D::Error::unknown_variant(&name, KIND_LABELS))
    }
}

impl Display for ArtifactKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Proposed,
    Accepted,
    Superseded,
}

impl DecisionStatus {
    pub const VALUES: &'static [&'static str] = &["proposed", "accepted", "superseded"];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Accepted => "accepted",
            Self::Superseded => "superseded",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "proposed" => Some(Self::Proposed),
            "accepted" => Some(Self::Accepted),
            "superseded" => Some(Self::Superseded),
            _ => None,
        }
    }
}

/// How strictly a rule is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSeverity {
    Info,
    Warning,
    Error,
}

impl RuleSeverity {
    pub const VALUES: &'static [&'static str] = &["info", "warning", "error"];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "info" => Some(Self::Info),
            "warning" => Some(Self::Warning),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Kind-specific metadata, one variant per artifact kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ArtifactDetails {
    #[serde(alias = "decision")]
    Decision {
        status: DecisionStatus,
        date: Option<String>,
    },
    #[serde(alias = "rule")]
    Rule {
        severity: RuleSeverity,
        scope: Option<String>,
    },
    #[serde(alias = "guide")]
    Guide {
        audience: Option<String>,
    },
    #[serde(alias = "project")]
    Project {
        owner: String,
        repository: Option<String>,
    },
}

impl ArtifactDetails {
    /// Returns the kind this variant belongs to.
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Self::Decision { .. } => ArtifactKind::Decision,
            Self::Rule { .. } => ArtifactKind::Rule,
            Self::Guide { .. } => ArtifactKind::Guide,
            Self::Project { .. } => ArtifactKind::Project,
        }
    }
}

/// Back-reference to the document an artifact was parsed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Originating file, when the document came from the filesystem.
    pub path: Option<PathBuf>,
    /// 1-based line where the document starts in that file.
    pub line: usize,
}

impl Default for SourceLocation {
    fn default() -> Self {
        Self::detached()
    }
}

impl SourceLocation {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            line: 1,
        }
    }

    /// Source for in-memory documents with no backing file.
    pub fn detached() -> Self {
        Self { path: None, line: 1 }
    }

    /// Stable key used to track a document across re-parses.
    pub fn key(&self) -> Option<String> {
        self.path
            .as_ref()
            .map(|path| path.to_string_lossy().replace('\\', "/"))
    }
}

impl Display for SourceLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{}:{}", path.display(), self.line),
            None => write!(f, "<memory>:{}", self.line),
        }
    }
}

/// Canonical record for one architectural artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub title: String,
    pub tags: BTreeSet<String>,
    /// Ordered, deduplicated ids of related artifacts.
    pub relations: Vec<ArtifactId>,
    pub body: String,
    pub details: ArtifactDetails,
    pub source: SourceLocation,
}

impl Artifact {
    /// Creates an artifact with no tags, relations or body.
    ///
    /// Does not validate `id` syntax; parser and store paths do.
    pub fn new(id: impl Into<ArtifactId>, title: impl Into<String>, details: ArtifactDetails) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            tags: BTreeSet::new(),
            relations: Vec::new(),
            body: String::new(),
            details,
            source: SourceLocation::detached(),
        }
    }

    pub fn kind(&self) -> ArtifactKind {
        self.details.kind()
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tags = normalize_tags(tags);
        self
    }

    pub fn with_relations<I, S>(mut self, relations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ArtifactId>,
    {
        self.relations = dedup_relations(relations.into_iter().map(Into::into));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_source(mut self, source: SourceLocation) -> Self {
        self.source = source;
        self
    }
}

/// Agent-facing projection without the body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSummary {
    pub id: ArtifactId,
    pub kind: ArtifactKind,
    pub title: String,
    pub tags: Vec<String>,
    pub relations: Vec<ArtifactId>,
}

impl From<&Artifact> for ArtifactSummary {
    fn from(value: &Artifact) -> Self {
        Self {
            id: value.id.clone(),
            kind: value.kind(),
            title: value.title.clone(),
            tags: value.tags.iter().cloned().collect(),
            relations: value.relations.clone(),
        }
    }
}

/// Normalizes one tag; returns `None` for blank input.
pub fn normalize_tag(tag: &str) -> Option<String> {
    let trimmed = tag.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Normalizes and deduplicates a tag list, dropping blanks.
pub fn normalize_tags<I, S>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .filter_map(|tag| normalize_tag(tag.as_ref()))
        .collect()
}

/// Returns whether `value` is a syntactically valid artifact id.
pub fn is_valid_artifact_id(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

fn dedup_relations(relations: impl Iterator<Item = ArtifactId>) -> Vec<ArtifactId> {
    let mut seen = BTreeSet::new();
    relations
        .filter(|relation| seen.insert(relation.clone()))
        .collect()
}

pub(crate) fn dedup_relation_list(relations: Vec<ArtifactId>) -> Vec<ArtifactId> {
    dedup_relations(relations.into_iter())
}
