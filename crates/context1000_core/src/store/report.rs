//! Corpus health report types.

use crate::model::artifact::ArtifactId;
use serde::{Deserialize, Serialize};

/// One artifact or document excluded from queries, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QuarantineEntry {
    /// Artifact id, or the source key for documents that failed to parse.
    pub id: String,
    pub reason: String,
}

/// One unresolved relation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DanglingRelation {
    pub id: ArtifactId,
    pub missing_target: ArtifactId,
}

/// Diagnostics snapshot returned by `settle()` and the diagnostics API.
///
/// Both lists are sorted, so equal store states yield equal reports.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub quarantined: Vec<QuarantineEntry>,
    pub dangling_relations: Vec<DanglingRelation>,
}

impl ValidationReport {
    /// Returns whether the corpus has no quarantined or dangling entries.
    pub fn is_clean(&self) -> bool {
        self.quarantined.is_empty() && self.dangling_relations.is_empty()
    }
}
