//! Structured artifact queries.
//!
//! # Responsibility
//! - Answer conjunctive kind/tag/relation/text filters against an index.
//! - Apply deterministic ordering and an optional limit.
//!
//! # Invariants
//! - Queries never mutate store or index.
//! - Ties are broken by id ascending; equal inputs give equal outputs.
//! - Only indexed (non-quarantined) artifacts are returned.

use crate::index::artifact_index::ArtifactIndex;
use crate::index::tokenize::tokenize;
use crate::model::artifact::{normalize_tag, Artifact, ArtifactId, ArtifactKind};
use crate::store::artifact_store::{ArtifactStore, StoredArtifact};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Result ordering key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderBy {
    /// Store insertion order.
    #[default]
    Insertion,
    /// Id ascending.
    Id,
    /// Case-insensitive title ascending.
    Title,
    /// Most recently written first.
    Recency,
}

/// Conjunction of filters plus ordering and limit.
///
/// Serialized with camelCase names to match the agent-facing request shape.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryDescriptor {
    pub kind: Option<ArtifactKind>,
    /// Every tag must be present.
    pub tags: Vec<String>,
    /// Artifacts whose relations name this id.
    pub relates_to: Option<ArtifactId>,
    /// Every token of this text must appear in title or body.
    pub text: Option<String>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl QueryDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kind(mut self, kind: ArtifactKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn relating_to(mut self, target: impl Into<ArtifactId>) -> Self {
        self.relates_to = Some(target.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn ordered_by(mut self, order_by: OrderBy) -> Self {
        self.order_by = Some(order_by);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Runs `descriptor` against one consistent store/index pair.
///
/// Returns an empty list when nothing matches.
pub fn query(
    store: &ArtifactStore,
    index: &ArtifactIndex,
    descriptor: &QueryDescriptor,
) -> Vec<Arc<Artifact>> {
    if descriptor.limit == Some(0) {
        return Vec::new();
    }

    let mut candidates: Option<BTreeSet<ArtifactId>> = None;

    if let Some(kind) = descriptor.kind {
        narrow(&mut candidates, index.ids_by_kind(kind).into_iter().collect());
    }
    for tag in &descriptor.tags {
        // A blank tag can never match a normalized tag set.
        let ids = normalize_tag(tag)
            .map(|tag| index.ids_by_tag(&tag))
            .unwrap_or_default();
        narrow(&mut candidates, ids);
    }
    if let Some(target) = &descriptor.relates_to {
        narrow(&mut candidates, index.ids_relating_to(target.trim()));
    }
    if let Some(text) = &descriptor.text {
        for token in tokenize(text) {
            narrow(&mut candidates, index.ids_by_token(&token));
        }
    }

    let ids = candidates.unwrap_or_else(|| index.ids());
    let mut matches: Vec<&StoredArtifact> =
        ids.iter().filter_map(|id| store.entry(id)).collect();

    sort_matches(&mut matches, descriptor.order_by.unwrap_or_default());
    if let Some(limit) = descriptor.limit {
        matches.truncate(limit);
    }

    matches
        .into_iter()
        .map(|stored| Arc::clone(&stored.artifact))
        .collect()
}

fn narrow(candidates: &mut Option<BTreeSet<ArtifactId>>, ids: BTreeSet<ArtifactId>) {
    let next = match candidates.take() {
        Some(current) => current.intersection(&ids).cloned().collect(),
        None => ids,
    };
    *candidates = Some(next);
}

fn sort_matches(matches: &mut [&StoredArtifact], order_by: OrderBy) {
    match order_by {
        OrderBy::Insertion => matches.sort_by(|a, b| a.seq.cmp(&b.seq).then_with(|| by_id(a, b))),
        OrderBy::Id => matches.sort_by(|a, b| by_id(a, b)),
        OrderBy::Title => matches.sort_by_cached_key(|stored| {
            (stored.artifact.title.to_lowercase(), stored.artifact.id.clone())
        }),
        OrderBy::Recency => {
            matches.sort_by(|a, b| b.revision.cmp(&a.revision).then_with(|| by_id(a, b)))
        }
    }
}

fn by_id(a: &StoredArtifact, b: &StoredArtifact) -> Ordering {
    a.artifact.id.cmp(&b.artifact.id)
}

#[cfg(test)]
mod tests {
    use super::{query, OrderBy, QueryDescriptor};
    use crate::index::artifact_index::ArtifactIndex;
    use crate::model::artifact::{Artifact, ArtifactDetails, ArtifactKind};
    use crate::store::artifact_store::ArtifactStore;

    fn guide(id: &str, title: &str) -> Artifact {
        Artifact::new(id, title, ArtifactDetails::Guide { audience: None })
    }

    #[test]
    fn title_order_breaks_ties_by_id() {
        let mut store = ArtifactStore::new();
        store.insert(guide("b", "Same")).unwrap();
        store.insert(guide("a", "same")).unwrap();
        store.insert(guide("c", "Alpha")).unwrap();
        let index = ArtifactIndex::build(&store);

        let results = query(
            &store,
            &index,
            &QueryDescriptor::new().ordered_by(OrderBy::Title),
        );
        let ids: Vec<_> = results.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn title_order_folds_non_ascii_case() {
        let mut store = ArtifactStore::new();
        store.insert(guide("z", "Ärger")).unwrap();
        store.insert(guide("y", "ärger")).unwrap();
        store.insert(guide("x", "Zoll")).unwrap();
        let index = ArtifactIndex::build(&store);

        let results = query(
            &store,
            &index,
            &QueryDescriptor::new().ordered_by(OrderBy::Title),
        );
        let ids: Vec<_> = results.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "y", "z"]);
    }

    #[test]
    fn limit_zero_returns_nothing() {
        let mut store = ArtifactStore::new();
        store.insert(guide("a", "A")).unwrap();
        let index = ArtifactIndex::build(&store);
        assert!(query(&store, &index, &QueryDescriptor::new().with_limit(0)).is_empty());
    }

    #[test]
    fn descriptor_uses_camel_case_wire_names() {
        let descriptor: QueryDescriptor = serde_json::from_str(
            r#"{"kind":"Rule","relatesTo":"d1","orderBy":"recency","limit":3}"#,
        )
        .unwrap();
        assert_eq!(descriptor.kind, Some(ArtifactKind::Rule));
        assert_eq!(descriptor.relates_to.as_deref(), Some("d1"));
        assert_eq!(descriptor.order_by, Some(OrderBy::Recency));
        assert!(descriptor.tags.is_empty());
    }
}
