//! Label deprecation: suppress key values too generic to discriminate

use crate::graph::{CurationGraph, CurationResult, Label};
use crate::stitch::{KeyKind, StitchKey};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// One deprecation pass over a key kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeprecationRequest {
    pub kind: KeyKind,
    /// Values shared by more than this many entities are deprecated
    pub threshold: usize,
    /// Only count sharers carrying this label (all entities when absent)
    #[serde(default)]
    pub scope: Option<Label>,
    #[serde(default)]
    pub dry_run: bool,
}

impl DeprecationRequest {
    pub fn new(kind: KeyKind, threshold: usize) -> Self {
        Self {
            kind,
            threshold,
            scope: None,
            dry_run: false,
        }
    }

    pub fn with_scope(mut self, scope: Option<Label>) -> Self {
        self.scope = scope;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// A value judged too generic, with how many entities shared it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeprecatedValue {
    pub value: String,
    pub sharers: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeprecationReport {
    pub kind: KeyKind,
    pub threshold: usize,
    pub scope: Option<String>,
    pub dry_run: bool,
    pub values: Vec<DeprecatedValue>,
    pub links_before: usize,
    pub links_after: usize,
    /// Links deleted because a deprecated value was all they carried
    pub links_removed: usize,
    /// Links that lost a deprecated value but still carry another
    pub links_trimmed: usize,
}

/// Deprecate every value of `request.kind` shared by more than
/// `request.threshold` entities in scope.
///
/// Outside dry-run the values are recorded in the deprecated-key registry,
/// so later linking skips them, and removed from existing links. The link
/// count for the kind never grows.
pub fn deprecate(graph: &CurationGraph, request: &DeprecationRequest) -> CurationResult<DeprecationReport> {
    let _exclusive = graph.exclusive()?;
    let store = graph.store();
    let kind = request.kind;

    let links_before = store.link_counts()?.get(&kind).copied().unwrap_or(0);
    let values: Vec<DeprecatedValue> = store
        .key_sharers(kind, request.scope.as_ref())?
        .into_iter()
        .filter(|(_, ids)| ids.len() > request.threshold)
        .map(|(value, ids)| DeprecatedValue {
            value,
            sharers: ids.len(),
        })
        .collect();

    let (mut removed, mut trimmed) = (0, 0);
    if !request.dry_run {
        for value in &values {
            store.deprecate_key(&StitchKey::normalized(kind, &value.value))?;
            let removal = store.remove_link_value(kind, &value.value)?;
            removed += removal.deleted;
            trimmed += removal.trimmed;
            debug!(kind = %kind, value = %value.value, sharers = value.sharers, "value deprecated");
        }
    }
    let links_after = store.link_counts()?.get(&kind).copied().unwrap_or(0);

    info!(
        kind = %kind,
        threshold = request.threshold,
        deprecated = values.len(),
        dry_run = request.dry_run,
        links_before,
        links_after,
        "deprecation pass complete"
    );
    Ok(DeprecationReport {
        kind,
        threshold: request.threshold,
        scope: request.scope.as_ref().map(Label::to_string),
        dry_run: request.dry_run,
        values,
        links_before,
        links_after,
        links_removed: removed,
        links_trimmed: trimmed,
    })
}
