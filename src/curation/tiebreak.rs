//! Source tie-break: prefer the cluster member from the most authoritative source

use crate::graph::{DataSource, EntityId, GraphSnapshot};
use serde::{Deserialize, Serialize};

/// Data sources in decreasing authority, named by source name or digest prefix
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourcePriority(Vec<String>);

impl SourcePriority {
    pub fn new<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(sources.into_iter().map(Into::into).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Position of `source` in the list (0 = most authoritative)
    pub fn rank(&self, source: &DataSource) -> Option<usize> {
        self.0
            .iter()
            .position(|p| *p == source.name || source.id.matches_prefix(p))
    }

    /// The member from the highest-ranked source present, lowest id first
    /// within that source. `None` when no member's source is listed.
    ///
    /// Only reads membership; never changes it.
    pub fn choose(&self, members: &[EntityId], snapshot: &GraphSnapshot) -> Option<EntityId> {
        members
            .iter()
            .filter_map(|id| {
                let source = snapshot.source_of(*id)?;
                self.rank(source).map(|rank| (rank, *id))
            })
            .min()
            .map(|(_, id)| id)
    }
}
