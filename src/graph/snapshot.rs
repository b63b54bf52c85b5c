//! Consistent whole-graph view consumed by batch passes

use super::edge::Link;
use super::node::{Entity, EntityId, Label};
use super::source::{DataSource, DataSourceId};
use crate::stitch::KeyKind;
use crate::storage::{GraphStore, LinkFilter, StorageResult};
use std::collections::BTreeMap;

/// A point-in-time copy of entities, links and sources.
///
/// Clustering and metrics read only from a snapshot, so their results never
/// reflect a half-written linking batch.
#[derive(Debug, Clone, Default)]
pub struct GraphSnapshot {
    pub entities: BTreeMap<EntityId, Entity>,
    pub links: Vec<Link>,
    pub sources: BTreeMap<DataSourceId, DataSource>,
}

impl GraphSnapshot {
    /// Read the full graph from a store
    pub fn load(store: &dyn GraphStore) -> StorageResult<Self> {
        let entities = store
            .load_entities()?
            .into_iter()
            .map(|e| (e.id, e))
            .collect();
        let links = store.links(&LinkFilter::new())?;
        let sources = store
            .list_sources()?
            .into_iter()
            .map(|s| (s.id.clone(), s))
            .collect();
        Ok(Self {
            entities,
            links,
            sources,
        })
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Entities carrying `scope` (all entities when `None`), ascending by id
    pub fn in_scope<'a>(&'a self, scope: Option<&'a Label>) -> impl Iterator<Item = &'a Entity> + 'a {
        self.entities
            .values()
            .filter(move |e| scope.map_or(true, |label| e.has_label(label)))
    }

    /// The data source an entity came from
    pub fn source_of(&self, id: EntityId) -> Option<&DataSource> {
        self.entity(id).and_then(|e| self.sources.get(&e.source))
    }

    /// Number of links per kind
    pub fn link_counts(&self) -> BTreeMap<KeyKind, usize> {
        let mut counts = BTreeMap::new();
        for link in &self.links {
            *counts.entry(link.kind).or_insert(0) += 1;
        }
        counts
    }
}
