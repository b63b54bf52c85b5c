//! Key-based linking: connect an entity to every entity sharing one of its keys

use crate::graph::{CurationError, CurationGraph, CurationResult, EntityId, Link, LinkWrite};
use crate::stitch::{KeyKind, StitchKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, trace};

/// Which existing sharers a new entity links to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkTopology {
    /// Every entity already carrying the key (star centred on the new entity)
    #[default]
    Star,
    /// Only the lowest-id entity carrying the key
    Anchor,
}

/// Counters for one or more `link` calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    pub keys_indexed: usize,
    pub links_created: usize,
    pub links_extended: usize,
    /// Keys not linked on because they were deprecated
    pub deprecated_skipped: usize,
}

impl LinkStats {
    pub fn absorb(&mut self, other: LinkStats) {
        self.keys_indexed += other.keys_indexed;
        self.links_created += other.links_created;
        self.links_extended += other.links_extended;
        self.deprecated_skipped += other.deprecated_skipped;
    }
}

/// Links entities through the graph's persistent key index
#[derive(Debug)]
pub struct Linker<'g> {
    graph: &'g CurationGraph,
    topology: LinkTopology,
}

impl<'g> Linker<'g> {
    pub fn new(graph: &'g CurationGraph, topology: LinkTopology) -> Self {
        Self { graph, topology }
    }

    /// Link `entity` to every entity that already carries one of `keys`,
    /// then index it under those keys.
    ///
    /// Idempotent: relinking with the same keys creates no new links.
    /// Predicate keys link to carriers of their target identifier, and an
    /// identifier key links back to entities whose predicates point at it.
    pub fn link(&self, entity: EntityId, keys: &BTreeSet<StitchKey>) -> CurationResult<LinkStats> {
        let _batch = self.graph.batch()?;
        let locks = self.kind_locks(keys);
        let _guards = locks
            .iter()
            .map(|l| l.lock())
            .collect::<Result<Vec<MutexGuard<'_, ()>>, _>>()
            .map_err(|_| CurationError::Poisoned)?;

        let store = self.graph.store();
        let mut stats = LinkStats::default();
        for key in keys {
            if key.kind.is_linkable() {
                for (link_kind, lookup) in self.lookups(key) {
                    if store.is_deprecated(&StitchKey::normalized(link_kind, &key.value))? {
                        stats.deprecated_skipped += 1;
                        trace!(entity = %entity, key = %key, "deprecated key not linked");
                        continue;
                    }
                    let found = store.lookup_key(&lookup)?;
                    for other in self.targets(entity, &found) {
                        let Some(link) = Link::new(entity, other, link_kind, key.value.clone()) else {
                            continue;
                        };
                        match store.upsert_link(&link)? {
                            LinkWrite::Created => stats.links_created += 1,
                            LinkWrite::Extended => stats.links_extended += 1,
                            LinkWrite::Unchanged => {}
                        }
                    }
                }
            }
            if store.index_key(entity, key)? {
                stats.keys_indexed += 1;
            }
        }

        debug!(
            entity = %entity,
            keys = keys.len(),
            created = stats.links_created,
            extended = stats.links_extended,
            "entity linked"
        );
        Ok(stats)
    }

    /// Locks for every kind whose index this call reads or writes, in kind order
    fn kind_locks(&self, keys: &BTreeSet<StitchKey>) -> Vec<Arc<Mutex<()>>> {
        let mut kinds = BTreeSet::new();
        for key in keys {
            kinds.insert(key.kind);
            kinds.extend(key.kind.predicate_target());
            kinds.extend(key.kind.predicate_sources());
        }
        kinds.into_iter().map(|k| self.graph.kind_lock(k)).collect()
    }

    /// (link kind, index key to look up) pairs for one key
    fn lookups(&self, key: &StitchKey) -> Vec<(KeyKind, StitchKey)> {
        let mut lookups = Vec::new();
        match key.kind.predicate_target() {
            Some(target) => {
                lookups.push((key.kind, StitchKey::normalized(target, &key.value)));
            }
            None => {
                lookups.push((key.kind, key.clone()));
                for predicate in key.kind.predicate_sources() {
                    lookups.push((predicate, StitchKey::normalized(predicate, &key.value)));
                }
            }
        }
        lookups
    }

    /// Entities to link to, given the sharers found (ascending by id)
    fn targets(&self, entity: EntityId, found: &[EntityId]) -> Vec<EntityId> {
        let others = found.iter().copied().filter(|id| *id != entity);
        match self.topology {
            LinkTopology::Star => others.collect(),
            LinkTopology::Anchor => others.min().into_iter().collect(),
        }
    }
}
