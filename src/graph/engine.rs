//! CurationGraph: the shared handle every curation stage works through

use super::node::{Entity, EntityId, Label};
use super::snapshot::GraphSnapshot;
use super::source::{DataSource, DataSourceId};
use crate::adapter::ExtractError;
use crate::registry::{RegistryError, SourceRegistry};
use crate::stitch::KeyKind;
use crate::storage::{GraphStore, OpenStore, SqliteStore, StorageError};
use dashmap::DashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

/// Errors that can occur in curation operations
#[derive(Debug, Error)]
pub enum CurationError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    #[error("Data source not found: {0}")]
    SourceNotFound(String),

    #[error("No extractor registered for format '{0}'")]
    UnknownFormat(String),

    #[error("Invalid key policy: {0}")]
    InvalidPolicy(String),

    #[error("Graph lock poisoned")]
    Poisoned,
}

/// Result type for curation operations
pub type CurationResult<T> = Result<T, CurationError>;

/// One curation graph: the store plus the locks that order access to it.
///
/// The key index inside the store is the only structure ingestion writers
/// share; writers serialize on it per key kind through [`kind_lock`].
/// Linking batches hold the batch gate in shared mode, while clustering,
/// deprecation and metrics take it exclusively so they see a consistent graph.
///
/// Graphs are values, not process globals: several independent graphs can
/// live in one process.
///
/// [`kind_lock`]: CurationGraph::kind_lock
pub struct CurationGraph {
    store: Arc<dyn GraphStore>,
    registry: SourceRegistry,
    kind_locks: DashMap<KeyKind, Arc<Mutex<()>>>,
    gate: RwLock<()>,
}

impl std::fmt::Debug for CurationGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurationGraph")
            .field("kind_locks", &self.kind_locks.len())
            .finish_non_exhaustive()
    }
}

impl CurationGraph {
    /// Create a graph over an existing store
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            registry: SourceRegistry::new(store.clone()),
            store,
            kind_locks: DashMap::new(),
            gate: RwLock::new(()),
        }
    }

    /// A graph backed by a fresh in-memory SQLite store
    pub fn in_memory() -> CurationResult<Self> {
        Ok(Self::new(Arc::new(SqliteStore::open_in_memory()?)))
    }

    pub fn store(&self) -> &dyn GraphStore {
        self.store.as_ref()
    }

    /// Digest registry shared by every ingestion into this graph
    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Exclusive-access lock for one key kind's slice of the key index
    pub fn kind_lock(&self, kind: KeyKind) -> Arc<Mutex<()>> {
        self.kind_locks
            .entry(kind)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Enter a linking batch (shared with other linking batches)
    pub fn batch(&self) -> CurationResult<RwLockReadGuard<'_, ()>> {
        self.gate.read().map_err(|_| CurationError::Poisoned)
    }

    /// Enter a whole-graph pass (excludes linking batches)
    pub fn exclusive(&self) -> CurationResult<RwLockWriteGuard<'_, ()>> {
        self.gate.write().map_err(|_| CurationError::Poisoned)
    }

    /// Take a consistent snapshot of the whole graph
    pub fn snapshot(&self) -> CurationResult<GraphSnapshot> {
        let _guard = self.exclusive()?;
        Ok(GraphSnapshot::load(self.store())?)
    }

    pub fn entity(&self, id: EntityId) -> CurationResult<Entity> {
        self.store
            .load_entity(id)?
            .ok_or(CurationError::EntityNotFound(id))
    }

    pub fn source(&self, id: &DataSourceId) -> CurationResult<DataSource> {
        self.store
            .load_source(id)?
            .ok_or_else(|| CurationError::SourceNotFound(id.to_string()))
    }

    pub fn sources(&self) -> CurationResult<Vec<DataSource>> {
        Ok(self.store.list_sources()?)
    }

    /// Resolve a source by name or digest prefix
    pub fn find_source(&self, name_or_digest: &str) -> CurationResult<DataSource> {
        self.sources()?
            .into_iter()
            .find(|s| s.name == name_or_digest || s.id.matches_prefix(name_or_digest))
            .ok_or_else(|| CurationError::SourceNotFound(name_or_digest.to_string()))
    }

    /// Exclude an entity from clustering; returns false if it already was
    pub fn denylist(&self, id: EntityId) -> CurationResult<bool> {
        self.entity(id)?;
        Ok(self.store.add_label(id, &Label::Denylist)?)
    }

    /// Re-admit a denylisted entity; returns false if it was not denylisted
    pub fn allow(&self, id: EntityId) -> CurationResult<bool> {
        self.entity(id)?;
        Ok(self.store.remove_label(id, &Label::Denylist)?)
    }
}
