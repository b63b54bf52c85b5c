//! The persistence seam between the curation engine and its database

use crate::graph::{DataSource, DataSourceId, Entity, EntityDraft, EntityId, Label, Link, LinkWrite};
use crate::stitch::{KeyKind, StitchKey};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use thiserror::Error;

/// Failures surfaced by a [`GraphStore`]
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Data source not found: {0}")]
    SourceNotFound(String),

    #[error("Corrupt row in {table}: {message}")]
    CorruptRow { table: &'static str, message: String },

    #[error("Store lock poisoned")]
    Poisoned,
}

/// Shorthand for store results
pub type StorageResult<T> = Result<T, StorageError>;

/// Filter criteria for listing entities
#[derive(Debug, Clone, Default)]
pub struct EntityFilter {
    /// Only entities carrying this label
    pub label: Option<Label>,
    /// Only entities from this data source
    pub source: Option<DataSourceId>,
    /// Cap on returned ids
    pub limit: Option<usize>,
}

impl EntityFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, label: Label) -> Self {
        self.label = Some(label);
        self
    }

    pub fn with_source(mut self, source: DataSourceId) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Filter criteria for listing links
#[derive(Debug, Clone, Default)]
pub struct LinkFilter {
    /// Only links of these kinds
    pub kinds: Option<BTreeSet<KeyKind>>,
    /// Only links touching this entity
    pub entity: Option<EntityId>,
}

impl LinkFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = KeyKind>) -> Self {
        self.kinds = Some(kinds.into_iter().collect());
        self
    }

    pub fn touching(mut self, entity: EntityId) -> Self {
        self.entity = Some(entity);
        self
    }
}

/// Result of a value-scoped link removal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkRemoval {
    /// Links deleted because the removed value was the last they carried
    pub deleted: usize,
    /// Links that lost the value but still carry another one
    pub trimmed: usize,
}

/// The graph store capability the curation engine consumes.
///
/// Implementations provide atomic single-row writes; no operation here spans
/// a whole ingestion batch. They must be thread-safe (Send + Sync).
pub trait GraphStore: Send + Sync {
    // === Data source operations ===

    /// Atomically find the source with `draft.id`, or create it from `draft`.
    ///
    /// Returns the stored source and whether this call created it.
    fn find_or_create_source(&self, draft: &DataSource) -> StorageResult<(DataSource, bool)>;

    /// Load a source by digest
    fn load_source(&self, id: &DataSourceId) -> StorageResult<Option<DataSource>>;

    /// Update a source's mutable fields (schema, instances, state, metadata)
    fn update_source(&self, source: &DataSource) -> StorageResult<()>;

    /// All registered sources, oldest first
    fn list_sources(&self) -> StorageResult<Vec<DataSource>>;

    // === Entity operations ===

    /// Find the entity for `(draft.source, draft.ordinal)` or create it.
    ///
    /// Returns the id and whether this call created it.
    fn find_or_create_entity(&self, draft: &EntityDraft) -> StorageResult<(EntityId, bool)>;

    /// Load an entity with its labels
    fn load_entity(&self, id: EntityId) -> StorageResult<Option<Entity>>;

    /// Entity ids matching the filter, ascending
    fn entity_ids(&self, filter: &EntityFilter) -> StorageResult<Vec<EntityId>>;

    /// Every entity with its labels, ascending by id
    fn load_entities(&self) -> StorageResult<Vec<Entity>>;

    // === Label operations ===

    /// Add a label; returns false if it was already present
    fn add_label(&self, id: EntityId, label: &Label) -> StorageResult<bool>;

    /// Remove a label; returns false if it was absent
    fn remove_label(&self, id: EntityId, label: &Label) -> StorageResult<bool>;

    /// Remove every clustering-owned label from the given entities
    fn clear_cluster_labels(&self, ids: &[EntityId]) -> StorageResult<usize>;

    /// Apply a batch of label additions
    fn add_labels(&self, labels: &[(EntityId, Label)]) -> StorageResult<()>;

    // === Key index operations ===

    /// Index an entity under a key; returns false if already indexed
    fn index_key(&self, id: EntityId, key: &StitchKey) -> StorageResult<bool>;

    /// Entities indexed under a key, ascending
    fn lookup_key(&self, key: &StitchKey) -> StorageResult<Vec<EntityId>>;

    /// Keys an entity is indexed under
    fn entity_keys(&self, id: EntityId) -> StorageResult<BTreeSet<StitchKey>>;

    /// For one kind, every value with the entities sharing it, optionally
    /// restricted to entities carrying `scope`
    fn key_sharers(
        &self,
        kind: KeyKind,
        scope: Option<&Label>,
    ) -> StorageResult<BTreeMap<String, Vec<EntityId>>>;

    /// Record a key value as too generic to link on; returns false if already recorded
    fn deprecate_key(&self, key: &StitchKey) -> StorageResult<bool>;

    fn is_deprecated(&self, key: &StitchKey) -> StorageResult<bool>;

    // === Link operations ===

    /// Create the (pair, kind) link or add `value` to it
    fn upsert_link(&self, link: &Link) -> StorageResult<LinkWrite>;

    /// Links matching the filter, ordered by (source, target, kind)
    fn links(&self, filter: &LinkFilter) -> StorageResult<Vec<Link>>;

    /// Drop `value` from every link of `kind`; links left with no value are deleted
    fn remove_link_value(&self, kind: KeyKind, value: &str) -> StorageResult<LinkRemoval>;

    /// Number of links per kind
    fn link_counts(&self) -> StorageResult<BTreeMap<KeyKind, usize>>;
}

/// Constructors for stores backed by a file or by memory
pub trait OpenStore: GraphStore + Sized {
    /// Open the database at `path`, creating the schema on first use
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// A private, non-persistent database
    fn open_in_memory() -> StorageResult<Self>;
}
