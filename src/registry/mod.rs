//! Content digest registry
//!
//! A data source is identified by the digest of its raw inputs. Registering
//! the same content twice yields one [`DataSource`]; the second caller gets
//! [`Registration::AlreadyRegistered`] instead of an error.

mod digest;

pub use digest::{digest_inputs, verify};

use crate::adapter::InputSet;
use crate::graph::{DataSource, DataSourceId, SourceState};
use crate::storage::{GraphStore, StorageError};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Default number of hex characters shown for a digest
pub const DIGEST_PREFIX_LEN: usize = 9;

/// Errors that abort a registration before any entity is created
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Required input is missing: {input}")]
    MissingInput { input: String },

    #[error("Cannot read {input}: {source}")]
    CorruptStream {
        input: String,
        #[source]
        source: io::Error,
    },

    #[error("Digest mismatch: expected {expected}, computed {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// What a caller wants registered
#[derive(Debug, Clone)]
pub struct SourceRequest<'a> {
    pub name: String,
    pub format: String,
    pub input: &'a InputSet,
    /// Inputs to digest, in the extractor's declared order
    pub inputs: Vec<String>,
    /// Digest the caller expects (full or prefix)
    pub expected_digest: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl<'a> SourceRequest<'a> {
    pub fn new(
        name: impl Into<String>,
        format: impl Into<String>,
        input: &'a InputSet,
        inputs: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            format: format.into(),
            input,
            inputs,
            expected_digest: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_expected_digest(mut self, digest: Option<String>) -> Self {
        self.expected_digest = digest;
        self
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Exclusive right to ingest one data source.
///
/// Held for the whole extraction; dropping it releases the digest so a
/// later caller can resume an unfinished source.
#[derive(Debug)]
pub struct Claim {
    source: DataSource,
    claims: Arc<DashMap<DataSourceId, ()>>,
}

impl Claim {
    pub fn source(&self) -> &DataSource {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut DataSource {
        &mut self.source
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.claims.remove(&self.source.id);
    }
}

/// Outcome of a registration attempt
#[derive(Debug)]
pub enum Registration {
    /// First registration of this content
    Created(Claim),
    /// Content registered earlier but never finished; ingestion should rerun
    Resumed(Claim),
    /// Content already ingested, or being ingested by another caller
    AlreadyRegistered(DataSource),
}

impl Registration {
    pub fn source(&self) -> &DataSource {
        match self {
            Registration::Created(claim) | Registration::Resumed(claim) => claim.source(),
            Registration::AlreadyRegistered(source) => source,
        }
    }

    pub fn is_already_registered(&self) -> bool {
        matches!(self, Registration::AlreadyRegistered(_))
    }

    pub fn into_claim(self) -> Option<Claim> {
        match self {
            Registration::Created(claim) | Registration::Resumed(claim) => Some(claim),
            Registration::AlreadyRegistered(_) => None,
        }
    }
}

/// Registers data sources by content digest.
///
/// Creation is serialized per digest: the claim map entry is held while the
/// store's find-or-create runs, so concurrent callers with the same content
/// see exactly one `Created`.
#[derive(Clone)]
pub struct SourceRegistry {
    store: Arc<dyn GraphStore>,
    claims: Arc<DashMap<DataSourceId, ()>>,
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("claims", &self.claims.len())
            .finish_non_exhaustive()
    }
}

impl SourceRegistry {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store,
            claims: Arc::new(DashMap::new()),
        }
    }

    /// Whether some caller currently holds a claim on `id`
    pub fn is_claimed(&self, id: &DataSourceId) -> bool {
        self.claims.contains_key(id)
    }

    pub fn register(&self, request: SourceRequest<'_>) -> RegistryResult<Registration> {
        let id = digest_inputs(request.input, &request.inputs)?;
        if let Some(expected) = request.expected_digest.as_deref() {
            verify(expected, &id)?;
        }
        let short = id.short(DIGEST_PREFIX_LEN).to_string();

        let vacant = match self.claims.entry(id.clone()) {
            Entry::Occupied(_) => {
                let existing = self
                    .store
                    .load_source(&id)?
                    .ok_or_else(|| StorageError::SourceNotFound(id.to_string()))?;
                warn!(digest = %short, name = %existing.name, "data source is being ingested by another caller");
                return Ok(Registration::AlreadyRegistered(existing));
            }
            Entry::Vacant(vacant) => vacant,
        };

        let mut draft = DataSource::new(id.clone(), &request.name, request.input.origin(), &request.format);
        draft.metadata = request.metadata;
        let (source, created) = self.store.find_or_create_source(&draft)?;

        if created {
            vacant.insert(());
            info!(digest = %short, name = %source.name, format = %source.format, "data source registered");
            return Ok(Registration::Created(self.claim(source)));
        }
        match source.state {
            SourceState::Complete => {
                warn!(
                    digest = %short,
                    name = %source.name,
                    instances = source.instances,
                    "data source has already been registered"
                );
                Ok(Registration::AlreadyRegistered(source))
            }
            SourceState::Pending => {
                vacant.insert(());
                info!(digest = %short, name = %source.name, "resuming unfinished data source");
                Ok(Registration::Resumed(self.claim(source)))
            }
        }
    }

    fn claim(&self, source: DataSource) -> Claim {
        Claim {
            source,
            claims: self.claims.clone(),
        }
    }
}
