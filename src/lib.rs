//! Stitcher: entity resolution and graph curation for chemical and drug data
//!
//! Raw data sources (tabular dumps, SD files, JSON registries) are registered
//! by content digest, extracted into records, and turned into entities. Each
//! entity carries typed stitch keys; entities sharing a key value are linked,
//! and clustering groups linked entities into supernodes.
//!
//! # Core Concepts
//!
//! - **DataSource**: provenance of one ingested batch, identified by digest
//! - **Entity**: a curated node created from one record
//! - **Stitch key**: a typed identity value (CAS number, name, structure hash)
//! - **Cluster**: the entities judged equivalent over chosen key kinds
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use stitcher::{CurationGraph, CurationPipeline, CuratorConfig};
//!
//! let graph = Arc::new(CurationGraph::in_memory().unwrap());
//! let pipeline = CurationPipeline::new(graph, CuratorConfig::default());
//! // Pipeline is ready to ingest
//! # let _ = pipeline;
//! ```

pub mod adapter;
pub mod config;
pub mod curation;
mod graph;
pub mod job;
pub mod pipeline;
pub mod registry;
pub mod stitch;
pub mod storage;
pub mod upload;

pub use adapter::{CancellationToken, ExtractError, ExtractorRegistry, InputSet, RecordExtractor};
pub use config::{ConfigError, CuratorConfig};
pub use curation::{
    cluster, compute_metrics, compute_partition, curate, deprecate, export_node_labels, CurationMetrics,
    CurationOutcome, CurationPlan, ClusterOptions, DeprecationRequest, LinkTopology, Partition,
    SourcePriority,
};
pub use graph::{
    CurationError, CurationGraph, CurationResult, DataSource, DataSourceId, Entity, EntityDraft,
    EntityId, EntityKind, GraphSnapshot, Label, Link, LinkWrite, Properties, PropertyValue,
    SourceState,
};
pub use job::{JobError, JobKey, JobScheduler, JobStatus};
pub use pipeline::{CurationPipeline, IngestOutcome, IngestReport, IngestRequest};
pub use registry::{Registration, RegistryError, SourceRegistry};
pub use stitch::{KeyKind, KeyPolicy, StitchKey};
pub use storage::{GraphStore, OpenStore, SqliteStore, StorageError, StorageResult};
pub use upload::{upload, UploadError, UploadRequest};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
