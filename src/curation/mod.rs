//! Curation stages that run over the linked graph
//!
//! Linking happens per entity during ingestion. Deprecation, clustering,
//! metrics and export are whole-graph passes that take the graph's exclusive
//! gate, so they never observe a half-written linking batch.

mod batch;
mod cluster;
mod deprecate;
mod export;
mod linker;
mod metrics;
mod tiebreak;

pub use batch::{curate, CurationOutcome, CurationPlan};
pub use cluster::{cluster, compute_partition, Cluster, ClusterOptions, Partition};
pub use deprecate::{deprecate, DeprecatedValue, DeprecationReport, DeprecationRequest};
pub use export::{export_node_labels, write_node_labels};
pub use linker::{LinkStats, LinkTopology, Linker};
pub use metrics::{compute_metrics, ClusterSummary, CurationMetrics, SourceStats};
pub use tiebreak::SourcePriority;
