//! End-to-end curation pass: metrics, deprecation, clustering, export

use super::cluster::{cluster, ClusterOptions, Partition};
use super::deprecate::{deprecate, DeprecationReport, DeprecationRequest};
use super::export::export_node_labels;
use super::metrics::{compute_metrics, CurationMetrics};
use crate::graph::{CurationGraph, CurationResult};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

/// Giant-cluster ratio above which the pass warns about over-merging
const OVER_MERGE_WARNING: f64 = 0.5;

/// What one curation pass does, in order
#[derive(Debug, Clone, Default)]
pub struct CurationPlan {
    pub deprecations: Vec<DeprecationRequest>,
    pub cluster: ClusterOptions,
    /// Where to write the node/label report, if anywhere
    pub export: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CurationOutcome {
    pub before: CurationMetrics,
    pub deprecations: Vec<DeprecationReport>,
    pub partition_size: usize,
    pub after: CurationMetrics,
    pub exported: Option<usize>,
    #[serde(skip)]
    pub partition: Partition,
}

/// Run a plan against the graph.
///
/// Every deprecation completes before clustering reads the links.
pub fn curate(graph: &CurationGraph, plan: &CurationPlan) -> CurationResult<CurationOutcome> {
    let before = compute_metrics(&graph.snapshot()?);

    let mut deprecations = Vec::with_capacity(plan.deprecations.len());
    for request in &plan.deprecations {
        deprecations.push(deprecate(graph, request)?);
    }

    let partition = cluster(graph, &plan.cluster)?;
    let after = compute_metrics(&graph.snapshot()?);
    if after.giant_cluster_ratio > OVER_MERGE_WARNING {
        warn!(
            ratio = after.giant_cluster_ratio,
            largest = after.largest_cluster,
            "one cluster holds most entities; deprecation thresholds may be too loose"
        );
    }

    let exported = match &plan.export {
        Some(path) => Some(export_node_labels(graph, path)?),
        None => None,
    };

    info!(
        clusters = after.cluster_count,
        singletons = after.singleton_count,
        deprecated = deprecations.iter().map(|d| d.values.len()).sum::<usize>(),
        "curation pass complete"
    );
    Ok(CurationOutcome {
        before,
        deprecations,
        partition_size: partition.len(),
        after,
        exported,
        partition,
    })
}
