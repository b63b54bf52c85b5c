//! Curation metrics: read-only aggregates over a graph snapshot

use crate::graph::{EntityId, GraphSnapshot, Label};
use crate::stitch::KeyKind;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// How many of the largest clusters the metrics list individually
pub const TOP_CLUSTERS: usize = 10;

/// Per data source counts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceStats {
    pub name: String,
    pub digest: String,
    pub instances: u64,
    pub entities: usize,
    /// Entities in multi-member clusters
    pub clustered: usize,
    pub singletons: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSummary {
    pub root: EntityId,
    pub size: usize,
    pub representative: Option<EntityId>,
    /// Distinct data sources among the members
    pub sources: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurationMetrics {
    pub entity_count: usize,
    pub denylisted: usize,
    /// Multi-member clusters
    pub cluster_count: usize,
    pub singleton_count: usize,
    pub largest_cluster: usize,
    /// Cluster size -> number of clusters of that size (singletons at 1)
    pub size_histogram: BTreeMap<usize, usize>,
    pub link_counts: BTreeMap<KeyKind, usize>,
    /// Singletons over clustered entities; 0 for an empty graph
    pub singleton_ratio: f64,
    /// Largest cluster over clustered entities; near 1 signals over-merging
    pub giant_cluster_ratio: f64,
    pub sources: Vec<SourceStats>,
    pub top_clusters: Vec<ClusterSummary>,
}

impl CurationMetrics {
    /// Entities the last clustering run partitions (everything not denylisted)
    pub fn partition_total(&self) -> usize {
        self.entity_count - self.denylisted
    }
}

/// Aggregate the cluster labels recorded by the last clustering run.
///
/// Non-denylisted entities without a `cc:` label count as singletons, so a
/// graph that was never clustered reports every entity as one.
pub fn compute_metrics(snapshot: &GraphSnapshot) -> CurationMetrics {
    let mut denylisted = 0;
    let mut members: BTreeMap<EntityId, Vec<EntityId>> = BTreeMap::new();
    let mut singletons: Vec<EntityId> = Vec::new();

    for entity in snapshot.entities.values() {
        if entity.is_denylisted() {
            denylisted += 1;
            continue;
        }
        let root = entity.labels.iter().find_map(|l| match l {
            Label::Component(root) => Some(*root),
            _ => None,
        });
        match root {
            Some(root) => members.entry(root).or_default().push(entity.id),
            None => singletons.push(entity.id),
        }
    }
    // a component whose other members were denylisted since clustering
    let (groups, lone): (BTreeMap<_, _>, BTreeMap<_, _>) =
        members.into_iter().partition(|(_, ids)| ids.len() > 1);
    singletons.extend(lone.into_values().flatten());

    let mut size_histogram = BTreeMap::new();
    if !singletons.is_empty() {
        size_histogram.insert(1, singletons.len());
    }
    for ids in groups.values() {
        *size_histogram.entry(ids.len()).or_insert(0) += 1;
    }

    let clustered = snapshot.entities.len() - denylisted;
    let largest_cluster = groups
        .values()
        .map(Vec::len)
        .max()
        .unwrap_or(if singletons.is_empty() { 0 } else { 1 });
    let ratio = |n: usize| if clustered == 0 { 0.0 } else { n as f64 / clustered as f64 };

    let mut top: Vec<ClusterSummary> = groups
        .iter()
        .map(|(root, ids)| ClusterSummary {
            root: *root,
            size: ids.len(),
            representative: ids
                .iter()
                .copied()
                .find(|id| snapshot.entity(*id).is_some_and(|e| e.has_label(&Label::Supernode))),
            sources: ids
                .iter()
                .filter_map(|id| snapshot.entity(*id).map(|e| &e.source))
                .collect::<BTreeSet<_>>()
                .len(),
        })
        .collect();
    top.sort_by(|a, b| b.size.cmp(&a.size).then(a.root.cmp(&b.root)));
    top.truncate(TOP_CLUSTERS);

    let grouped: BTreeSet<EntityId> = groups.values().flatten().copied().collect();
    let sources = snapshot
        .sources
        .values()
        .map(|source| {
            let entities: Vec<_> = snapshot
                .entities
                .values()
                .filter(|e| e.source == source.id && !e.is_denylisted())
                .collect();
            let in_groups = entities.iter().filter(|e| grouped.contains(&e.id)).count();
            SourceStats {
                name: source.name.clone(),
                digest: source.id.to_string(),
                instances: source.instances,
                entities: entities.len(),
                clustered: in_groups,
                singletons: entities.len() - in_groups,
            }
        })
        .collect();

    CurationMetrics {
        entity_count: snapshot.entities.len(),
        denylisted,
        cluster_count: groups.len(),
        singleton_count: singletons.len(),
        largest_cluster,
        size_histogram,
        link_counts: snapshot.link_counts(),
        singleton_ratio: ratio(singletons.len()),
        giant_cluster_ratio: ratio(largest_cluster),
        sources,
        top_clusters: top,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{DataSource, DataSourceId, Entity, EntityKind, Link};
    use chrono::Utc;

    fn entity(raw: i64, source: &DataSourceId, labels: &[Label]) -> Entity {
        Entity {
            id: EntityId::new(raw),
            kind: EntityKind::Structure,
            source: source.clone(),
            ordinal: raw as u64,
            source_key: None,
            properties: Default::default(),
            labels: labels.iter().cloned().collect(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn empty_graph_reports_zeroes() {
        let m = compute_metrics(&GraphSnapshot::default());
        assert_eq!(m.entity_count, 0);
        assert_eq!(m.cluster_count, 0);
        assert_eq!(m.largest_cluster, 0);
        assert!(m.size_histogram.is_empty());
        assert_eq!(m.singleton_ratio, 0.0);
        assert_eq!(m.giant_cluster_ratio, 0.0);
    }

    #[test]
    fn histogram_sums_to_partition_total() {
        let source = DataSource::new(DataSourceId::from_hex("aa"), "npc", "mem", "sdf");
        let id = source.id.clone();
        let cc = |r| Label::Component(EntityId::new(r));
        let mut snap = GraphSnapshot::default();
        for e in [
            entity(1, &id, &[Label::Group, cc(1), Label::Supernode]),
            entity(2, &id, &[Label::Group, cc(1)]),
            entity(3, &id, &[Label::Group, cc(1)]),
            entity(4, &id, &[Label::Singleton]),
            entity(5, &id, &[]),
            entity(6, &id, &[Label::Denylist]),
        ] {
            snap.entities.insert(e.id, e);
        }
        snap.links.push(Link::new(EntityId::new(1), EntityId::new(2), KeyKind::Name, "X").unwrap());
        snap.sources.insert(source.id.clone(), source);

        let m = compute_metrics(&snap);
        let total: usize = m.size_histogram.iter().map(|(size, n)| size * n).sum();
        assert_eq!(total, m.partition_total());
        assert_eq!(m.partition_total(), 5);
        assert_eq!(m.cluster_count, 1);
        assert_eq!(m.singleton_count, 2);
        assert_eq!(m.largest_cluster, 3);
        assert_eq!(m.link_counts[&KeyKind::Name], 1);
        assert_eq!(m.top_clusters[0].representative, Some(EntityId::new(1)));
        assert_eq!(m.sources[0].clustered, 3);
        assert_eq!(m.sources[0].singletons, 2);
    }

    #[test]
    fn one_giant_cluster_is_surfaced_not_corrected() {
        let source = DataSourceId::from_hex("aa");
        let mut snap = GraphSnapshot::default();
        for raw in 1..=4 {
            let e = entity(raw, &source, &[Label::Group, Label::Component(EntityId::new(1))]);
            snap.entities.insert(e.id, e);
        }
        let m = compute_metrics(&snap);
        assert_eq!(m.cluster_count, 1);
        assert_eq!(m.giant_cluster_ratio, 1.0);
        assert_eq!(m.singleton_ratio, 0.0);
    }
}
