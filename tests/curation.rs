//! Deprecation, metrics and the end-to-end curation pass.

mod common;

use common::{ingest_sdf, pipeline, sdf_block};
use std::collections::BTreeMap;
use std::fs;
use stitcher::{
    compute_metrics, curate, deprecate, ClusterOptions, CurationPlan, CuratorConfig,
    DeprecationRequest, EntityId, KeyKind, Label,
};

/// Five entities named WATER, two sharing a real name, one loner
fn placeholder_names() -> Vec<String> {
    let mut blocks: Vec<String> = (0..5)
        .map(|i| {
            let cas = format!("{}-00-0", i);
            sdf_block(&format!("w{}", i), &[("NAME", "Water"), ("CAS", cas.as_str())])
        })
        .collect();
    blocks.push(sdf_block("a", &[("NAME", "Aspirin")]));
    blocks.push(sdf_block("b", &[("NAME", "aspirin")]));
    blocks.push(sdf_block("c", &[("NAME", "Caffeine")]));
    blocks
}

#[test]
fn deprecation_never_adds_links() {
    let pipeline = pipeline();
    ingest_sdf(&pipeline, "npc", &placeholder_names());
    let graph = pipeline.graph();

    for threshold in [10, 4, 1] {
        let before = graph.snapshot().unwrap().link_counts();
        let report = deprecate(graph, &DeprecationRequest::new(KeyKind::Name, threshold)).unwrap();
        let after = graph.snapshot().unwrap().link_counts();
        let count = |m: &BTreeMap<KeyKind, usize>| m.get(&KeyKind::Name).copied().unwrap_or(0);
        assert!(count(&after) <= count(&before), "threshold {}", threshold);
        assert_eq!(report.links_before, count(&before));
        assert_eq!(report.links_after, count(&after));
    }
}

#[test]
fn generic_name_is_deprecated_and_stays_deprecated() {
    let pipeline = pipeline();
    ingest_sdf(&pipeline, "npc", &placeholder_names());
    let graph = pipeline.graph();
    // WATER star over five entities, plus one ASPIRIN link
    assert_eq!(graph.snapshot().unwrap().link_counts()[&KeyKind::Name], 11);

    let dry = deprecate(graph, &DeprecationRequest::new(KeyKind::Name, 2).dry_run(true)).unwrap();
    assert_eq!(dry.values.len(), 1);
    assert_eq!(dry.values[0].value, "WATER");
    assert_eq!(dry.values[0].sharers, 5);
    assert_eq!(graph.snapshot().unwrap().link_counts()[&KeyKind::Name], 11);

    let report = deprecate(graph, &DeprecationRequest::new(KeyKind::Name, 2)).unwrap();
    assert_eq!(report.links_removed, 10);
    assert_eq!(graph.snapshot().unwrap().link_counts()[&KeyKind::Name], 1);

    // a later source carrying the deprecated value is not linked on it
    let late = ingest_sdf(&pipeline, "late", &[sdf_block("w", &[("NAME", "WATER")])]);
    assert_eq!(late.links.links_created, 0);
    assert!(late.links.deprecated_skipped > 0);
    assert_eq!(graph.snapshot().unwrap().link_counts()[&KeyKind::Name], 1);
}

#[test]
fn histogram_accounts_for_every_non_denylisted_entity() {
    let pipeline = pipeline();
    ingest_sdf(&pipeline, "npc", &placeholder_names());
    let graph = pipeline.graph();
    graph.denylist(EntityId::new(8)).unwrap();
    stitcher::cluster(graph, &ClusterOptions::new([KeyKind::Name])).unwrap();

    let metrics = compute_metrics(&graph.snapshot().unwrap());
    let total: usize = metrics.size_histogram.iter().map(|(size, n)| size * n).sum();
    assert_eq!(metrics.entity_count, 8);
    assert_eq!(metrics.denylisted, 1);
    assert_eq!(total, metrics.partition_total());
    assert_eq!(metrics.cluster_count, 2);
    assert_eq!(metrics.largest_cluster, 5);
    assert_eq!(metrics.sources.len(), 1);
    assert_eq!(metrics.sources[0].instances, 8);
}

#[test]
fn empty_graph_metrics_are_well_defined() {
    let pipeline = pipeline();
    let metrics = compute_metrics(&pipeline.graph().snapshot().unwrap());
    assert_eq!(metrics.entity_count, 0);
    assert_eq!(metrics.cluster_count, 0);
    assert_eq!(metrics.singleton_ratio, 0.0);
    assert!(metrics.top_clusters.is_empty());
}

#[test]
fn curation_pass_deprecates_before_clustering_and_exports() {
    let mut config = CuratorConfig::default();
    config.deprecation.scope = Some("ginas".into());
    let pipeline = common::pipeline_with(config.clone());
    ingest_sdf(&pipeline, "ginas", &placeholder_names());
    let graph = pipeline.graph();

    let dir = tempfile::tempdir().unwrap();
    let export = dir.path().join("NodesAndLabels.txt");
    let plan = CurationPlan {
        deprecations: config.deprecation.requests(),
        cluster: config.cluster_options(),
        export: Some(export.clone()),
    };
    let outcome = curate(graph, &plan).unwrap();

    // without deprecation WATER would have merged five entities
    assert_eq!(outcome.before.cluster_count, 0);
    assert_eq!(outcome.deprecations.len(), 3);
    let name = outcome
        .deprecations
        .iter()
        .find(|d| d.kind == KeyKind::Name)
        .unwrap();
    assert_eq!(name.values.len(), 1);
    assert_eq!(outcome.after.largest_cluster, 2);
    assert_eq!(outcome.after.cluster_count, 1);
    assert_eq!(outcome.partition_size, 7);
    assert_eq!(outcome.exported, Some(8));

    let text = fs::read_to_string(&export).unwrap();
    assert_eq!(text.lines().count(), 8);
    let aspirin = text.lines().find(|l| l.starts_with("6\t")).unwrap();
    assert!(aspirin.contains("SUPERNODE"));
    assert!(aspirin.contains(&Label::Component(EntityId::new(6)).to_string()));
}

#[test]
fn unscoped_configuration_skips_deprecation() {
    let config = CuratorConfig::default();
    let pipeline = common::pipeline_with(config.clone());
    ingest_sdf(&pipeline, "npc", &placeholder_names());

    let plan = CurationPlan {
        deprecations: config.deprecation.requests(),
        cluster: config.cluster_options(),
        export: None,
    };
    let outcome = curate(pipeline.graph(), &plan).unwrap();
    assert!(outcome.deprecations.is_empty());
    assert_eq!(outcome.after.largest_cluster, 5);
    assert_eq!(outcome.exported, None);
}
