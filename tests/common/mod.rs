//! Common test utilities for the stitcher integration tests
//!
//! Fixtures build small SD files and tabular dumps in memory, plus random
//! link graphs for property checks.

#![allow(dead_code)]

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use stitcher::{
    CurationGraph, CurationPipeline, CuratorConfig, DataSource, DataSourceId, Entity, EntityId,
    EntityKind, GraphSnapshot, IngestReport, IngestRequest, InputSet, KeyKind, KeyPolicy, Link,
};

/// A fresh in-memory graph with the default configuration
pub fn pipeline() -> CurationPipeline {
    pipeline_with(CuratorConfig::default())
}

pub fn pipeline_with(config: CuratorConfig) -> CurationPipeline {
    let graph = Arc::new(CurationGraph::in_memory().expect("in-memory graph"));
    CurationPipeline::new(graph, config)
}

/// One SD block with an empty connection table and the given data items
pub fn sdf_block(title: &str, fields: &[(&str, &str)]) -> String {
    let mut block = format!(
        "{}\n  stitcher\n\n  0  0  0  0  0  0  0  0  0  0999 V2000\nM  END\n",
        title
    );
    for (field, value) in fields {
        block.push_str(&format!("> <{}>\n{}\n\n", field, value));
    }
    block.push_str("$$$$\n");
    block
}

/// Concatenate blocks into SD file bytes
pub fn sdf(blocks: &[String]) -> Vec<u8> {
    blocks.concat().into_bytes()
}

/// Policy mapping the usual SD data items
pub fn sdf_policy() -> KeyPolicy {
    KeyPolicy::parse_mappings(["id:ID", "I_CAS:CAS", "N_Name:NAME", "H_LyChI:LYCHI", "I_UNII:UNII"])
        .expect("valid mappings")
}

/// Ingest SD blocks as one named source
pub fn ingest_sdf(pipeline: &CurationPipeline, name: &str, blocks: &[String]) -> IngestReport {
    let input = InputSet::memory([(format!("{}.sdf", name), sdf(blocks))]);
    pipeline
        .ingest(IngestRequest::new(name, "sdf", input).with_policy(sdf_policy()))
        .expect("ingest succeeds")
}

/// Random graph over `n` entities with `links` random links of the given kinds
pub fn random_snapshot(seed: u64, n: i64, links: usize, kinds: &[KeyKind]) -> GraphSnapshot {
    let mut rng = StdRng::seed_from_u64(seed);
    let source = DataSource::new(DataSourceId::from_hex("5eed"), "random", "memory", "sdf");
    let mut snapshot = GraphSnapshot::default();
    for raw in 1..=n {
        let id = EntityId::new(raw);
        snapshot.entities.insert(
            id,
            Entity {
                id,
                kind: EntityKind::Structure,
                source: source.id.clone(),
                ordinal: raw as u64,
                source_key: None,
                properties: Default::default(),
                labels: Default::default(),
                created_at: Utc::now(),
            },
        );
    }
    for i in 0..links {
        let a = EntityId::new(rng.gen_range(1..=n));
        let b = EntityId::new(rng.gen_range(1..=n));
        let kind = kinds[rng.gen_range(0..kinds.len())];
        if let Some(link) = Link::new(a, b, kind, format!("V{}", i)) {
            snapshot.links.push(link);
        }
    }
    snapshot.sources.insert(source.id.clone(), source);
    snapshot
}
