//! Node/label export: the audit report written after a clustering run

use crate::graph::{CurationGraph, CurationResult, GraphSnapshot};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Write one line per entity: `<id>\t<LABEL>,<LABEL>,...`, ascending by id.
///
/// Returns the number of lines written.
pub fn write_node_labels<W: Write>(snapshot: &GraphSnapshot, mut out: W) -> io::Result<usize> {
    let mut lines = 0;
    for entity in snapshot.entities.values() {
        let labels: Vec<String> = entity.labels.iter().map(ToString::to_string).collect();
        writeln!(out, "{}\t{}", entity.id, labels.join(","))?;
        lines += 1;
    }
    out.flush()?;
    Ok(lines)
}

/// Export the graph's current labels to `path`
pub fn export_node_labels(graph: &CurationGraph, path: impl AsRef<Path>) -> CurationResult<usize> {
    let path = path.as_ref();
    let snapshot = graph.snapshot()?;
    let lines = write_node_labels(&snapshot, BufWriter::new(File::create(path)?))?;
    info!(path = %path.display(), entities = lines, "node labels exported");
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{DataSourceId, Entity, EntityId, EntityKind, Label};
    use chrono::Utc;

    #[test]
    fn one_line_per_entity_with_sorted_labels() {
        let mut snap = GraphSnapshot::default();
        for (raw, labels) in [
            (2, vec![Label::Group, Label::Entity, Label::Component(EntityId::new(1))]),
            (1, vec![Label::Supernode, Label::Group, Label::Entity]),
            (3, vec![]),
        ] {
            let id = EntityId::new(raw);
            snap.entities.insert(
                id,
                Entity {
                    id,
                    kind: EntityKind::Generic,
                    source: DataSourceId::from_hex("aa"),
                    ordinal: raw as u64,
                    source_key: None,
                    properties: Default::default(),
                    labels: labels.into_iter().collect(),
                    created_at: Utc::now(),
                },
            );
        }

        let mut out = Vec::new();
        assert_eq!(write_node_labels(&snap, &mut out).unwrap(), 3);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "1\tENTITY,GROUP,SUPERNODE\n2\tENTITY,GROUP,cc:1\n3\t\n"
        );
    }

    #[test]
    fn export_writes_file() {
        let graph = CurationGraph::in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("NodesAndLabels.txt");
        assert_eq!(export_node_labels(&graph, &path).unwrap(), 0);
        assert!(path.exists());
    }
}
