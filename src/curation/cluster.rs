//! Greedy connected components over a chosen set of link kinds

use super::tiebreak::SourcePriority;
use crate::graph::{CurationGraph, CurationResult, EntityId, GraphSnapshot, Label};
use crate::stitch::KeyKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use tracing::info;

/// Parameters of one clustering run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterOptions {
    /// Link kinds that connect entities
    pub kinds: BTreeSet<KeyKind>,
    /// Only cluster entities carrying this label
    #[serde(default)]
    pub scope: Option<Label>,
    /// Representative tie-break; first-visited when empty
    #[serde(default)]
    pub priority: SourcePriority,
}

impl ClusterOptions {
    pub fn new(kinds: impl IntoIterator<Item = KeyKind>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn with_scope(mut self, scope: Option<Label>) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_priority(mut self, priority: SourcePriority) -> Self {
        self.priority = priority;
        self
    }
}

/// One connected component
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cluster {
    /// Lowest member id; names the cluster
    pub root: EntityId,
    pub representative: EntityId,
    /// Members, ascending
    pub members: Vec<EntityId>,
}

impl Cluster {
    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn is_singleton(&self) -> bool {
        self.members.len() == 1
    }
}

/// Clusters of one run; every eligible entity is in exactly one
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Partition {
    /// Ordered by root
    pub clusters: Vec<Cluster>,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn entity_count(&self) -> usize {
        self.clusters.iter().map(Cluster::size).sum()
    }

    pub fn singleton_count(&self) -> usize {
        self.clusters.iter().filter(|c| c.is_singleton()).count()
    }

    /// Multi-member clusters
    pub fn groups(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.iter().filter(|c| !c.is_singleton())
    }

    /// Member id -> cluster root
    pub fn roots(&self) -> BTreeMap<EntityId, EntityId> {
        self.clusters
            .iter()
            .flat_map(|c| c.members.iter().map(move |m| (*m, c.root)))
            .collect()
    }

    pub fn cluster_of(&self, id: EntityId) -> Option<&Cluster> {
        self.clusters.iter().find(|c| c.members.binary_search(&id).is_ok())
    }
}

/// Partition the snapshot's eligible entities.
///
/// Eligible entities carry the scope label (when set) and are not
/// denylisted. Entities are visited in ascending id order and each unvisited
/// one claims everything reachable through links of the chosen kinds, so the
/// result depends only on the graph and the options.
pub fn compute_partition(snapshot: &GraphSnapshot, options: &ClusterOptions) -> Partition {
    let eligible: BTreeSet<EntityId> = snapshot
        .in_scope(options.scope.as_ref())
        .filter(|e| !e.is_denylisted())
        .map(|e| e.id)
        .collect();

    let mut adjacency: BTreeMap<EntityId, BTreeSet<EntityId>> = BTreeMap::new();
    for link in &snapshot.links {
        if !options.kinds.contains(&link.kind)
            || !eligible.contains(&link.source)
            || !eligible.contains(&link.target)
        {
            continue;
        }
        adjacency.entry(link.source).or_default().insert(link.target);
        adjacency.entry(link.target).or_default().insert(link.source);
    }

    let mut visited: HashSet<EntityId> = HashSet::with_capacity(eligible.len());
    let mut clusters = Vec::new();
    for &start in &eligible {
        if !visited.insert(start) {
            continue;
        }
        let mut members = vec![start];
        let mut queue = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            let Some(neighbours) = adjacency.get(&current) else {
                continue;
            };
            for &next in neighbours {
                if visited.insert(next) {
                    members.push(next);
                    queue.push_back(next);
                }
            }
        }
        members.sort();
        let representative = options.priority.choose(&members, snapshot).unwrap_or(start);
        clusters.push(Cluster {
            root: start,
            representative,
            members,
        });
    }
    Partition { clusters }
}

/// Run clustering and record the result as labels.
///
/// The run supersedes every earlier one: cluster labels are cleared from all
/// entities carrying them, in scope or not, so the labels always describe
/// the returned partition and entities outside the scope are left
/// unclustered. Multi-member clusters label each member `GROUP` and
/// `cc:<root>` and the representative `SUPERNODE`; singletons are labelled
/// `SINGLETON`.
pub fn cluster(graph: &CurationGraph, options: &ClusterOptions) -> CurationResult<Partition> {
    let _exclusive = graph.exclusive()?;
    let store = graph.store();
    let snapshot = GraphSnapshot::load(store)?;
    let partition = compute_partition(&snapshot, options);

    let labelled: Vec<EntityId> = snapshot
        .entities
        .values()
        .filter(|e| e.labels.iter().any(Label::is_cluster_label))
        .map(|e| e.id)
        .collect();
    let cleared = store.clear_cluster_labels(&labelled)?;

    let mut labels = Vec::with_capacity(partition.entity_count() + partition.len());
    for cluster in &partition.clusters {
        if cluster.is_singleton() {
            labels.push((cluster.root, Label::Singleton));
            continue;
        }
        for member in &cluster.members {
            labels.push((*member, Label::Group));
            labels.push((*member, Label::Component(cluster.root)));
        }
        labels.push((cluster.representative, Label::Supernode));
    }
    store.add_labels(&labels)?;

    info!(
        kinds = ?options.kinds,
        scope = ?options.scope.as_ref().map(Label::to_string),
        cleared,
        clusters = partition.len(),
        singletons = partition.singleton_count(),
        largest = partition.clusters.iter().map(Cluster::size).max().unwrap_or(0),
        "clustering complete"
    );
    Ok(partition)
}
