//! Entity representation in the curation graph

use super::source::DataSourceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Store-assigned identifier for an entity.
///
/// Identifiers are allocated in increasing order, which gives clustering a
/// stable traversal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(i64);

impl EntityId {
    pub fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// What kind of real-world object an entity was extracted as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// Row-oriented record (e.g. an approved drug product)
    Generic,
    /// Chemical structure record
    Structure,
    /// Substance registry record
    Substance,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Generic => "generic",
            EntityKind::Structure => "structure",
            EntityKind::Substance => "substance",
        }
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generic" => Ok(EntityKind::Generic),
            "structure" => Ok(EntityKind::Structure),
            "substance" => Ok(EntityKind::Substance),
            other => Err(format!("unknown entity kind: {}", other)),
        }
    }
}

/// Property values are either a single string or a list of strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Text(String),
    List(Vec<String>),
}

impl PropertyValue {
    /// Split a raw cell on `separator`; a single piece stays `Text`
    pub fn split(raw: &str, separator: char) -> Self {
        let parts: Vec<String> = raw.split(separator).map(|p| p.trim().to_string()).collect();
        if parts.len() == 1 {
            PropertyValue::Text(parts.into_iter().next().unwrap_or_default())
        } else {
            PropertyValue::List(parts)
        }
    }

    /// Iterate every string carried by this value
    pub fn values(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        match self {
            PropertyValue::Text(s) => Box::new(std::iter::once(s.as_str())),
            PropertyValue::List(items) => Box::new(items.iter().map(String::as_str)),
        }
    }

    /// Add another value, promoting `Text` to `List`
    pub fn push(&mut self, value: String) {
        match self {
            PropertyValue::Text(existing) => {
                let first = std::mem::take(existing);
                *self = PropertyValue::List(vec![first, value]);
            }
            PropertyValue::List(items) => items.push(value),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            PropertyValue::List(_) => None,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::Text(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::Text(s)
    }
}

/// Property bag of an entity
pub type Properties = BTreeMap<String, PropertyValue>;

/// Non-exclusive tags attached to entities.
///
/// Cluster membership is itself a label (`Component`) naming the root entity
/// of the connected component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Label {
    /// Every curated entity
    Entity,
    /// Entity created from raw ingested data
    Data,
    /// In no multi-member cluster after the last clustering run
    Singleton,
    /// Member of a multi-member cluster
    Group,
    /// Representative of its cluster
    Supernode,
    /// Excluded from clustering
    Denylist,
    /// Marks entities originating from the named data source
    Source(String),
    /// Member of the cluster rooted at the given entity
    Component(EntityId),
}

const SOURCE_PREFIX: &str = "source:";
const COMPONENT_PREFIX: &str = "cc:";

impl Label {
    /// Labels owned by the clustering stage and cleared before each run
    pub fn is_cluster_label(&self) -> bool {
        matches!(
            self,
            Label::Singleton | Label::Group | Label::Supernode | Label::Component(_)
        )
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Entity => f.write_str("ENTITY"),
            Label::Data => f.write_str("DATA"),
            Label::Singleton => f.write_str("SINGLETON"),
            Label::Group => f.write_str("GROUP"),
            Label::Supernode => f.write_str("SUPERNODE"),
            Label::Denylist => f.write_str("DENYLIST"),
            Label::Source(name) => write!(f, "{}{}", SOURCE_PREFIX, name),
            Label::Component(root) => write!(f, "{}{}", COMPONENT_PREFIX, root),
        }
    }
}

impl FromStr for Label {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ENTITY" => Ok(Label::Entity),
            "DATA" => Ok(Label::Data),
            "SINGLETON" => Ok(Label::Singleton),
            "GROUP" => Ok(Label::Group),
            "SUPERNODE" => Ok(Label::Supernode),
            "DENYLIST" => Ok(Label::Denylist),
            other => {
                if let Some(name) = other.strip_prefix(SOURCE_PREFIX) {
                    Ok(Label::Source(name.to_string()))
                } else if let Some(root) = other.strip_prefix(COMPONENT_PREFIX) {
                    root.parse()
                        .map(Label::Component)
                        .map_err(|e| format!("bad component label {}: {}", other, e))
                } else {
                    Err(format!("unknown label: {}", other))
                }
            }
        }
    }
}

impl From<Label> for String {
    fn from(label: Label) -> Self {
        label.to_string()
    }
}

impl TryFrom<String> for Label {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Everything needed to create an entity; the store assigns the id.
///
/// `(source, ordinal)` identifies the record within its data source, which
/// makes re-ingesting the same source idempotent.
#[derive(Debug, Clone)]
pub struct EntityDraft {
    pub kind: EntityKind,
    pub source: DataSourceId,
    pub ordinal: u64,
    pub source_key: Option<String>,
    pub properties: Properties,
    pub labels: BTreeSet<Label>,
}

impl EntityDraft {
    pub fn new(kind: EntityKind, source: DataSourceId, ordinal: u64) -> Self {
        Self {
            kind,
            source,
            ordinal,
            source_key: None,
            properties: Properties::new(),
            labels: BTreeSet::new(),
        }
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_label(mut self, label: Label) -> Self {
        self.labels.insert(label);
        self
    }

    pub fn with_source_key(mut self, key: Option<String>) -> Self {
        self.source_key = key;
        self
    }
}

/// A curated entity in the graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    /// Data source this entity was extracted from
    pub source: DataSourceId,
    /// Position of the originating record within its source
    pub ordinal: u64,
    /// Source-local identifier, when the key policy names one
    pub source_key: Option<String>,
    pub properties: Properties,
    pub labels: BTreeSet<Label>,
    pub created_at: DateTime<Utc>,
}

impl Entity {
    pub fn has_label(&self, label: &Label) -> bool {
        self.labels.contains(label)
    }

    pub fn is_denylisted(&self) -> bool {
        self.has_label(&Label::Denylist)
    }
}
