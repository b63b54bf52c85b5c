//! DataSource: provenance record for one ingested batch of raw input

use super::node::Label;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Content digest identifying a data source (lowercase hex)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataSourceId(String);

impl DataSourceId {
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Display form truncated to `len` hex characters
    pub fn short(&self, len: usize) -> &str {
        let end = len.min(self.0.len());
        &self.0[..end]
    }

    /// True when `prefix` is a (case-insensitive) prefix of the digest
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        !prefix.is_empty() && self.0.starts_with(&prefix.to_ascii_lowercase())
    }
}

impl fmt::Display for DataSourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ingestion lifecycle of a data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceState {
    /// Registered; extraction has not finished
    Pending,
    /// Extraction finished and the instance count is final
    Complete,
}

impl SourceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceState::Pending => "pending",
            SourceState::Complete => "complete",
        }
    }
}

/// A registered data source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    pub id: DataSourceId,
    pub name: String,
    /// File path or URI the content came from
    pub origin: String,
    /// Extraction format identifier
    pub format: String,
    /// Field names observed in the first extracted record
    pub properties: Vec<String>,
    /// Number of committed entities
    pub instances: u64,
    pub state: SourceState,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl DataSource {
    /// A fresh, pending source with no instances
    pub fn new(
        id: DataSourceId,
        name: impl Into<String>,
        origin: impl Into<String>,
        format: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            origin: origin.into(),
            format: format.into(),
            properties: Vec::new(),
            instances: 0,
            state: SourceState::Pending,
            metadata: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    /// Label marking entities from this source
    pub fn label(&self) -> Label {
        Label::Source(self.name.clone())
    }

    pub fn is_complete(&self) -> bool {
        self.state == SourceState::Complete
    }
}
