//! Curator configuration, loaded from YAML
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration.

use crate::adapter::json::DEFAULT_FLATTEN_DEPTH;
use crate::curation::{ClusterOptions, DeprecationRequest, LinkTopology, SourcePriority};
use crate::graph::Label;
use crate::registry::DIGEST_PREFIX_LEN;
use crate::stitch::{KeyKind, KeyPolicy};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Extraction tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Field delimiter of tabular inputs; each preset's own when unset
    pub delimiter: Option<char>,
    /// Nesting depth flattened from JSON documents
    pub json_depth: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            delimiter: None,
            json_depth: DEFAULT_FLATTEN_DEPTH,
        }
    }
}

/// Deprecation tuning.
///
/// The default thresholds were chosen against the reference substance
/// registry, where an identifier is expected on exactly one record: a CAS
/// number on more than one record, a name on more than two, or a coarse
/// structure hash on more than seven marks a placeholder value. They only
/// make sense within such a source, so deprecation runs in a pass only when
/// `scope` names one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeprecationConfig {
    pub thresholds: BTreeMap<KeyKind, usize>,
    /// Source whose entities are counted
    pub scope: Option<String>,
}

impl Default for DeprecationConfig {
    fn default() -> Self {
        Self {
            thresholds: [
                (KeyKind::Cas, 1),
                (KeyKind::Name, 2),
                (KeyKind::LychiL4, 7),
            ]
            .into(),
            scope: None,
        }
    }
}

impl DeprecationConfig {
    /// Requests for a curation pass; empty when no scope is configured
    pub fn requests(&self) -> Vec<DeprecationRequest> {
        let Some(scope) = &self.scope else {
            return Vec::new();
        };
        self.thresholds
            .iter()
            .map(|(kind, threshold)| {
                DeprecationRequest::new(*kind, *threshold).with_scope(Some(Label::Source(scope.clone())))
            })
            .collect()
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CuratorConfig {
    /// Hex characters shown when displaying a digest
    pub digest_prefix_len: usize,
    pub link_topology: LinkTopology,
    pub extraction: ExtractionConfig,
    pub deprecation: DeprecationConfig,
    /// Link kinds clustering follows
    pub cluster_kinds: BTreeSet<KeyKind>,
    /// Representative tie-break order
    pub source_priority: SourcePriority,
    /// Key policies by format, layered over each extractor's default
    pub policies: BTreeMap<String, KeyPolicy>,
}

impl Default for CuratorConfig {
    fn default() -> Self {
        Self {
            digest_prefix_len: DIGEST_PREFIX_LEN,
            link_topology: LinkTopology::Star,
            extraction: ExtractionConfig::default(),
            deprecation: DeprecationConfig::default(),
            cluster_kinds: [
                KeyKind::Cas,
                KeyKind::Unii,
                KeyKind::Code,
                KeyKind::Name,
                KeyKind::LychiL4,
                KeyKind::LychiL5,
                KeyKind::ActiveMoiety,
            ]
            .into(),
            source_priority: SourcePriority::default(),
            policies: BTreeMap::new(),
        }
    }
}

impl CuratorConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        Self::from_yaml(&text).map_err(|source| ConfigError::Yaml {
            path: display,
            source,
        })
    }

    /// Load `path` when given, otherwise the defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Configured policy overlay for a format
    pub fn policy_for(&self, format: &str) -> Option<&KeyPolicy> {
        self.policies.get(format)
    }

    pub fn cluster_options(&self) -> ClusterOptions {
        ClusterOptions::new(self.cluster_kinds.iter().copied())
            .with_priority(self.source_priority.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_is_the_default() {
        assert_eq!(CuratorConfig::from_yaml("").unwrap(), CuratorConfig::default());
        let config = CuratorConfig::default();
        assert_eq!(config.digest_prefix_len, 9);
        assert_eq!(config.link_topology, LinkTopology::Star);
        assert_eq!(config.extraction.delimiter, None);
        assert_eq!(config.deprecation.thresholds[&KeyKind::Name], 2);
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let yaml = r#"
link_topology: anchor
extraction:
  delimiter: ","
source_priority: [ginas, fda]
policies:
  sdf:
    id: ID
    keys:
      I_CAS: [CAS]
      N_Name: [Synonyms]
"#;
        let config = CuratorConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.link_topology, LinkTopology::Anchor);
        assert_eq!(config.extraction.delimiter, Some(','));
        assert_eq!(config.extraction.json_depth, DEFAULT_FLATTEN_DEPTH);
        assert_eq!(config.source_priority, SourcePriority::new(["ginas", "fda"]));
        let policy = config.policy_for("sdf").unwrap();
        assert_eq!(policy.keys[&KeyKind::Cas], vec!["CAS"]);
        assert_eq!(config.digest_prefix_len, 9);
    }

    #[test]
    fn deprecation_needs_a_scope() {
        let mut config = DeprecationConfig::default();
        assert!(config.requests().is_empty());
        config.scope = Some("ginas".into());
        let requests = config.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests
            .iter()
            .all(|r| r.scope == Some(Label::Source("ginas".into()))));
    }

    #[test]
    fn unknown_key_kind_is_rejected() {
        let yaml = "cluster_kinds: [I_CAS, X_BOGUS]\n";
        assert!(CuratorConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = CuratorConfig::load("/nonexistent/stitcher.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
