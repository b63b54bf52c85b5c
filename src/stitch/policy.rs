//! Key policies and the pure key extractor

use super::key::{KeyKind, StitchKey};
use crate::graph::{Properties, PropertyValue};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Pseudo-kind naming the source-local identifier property (`id:Column`)
const ID_MAPPING: &str = "id";

/// Pseudo-kind expanding to every structure hash level (`H_LyChI:Column`)
const ALL_STRUCTURE_LEVELS: &str = "H_LyChI";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("mapping '{0}' is not of the form KIND:Property")]
    Malformed(String),

    #[error(transparent)]
    UnknownKind(#[from] super::key::UnknownKeyKind),
}

/// Which properties feed which key kinds.
///
/// ```yaml
/// id: ApplNo
/// keys:
///   N_Name: [ActiveIngredient, DrugName]
///   I_CODE: [ApplNo]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPolicy {
    /// Property holding the source-local record identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Key kind -> source properties, in declaration order
    #[serde(default)]
    pub keys: BTreeMap<KeyKind, Vec<String>>,
}

impl KeyPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, property: impl Into<String>) -> Self {
        self.id = Some(property.into());
        self
    }

    /// Map `property` to `kind` (a property may feed several kinds)
    pub fn add(mut self, kind: KeyKind, property: impl Into<String>) -> Self {
        let property = property.into();
        let props = self.keys.entry(kind).or_default();
        if !props.contains(&property) {
            props.push(property);
        }
        self
    }

    /// Parse command-line style mappings: `I_CAS:CAS`, `N_Name:Synonyms`,
    /// `H_LyChI:LyChI` (all structure levels) and `id:ID`.
    pub fn parse_mappings<I, S>(mappings: I) -> Result<Self, PolicyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut policy = Self::new();
        for mapping in mappings {
            let mapping = mapping.as_ref();
            let (kind, property) = mapping
                .split_once(':')
                .map(|(k, p)| (k.trim(), p.trim()))
                .filter(|(k, p)| !k.is_empty() && !p.is_empty())
                .ok_or_else(|| PolicyError::Malformed(mapping.to_string()))?;

            if kind.eq_ignore_ascii_case(ID_MAPPING) {
                policy = policy.with_id(property);
            } else if kind.eq_ignore_ascii_case(ALL_STRUCTURE_LEVELS) {
                for level in KeyKind::STRUCTURE_LEVELS {
                    policy = policy.add(level, property);
                }
            } else {
                policy = policy.add(kind.parse()?, property);
            }
        }
        Ok(policy)
    }

    /// Layer `other` on top of this policy; `other`'s id wins when set
    pub fn merge(mut self, other: &KeyPolicy) -> Self {
        if other.id.is_some() {
            self.id = other.id.clone();
        }
        for (kind, props) in &other.keys {
            for prop in props {
                self = self.add(*kind, prop.clone());
            }
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.keys.is_empty()
    }

    /// Source-local identifier of a record, if the policy names one
    pub fn source_key<'a, F>(&self, lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<&'a PropertyValue>,
    {
        let prop = self.id.as_deref()?;
        lookup(prop)
            .and_then(|v| v.values().map(str::trim).find(|s| !s.is_empty()))
            .map(str::to_string)
    }

    /// Compute the key set for a record.
    ///
    /// Pure and deterministic: the same fields under the same policy always
    /// yield the same set. Missing properties contribute nothing.
    pub fn extract_with<'a, F>(&self, lookup: F) -> BTreeSet<StitchKey>
    where
        F: Fn(&str) -> Option<&'a PropertyValue>,
    {
        let mut keys = BTreeSet::new();
        for (kind, props) in &self.keys {
            for prop in props {
                let Some(value) = lookup(prop) else {
                    continue;
                };
                for raw in value.values() {
                    if let Some(key) = StitchKey::new(*kind, raw) {
                        keys.insert(key);
                    }
                }
            }
        }
        keys
    }

    /// Key set for an entity's stored property bag
    pub fn extract_properties(&self, properties: &Properties) -> BTreeSet<StitchKey> {
        self.extract_with(|name| properties.get(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, PropertyValue)]) -> Properties {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn parses_command_line_mappings() {
        let policy =
            KeyPolicy::parse_mappings(["I_CAS:CAS", "N_Name:Synonyms", "id:ID", "N_Name:Drug_Name"]).unwrap();
        assert_eq!(policy.id.as_deref(), Some("ID"));
        assert_eq!(policy.keys[&KeyKind::Cas], vec!["CAS"]);
        assert_eq!(policy.keys[&KeyKind::Name], vec!["Synonyms", "Drug_Name"]);
    }

    #[test]
    fn structure_shorthand_expands_to_every_level() {
        let policy = KeyPolicy::parse_mappings(["H_LyChI:LyChI"]).unwrap();
        assert_eq!(policy.keys.len(), 5);
        assert!(policy.keys.contains_key(&KeyKind::LychiL1));
        assert!(policy.keys.contains_key(&KeyKind::LychiL5));
    }

    #[test]
    fn malformed_and_unknown_mappings_fail() {
        assert!(matches!(
            KeyPolicy::parse_mappings(["I_CAS"]),
            Err(PolicyError::Malformed(_))
        ));
        assert!(matches!(
            KeyPolicy::parse_mappings(["X_Bogus:Col"]),
            Err(PolicyError::UnknownKind(_))
        ));
    }

    #[test]
    fn extraction_is_deterministic_and_normalized() {
        let policy = KeyPolicy::new()
            .add(KeyKind::Name, "ActiveIngredient")
            .add(KeyKind::Name, "DrugName")
            .add(KeyKind::Code, "ApplNo");
        let record = props(&[
            ("ApplNo", PropertyValue::from(" 004782 ")),
            ("DrugName", PropertyValue::from("Aspirin")),
            (
                "ActiveIngredient",
                PropertyValue::List(vec!["aspirin".into(), "caffeine  citrate".into()]),
            ),
        ]);

        let first = policy.extract_properties(&record);
        let second = policy.extract_properties(&record);
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        assert!(first.contains(&StitchKey::normalized(KeyKind::Name, "ASPIRIN")));
        assert!(first.contains(&StitchKey::normalized(KeyKind::Name, "CAFFEINE CITRATE")));
        assert!(first.contains(&StitchKey::normalized(KeyKind::Code, "004782")));
    }

    #[test]
    fn missing_properties_yield_no_keys() {
        let policy = KeyPolicy::new().add(KeyKind::Cas, "CAS");
        assert!(policy.extract_properties(&Properties::new()).is_empty());
    }

    #[test]
    fn source_key_uses_first_non_blank_value() {
        let policy = KeyPolicy::new().with_id("ID");
        let record = props(&[("ID", PropertyValue::List(vec!["".into(), "NCGC001".into()]))]);
        assert_eq!(policy.source_key(|n| record.get(n)).as_deref(), Some("NCGC001"));
        assert_eq!(KeyPolicy::new().source_key(|n| record.get(n)), None);
    }

    #[test]
    fn policy_loads_from_yaml() {
        let yaml = "id: ApplNo\nkeys:\n  N_Name: [ActiveIngredient, DrugName]\n  I_CODE: [ApplNo]\n";
        let policy: KeyPolicy = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(policy.id.as_deref(), Some("ApplNo"));
        assert_eq!(policy.keys[&KeyKind::Name].len(), 2);
    }

    #[test]
    fn merge_layers_overrides() {
        let base = KeyPolicy::new().with_id("ApplNo").add(KeyKind::Name, "DrugName");
        let overlay = KeyPolicy::new().add(KeyKind::Name, "ActiveIngredient");
        let merged = base.merge(&overlay);
        assert_eq!(merged.id.as_deref(), Some("ApplNo"));
        assert_eq!(merged.keys[&KeyKind::Name], vec!["DrugName", "ActiveIngredient"]);
    }
}
