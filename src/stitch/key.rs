//! Stitch key kinds and normalized key instances

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Broad family a key kind belongs to; decides how raw values are normalized
/// and whether the kind produces links at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyClass {
    /// Registry numbers and controlled vocabulary codes, compared verbatim after trimming
    Identifier,
    /// Names and synonyms, case-folded with whitespace collapsed
    Name,
    /// Precomputed structure hashes, compared verbatim at a precision level
    Structure,
    /// Encodes a relationship to another entity's identifier
    Predicate,
    /// Free-form tags; indexed for lookup but never linked
    Tag,
}

/// The declared kind of a stitch key.
///
/// Serialized names follow the curation vocabulary (`I_` identifiers,
/// `N_` names, `H_` hashes, `T_` tags, `R_` relationships).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KeyKind {
    #[serde(rename = "I_CAS")]
    Cas,
    #[serde(rename = "I_UNII")]
    Unii,
    #[serde(rename = "I_CODE")]
    Code,
    #[serde(rename = "N_Name")]
    Name,
    #[serde(rename = "H_LyChI_L1")]
    LychiL1,
    #[serde(rename = "H_LyChI_L2")]
    LychiL2,
    #[serde(rename = "H_LyChI_L3")]
    LychiL3,
    #[serde(rename = "H_LyChI_L4")]
    LychiL4,
    #[serde(rename = "H_LyChI_L5")]
    LychiL5,
    #[serde(rename = "T_Keyword")]
    Keyword,
    #[serde(rename = "R_ActiveMoiety")]
    ActiveMoiety,
    #[serde(rename = "R_ConceptOf")]
    ConceptOf,
}

impl KeyKind {
    pub const ALL: [KeyKind; 12] = [
        KeyKind::Cas,
        KeyKind::Unii,
        KeyKind::Code,
        KeyKind::Name,
        KeyKind::LychiL1,
        KeyKind::LychiL2,
        KeyKind::LychiL3,
        KeyKind::LychiL4,
        KeyKind::LychiL5,
        KeyKind::Keyword,
        KeyKind::ActiveMoiety,
        KeyKind::ConceptOf,
    ];

    /// Structure hash kinds, coarsest first
    pub const STRUCTURE_LEVELS: [KeyKind; 5] = [
        KeyKind::LychiL1,
        KeyKind::LychiL2,
        KeyKind::LychiL3,
        KeyKind::LychiL4,
        KeyKind::LychiL5,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyKind::Cas => "I_CAS",
            KeyKind::Unii => "I_UNII",
            KeyKind::Code => "I_CODE",
            KeyKind::Name => "N_Name",
            KeyKind::LychiL1 => "H_LyChI_L1",
            KeyKind::LychiL2 => "H_LyChI_L2",
            KeyKind::LychiL3 => "H_LyChI_L3",
            KeyKind::LychiL4 => "H_LyChI_L4",
            KeyKind::LychiL5 => "H_LyChI_L5",
            KeyKind::Keyword => "T_Keyword",
            KeyKind::ActiveMoiety => "R_ActiveMoiety",
            KeyKind::ConceptOf => "R_ConceptOf",
        }
    }

    pub fn class(&self) -> KeyClass {
        match self {
            KeyKind::Cas | KeyKind::Unii | KeyKind::Code => KeyClass::Identifier,
            KeyKind::Name => KeyClass::Name,
            KeyKind::LychiL1
            | KeyKind::LychiL2
            | KeyKind::LychiL3
            | KeyKind::LychiL4
            | KeyKind::LychiL5 => KeyClass::Structure,
            KeyKind::Keyword => KeyClass::Tag,
            KeyKind::ActiveMoiety | KeyKind::ConceptOf => KeyClass::Predicate,
        }
    }

    /// Precision level (1 = coarsest) for structure hash kinds
    pub fn structure_level(&self) -> Option<usize> {
        Self::STRUCTURE_LEVELS
            .iter()
            .position(|k| k == self)
            .map(|i| i + 1)
    }

    /// Whether keys of this kind produce links between entities
    pub fn is_linkable(&self) -> bool {
        self.class() != KeyClass::Tag
    }

    /// For predicate kinds, the identifier kind whose carriers the predicate points at
    pub fn predicate_target(&self) -> Option<KeyKind> {
        match self {
            KeyKind::ActiveMoiety | KeyKind::ConceptOf => Some(KeyKind::Unii),
            _ => None,
        }
    }

    /// Predicate kinds that point at carriers of this kind
    pub fn predicate_sources(&self) -> Vec<KeyKind> {
        Self::ALL
            .iter()
            .copied()
            .filter(|k| k.predicate_target() == Some(*self))
            .collect()
    }

    /// Normalize a raw property value into a comparable key value.
    ///
    /// Returns `None` when nothing discriminating remains (blank input).
    pub fn normalize(&self, raw: &str) -> Option<String> {
        let value = match self.class() {
            KeyClass::Name => raw
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_uppercase(),
            KeyClass::Structure => {
                let trimmed = raw.trim();
                match self.structure_level() {
                    Some(level) => truncate_layers(trimmed, level),
                    None => trimmed.to_string(),
                }
            }
            KeyClass::Identifier | KeyClass::Predicate | KeyClass::Tag => raw.trim().to_string(),
        };
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }
}

/// Keep the first `level` dash-separated layers of a layered structure hash.
///
/// Hashes with no more than `level` layers are returned unchanged, so a fully
/// specified hash matches verbatim at its finest level.
fn truncate_layers(hash: &str, level: usize) -> String {
    let layers: Vec<&str> = hash.split('-').collect();
    if layers.len() <= level {
        hash.to_string()
    } else {
        layers[..level].join("-")
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a key kind name is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown stitch key kind: {0}")]
pub struct UnknownKeyKind(pub String);

impl FromStr for KeyKind {
    type Err = UnknownKeyKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownKeyKind(s.to_string()))
    }
}

/// A typed identity key: (kind, normalized value)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StitchKey {
    pub kind: KeyKind,
    pub value: String,
}

impl StitchKey {
    /// Build a key from a raw value, normalizing it for the kind
    pub fn new(kind: KeyKind, raw: &str) -> Option<Self> {
        kind.normalize(raw).map(|value| Self { kind, value })
    }

    /// Build a key from a value that is already normalized
    pub fn normalized(kind: KeyKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

impl fmt::Display for StitchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.kind, self.value)
    }
}
