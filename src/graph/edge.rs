//! Link representation: an undirected edge produced by a shared stitch key

use super::node::EntityId;
use crate::stitch::KeyKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of writing a link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkWrite {
    /// No link of this kind existed between the endpoints
    Created,
    /// The link existed; the shared value was added to it
    Extended,
    /// The link already carried this value
    Unchanged,
}

/// A link between two distinct entities, typed by the key kind that produced it.
///
/// Endpoints are stored in ascending order, so a (pair, kind) is unique
/// regardless of which entity triggered the link. Every key value the pair
/// shares under `kind` is kept in `values`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub source: EntityId,
    pub target: EntityId,
    pub kind: KeyKind,
    pub values: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Link {
    /// Create a link; returns `None` for a self-link
    pub fn new(a: EntityId, b: EntityId, kind: KeyKind, value: impl Into<String>) -> Option<Self> {
        if a == b {
            return None;
        }
        let (source, target) = Self::ordered(a, b);
        Some(Self {
            source,
            target,
            kind,
            values: vec![value.into()],
            created_at: Utc::now(),
        })
    }

    /// Canonical endpoint order
    pub fn ordered(a: EntityId, b: EntityId) -> (EntityId, EntityId) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// The endpoint opposite `id`, if `id` is an endpoint
    pub fn other(&self, id: EntityId) -> Option<EntityId> {
        if self.source == id {
            Some(self.target)
        } else if self.target == id {
            Some(self.source)
        } else {
            None
        }
    }

    pub fn carries(&self, value: &str) -> bool {
        self.values.iter().any(|v| v == value)
    }
}
