//! Entities, links and data sources, and the graph that holds them

mod edge;
mod engine;
mod node;
mod snapshot;
mod source;


pub use edge::{Link, LinkWrite};
pub use engine::{CurationError, CurationGraph, CurationResult};
pub use node::{Entity, EntityDraft, EntityId, EntityKind, Label, Properties, PropertyValue};
pub use snapshot::GraphSnapshot;
pub use source::{DataSource, DataSourceId, SourceState};
