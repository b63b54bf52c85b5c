//! Storage backends for the curation graph
//!
//! The engine reaches the graph store only through the `GraphStore` trait.
//! `SqliteStore` is the persistent implementation; its key index survives
//! across runs, which is what makes incremental ingestion possible.

mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{
    EntityFilter, GraphStore, LinkFilter, LinkRemoval, OpenStore, StorageError, StorageResult,
};
