//! Record extraction layer
//!
//! Each input format implements [`RecordExtractor`], turning a data source's
//! raw inputs into a lazy stream of canonical [`Record`]s. The
//! [`ExtractorRegistry`] selects the extractor by declared format identifier.

mod cancel;
mod delimited;
mod input;
pub mod json;
pub mod lookup;
mod record;
mod router;
pub mod sdf;
pub mod tabular;
mod traits;

pub use cancel::CancellationToken;
pub use delimited::DelimitedReader;
pub use input::InputSet;
pub use json::JsonExtractor;
pub use record::{FormatError, Record};
pub use router::ExtractorRegistry;
pub use sdf::SdfExtractor;
pub use tabular::{JoinKey, TableSpec, TabularJoin};
pub use traits::{ExtractError, ExtractResult, RecordExtractor, RecordStream};
