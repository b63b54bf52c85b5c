//! RecordExtractor trait: the contract every input format implements
//!
//! An extractor turns a data source's raw inputs into a lazy stream of
//! canonical records. Calling `extract` again restarts from the beginning.

use super::input::InputSet;
use super::record::{FormatError, Record};
use crate::graph::EntityKind;
use crate::stitch::KeyPolicy;
use std::io;
use thiserror::Error;
use tracing::warn;

/// Errors that stop extraction of a data source
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("No extractor registered for format '{0}'")]
    UnknownFormat(String),

    #[error("Required input is missing: {0}")]
    MissingInput(String),

    #[error("IO error reading {input}: {source}")]
    Io {
        input: String,
        #[source]
        source: io::Error,
    },

    #[error("JSON error in {input}: {source}")]
    Json {
        input: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{input} has no '{column}' column")]
    MissingColumn { input: String, column: String },

    #[error("{input} is empty")]
    EmptyInput { input: String },

    #[error(transparent)]
    Format(#[from] FormatError),
}

impl ExtractError {
    pub fn io(input: &str, source: io::Error) -> Self {
        ExtractError::Io {
            input: input.to_string(),
            source,
        }
    }
}

/// Result type for extraction
pub type ExtractResult<T> = Result<T, ExtractError>;

/// The contract extractors implement.
///
/// Extractors hold no per-run mutable state, so one instance can serve
/// several ingestions concurrently.
pub trait RecordExtractor: Send + Sync {
    /// Format identifier the registry dispatches on
    fn format(&self) -> &str;

    /// Kind of entity each record becomes
    fn entity_kind(&self) -> EntityKind;

    /// Inputs that must be present, in digest order
    fn required_inputs(&self, input: &InputSet) -> ExtractResult<Vec<String>>;

    /// Key policy used when the caller supplies none
    fn default_policy(&self) -> KeyPolicy {
        KeyPolicy::default()
    }

    /// Start a fresh pass over the inputs
    fn extract(&self, input: &InputSet) -> ExtractResult<RecordStream>;
}

type Items = Box<dyn Iterator<Item = ExtractResult<Record>> + Send>;

/// A lazy, finite stream of records.
///
/// Format errors are logged and skipped here, so consumers only see good
/// records and fatal errors. `parsed` and `rejected` count both.
pub struct RecordStream {
    items: Items,
    parsed: u64,
    rejected: u64,
}

impl RecordStream {
    pub fn new(items: impl Iterator<Item = ExtractResult<Record>> + Send + 'static) -> Self {
        Self {
            items: Box::new(items),
            parsed: 0,
            rejected: 0,
        }
    }

    /// Stream over records already materialized
    pub fn from_records(records: Vec<Record>) -> Self {
        Self::new(records.into_iter().map(Ok))
    }

    /// Count records rejected before the stream was built
    pub fn with_rejected(mut self, rejected: u64) -> Self {
        self.rejected += rejected;
        self
    }

    pub fn parsed(&self) -> u64 {
        self.parsed
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}

impl Iterator for RecordStream {
    type Item = ExtractResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.items.next()? {
                Ok(record) => {
                    self.parsed += 1;
                    return Some(Ok(record));
                }
                Err(ExtractError::Format(e)) => {
                    warn!(record = e.record, "skipping record: {}", e.message);
                    self.rejected += 1;
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

impl std::fmt::Debug for RecordStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStream")
            .field("parsed", &self.parsed)
            .field("rejected", &self.rejected)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_skips_and_counts_format_errors() {
        let items = vec![
            Ok(Record::from_iter([("a", "1")])),
            Err(ExtractError::Format(FormatError::new(2, "bad"))),
            Ok(Record::from_iter([("a", "3")])),
        ];
        let mut stream = RecordStream::new(items.into_iter()).with_rejected(1);
        let records: Vec<Record> = stream.by_ref().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(stream.parsed(), 2);
        assert_eq!(stream.rejected(), 2);
    }

    #[test]
    fn stream_passes_fatal_errors_through() {
        let items = vec![Err(ExtractError::MissingInput("x".into()))];
        let mut stream = RecordStream::new(items.into_iter());
        assert!(matches!(stream.next(), Some(Err(ExtractError::MissingInput(_)))));
        assert!(stream.next().is_none());
    }
}
