//! Extractor registry: dispatches a declared format identifier to its extractor

use super::json::JsonExtractor;
use super::sdf::SdfExtractor;
use super::tabular::TabularJoin;
use super::traits::{ExtractError, ExtractResult, RecordExtractor};
use crate::config::CuratorConfig;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Extractors keyed by format identifier.
///
/// Registering a second extractor under the same format replaces the first.
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    extractors: BTreeMap<String, Arc<dyn RecordExtractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in formats, tuned by configuration
    pub fn standard(config: &CuratorConfig) -> Self {
        let mut registry = Self::new();
        let mut drugs_at_fda = TabularJoin::drugs_at_fda();
        if let Some(delimiter) = config.extraction.delimiter {
            drugs_at_fda = drugs_at_fda.with_delimiter(delimiter);
        }
        registry.register(Arc::new(drugs_at_fda));
        registry.register(Arc::new(SdfExtractor::new()));
        registry.register(Arc::new(JsonExtractor::new(config.extraction.json_depth)));
        registry
    }

    pub fn register(&mut self, extractor: Arc<dyn RecordExtractor>) {
        self.extractors.insert(extractor.format().to_string(), extractor);
    }

    pub fn get(&self, format: &str) -> ExtractResult<Arc<dyn RecordExtractor>> {
        self.extractors
            .get(format)
            .cloned()
            .ok_or_else(|| ExtractError::UnknownFormat(format.to_string()))
    }

    pub fn formats(&self) -> Vec<&str> {
        self.extractors.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractorRegistry")
            .field("formats", &self.formats())
            .finish()
    }
}
