//! Canonical record: the ordered field map every extractor produces

use crate::graph::{Properties, PropertyValue};
use thiserror::Error;

/// A record that violates its format's declared schema.
///
/// Never fatal: the record is logged and skipped, and ingestion continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("record {record}: {message}")]
pub struct FormatError {
    /// Line or record number within the input
    pub record: u64,
    pub message: String,
}

impl FormatError {
    pub fn new(record: u64, message: impl Into<String>) -> Self {
        Self {
            record,
            message: message.into(),
        }
    }
}

/// Ordered key -> value field map.
///
/// Field order is the order fields were first seen, which is what the data
/// source's property schema records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(String, PropertyValue)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing any previous value but keeping its position
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<PropertyValue>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Add a value to a field, promoting it to a list if already set
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => existing.push(value),
            None => self.fields.push((name, PropertyValue::Text(value))),
        }
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_properties(self) -> Properties {
        self.fields.into_iter().collect()
    }
}

impl<K: Into<String>, V: Into<PropertyValue>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_keeps_first_seen_order() {
        let mut record = Record::new();
        record.insert("ApplNo", "004782");
        record.insert("Form", "TABLET");
        record.insert("ApplNo", "004783");
        assert_eq!(record.field_names(), vec!["ApplNo", "Form"]);
        assert_eq!(record.get("ApplNo"), Some(&PropertyValue::from("004783")));
    }

    #[test]
    fn append_promotes_to_list() {
        let mut record = Record::new();
        record.append("Synonyms", "aspirin");
        record.append("Synonyms", "acetylsalicylic acid");
        assert_eq!(
            record.get("Synonyms"),
            Some(&PropertyValue::List(vec![
                "aspirin".into(),
                "acetylsalicylic acid".into()
            ]))
        );
    }

    #[test]
    fn format_error_names_the_record() {
        let err = FormatError::new(12, "expected 4 fields, got 3");
        assert_eq!(err.to_string(), "record 12: expected 4 fields, got 3");
    }
}
