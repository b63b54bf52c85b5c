//! JSON registry extractor: streamed documents flattened into records
//!
//! Each top-level object is one record; a top-level array contributes one
//! record per element. Nested objects flatten into dotted field names and
//! arrays accumulate into list values. Content nested deeper than the
//! configured depth is kept as a JSON string.

use super::input::InputSet;
use super::record::{FormatError, Record};
use super::sdf::every_input;
use super::traits::{ExtractError, ExtractResult, RecordExtractor, RecordStream};
use crate::graph::EntityKind;
use crate::stitch::KeyPolicy;
use serde_json::{Map, Value};

pub const JSON: &str = "json";

pub const DEFAULT_FLATTEN_DEPTH: usize = 4;

#[derive(Debug, Clone)]
pub struct JsonExtractor {
    max_depth: usize,
    policy: KeyPolicy,
}

impl Default for JsonExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_FLATTEN_DEPTH)
    }
}

impl JsonExtractor {
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth: max_depth.max(1),
            policy: KeyPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: KeyPolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl RecordExtractor for JsonExtractor {
    fn format(&self) -> &str {
        JSON
    }

    fn entity_kind(&self) -> EntityKind {
        EntityKind::Substance
    }

    fn required_inputs(&self, input: &InputSet) -> ExtractResult<Vec<String>> {
        every_input(input)
    }

    fn default_policy(&self) -> KeyPolicy {
        self.policy.clone()
    }

    fn extract(&self, input: &InputSet) -> ExtractResult<RecordStream> {
        let names = every_input(input)?;
        let input = input.clone();
        let max_depth = self.max_depth;
        let records = names.into_iter().flat_map(move |name| -> Box<dyn Iterator<Item = ExtractResult<Record>> + Send> {
            let reader = match input.open(&name) {
                Ok(reader) => reader,
                Err(e) => return Box::new(std::iter::once(Err(ExtractError::io(&name, e)))),
            };
            let mut document = 0u64;
            let mut failed = false;
            let values = serde_json::Deserializer::from_reader(reader)
                .into_iter::<Value>()
                .map_while(move |item| {
                    if failed {
                        return None;
                    }
                    document += 1;
                    Some(match item {
                        Ok(value) => Ok((document, value)),
                        Err(source) => {
                            failed = true;
                            Err(ExtractError::Json {
                                input: name.clone(),
                                source,
                            })
                        }
                    })
                });
            Box::new(values.flat_map(move |item| -> Vec<ExtractResult<Record>> {
                match item {
                    Ok((document, value)) => documents(document, value)
                        .into_iter()
                        .map(|doc| doc.map(|obj| flatten(&obj, max_depth)).map_err(ExtractError::from))
                        .collect(),
                    Err(e) => vec![Err(e)],
                }
            }))
        });
        Ok(RecordStream::new(records))
    }
}

/// Split one top-level value into record objects
fn documents(document: u64, value: Value) -> Vec<Result<Map<String, Value>, FormatError>> {
    match value {
        Value::Object(obj) => vec![Ok(obj)],
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(obj) => Ok(obj),
                other => Err(FormatError::new(
                    document,
                    format!("array element is {}, not an object", kind_of(&other)),
                )),
            })
            .collect(),
        other => vec![Err(FormatError::new(
            document,
            format!("top-level value is {}, not an object", kind_of(&other)),
        ))],
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Flatten an object into a record
pub fn flatten(object: &Map<String, Value>, max_depth: usize) -> Record {
    let mut record = Record::new();
    for (key, value) in object {
        flatten_value(&mut record, key, value, 1, max_depth);
    }
    record
}

fn flatten_value(record: &mut Record, path: &str, value: &Value, depth: usize, max_depth: usize) {
    match value {
        Value::Null => {}
        Value::String(s) => record.append(path, s.clone()),
        Value::Bool(_) | Value::Number(_) => record.append(path, value.to_string()),
        Value::Array(items) => {
            for item in items {
                flatten_value(record, path, item, depth, max_depth);
            }
        }
        Value::Object(_) if depth >= max_depth => record.append(path, value.to_string()),
        Value::Object(obj) => {
            for (key, child) in obj {
                flatten_value(record, &format!("{}.{}", path, key), child, depth + 1, max_depth);
            }
        }
    }
}
