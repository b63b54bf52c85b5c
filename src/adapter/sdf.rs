//! SD file extractor: one record per `$$$$`-terminated structure block

use super::input::InputSet;
use super::record::{FormatError, Record};
use super::traits::{ExtractError, ExtractResult, RecordExtractor, RecordStream};
use crate::graph::EntityKind;
use crate::stitch::KeyPolicy;
use std::io::BufRead;

pub const SDF: &str = "sdf";

/// Field holding the block's title line
pub const NAME_FIELD: &str = "_NAME";
/// Field holding the connection table
pub const MOLFILE_FIELD: &str = "MOLFILE";

const BLOCK_END: &str = "$$$$";
const CTAB_END: &str = "M  END";

/// Streams structure records from one or more SD files
#[derive(Debug, Clone, Default)]
pub struct SdfExtractor {
    policy: KeyPolicy,
}

impl SdfExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(mut self, policy: KeyPolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl RecordExtractor for SdfExtractor {
    fn format(&self) -> &str {
        SDF
    }

    fn entity_kind(&self) -> EntityKind {
        EntityKind::Structure
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
        let blocks = names.into_iter().flat_map(move |name| -> Box<dyn Iterator<Item = ExtractResult<Record>> + Send> {
            match input.open(&name) {
                Ok(reader) => Box::new(SdfBlocks::new(reader, name)),
                Err(e) => Box::new(std::iter::once(Err(ExtractError::io(&name, e)))),
            }
        });
        Ok(RecordStream::new(blocks))
    }
}

/// All inputs of a single-stream format; at least one is required
pub(super) fn every_input(input: &InputSet) -> ExtractResult<Vec<String>> {
    let names = input
        .names()
        .map_err(|e| ExtractError::io(&input.origin(), e))?;
    if names.is_empty() {
        return Err(ExtractError::MissingInput(input.origin()));
    }
    Ok(names)
}

/// Lazily parses blocks from one reader
struct SdfBlocks<R> {
    reader: R,
    input: String,
    block: u64,
    done: bool,
}

impl<R: BufRead> SdfBlocks<R> {
    fn new(reader: R, input: String) -> Self {
        Self {
            reader,
            input,
            block: 0,
            done: false,
        }
    }

    /// Raw lines up to the next terminator; `None` at end of input
    fn read_block(&mut self) -> ExtractResult<Option<Vec<String>>> {
        let mut lines = Vec::new();
        let mut buf = String::new();
        loop {
            buf.clear();
            let read = self
                .reader
                .read_line(&mut buf)
                .map_err(|e| ExtractError::io(&self.input, e))?;
            if read == 0 {
                let blank = lines.iter().all(|l: &String| l.trim().is_empty());
                return Ok(if blank { None } else { Some(lines) });
            }
            let line = buf.trim_end_matches(&['\n', '\r'][..]);
            if line.trim_end() == BLOCK_END {
                return Ok(Some(lines));
            }
            lines.push(line.to_string());
        }
    }

    fn parse(&self, lines: Vec<String>) -> Result<Record, FormatError> {
        let ctab_end = lines
            .iter()
            .position(|l| l.trim_end() == CTAB_END)
            .ok_or_else(|| {
                FormatError::new(self.block, format!("{}: block has no '{}' line", self.input, CTAB_END))
            })?;

        let mut record = Record::new();
        let title = lines[0].trim();
        if !title.is_empty() {
            record.insert(NAME_FIELD, title);
        }
        record.insert(MOLFILE_FIELD, lines[..=ctab_end].join("\n"));

        let mut rest = lines[ctab_end + 1..].iter();
        while let Some(line) = rest.next() {
            let Some(field) = data_header(line) else {
                continue;
            };
            let mut values = Vec::new();
            for value in rest.by_ref() {
                if value.trim().is_empty() {
                    break;
                }
                values.push(value.trim().to_string());
            }
            for value in values {
                record.append(field.clone(), value);
            }
        }
        Ok(record)
    }
}

/// Field name from a `> <FIELD>` or `>  (1) <FIELD>` data header
fn data_header(line: &str) -> Option<String> {
    let rest = line.strip_prefix('>')?;
    let start = rest.find('<')? + 1;
    let end = start + rest[start..].find('>')?;
    let name = rest[start..end].trim();
    (!name.is_empty()).then(|| name.to_string())
}

impl<R: BufRead> Iterator for SdfBlocks<R> {
    type Item = ExtractResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_block() {
            Ok(Some(lines)) => {
                self.block += 1;
                Some(self.parse(lines).map_err(ExtractError::from))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
