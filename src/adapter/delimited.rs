//! Delimited table reader over the `csv` crate

use csv::{ReaderBuilder, StringRecord};
use std::io::{self, Read};

/// Reads a headered delimited table row by row.
///
/// Rows may be shorter or longer than the header; callers decide how to
/// align them. Rows whose fields are all blank are skipped and not counted.
pub struct DelimitedReader<R> {
    reader: csv::Reader<R>,
    header: Vec<String>,
    record: StringRecord,
    rows: u64,
}

impl<R: Read> DelimitedReader<R> {
    /// Open `reader` and read its header row.
    ///
    /// The delimiter must be a single ASCII character.
    pub fn new(reader: R, delimiter: char) -> io::Result<Self> {
        let delimiter = u8::try_from(delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("delimiter {:?} is not a single ASCII character", delimiter),
                )
            })?;
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);
        let header = reader
            .headers()
            .map_err(invalid_data)?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();
        Ok(Self {
            reader,
            header,
            record: StringRecord::new(),
            rows: 0,
        })
    }

    /// Trimmed column names; empty for an empty input
    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Next non-blank row with its 1-based row number, header excluded
    pub fn next_row(&mut self) -> io::Result<Option<(u64, Vec<String>)>> {
        loop {
            if !self.reader.read_record(&mut self.record).map_err(invalid_data)? {
                return Ok(None);
            }
            if self.record.iter().all(|f| f.trim().is_empty()) {
                continue;
            }
            self.rows += 1;
            return Ok(Some((self.rows, self.record.iter().map(str::to_string).collect())));
        }
    }
}

fn invalid_data(e: csv::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e)
}
