//! Tabular multi-file join
//!
//! The first table establishes one record per (primary, secondary) identifier
//! pair. Each later table is merged into the records it names, either by the
//! full pair or by the primary identifier alone (every record under it).

use super::delimited::DelimitedReader;
use super::input::InputSet;
use super::lookup::{self, LookupTable};
use super::record::{FormatError, Record};
use super::traits::{ExtractError, ExtractResult, RecordExtractor, RecordStream};
use crate::graph::{EntityKind, PropertyValue};
use crate::stitch::{KeyKind, KeyPolicy};
use std::collections::BTreeMap;
use std::io;
use tracing::{debug, info, warn};

pub const DRUGS_AT_FDA: &str = "drugs-at-fda";

/// Field delimiter of the Drugs@FDA download
pub const DRUGS_AT_FDA_DELIMITER: char = ',';

/// How a table's rows find their records
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinKey {
    /// Rows apply to every record under the primary identifier
    Primary(String),
    /// Rows apply to the single record with this (primary, secondary) pair
    Compound(String, String),
}

impl JoinKey {
    fn primary(&self) -> &str {
        match self {
            JoinKey::Primary(p) | JoinKey::Compound(p, _) => p,
        }
    }

    fn secondary(&self) -> Option<&str> {
        match self {
            JoinKey::Primary(_) => None,
            JoinKey::Compound(_, s) => Some(s),
        }
    }
}

/// A code column expanded through a fixed table
#[derive(Debug, Clone)]
pub struct LookupColumn {
    pub column: String,
    pub table: &'static LookupTable,
    /// One output field per table column
    pub outputs: Vec<String>,
}

/// One input file of the join
#[derive(Debug, Clone)]
pub struct TableSpec {
    pub file: String,
    pub join: JoinKey,
    /// Columns whose values are split into lists
    pub split: Vec<String>,
    pub lookups: Vec<LookupColumn>,
}

impl TableSpec {
    pub fn new(file: impl Into<String>, join: JoinKey) -> Self {
        Self {
            file: file.into(),
            join,
            split: Vec::new(),
            lookups: Vec::new(),
        }
    }

    pub fn with_split(mut self, column: impl Into<String>) -> Self {
        self.split.push(column.into());
        self
    }

    pub fn with_lookup(
        mut self,
        column: impl Into<String>,
        table: &'static LookupTable,
        outputs: &[&str],
    ) -> Self {
        self.lookups.push(LookupColumn {
            column: column.into(),
            table,
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
        });
        self
    }
}

/// Column positions resolved against one table's header
struct Layout {
    header: Vec<String>,
    primary: usize,
    secondary: Option<usize>,
    lookups: BTreeMap<usize, LookupColumn>,
}

type JoinIndex = BTreeMap<String, BTreeMap<String, Record>>;

/// Joins several delimited files into one record per identifier pair
#[derive(Debug, Clone)]
pub struct TabularJoin {
    format: String,
    tables: Vec<TableSpec>,
    delimiter: char,
    list_separator: char,
    policy: KeyPolicy,
}

impl TabularJoin {
    pub fn new(format: impl Into<String>, tables: Vec<TableSpec>) -> Self {
        Self {
            format: format.into(),
            tables,
            delimiter: '\t',
            list_separator: ';',
            policy: KeyPolicy::default(),
        }
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_policy(mut self, policy: KeyPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The Drugs@FDA download: products joined with marketing status,
    /// documents, applications and submissions
    pub fn drugs_at_fda() -> Self {
        let compound = || JoinKey::Compound("ApplNo".into(), "ProductNo".into());
        let primary = || JoinKey::Primary("ApplNo".into());
        let tables = vec![
            TableSpec::new("Products.txt", compound())
                .with_split("Form")
                .with_split("ActiveIngredient"),
            TableSpec::new("MarketingStatus.txt", compound()).with_lookup(
                "MarketingStatusID",
                &lookup::MARKETING_STATUS,
                &["MarketingStatus"],
            ),
            TableSpec::new("ApplicationDocs.txt", primary()).with_lookup(
                "ApplicationDocsTypeID",
                &lookup::DOCUMENT_TYPE,
                &["ApplicationDocsType"],
            ),
            TableSpec::new("Applications.txt", primary()),
            TableSpec::new("Submissions.txt", primary()).with_lookup(
                "SubmissionClassCodeID",
                &lookup::SUBMISSION_CLASS,
                &["SubmissionClass", "SubmissionClassDescription"],
            ),
        ];
        let policy = KeyPolicy::new()
            .with_id("ApplNo")
            .add(KeyKind::Name, "ActiveIngredient")
            .add(KeyKind::Name, "DrugName")
            .add(KeyKind::Code, "ApplNo");
        Self::new(DRUGS_AT_FDA, tables)
            .with_delimiter(DRUGS_AT_FDA_DELIMITER)
            .with_policy(policy)
    }

    pub fn tables(&self) -> &[TableSpec] {
        &self.tables
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    fn layout(&self, table: &TableSpec, header: Vec<String>) -> ExtractResult<Layout> {
        let position = |column: &str| {
            header
                .iter()
                .position(|h| h == column)
                .ok_or_else(|| ExtractError::MissingColumn {
                    input: table.file.clone(),
                    column: column.to_string(),
                })
        };
        let primary = position(table.join.primary())?;
        let secondary = table.join.secondary().map(&position).transpose()?;
        let mut lookups = BTreeMap::new();
        for lookup in &table.lookups {
            lookups.insert(position(&lookup.column)?, lookup.clone());
        }
        Ok(Layout {
            header,
            primary,
            secondary,
            lookups,
        })
    }

    /// Field values of one row; `keep_keys` keeps the join columns
    fn row_fields(
        &self,
        table: &TableSpec,
        layout: &Layout,
        tokens: &[String],
        row: u64,
        keep_keys: bool,
    ) -> Result<Vec<(String, PropertyValue)>, FormatError> {
        let mut fields = Vec::with_capacity(tokens.len());
        for (idx, value) in tokens.iter().enumerate() {
            let is_key = idx == layout.primary || Some(idx) == layout.secondary;
            if is_key && !keep_keys {
                continue;
            }
            let name = &layout.header[idx];
            let value = value.trim();

            if let Some(lookup) = layout.lookups.get(&idx) {
                let expanded = lookup
                    .table
                    .resolve(value)
                    .map_err(|msg| FormatError::new(row, format!("{}: {}", table.file, msg)))?;
                fields.push((name.clone(), PropertyValue::from(value)));
                for (output, text) in lookup.outputs.iter().zip(expanded.iter()) {
                    fields.push((output.clone(), PropertyValue::from(*text)));
                }
            } else if table.split.iter().any(|s| s == name) {
                fields.push((name.clone(), PropertyValue::split(value, self.list_separator)));
            } else {
                fields.push((name.clone(), PropertyValue::from(value)));
            }
        }
        Ok(fields)
    }

    /// Load one table into the index; returns (rows merged, rows rejected)
    fn load_table(
        &self,
        input: &InputSet,
        position: usize,
        index: &mut JoinIndex,
    ) -> ExtractResult<(u64, u64)> {
        let table = &self.tables[position];
        let reader = input.open(&table.file).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ExtractError::MissingInput(table.file.clone()),
            _ => ExtractError::io(&table.file, e),
        })?;
        let mut rows =
            DelimitedReader::new(reader, self.delimiter).map_err(|e| ExtractError::io(&table.file, e))?;
        if rows.header().is_empty() {
            return Err(ExtractError::EmptyInput {
                input: table.file.clone(),
            });
        }
        let layout = self.layout(table, rows.header().to_vec())?;

        let first = position == 0;
        let (mut merged, mut rejected, mut unmatched) = (0u64, 0u64, 0u64);

        while let Some((row, tokens)) = rows.next_row().map_err(|e| ExtractError::io(&table.file, e))? {
            if tokens.len() != layout.header.len() {
                warn!(
                    input = %table.file,
                    row,
                    expected = layout.header.len(),
                    found = tokens.len(),
                    "field count mismatch; aligning to the shorter"
                );
            }
            let width = tokens.len().min(layout.header.len());
            let tokens = &tokens[..width];

            let key = |idx: usize| tokens.get(idx).map(|t| t.trim().to_string());
            let Some(primary) = key(layout.primary).filter(|p| !p.is_empty()) else {
                warn!(input = %table.file, row, "row has no {} value", table.join.primary());
                rejected += 1;
                continue;
            };
            let secondary = match layout.secondary {
                Some(idx) => match key(idx).filter(|s| !s.is_empty()) {
                    Some(s) => Some(s),
                    None => {
                        warn!(input = %table.file, row, "row has no secondary identifier");
                        rejected += 1;
                        continue;
                    }
                },
                None => None,
            };

            let fields = match self.row_fields(table, &layout, tokens, row, first) {
                Ok(fields) => fields,
                Err(e) => {
                    warn!(input = %table.file, row = e.record, "skipping row: {}", e.message);
                    rejected += 1;
                    continue;
                }
            };

            if first {
                let secondary = secondary.unwrap_or_else(|| format!("{:010}", row));
                let record = index.entry(primary).or_default().entry(secondary).or_default();
                for (name, value) in fields {
                    record.insert(name, value);
                }
                merged += 1;
                continue;
            }

            let Some(group) = index.get_mut(&primary) else {
                warn!(input = %table.file, row, identifier = %primary, "unknown identifier; row dropped");
                unmatched += 1;
                continue;
            };
            match secondary {
                Some(secondary) => {
                    let Some(record) = group.get_mut(&secondary) else {
                        warn!(
                            input = %table.file,
                            row,
                            identifier = %primary,
                            secondary = %secondary,
                            "unknown identifier pair; row dropped"
                        );
                        unmatched += 1;
                        continue;
                    };
                    for (name, value) in fields {
                        record.insert(name, value);
                    }
                }
                None => {
                    for record in group.values_mut() {
                        for (name, value) in fields.iter().cloned() {
                            record.insert(name, value);
                        }
                    }
                }
            }
            merged += 1;
        }

        info!(input = %table.file, merged, rejected, unmatched, "table loaded");
        Ok((merged, rejected))
    }
}

impl RecordExtractor for TabularJoin {
    fn format(&self) -> &str {
        &self.format
    }

    fn entity_kind(&self) -> EntityKind {
        EntityKind::Generic
    }

    fn required_inputs(&self, _input: &InputSet) -> ExtractResult<Vec<String>> {
        Ok(self.tables.iter().map(|t| t.file.clone()).collect())
    }

    fn default_policy(&self) -> KeyPolicy {
        self.policy.clone()
    }

    /// The join needs every table before the first record is complete, so
    /// the index is built up front and the records streamed from it.
    fn extract(&self, input: &InputSet) -> ExtractResult<RecordStream> {
        let mut index = JoinIndex::new();
        let mut rejected = 0;
        for position in 0..self.tables.len() {
            let (_, skipped) = self.load_table(input, position, &mut index)?;
            rejected += skipped;
        }
        let records: Vec<Record> = index.into_values().flat_map(|g| g.into_values()).collect();
        debug!(format = %self.format, records = records.len(), "join complete");
        Ok(RecordStream::from_records(records).with_rejected(rejected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn products() -> &'static str {
        "ApplNo\tProductNo\tForm\tDrugName\tActiveIngredient\n\
         A001\tP1\tTABLET;ORAL\tASPIRIN\tASPIRIN\n\
         A001\tP2\tCAPSULE\tASPIRIN\tASPIRIN;CAFFEINE\n\
         A002\tP1\tINJECTABLE\tHEPARIN\tHEPARIN SODIUM\n"
    }

    fn two_table_join() -> TabularJoin {
        TabularJoin::new(
            "test",
            vec![
                TableSpec::new("Products.txt", JoinKey::Compound("ApplNo".into(), "ProductNo".into()))
                    .with_split("Form")
                    .with_split("ActiveIngredient"),
                TableSpec::new("Status.txt", JoinKey::Primary("ApplNo".into())),
            ],
        )
    }

    fn collect(join: &TabularJoin, input: &InputSet) -> (Vec<Record>, u64) {
        let mut stream = join.extract(input).unwrap();
        let records = stream.by_ref().map(|r| r.unwrap()).collect();
        (records, stream.rejected())
    }

    #[test]
    fn first_table_establishes_one_record_per_pair() {
        let input = InputSet::memory(vec![
            ("Products.txt", products().as_bytes().to_vec()),
            ("Status.txt", b"ApplNo\tStatus\n".to_vec()),
        ]);
        let (records, _) = collect(&two_table_join(), &input);
        assert_eq!(records.len(), 3);
        assert_eq!(
            records[0].get("Form"),
            Some(&PropertyValue::List(vec!["TABLET".into(), "ORAL".into()]))
        );
        assert_eq!(records[2].get("ApplNo"), Some(&PropertyValue::from("A002")));
    }

    #[test]
    fn primary_keyed_rows_reach_every_product_and_unknown_ids_are_dropped() {
        let status = "ApplNo\tStatus\nA001\tApproved\nZ999\tWithdrawn\n";
        let input = InputSet::memory(vec![
            ("Products.txt", products().as_bytes().to_vec()),
            ("Status.txt", status.as_bytes().to_vec()),
        ]);
        let (records, rejected) = collect(&two_table_join(), &input);
        let with_status: Vec<&Record> = records.iter().filter(|r| r.get("Status").is_some()).collect();
        assert_eq!(with_status.len(), 2);
        assert!(with_status
            .iter()
            .all(|r| r.get("ApplNo") == Some(&PropertyValue::from("A001"))));
        assert_eq!(rejected, 0);
    }

    #[test]
    fn compound_keyed_rows_reach_one_product() {
        let join = TabularJoin::new(
            "test",
            vec![
                TableSpec::new("Products.txt", JoinKey::Compound("ApplNo".into(), "ProductNo".into())),
                TableSpec::new(
                    "MarketingStatus.txt",
                    JoinKey::Compound("ApplNo".into(), "ProductNo".into()),
                )
                .with_lookup("MarketingStatusID", &lookup::MARKETING_STATUS, &["MarketingStatus"]),
            ],
        );
        let status = "MarketingStatusID\tApplNo\tProductNo\n1\tA001\tP1\n9\tA001\tP2\n";
        let input = InputSet::memory(vec![
            ("Products.txt", products().as_bytes().to_vec()),
            ("MarketingStatus.txt", status.as_bytes().to_vec()),
        ]);
        let (records, rejected) = collect(&join, &input);
        assert_eq!(records[0].get("MarketingStatus"), Some(&PropertyValue::from("Prescription")));
        assert_eq!(records[1].get("MarketingStatus"), None);
        assert_eq!(rejected, 1);
    }

    #[test]
    fn short_rows_are_aligned_not_fatal() {
        let products = "ApplNo\tProductNo\tForm\tDrugName\nA001\tP1\tTABLET\n";
        let input = InputSet::memory(vec![
            ("Products.txt", products.as_bytes().to_vec()),
            ("Status.txt", b"ApplNo\tStatus\n".to_vec()),
        ]);
        let (records, _) = collect(&two_table_join(), &input);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("DrugName"), None);
        assert_eq!(records[0].get("Form"), Some(&PropertyValue::from("TABLET")));
    }

    #[test]
    fn missing_table_is_reported_by_name() {
        let input = InputSet::memory(vec![("Products.txt", products().as_bytes().to_vec())]);
        let err = two_table_join().extract(&input).unwrap_err();
        assert!(matches!(err, ExtractError::MissingInput(ref f) if f == "Status.txt"));
    }

    #[test]
    fn missing_join_column_is_fatal() {
        let input = InputSet::memory(vec![
            ("Products.txt", b"Appl\tProductNo\nA001\tP1\n".to_vec()),
            ("Status.txt", b"ApplNo\tStatus\n".to_vec()),
        ]);
        let err = two_table_join().extract(&input).unwrap_err();
        assert!(matches!(err, ExtractError::MissingColumn { .. }));
    }

    #[test]
    fn drugs_at_fda_declares_five_files_in_digest_order() {
        let join = TabularJoin::drugs_at_fda();
        let files = join.required_inputs(&InputSet::memory(Vec::<(String, Vec<u8>)>::new())).unwrap();
        assert_eq!(
            files,
            vec![
                "Products.txt",
                "MarketingStatus.txt",
                "ApplicationDocs.txt",
                "Applications.txt",
                "Submissions.txt"
            ]
        );
        assert_eq!(join.default_policy().id.as_deref(), Some("ApplNo"));
        assert_eq!(join.delimiter(), ',');
    }

    #[test]
    fn quoted_values_may_contain_the_delimiter() {
        let join = TabularJoin::new(
            "test",
            vec![TableSpec::new("Products.txt", JoinKey::Compound("ApplNo".into(), "ProductNo".into()))
                .with_split("Form")],
        )
        .with_delimiter(',');
        let products = "ApplNo,ProductNo,Form\nA001,P1,\"TABLET, FILM COATED;ORAL\"\n";
        let input = InputSet::memory(vec![("Products.txt", products.as_bytes().to_vec())]);
        let (records, rejected) = collect(&join, &input);
        assert_eq!(rejected, 0);
        assert_eq!(
            records[0].get("Form"),
            Some(&PropertyValue::List(vec!["TABLET, FILM COATED".into(), "ORAL".into()]))
        );
    }

    #[test]
    fn submission_class_expands_to_code_and_description() {
        let tables = vec![
            TableSpec::new("Products.txt", JoinKey::Compound("ApplNo".into(), "ProductNo".into())),
            TableSpec::new("Submissions.txt", JoinKey::Primary("ApplNo".into())).with_lookup(
                "SubmissionClassCodeID",
                &lookup::SUBMISSION_CLASS,
                &["SubmissionClass", "SubmissionClassDescription"],
            ),
        ];
        let join = TabularJoin::new("test", tables).with_delimiter(',');
        let input = InputSet::memory(vec![
            ("Products.txt", b"ApplNo,ProductNo\nA001,P1\n".to_vec()),
            ("Submissions.txt", b"ApplNo,SubmissionClassCodeID\nA001,7\n".to_vec()),
        ]);
        let (records, _) = collect(&join, &input);
        assert_eq!(records[0].get("SubmissionClass"), Some(&PropertyValue::from("TYPE 1")));
        assert_eq!(
            records[0].get("SubmissionClassDescription"),
            Some(&PropertyValue::from("Type 1 - New Molecular Entity"))
        );
    }
}
