//! Fixed code tables used to expand numeric lookup columns

/// An immutable code table.
///
/// Row `n` holds the expansions for code `n`; every row has the same width,
/// one value per output column.
#[derive(Debug)]
pub struct LookupTable {
    pub name: &'static str,
    rows: &'static [&'static [&'static str]],
}

impl LookupTable {
    pub const fn new(name: &'static str, rows: &'static [&'static [&'static str]]) -> Self {
        Self { name, rows }
    }

    /// Number of values each code expands to
    pub fn width(&self) -> usize {
        self.rows.first().map_or(0, |r| r.len())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Expand a raw code; unparseable or out-of-range codes are an error message
    pub fn resolve(&self, raw: &str) -> Result<&'static [&'static str], String> {
        let code: usize = raw
            .trim()
            .parse()
            .map_err(|_| format!("{} code '{}' is not a number", self.name, raw.trim()))?;
        self.rows.get(code).copied().ok_or_else(|| {
            format!(
                "{} code {} is out of range (0..{})",
                self.name,
                code,
                self.rows.len()
            )
        })
    }
}

/// Drugs@FDA `MarketingStatus_Lookup`
pub static MARKETING_STATUS: LookupTable = LookupTable::new(
    "MarketingStatus",
    &[
        &[""],
        &["Prescription"],
        &["Over-the-counter"],
        &["Discontinued"],
        &["None (Tentative Approval)"],
    ],
);

/// Drugs@FDA `ApplicationsDocsType_Lookup`
pub static DOCUMENT_TYPE: LookupTable = LookupTable::new(
    "ApplicationDocsType",
    &[
        &[""],
        &["Letter"],
        &["Label"],
        &["Review"],
        &["FDA Talk Paper"],
        &["FDA Press Release"],
        &["Patient Package Insert"],
        &["Dear Health Professional Letter"],
        &["Medication Guide"],
        &["Withdrawal Notice"],
        &["Other Important Information from FDA"],
        &["Consumer Information Sheet"],
        &["Exclusivity Letter"],
        &["Questions and Answers"],
        &["Other"],
        &["Patient Information Sheet"],
        &["Healthcare Professional Sheet"],
        &["Pediatric Summary, Medical Review"],
        &["Pediatric Summary, Clinical Pharmacology Review"],
        &["REMS"],
        &["Pediatric Summary, Clinical Pharmacology Review"],
        &["Summary Review"],
    ],
);

/// Drugs@FDA `SubmissionClass_Lookup`: (class code, description)
pub static SUBMISSION_CLASS: LookupTable = LookupTable::new(
    "SubmissionClass",
    &[
        &["", ""],
        &["BIOEQUIV", "Bioequivalence"],
        &["EFFICACY", "Efficacy"],
        &["LABELING", "Labeling"],
        &["MANUF (CMC)", "Manufacturing (CMC)"],
        &["N/A", "Not Applicable"],
        &["S", "Supplement"],
        &["TYPE 1", "Type 1 - New Molecular Entity"],
        &["TYPE 1/4", "Type 1 - New Molecular Entity and Type 4 - New Combination"],
        &["TYPE 2", "Type 2 - New Active Ingredient"],
        &["TYPE 2/3", "Type 2 - New Active Ingredient and Type 3 - New Dosage Form"],
        &["TYPE 2/4", "Type 2 New Active Ingredient and Type 4 New Combination"],
        &["TYPE 3", "Type 3 - New Dosage Form"],
        &["TYPE 3/4", "Type 3 - New Dosage Form and Type 4 - New Combination"],
        &["TYPE 4", "Type 4 - New Combination"],
        &["TYPE 5", "Type 5 - New Formulation or New Manufacturer"],
        &["TYPE 6", "Type 6 - New Indication (no longer used)"],
        &["TYPE 7", "Type 7 - Drug Already Marketed without Approved NDA"],
        &["TYPE 8", "Type 8 - Partial Rx to OTC Switch"],
        &["UNKNOWN", ""],
        &["Unspecified", ""],
        &["REMS", "REMS"],
        &["TYPE 10", "Type 10 - New Indication Submitted as Distinct NDA - Not Consolidated"],
        &["MEDGAS", "Medical Gas"],
        &[
            "TYPE 9",
            "Type 9 - New Indication Submitted as Distinct NDA, Consolidated with Original NDA after Approval",
        ],
        &["TYPE 9- BLA", "Type 9 - New indication submitted as distinct BLA, consolidated"],
    ],
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_are_rectangular() {
        for table in [&MARKETING_STATUS, &DOCUMENT_TYPE, &SUBMISSION_CLASS] {
            assert!(!table.is_empty(), "{} is empty", table.name);
            let width = table.width();
            for code in 0..table.len() {
                let row = table.resolve(&code.to_string()).unwrap();
                assert_eq!(row.len(), width, "{} row {}", table.name, code);
            }
        }
    }

    #[test]
    fn resolves_known_codes() {
        assert_eq!(MARKETING_STATUS.resolve("1").unwrap(), &["Prescription"]);
        assert_eq!(
            SUBMISSION_CLASS.resolve(" 7 ").unwrap(),
            &["TYPE 1", "Type 1 - New Molecular Entity"]
        );
    }

    #[test]
    fn bad_codes_are_errors_not_panics() {
        assert!(MARKETING_STATUS.resolve("9").unwrap_err().contains("out of range"));
        assert!(DOCUMENT_TYPE.resolve("x").unwrap_err().contains("not a number"));
        assert!(SUBMISSION_CLASS.resolve("-1").is_err());
    }
}
