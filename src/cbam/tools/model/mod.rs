use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};

pub mod report;

pub use report::{
    Attachment, DeterminationType, DirectEmissions, EmissionData, GeneralInfo, GoodsEmission,
    ImportedGood, Importer, IndirectEmissions, Installation, InwardProcessingSplit, Operator,
    Procedure, Report, Summary, SupportingDocument,
};

/// A single spreadsheet value after it left the workbook reader.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ScalarValue {
    /// Plain string literal.
    String(String),
    /// Floating point number literal.
    Number(f64),
    /// Boolean literal.
    Boolean(bool),
    /// Empty cell or a value explicitly cleared by normalization.
    Null,
}

impl ScalarValue {
    /// Empty cells and empty strings are treated alike by every consumer.
    pub fn is_empty(&self) -> bool {
        match self {
            ScalarValue::Null => true,
            ScalarValue::String(value) => value.is_empty(),
            _ => false,
        }
    }

    /// Textual rendering used for regex validation and merge keys.
    ///
    /// Integral numbers render without a fractional part so a commodity code
    /// typed as a number still reads `72081000`.
    pub fn to_text(&self) -> String {
        match self {
            ScalarValue::String(value) => value.clone(),
            ScalarValue::Number(value) => value.to_string(),
            ScalarValue::Boolean(value) => value.to_string(),
            ScalarValue::Null => String::new(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            ScalarValue::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// Converts the scalar into its JSON representation.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ScalarValue::String(value) => serde_json::Value::String(value.clone()),
            ScalarValue::Number(value) => serde_json::Number::from_f64(*value)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ScalarValue::Boolean(value) => serde_json::Value::Bool(*value),
            ScalarValue::Null => serde_json::Value::Null,
        }
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::String(value.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        ScalarValue::String(value)
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        ScalarValue::Number(value)
    }
}

/// Zero-based worksheet coordinate rendered in A1 notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Parses an A1 reference such as `B12`. Lowercase letters are accepted.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let split = text.find(|c: char| c.is_ascii_digit())?;
        let (letters, digits) = text.split_at(split);
        if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
            return None;
        }
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let row: u32 = digits.parse().ok()?;
        if row == 0 {
            return None;
        }
        let mut col: u32 = 0;
        for letter in letters.chars() {
            let value = letter.to_ascii_uppercase() as u32 - 'A' as u32 + 1;
            col = col.checked_mul(26)?.checked_add(value)?;
        }
        Some(Self {
            row: row - 1,
            col: col - 1,
        })
    }

    pub fn column_letters(&self) -> String {
        let mut letters = Vec::new();
        let mut remaining = self.col + 1;
        while remaining > 0 {
            let rem = (remaining - 1) % 26;
            letters.push((b'A' + rem as u8) as char);
            remaining = (remaining - 1) / 26;
        }
        letters.iter().rev().collect()
    }

    pub fn right(&self) -> Self {
        Self::new(self.row, self.col + 1)
    }

    pub fn below(&self) -> Self {
        Self::new(self.row + 1, self.col)
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.column_letters(), self.row + 1)
    }
}

impl Serialize for CellRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One row (vertical table) or column (horizontal table) of extracted values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawEntry {
    /// Cell holding the entry's primary key.
    pub cell: CellRef,
    /// Field code name → normalized value.
    pub values: BTreeMap<String, ScalarValue>,
}

impl RawEntry {
    pub fn new(cell: CellRef) -> Self {
        Self {
            cell,
            values: BTreeMap::new(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&ScalarValue> {
        self.values.get(field)
    }

    /// Text of a field, `None` when absent or empty.
    pub fn text(&self, field: &str) -> Option<String> {
        self.values
            .get(field)
            .filter(|value| !value.is_empty())
            .map(ScalarValue::to_text)
    }

    pub fn number(&self, field: &str) -> Option<f64> {
        self.values.get(field).and_then(ScalarValue::as_number)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: ScalarValue) {
        self.values.insert(field.into(), value);
    }
}

/// Entries of one table, keyed by code names in the effective layout.
pub type TableEntries = Vec<RawEntry>;

/// Everything extracted from one workbook: sheet code → table name → entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractedWorkbook {
    /// Layout version key the workbook was read with.
    pub version: String,
    pub sheets: BTreeMap<String, BTreeMap<String, TableEntries>>,
}

impl ExtractedWorkbook {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            sheets: BTreeMap::new(),
        }
    }

    /// Entries of a table, empty when the sheet or table was not present.
    pub fn table(&self, sheet: &str, table: &str) -> &[RawEntry] {
        self.sheets
            .get(sheet)
            .and_then(|tables| tables.get(table))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_sheet(&self, sheet: &str) -> bool {
        self.sheets.contains_key(sheet)
    }

    pub fn insert_table(&mut self, sheet: &str, table: &str, entries: TableEntries) {
        self.sheets
            .entry(sheet.to_string())
            .or_default()
            .insert(table.to_string(), entries);
    }
}
