//! Layout documents describe where data lives in a customer workbook.
//!
//! A document has a `base` layout and any number of `version_<x>_<y>[_<z>]`
//! overlays. Loading decodes the document once into typed descriptors;
//! [`LayoutDocument::resolve`] then produces an immutable effective
//! [`Layout`] for one version without touching the cached base.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_yaml::Value;
use tracing::{debug, warn};

use crate::cbam::tools::error::{Result, ToolError};
use crate::cbam::tools::io::Keyword;
use crate::cbam::tools::model::CellRef;

pub mod field_type;
pub mod version;

pub use field_type::{
    Clause, Combinator, Condition, ConditionOutcome, FieldType, Operator, Requirement,
};
pub use version::{detect_version, merge_sheets, version_key};

use field_type::RawCondition;

/// Keys whose values keep their original case when the document is loaded.
const CASE_PROTECTED_KEYS: &[&str] = &["code_sheet_name", "alias_sheet_name"];

const BASE_KEY: &str = "base";
const AUTO_PREFIX: &str = "auto:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// One entry per row, field headers along the anchor row.
    Vertical,
    /// One entry per column, field headers down the anchor column.
    Horizontal,
}

/// Where a table starts.
#[derive(Debug, Clone, PartialEq)]
pub enum Anchor {
    /// Header text to search the sheet for.
    Keyword(Keyword),
    /// Text that reads as an A1 reference, such as `b3` or `co2`.
    ///
    /// The text is searched like a keyword first; the coordinate applies
    /// only when no cell carries that text.
    Cell { cell: CellRef, keyword: Keyword },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub code: String,
    pub aliases: Vec<Keyword>,
    pub field_type: FieldType,
    pub primary_key: bool,
    /// Whether the header must be present in the workbook.
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableDescriptor {
    pub name: String,
    pub orientation: Orientation,
    /// Candidate anchors in priority order.
    pub anchors: Vec<Anchor>,
    pub num_entries: u32,
    pub num_examples: u32,
    pub fields: Vec<FieldDescriptor>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SheetDescriptor {
    pub code: String,
    pub aliases: Vec<String>,
    pub tables: Vec<TableDescriptor>,
}

/// The fully resolved layout for one workbook.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub version: String,
    pub sheets: Vec<SheetDescriptor>,
}

impl Layout {
    pub fn sheet(&self, code: &str) -> Option<&SheetDescriptor> {
        self.sheets.iter().find(|sheet| sheet.code == code)
    }
}

/// A decoded layout document: base sheets plus named overlays.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutDocument {
    base: Vec<SheetDescriptor>,
    overlays: BTreeMap<String, Option<Vec<SheetDescriptor>>>,
}

impl LayoutDocument {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ToolError::MissingInput(path.to_path_buf()));
        }
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let document: Value = serde_yaml::from_str(text)?;
        let Value::Mapping(mapping) = case_fold(document, false) else {
            return Err(ToolError::Layout("layout document must be a mapping".into()));
        };

        let mut base = None;
        let mut overlays = BTreeMap::new();
        for (key, value) in mapping {
            let Some(key) = key.as_str().map(str::to_string) else {
                continue;
            };
            let raw: RawLayout = serde_yaml::from_value(value)?;
            if key == BASE_KEY {
                let sheets = raw.sheets.ok_or_else(|| {
                    ToolError::Layout("base layout does not define any sheets".into())
                })?;
                base = Some(decode_sheets(sheets)?);
            } else {
                let sheets = raw.sheets.map(decode_sheets).transpose()?;
                overlays.insert(key, sheets);
            }
        }

        let base = base.ok_or_else(|| ToolError::Layout("missing base layout".into()))?;
        debug!(
            sheet_count = base.len(),
            overlay_count = overlays.len(),
            "layout document loaded"
        );
        Ok(Self { base, overlays })
    }

    pub fn has_version(&self, key: &str) -> bool {
        self.overlays.contains_key(key)
    }

    pub fn versions(&self) -> impl Iterator<Item = &str> {
        self.overlays.keys().map(String::as_str)
    }

    pub fn base(&self) -> &[SheetDescriptor] {
        &self.base
    }

    /// Applies the overlay named `key` to the base layout.
    pub fn resolve(&self, key: &str) -> Result<Layout> {
        let overlay = self
            .overlays
            .get(key)
            .ok_or_else(|| ToolError::Layout(format!("missing layout version '{key}'")))?;
        let sheets = match overlay {
            Some(sheets) => merge_sheets(&self.base, sheets),
            None => {
                warn!(version = key, "layout version defines no sheets, using base layout");
                self.base.clone()
            }
        };
        Ok(Layout {
            version: key.to_string(),
            sheets,
        })
    }
}

/// Lowercases every string value except those under protected keys.
fn case_fold(value: Value, protected: bool) -> Value {
    match value {
        Value::String(text) if !protected => Value::String(text.to_lowercase()),
        Value::Sequence(items) => Value::Sequence(
            items
                .into_iter()
                .map(|item| case_fold(item, protected))
                .collect(),
        ),
        Value::Mapping(mapping) => Value::Mapping(
            mapping
                .into_iter()
                .map(|(key, value)| {
                    let keep = protected
                        || key
                            .as_str()
                            .is_some_and(|key| CASE_PROTECTED_KEYS.contains(&key));
                    (key, case_fold(value, keep))
                })
                .collect(),
        ),
        other => other,
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

/// Entry counts are written as locale formatted text such as `"1.000"`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Count {
    Number(u32),
    Text(String),
}

impl Count {
    fn value(&self, what: &str, table: &str) -> Result<u32> {
        match self {
            Count::Number(value) => Ok(*value),
            Count::Text(text) => text.replace('.', "").trim().parse().map_err(|_| {
                ToolError::Layout(format!("invalid {what} '{text}' for table '{table}'"))
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawLayout {
    #[serde(default)]
    sheets: Option<Vec<RawSheet>>,
}

#[derive(Debug, Deserialize)]
struct RawSheet {
    #[serde(default)]
    code_sheet_name: Option<String>,
    #[serde(default)]
    alias_sheet_name: Option<OneOrMany>,
    #[serde(default)]
    tables: Vec<RawTable>,
}

#[derive(Debug, Deserialize)]
struct RawTable {
    table_name: String,
    orientation: Orientation,
    upper_left: OneOrMany,
    num_entries: Count,
    #[serde(default)]
    num_examples: Option<Count>,
    #[serde(default)]
    fields: Vec<RawField>,
}

#[derive(Debug, Deserialize)]
struct RawField {
    code_field_name: String,
    #[serde(default)]
    alias_field_name: Option<OneOrMany>,
    #[serde(rename = "type")]
    type_tag: String,
    #[serde(default)]
    primary_key: bool,
    #[serde(default = "default_required")]
    required: bool,
    #[serde(default)]
    condition: Option<RawCondition>,
}

fn default_required() -> bool {
    true
}

fn decode_sheets(sheets: Vec<RawSheet>) -> Result<Vec<SheetDescriptor>> {
    sheets.into_iter().map(decode_sheet).collect()
}

fn decode_sheet(sheet: RawSheet) -> Result<SheetDescriptor> {
    let code = sheet
        .code_sheet_name
        .filter(|code| !code.trim().is_empty())
        .ok_or_else(|| ToolError::Layout("sheet entry without code_sheet_name".into()))?;
    let aliases = sheet
        .alias_sheet_name
        .map(OneOrMany::into_vec)
        .unwrap_or_else(|| vec![code.clone()]);
    let tables = sheet
        .tables
        .into_iter()
        .map(decode_table)
        .collect::<Result<Vec<_>>>()?;
    Ok(SheetDescriptor {
        code,
        aliases,
        tables,
    })
}

fn decode_table(table: RawTable) -> Result<TableDescriptor> {
    let num_entries = table.num_entries.value("num_entries", &table.table_name)?;
    let num_examples = table
        .num_examples
        .as_ref()
        .map(|count| count.value("num_examples", &table.table_name))
        .transpose()?
        .unwrap_or(0);
    let anchors = table
        .upper_left
        .into_vec()
        .iter()
        .map(|raw| decode_anchor(raw))
        .collect();
    let fields = table
        .fields
        .into_iter()
        .map(decode_field)
        .collect::<Result<Vec<_>>>()?;
    Ok(TableDescriptor {
        name: table.table_name,
        orientation: table.orientation,
        anchors,
        num_entries,
        num_examples,
        fields,
    })
}

fn decode_anchor(raw: &str) -> Anchor {
    if let Some(keyword) = raw.strip_prefix(AUTO_PREFIX) {
        return Anchor::Keyword(Keyword::parse(keyword));
    }
    let keyword = Keyword::parse(raw);
    match CellRef::parse(raw) {
        Some(cell) => Anchor::Cell { cell, keyword },
        None => Anchor::Keyword(keyword),
    }
}

fn decode_field(field: RawField) -> Result<FieldDescriptor> {
    let condition = field.condition.map(RawCondition::decode).transpose()?;
    let aliases = field
        .alias_field_name
        .map(OneOrMany::into_vec)
        .unwrap_or_else(|| vec![field.code_field_name.clone()])
        .iter()
        .map(|alias| Keyword::parse(alias))
        .collect();
    Ok(FieldDescriptor {
        aliases,
        field_type: FieldType::decode(&field.type_tag, condition),
        primary_key: field.primary_key,
        required: field.required,
        code: field.code_field_name,
    })
}
