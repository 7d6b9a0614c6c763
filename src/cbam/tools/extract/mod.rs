//! Keyword-anchored table extraction.
//!
//! Extraction runs in two phases. [`resolve_table`] searches the worksheet
//! for the table anchor and every field header and returns the coordinates as
//! a [`ResolvedTable`]. [`extract_entries`] then reads and normalizes values
//! from those coordinates without any further searching.

use tracing::{debug, info, instrument, warn};

use crate::cbam::tools::error::{FieldLocation, Result, ToolError};
use crate::cbam::tools::io::{Grid, SearchScope, Workbook, find_keyword};
use crate::cbam::tools::layout::{
    Anchor, FieldDescriptor, Layout, Orientation, SheetDescriptor, TableDescriptor,
};
use crate::cbam::tools::model::{CellRef, ExtractedWorkbook, RawEntry, ScalarValue};
use crate::cbam::tools::validate::{Mode, Normalizer};

/// Primary key placeholder that counts as an empty cell.
const EMPTY_KEY_MARKER: &str = "--";

/// A field whose header was found, with the row or column it occupies.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedField {
    pub descriptor: FieldDescriptor,
    pub header: CellRef,
}

impl ResolvedField {
    fn cell(&self, orientation: Orientation, line: u32) -> CellRef {
        match orientation {
            Orientation::Vertical => CellRef::new(line, self.header.col),
            Orientation::Horizontal => CellRef::new(self.header.row, line),
        }
    }
}

/// Output of the anchor phase: every coordinate extraction needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTable {
    pub sheet: String,
    pub table: String,
    pub orientation: Orientation,
    pub anchor: CellRef,
    pub fields: Vec<ResolvedField>,
    /// Index into `fields`.
    pub primary_key: usize,
    /// Distance from the anchor to the first data row or column.
    pub first_offset: u32,
    pub num_entries: u32,
}

impl ResolvedTable {
    pub fn primary_key_field(&self) -> &ResolvedField {
        &self.fields[self.primary_key]
    }

    /// Rows (vertical) or columns (horizontal) that may hold entries.
    pub fn lines(&self) -> impl Iterator<Item = u32> + '_ {
        let start = match self.orientation {
            Orientation::Vertical => self.anchor.row,
            Orientation::Horizontal => self.anchor.col,
        };
        (self.first_offset..self.first_offset + self.num_entries).map(move |offset| start + offset)
    }
}

/// Anchor phase: finds the anchor cell, field headers, and primary key.
pub fn resolve_table(grid: &Grid, sheet: &str, table: &TableDescriptor) -> Result<ResolvedTable> {
    let anchor = table
        .anchors
        .iter()
        .find_map(|anchor| match anchor {
            Anchor::Cell { cell, keyword } => {
                find_keyword(grid, keyword, SearchScope::Anywhere, false).or(Some(*cell))
            }
            Anchor::Keyword(keyword) => {
                let hit = find_keyword(grid, keyword, SearchScope::Anywhere, false);
                if hit.is_none() {
                    debug!(table = %table.name, keyword = keyword.text(), "anchor candidate not found");
                }
                hit
            }
        })
        .ok_or_else(|| ToolError::MissingAnchor {
            sheet: sheet.to_string(),
            table: table.name.clone(),
            keywords: table.anchors.iter().map(anchor_label).collect(),
        })?;

    let scope = match table.orientation {
        Orientation::Vertical => SearchScope::Row(anchor.row),
        Orientation::Horizontal => SearchScope::Column(anchor.col),
    };

    let mut fields = Vec::with_capacity(table.fields.len());
    for field in &table.fields {
        let header = field
            .aliases
            .iter()
            .find_map(|alias| find_keyword(grid, alias, scope, false));
        match header {
            Some(header) => fields.push(ResolvedField {
                descriptor: field.clone(),
                header,
            }),
            None if field.required => {
                return Err(ToolError::MissingField {
                    sheet: sheet.to_string(),
                    table: table.name.clone(),
                    field: field.code.clone(),
                });
            }
            None => debug!(table = %table.name, field = %field.code, "optional field absent"),
        }
    }

    let primary_key = fields
        .iter()
        .position(|field| field.descriptor.primary_key)
        .or_else(|| {
            fields
                .iter()
                .position(|field| field.descriptor.field_type.is_mandatory())
        })
        .ok_or_else(|| {
            ToolError::Layout(format!(
                "cannot determine primary key for table '{}' in sheet '{sheet}'",
                table.name
            ))
        })?;

    Ok(ResolvedTable {
        sheet: sheet.to_string(),
        table: table.name.clone(),
        orientation: table.orientation,
        anchor,
        fields,
        primary_key,
        first_offset: table.num_examples + 1,
        num_entries: table.num_entries,
    })
}

fn anchor_label(anchor: &Anchor) -> String {
    match anchor {
        Anchor::Cell { keyword, .. } | Anchor::Keyword(keyword) => keyword.text().to_string(),
    }
}

fn is_empty_key(value: &ScalarValue) -> bool {
    value.is_empty() || value.as_str().is_some_and(|text| text.trim() == EMPTY_KEY_MARKER)
}

/// Extraction phase: reads and normalizes every entry of a resolved table.
///
/// Entries with an empty primary key are skipped; a run of skipped entries
/// is reported once, when the next non-empty entry appears. Invalid values
/// are fatal and carry their cell coordinate.
pub fn extract_entries(
    grid: &Grid,
    table: &ResolvedTable,
    normalizer: &Normalizer<'_>,
) -> Result<Vec<RawEntry>> {
    let mut entries = Vec::new();
    let mut in_gap = false;
    let key_field = table.primary_key_field();

    for line in table.lines() {
        let key_cell = key_field.cell(table.orientation, line);
        if is_empty_key(grid.get(key_cell)) {
            in_gap = true;
            continue;
        }
        if in_gap {
            warn!(
                sheet = %table.sheet,
                table = %table.table,
                before = %key_cell,
                "empty entries inside table"
            );
            in_gap = false;
        }

        let mut entry = RawEntry::new(key_cell);
        for field in &table.fields {
            let cell = field.cell(table.orientation, line);
            let location = || FieldLocation {
                sheet: table.sheet.clone(),
                table: table.table.clone(),
                field: field.descriptor.code.clone(),
                cell,
            };
            let raw = grid.get(cell).clone();
            let normalized = normalizer
                .normalize(&field.descriptor.field_type, raw.clone(), &entry, Mode::Strict)
                .map_err(|error| error.at(location()))?;
            if !normalized.valid {
                return Err(ToolError::Validation {
                    message: format!(
                        "invalid value '{}' for type '{}'",
                        raw.to_text(),
                        field.descriptor.field_type
                    ),
                    location: Some(location()),
                });
            }
            entry.insert(field.descriptor.code.clone(), normalized.value);
        }
        entries.push(entry);
    }

    if entries.is_empty() {
        warn!(sheet = %table.sheet, table = %table.table, "table has no entries");
    }
    Ok(entries)
}

/// Finds the worksheet for a sheet descriptor by its display aliases.
pub fn find_sheet<'w>(workbook: &'w Workbook, sheet: &SheetDescriptor) -> Option<&'w Grid> {
    sheet
        .aliases
        .iter()
        .find_map(|alias| workbook.sheet(alias))
        .or_else(|| {
            sheet
                .aliases
                .iter()
                .find_map(|alias| workbook.sheet_ignore_case(alias))
        })
}

/// Runs both phases for every table of every sheet in the layout.
#[instrument(level = "info", skip_all, fields(version = %layout.version))]
pub fn extract_workbook(
    workbook: &Workbook,
    layout: &Layout,
    normalizer: &Normalizer<'_>,
) -> Result<ExtractedWorkbook> {
    let mut extracted = ExtractedWorkbook::new(layout.version.clone());
    for sheet in &layout.sheets {
        let Some(grid) = find_sheet(workbook, sheet) else {
            warn!(sheet = %sheet.code, aliases = ?sheet.aliases, "sheet not found in workbook");
            continue;
        };
        for table in &sheet.tables {
            let resolved = resolve_table(grid, &sheet.code, table)?;
            debug!(table = %table.name, anchor = %resolved.anchor, "table anchored");
            let entries = extract_entries(grid, &resolved, normalizer)?;
            info!(sheet = %sheet.code, table = %table.name, entry_count = entries.len(), "table extracted");
            extracted.insert_table(&sheet.code, &table.name, entries);
        }
        if sheet.tables.is_empty() {
            extracted.sheets.entry(sheet.code.clone()).or_default();
        }
    }
    Ok(extracted)
}
