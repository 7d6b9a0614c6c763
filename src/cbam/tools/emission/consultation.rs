//! Consultation overview: the communication status of every supplier.

use std::path::Path;

use tracing::{debug, info};

use crate::cbam::tools::emission::matching::{
    MatchKind, find_name, same_name, similar_name, strip_parenthetical,
};
use crate::cbam::tools::error::{Result, ToolError};
use crate::cbam::tools::io::excel_read::read_workbook;
use crate::cbam::tools::io::{Grid, Keyword, SearchScope, Workbook, find_keyword, read_header_table};
use crate::cbam::tools::model::CellRef;
use crate::cbam::tools::run::RunContext;

pub const CUSTOMER_LIST_SHEET: &str = "1 - Customer List";
/// Zero-based row holding the alias table headers.
const CUSTOMER_LIST_HEADER_ROW: u32 = 2;
const ALIAS_HEADER: &str = "Alias";
const REAL_NAME_HEADER: &str = "Real Name";

const INSTALLATION_COLUMN: &str = "installation";
const STATUS_COLUMN: &str = "communication status";
const LAST_UPDATE_COLUMN: &str = "date of last update";
const OPERATOR_COLUMN: &str = "operator";

#[derive(Debug, Clone, PartialEq)]
pub struct ConsultationRow {
    pub installation: String,
    pub status: String,
    pub last_update: Option<String>,
    pub operator: Option<String>,
}

/// The importer's sheet of the consultation overview.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsultationOverview {
    pub importer_sheet: String,
    pub rows: Vec<ConsultationRow>,
}

impl ConsultationOverview {
    pub fn load(path: &Path, importer_name: &str, ctx: &mut RunContext) -> Result<Self> {
        let workbook = read_workbook(path)?;
        Self::from_workbook(&workbook, importer_name, ctx)
    }

    pub fn from_workbook(
        workbook: &Workbook,
        importer_name: &str,
        ctx: &mut RunContext,
    ) -> Result<Self> {
        let lookup_name = workbook
            .sheet(CUSTOMER_LIST_SHEET)
            .and_then(|sheet| importer_alias(sheet, importer_name))
            .unwrap_or_else(|| importer_name.to_string());

        let sheet_names: Vec<&str> = workbook.sheet_names().collect();
        let (sheet_name, kind) = find_name(&lookup_name, sheet_names.iter().copied())
            .map(|(name, kind)| (name.to_string(), kind))
            .ok_or_else(|| {
                ToolError::Config(format!(
                    "consultation overview has no sheet for importer '{importer_name}'"
                ))
            })?;
        if kind == MatchKind::Similar {
            ctx.warn(
                "non-exact match on importer sheet",
                format!("'{lookup_name}' matched sheet '{sheet_name}'"),
            );
        }

        let grid = workbook
            .sheet(&sheet_name)
            .ok_or_else(|| ToolError::InvalidWorkbook(format!("missing sheet '{sheet_name}'")))?;
        let rows = read_header_table(
            grid,
            INSTALLATION_COLUMN,
            &[INSTALLATION_COLUMN, STATUS_COLUMN, LAST_UPDATE_COLUMN, OPERATOR_COLUMN],
        )?
        .into_iter()
        .map(|row| {
            let text = |column: &str| {
                row.get(column)
                    .filter(|value| !value.is_empty())
                    .map(|value| value.to_text().trim().to_string())
            };
            ConsultationRow {
                installation: text(INSTALLATION_COLUMN).unwrap_or_default(),
                status: text(STATUS_COLUMN).unwrap_or_default(),
                last_update: text(LAST_UPDATE_COLUMN),
                operator: text(OPERATOR_COLUMN),
            }
        })
        .collect::<Vec<_>>();

        debug!(sheet = %sheet_name, row_count = rows.len(), "consultation overview loaded");
        Ok(Self {
            importer_sheet: sheet_name,
            rows,
        })
    }

    /// Row for a source: exact match, then similar match, then the same
    /// again with a trailing parenthetical removed.
    ///
    /// Several matches resolve to the first one and leave a finding.
    pub fn find(&self, source: &str, ctx: &mut RunContext) -> Result<&ConsultationRow> {
        let mut wanted = source;
        loop {
            if let Some(row) = self.match_rows(wanted, ctx) {
                if wanted != source {
                    info!(source, matched = wanted, "source matched without parenthetical");
                    ctx.note(
                        "source matched without parenthetical",
                        format!("'{source}' matched '{}'", row.installation),
                    );
                }
                return Ok(row);
            }
            match strip_parenthetical(wanted) {
                Some(stem) if wanted == source => wanted = stem,
                _ => break,
            }
        }
        Err(ToolError::Identity {
            name: source.to_string(),
            context: format!(
                "not listed in consultation overview sheet '{}'",
                self.importer_sheet
            ),
        })
    }

    fn match_rows(&self, wanted: &str, ctx: &mut RunContext) -> Option<&ConsultationRow> {
        let exact: Vec<&ConsultationRow> = self
            .rows
            .iter()
            .filter(|row| same_name(&row.installation, wanted))
            .collect();
        if let Some(first) = exact.first().copied() {
            if exact.len() > 1 {
                ctx.warn(
                    "multiple installations in consultation overview",
                    format!("'{wanted}' listed {} times, using the first one", exact.len()),
                );
            }
            return Some(first);
        }

        let similar: Vec<&ConsultationRow> = self
            .rows
            .iter()
            .filter(|row| similar_name(&row.installation, wanted))
            .collect();
        let first = similar.first().copied()?;
        if similar.len() > 1 {
            ctx.warn(
                "multiple non-exact matches in consultation overview",
                format!(
                    "'{wanted}' matches {} rows, using the first one",
                    similar.len()
                ),
            );
        }
        ctx.warn(
            "non-exact match on installation",
            format!("'{wanted}' matched '{}'", first.installation),
        );
        Some(first)
    }
}

/// Alias registered for the importer in the customer list, if any.
fn importer_alias(sheet: &Grid, importer_name: &str) -> Option<String> {
    let alias_header = find_keyword(
        sheet,
        &Keyword::parse(ALIAS_HEADER),
        SearchScope::Row(CUSTOMER_LIST_HEADER_ROW),
        false,
    )?;
    let real_header = find_keyword(
        sheet,
        &Keyword::parse(REAL_NAME_HEADER),
        SearchScope::Row(CUSTOMER_LIST_HEADER_ROW),
        false,
    )?;
    let mut alias_found = None;
    for row in CUSTOMER_LIST_HEADER_ROW + 1..sheet.height() {
        let alias = sheet.get(CellRef::new(row, alias_header.col)).to_text();
        let real = sheet.get(CellRef::new(row, real_header.col)).to_text();
        if alias.trim().is_empty() || real.trim().is_empty() {
            continue;
        }
        if similar_name(&real, importer_name) {
            info!(alias = alias.trim(), importer = importer_name, "importer alias found");
            alias_found = Some(alias.trim().to_string());
        }
    }
    alias_found
}
